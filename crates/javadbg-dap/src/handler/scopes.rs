use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::{Arguments, Command};
use crate::dap::types::Scope;
use crate::error::HandlerResult;

pub struct ScopesHandler;

#[async_trait]
impl DebugRequestHandler for ScopesHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Scopes]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Scopes(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        let mut scopes = Vec::new();
        // A stale frame handle means the thread resumed: nothing to show.
        if let Some(PoolObject::Frame(frame)) = context.handle(args.frame_id) {
            scopes.push(Scope {
                name: "Local".to_string(),
                variables_reference: context.add_handle(PoolObject::Scope(frame)),
                expensive: false,
            });
        }

        response.set_body(&json!({ "scopes": scopes }));
        Ok(())
    }
}

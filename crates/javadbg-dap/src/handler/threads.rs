use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::SessionContext;
use crate::dap::requests::{Arguments, Command};
use crate::dap::types::Thread;
use crate::error::{AdapterError, ErrorCode, HandlerResult};

pub struct ThreadsHandler;

#[async_trait]
impl DebugRequestHandler for ThreadsHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Threads]
    }

    async fn handle(
        &self,
        _command: Command,
        _arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let threads: Vec<Thread> = match context.session() {
            Some(session) => session
                .all_threads()
                .await
                .map_err(|err| {
                    AdapterError::vm(ErrorCode::UnknownFailure, "Failed to get threads", err)
                })?
                .into_iter()
                .map(|thread| Thread {
                    id: thread.id,
                    name: format!("Thread [{}]", thread.name),
                })
                .collect(),
            None => Vec::new(),
        };

        response.set_body(&json!({ "threads": threads }));
        Ok(())
    }
}

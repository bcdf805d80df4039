use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::SessionContext;
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, HandlerResult};

pub struct SourceHandler;

#[async_trait]
impl DebugRequestHandler for SourceHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Source]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Source(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        // `source.sourceReference` takes over when the top-level one is unset.
        let reference = match args.source_reference {
            0 => args
                .source
                .as_ref()
                .map(|source| source.source_reference)
                .unwrap_or(0),
            reference => reference,
        };

        let uri = context
            .source_refs()
            .get(reference)
            .cloned()
            .ok_or_else(|| {
                AdapterError::argument_missing(format!(
                    "SourceReference {reference} is not a valid source reference."
                ))
            })?;

        let content = context
            .source_lookup()
            .source_contents(&uri)
            .unwrap_or_default();
        response.set_body(&json!({ "content": content }));
        Ok(())
    }
}

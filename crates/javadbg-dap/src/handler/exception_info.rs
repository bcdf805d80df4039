use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::SessionContext;
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

/// Describes the exception a thread is stopped on.
pub struct ExceptionInfoHandler;

#[async_trait]
impl DebugRequestHandler for ExceptionInfoHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::ExceptionInfo]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::ExceptionInfo(args) = arguments else {
            return Err(unexpected_arguments(command));
        };
        let session = require_session(context)?;
        let thread_id = args.thread_id;

        let threads = session.all_threads().await.map_err(|err| {
            AdapterError::vm(ErrorCode::ExceptionInfoFailure, "Failed to get threads", err)
        })?;
        if !threads.iter().any(|thread| thread.id == thread_id) {
            return Err(AdapterError::new(
                ErrorCode::ExceptionInfoFailure,
                format!("Thread {thread_id} doesn't exist."),
            ));
        }

        let Some(thrown) = context.exception(thread_id) else {
            return Err(AdapterError::new(
                ErrorCode::ExceptionInfoFailure,
                format!("No exception exists in thread {thread_id}"),
            ));
        };

        let type_name = thrown.exception.type_name;
        let description = match session
            .invoke_to_string(thread_id, thrown.exception.id)
            .await
        {
            Ok(description) => description,
            Err(err) => {
                tracing::warn!(
                    target: "javadbg.dap",
                    thread_id,
                    error = %err,
                    "toString() of the exception failed"
                );
                type_name.clone()
            }
        };
        let break_mode = if thrown.uncaught {
            "userUnhandled"
        } else {
            "always"
        };

        response.set_body(&json!({
            "exceptionId": type_name,
            "description": description,
            "breakMode": break_mode,
        }));
        Ok(())
    }
}

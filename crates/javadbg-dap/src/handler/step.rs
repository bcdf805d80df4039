use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::StepKind;
use serde_json::json;

use super::{require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::SessionContext;
use crate::dap::messages::Event;
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

/// Execution control: `continue`, `next`, `stepIn`, `stepOut` and `pause`.
pub struct StepHandler;

#[async_trait]
impl DebugRequestHandler for StepHandler {
    fn commands(&self) -> &'static [Command] {
        &[
            Command::Continue,
            Command::Next,
            Command::StepIn,
            Command::StepOut,
            Command::Pause,
        ]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let session = require_session(context)?;
        let fail = |what: &str, err| AdapterError::vm(ErrorCode::UnknownFailure, what, err);

        match arguments {
            Arguments::Continue(args) => {
                let threads = session
                    .all_threads()
                    .await
                    .map_err(|err| fail("Failed to resume", err))?;
                let thread_id = args
                    .thread_id
                    .filter(|id| threads.iter().any(|thread| thread.id == *id));

                match thread_id {
                    Some(thread_id) => session.resume_thread(thread_id).await,
                    None => session.resume_vm().await,
                }
                .map_err(|err| fail("Failed to resume", err))?;

                context.clear_exceptions(thread_id);
                context
                    .recycle_handles_after_resume(session.as_ref(), thread_id)
                    .await;
                response.set_body(&json!({ "allThreadsContinued": thread_id.is_none() }));
            }
            Arguments::Next(args) | Arguments::StepIn(args) | Arguments::StepOut(args) => {
                let kind = match command {
                    Command::StepIn => StepKind::Into,
                    Command::StepOut => StepKind::Out,
                    _ => StepKind::Over,
                };
                session
                    .step(args.thread_id, kind)
                    .await
                    .map_err(|err| fail("Failed to step", err))?;
                context.clear_exceptions(Some(args.thread_id));
                context
                    .recycle_handles_after_resume(session.as_ref(), Some(args.thread_id))
                    .await;
            }
            Arguments::Pause(args) => {
                match args.thread_id {
                    Some(thread_id) => {
                        session
                            .suspend_thread(thread_id)
                            .await
                            .map_err(|err| fail("Failed to pause", err))?;
                        response.defer_event(Event::stopped("pause", thread_id, false));
                    }
                    None => {
                        session
                            .suspend_vm()
                            .await
                            .map_err(|err| fail("Failed to pause", err))?;
                        response.defer_event(Event::new(
                            "stopped",
                            Some(json!({ "reason": "pause", "allThreadsStopped": true })),
                        ));
                    }
                }
            }
            _ => return Err(unexpected_arguments(command)),
        }
        Ok(())
    }
}

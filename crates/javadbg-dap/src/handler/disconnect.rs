use std::sync::Arc;

use async_trait::async_trait;

use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{SessionContext, SessionState};
use crate::dap::messages::Event;
use crate::dap::requests::{Arguments, Command};
use crate::error::HandlerResult;

pub struct DisconnectHandler;

#[async_trait]
impl DebugRequestHandler for DisconnectHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Disconnect]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Disconnect(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        let attached = context.is_attached();
        if let Some(session) = context.take_session() {
            let terminate = !attached && args.terminate_debuggee.unwrap_or(true);
            let result = if terminate {
                tracing::info!(target: "javadbg.dap", "terminating debuggee");
                session.terminate().await
            } else {
                tracing::info!(target: "javadbg.dap", "detaching from debuggee");
                session.detach().await
            };
            // The client is leaving either way; a dead debuggee is not an error.
            if let Err(err) = result {
                tracing::warn!(target: "javadbg.dap", error = %err, "failed to end debuggee session");
            }
        }

        context.breakpoints().reset();
        context.reset_session_state();
        context.set_state(SessionState::Terminated);

        response.defer_event(Event::terminated());
        let server = context.server().clone();
        response.defer_task(async move { server.stop() });
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::DebuggeeSession;

use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{SessionContext, SessionState};
use crate::dap::requests::{Arguments, Command};
use crate::error::HandlerResult;
use crate::events;

pub struct ConfigurationDoneHandler;

#[async_trait]
impl DebugRequestHandler for ConfigurationDoneHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::ConfigurationDone]
    }

    async fn handle(
        &self,
        _command: Command,
        _arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        context.set_configuration_done();

        // Before launch/attach the flag is enough: the session starts as
        // soon as it exists.
        if let Some(session) = context.session() {
            if context.state() == SessionState::Configuring {
                start_debuggee(context, session, response);
            }
        }
        Ok(())
    }
}

/// Starts forwarding debuggee events and lets the debuggee run once the
/// response has been written.
pub(crate) fn start_debuggee(
    context: &Arc<SessionContext>,
    session: Arc<dyn DebuggeeSession>,
    response: &mut ResponseBuilder,
) {
    context.set_event_task(events::spawn_event_task(context.clone(), &session));
    context.set_state(SessionState::Running);

    response.defer_task(async move {
        if let Err(err) = session.start().await {
            tracing::warn!(target: "javadbg.vm", error = %err, "failed to start debuggee");
        }
    });
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use javadbg_vm::{DebuggeeSession, LaunchSpec};

use super::configuration_done::start_debuggee;
use super::set_breakpoints::install_pending;
use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::SessionContext;
use crate::dap::messages::Event;
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

/// Handles both `launch` and `attach`.
pub struct LaunchHandler;

#[async_trait]
impl DebugRequestHandler for LaunchHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Launch, Command::Attach]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let code = match command {
            Command::Attach => ErrorCode::AttachFailure,
            _ => ErrorCode::LaunchFailure,
        };
        if context.session().is_some() {
            return Err(AdapterError::new(code, "A debug session is already running."));
        }

        let (result, attached) = match arguments {
            Arguments::Launch(args) => {
                context.reset_session_state();
                context.source_lookup().initialize(&args.source_paths);
                let spec = LaunchSpec {
                    main_class: args.main_class.clone(),
                    classpath: args.classpath.clone(),
                    args: args.args.clone(),
                    vm_args: args.vm_args.clone(),
                    cwd: args.cwd.clone(),
                };
                tracing::info!(
                    target: "javadbg.dap",
                    main_class = %spec.main_class,
                    "launching debuggee"
                );
                let result = context
                    .vm_manager()
                    .launch(&spec)
                    .await
                    .map_err(|err| AdapterError::vm(code, "Failed to launch debuggee VM", err));
                (result, false)
            }
            Arguments::Attach(args) => {
                context.reset_session_state();
                context.source_lookup().initialize(&args.source_paths);
                let timeout = Duration::from_millis(
                    args.timeout.unwrap_or(context.config().attach_timeout_ms),
                );
                tracing::info!(
                    target: "javadbg.dap",
                    host = %args.host_name,
                    port = args.port,
                    ?timeout,
                    "attaching to debuggee"
                );
                let result = context
                    .vm_manager()
                    .attach(&args.host_name, args.port, timeout)
                    .await
                    .map_err(|err| {
                        let what = format!(
                            "Failed to attach to remote debuggee VM at {}:{}",
                            args.host_name, args.port
                        );
                        AdapterError::vm(code, &what, err)
                    });
                (result, true)
            }
            _ => return Err(unexpected_arguments(command)),
        };

        let session = match result {
            Ok(session) => session,
            Err(err) => {
                response.defer_event(Event::terminated());
                return Err(err);
            }
        };

        context.install_session(session.clone(), attached);
        apply_exception_filters(context, session.as_ref()).await;
        install_pending(context, session.as_ref(), response).await;

        if context.is_configuration_done() {
            start_debuggee(context, session, response);
        }
        Ok(())
    }
}

async fn apply_exception_filters(context: &SessionContext, session: &dyn DebuggeeSession) {
    let filters = context.exception_filters();
    if !filters.caught && !filters.uncaught {
        return;
    }
    if let Err(err) = session
        .set_exception_breakpoints(filters.caught, filters.uncaught)
        .await
    {
        tracing::warn!(target: "javadbg.dap", error = %err, "failed to apply exception breakpoints");
    }
}

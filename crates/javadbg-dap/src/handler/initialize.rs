use std::sync::Arc;

use async_trait::async_trait;

use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{SessionContext, SessionState};
use crate::dap::messages::Event;
use crate::dap::requests::{Arguments, Command};
use crate::dap::types::{Capabilities, ExceptionBreakpointsFilter};
use crate::error::HandlerResult;

pub struct InitializeHandler;

pub fn capabilities() -> Capabilities {
    Capabilities {
        supports_configuration_done_request: true,
        supports_hit_conditional_breakpoints: true,
        supports_conditional_breakpoints: true,
        supports_set_variable: true,
        supports_evaluate_for_hovers: true,
        support_terminate_debuggee: true,
        supports_exception_info_request: true,
        exception_breakpoint_filters: vec![
            ExceptionBreakpointsFilter {
                filter: "uncaught",
                label: "Uncaught Exceptions",
                default: false,
            },
            ExceptionBreakpointsFilter {
                filter: "caught",
                label: "Caught Exceptions",
                default: false,
            },
        ],
    }
}

#[async_trait]
impl DebugRequestHandler for InitializeHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Initialize]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Initialize(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        tracing::info!(
            target: "javadbg.dap",
            client_id = args.client_id.as_deref().unwrap_or("<unknown>"),
            "initializing"
        );
        context.set_client_conventions(
            args.lines_start_at1.unwrap_or(true),
            args.path_format.as_deref() == Some("uri"),
        );
        context.set_state(SessionState::Initialized);

        response.set_body(&capabilities());
        response.defer_event(Event::initialized());
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use super::unexpected_arguments;
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{ExceptionFilters, SessionContext};
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

pub struct SetExceptionBreakpointsHandler;

#[async_trait]
impl DebugRequestHandler for SetExceptionBreakpointsHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::SetExceptionBreakpoints]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        _response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::SetExceptionBreakpoints(args) = arguments else {
            return Err(unexpected_arguments(command));
        };

        let filters = ExceptionFilters {
            caught: args.filters.iter().any(|filter| filter == "caught"),
            uncaught: args.filters.iter().any(|filter| filter == "uncaught"),
        };
        context.set_exception_filters(filters);

        if let Some(session) = context.session() {
            session
                .set_exception_breakpoints(filters.caught, filters.uncaught)
                .await
                .map_err(|err| {
                    AdapterError::vm(
                        ErrorCode::SetExceptionBreakpointFailure,
                        "Failed to setExceptionBreakpoints",
                        err,
                    )
                })?;
        }
        Ok(())
    }
}

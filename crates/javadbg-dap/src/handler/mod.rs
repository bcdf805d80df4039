//! Built-in request handlers, one module per command family.

use std::sync::Arc;

use javadbg_vm::{DebuggeeSession, ObjectKind, ThreadId, Value};

use crate::adapter::DebugRequestHandler;
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::Command;
use crate::dap::types::{Source, Variable};
use crate::error::{AdapterError, ErrorCode, HandlerResult};
use crate::format::FormatOptions;

pub mod configuration_done;
pub mod disconnect;
pub mod evaluate;
pub mod exception_info;
pub mod initialize;
pub mod launch;
pub mod scopes;
pub mod set_breakpoints;
pub mod set_exception_breakpoints;
pub mod set_variable;
pub mod source;
pub mod stack_trace;
pub mod step;
pub mod threads;
pub mod variables;

pub fn default_handlers() -> Vec<Arc<dyn DebugRequestHandler>> {
    vec![
        Arc::new(initialize::InitializeHandler),
        Arc::new(launch::LaunchHandler),
        Arc::new(configuration_done::ConfigurationDoneHandler),
        Arc::new(disconnect::DisconnectHandler),
        Arc::new(set_breakpoints::SetBreakpointsHandler),
        Arc::new(set_exception_breakpoints::SetExceptionBreakpointsHandler),
        Arc::new(threads::ThreadsHandler),
        Arc::new(stack_trace::StackTraceHandler),
        Arc::new(scopes::ScopesHandler),
        Arc::new(variables::VariablesHandler),
        Arc::new(set_variable::SetVariableHandler),
        Arc::new(source::SourceHandler),
        Arc::new(evaluate::EvaluateHandler),
        Arc::new(step::StepHandler),
        Arc::new(exception_info::ExceptionInfoHandler),
    ]
}

pub(crate) fn require_session(
    context: &SessionContext,
) -> HandlerResult<Arc<dyn DebuggeeSession>> {
    context.session().ok_or_else(|| {
        AdapterError::new(ErrorCode::EmptyDebugSession, "Debug Session doesn't exist.")
    })
}

/// The dispatcher decoded arguments for a different command than the one it
/// routed. Only reachable through a registration mistake.
pub(crate) fn unexpected_arguments(command: Command) -> AdapterError {
    AdapterError::new(
        ErrorCode::UnknownFailure,
        format!("unexpected arguments for '{}'", command.as_str()),
    )
}

/// Client-side [`Source`] for a debugger URI. Files on disk are referenced by
/// path; anything else is served through a `sourceReference`.
pub(crate) fn client_source(context: &SessionContext, uri: &str, name: Option<String>) -> Source {
    let name = name.or_else(|| {
        uri.rsplit(['/', '\\'])
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    });

    if uri.starts_with("file:") {
        if let Some(path) = context.debugger_uri_to_client_path(uri) {
            return Source {
                name,
                path: Some(path),
                source_reference: 0,
            };
        }
    }

    Source {
        name,
        path: None,
        source_reference: context.source_refs().create(uri.to_string()),
    }
}

/// Renders `value` for the client, minting a child handle owned by
/// `thread_id` when the value can be expanded.
pub(crate) fn render_variable(
    context: &SessionContext,
    thread_id: ThreadId,
    name: String,
    declared_type: &str,
    value: Value,
    options: &FormatOptions,
) -> Variable {
    let formatter = context.formatter();
    let display = formatter.value_to_string(&value, options);

    let (type_name, variables_reference, indexed_variables) = match value {
        Value::Object(object) => {
            let type_name = formatter.type_to_string(&object.type_name, options);
            if matches!(object.kind, ObjectKind::String { .. }) {
                (type_name, 0, None)
            } else {
                let length = object.array_length();
                let reference = context.add_handle(PoolObject::Object { thread_id, object });
                (type_name, reference, length)
            }
        }
        _ => (formatter.type_to_string(declared_type, options), 0, None),
    };

    Variable {
        name,
        value: display,
        type_: type_name,
        variables_reference,
        indexed_variables,
        evaluate_name: None,
    }
}

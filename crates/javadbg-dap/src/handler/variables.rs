use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::{DebuggeeSession, FrameRef, ObjectRef, ThreadId, Value, VariableInfo, VmError};
use serde_json::json;

use super::{render_variable, require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::{Arguments, Command, VariablesArguments};
use crate::dap::types::Variable;
use crate::error::{AdapterError, ErrorCode, HandlerResult};
use crate::format::FormatOptions;

pub struct VariablesHandler;

#[async_trait]
impl DebugRequestHandler for VariablesHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Variables]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Variables(args) = arguments else {
            return Err(unexpected_arguments(command));
        };
        if args.variables_reference <= 0 {
            return Err(AdapterError::argument_missing(
                "VariablesReference is required in the variables request.",
            ));
        }
        let session = require_session(context)?;
        let options = context.format_options(args.format.is_some_and(|format| format.hex));

        let failed = |err: VmError| {
            AdapterError::vm(ErrorCode::GetVariableFailure, "Failed to get variables", err)
        };
        let variables = match context.handle(args.variables_reference) {
            Some(PoolObject::Scope(frame)) => {
                scope_variables(context, session.as_ref(), frame, &options)
                    .await
                    .map_err(failed)?
            }
            Some(PoolObject::Object { thread_id, object }) => {
                object_variables(context, session.as_ref(), thread_id, &object, args, &options)
                    .await
                    .map_err(failed)?
            }
            // Stale, or a frame handle that has no children of its own.
            Some(PoolObject::Frame(_)) | None => Vec::new(),
        };

        response.set_body(&json!({ "variables": variables }));
        Ok(())
    }
}

async fn scope_variables(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    frame: FrameRef,
    options: &FormatOptions,
) -> Result<Vec<Variable>, VmError> {
    let mut infos = session.visible_variables(frame).await?;

    if let Some(this) = session.this_object(frame).await? {
        let type_name = this.type_name.clone();
        infos.push(VariableInfo::local("this", type_name, Value::Object(this)));
    }

    if context.config().show_static_variables {
        let is_static_method = session
            .frames(frame.thread_id)
            .await?
            .get(frame.depth)
            .is_some_and(|info| info.is_static);
        if is_static_method {
            infos.extend(session.static_fields(frame).await?);
        }
    }

    Ok(to_client_variables(context, frame.thread_id, infos, options)
        .into_iter()
        .map(|(mut variable, evaluate_name)| {
            variable.evaluate_name = Some(evaluate_name);
            variable
        })
        .collect())
}

async fn object_variables(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    thread_id: ThreadId,
    object: &ObjectRef,
    args: &VariablesArguments,
    options: &FormatOptions,
) -> Result<Vec<Variable>, VmError> {
    let filter = args.filter.as_deref();

    if let Some(length) = object.array_length() {
        if filter == Some("named") {
            return Ok(Vec::new());
        }
        let start = clamp_index(args.start, length);
        let count = match args.count {
            Some(count) if count > 0 => clamp_index(Some(count), length - start),
            _ => length - start,
        };
        let element_type = object
            .type_name
            .strip_suffix("[]")
            .unwrap_or(&object.type_name);

        let elements = session.array_elements(object.id, start, count).await?;
        return Ok(elements
            .into_iter()
            .enumerate()
            .map(|(offset, value)| {
                let name = format!("[{}]", start + offset);
                render_variable(context, thread_id, name, element_type, value, options)
            })
            .collect());
    }

    if filter == Some("indexed") {
        return Ok(Vec::new());
    }
    let show_static = context.config().show_static_variables;
    let fields = session
        .fields(object.id)
        .await?
        .into_iter()
        .filter(|field| show_static || !field.is_static)
        .collect();
    Ok(to_client_variables(context, thread_id, fields, options)
        .into_iter()
        .map(|(variable, _)| variable)
        .collect())
}

fn clamp_index(value: Option<i64>, upper: usize) -> usize {
    value
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
        .min(upper)
}

/// Renders `infos` in order, returning each variable with its unmodified
/// name. Names shared by several entries get their declaring type appended.
fn to_client_variables(
    context: &SessionContext,
    thread_id: ThreadId,
    infos: Vec<VariableInfo>,
    options: &FormatOptions,
) -> Vec<(Variable, String)> {
    let names = display_names(&infos);
    infos
        .into_iter()
        .zip(names)
        .map(|(info, name)| {
            let variable = render_variable(
                context,
                thread_id,
                name,
                &info.type_name,
                info.value,
                options,
            );
            (variable, info.name)
        })
        .collect()
}

fn display_names(infos: &[VariableInfo]) -> Vec<String> {
    let counts = count(infos.iter().map(|info| info.name.clone()));
    let simple: Vec<String> = infos
        .iter()
        .map(|info| match (&info.declaring_type, counts[&info.name] > 1) {
            (Some(declaring), true) => format!("{} ({})", info.name, simple_type_name(declaring)),
            _ => info.name.clone(),
        })
        .collect();

    // Same simple class name in two packages: fall back to qualified names.
    let simple_counts = count(simple.iter().cloned());
    infos
        .iter()
        .zip(simple)
        .map(|(info, name)| match (&info.declaring_type, simple_counts[&name] > 1) {
            (Some(declaring), true) if counts[&info.name] > 1 => {
                format!("{} ({declaring})", info.name)
            }
            _ => name,
        })
        .collect()
}

fn count(names: impl Iterator<Item = String>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

pub(crate) fn simple_type_name(type_name: &str) -> &str {
    type_name.rsplit('.').next().unwrap_or(type_name)
}

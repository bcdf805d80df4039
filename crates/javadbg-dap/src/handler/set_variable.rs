use std::sync::Arc;

use async_trait::async_trait;
use javadbg_vm::{DebuggeeSession, ObjectId, ThreadId, Value, VariableInfo};
use serde_json::json;

use super::variables::simple_type_name;
use super::{render_variable, require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

pub struct SetVariableHandler;

fn failure(reason: impl std::fmt::Display) -> AdapterError {
    AdapterError::new(
        ErrorCode::SetVariableFailure,
        format!("Failed to set variable. Reason: {reason}"),
    )
}

#[async_trait]
impl DebugRequestHandler for SetVariableHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::SetVariable]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::SetVariable(args) = arguments else {
            return Err(unexpected_arguments(command));
        };
        let Some(text) = args.value.as_deref() else {
            // Nothing to assign.
            return Ok(());
        };
        let session = require_session(context)?;
        let Some(target) = context.handle(args.variables_reference) else {
            return Err(failure("Cannot set value because the thread is resumed."));
        };

        let (name, class) = split_variable_name(&args.name);
        if name == "this" {
            return Err(failure("'this' variable cannot be changed."));
        }

        let thread_id = target.thread_id();
        let (type_name, value) = match target {
            PoolObject::Scope(frame) => {
                let locals = session.visible_variables(frame).await.map_err(failure)?;
                let local = locals
                    .into_iter()
                    .find(|local| class.is_none() && local.name == name);
                match local {
                    Some(local) => {
                        let value =
                            parse_value(context, session.as_ref(), text, &local.type_name).await?;
                        session
                            .set_local(frame, name, value.clone())
                            .await
                            .map_err(failure)?;
                        (local.type_name, value)
                    }
                    None => {
                        let statics = session.static_fields(frame).await.map_err(failure)?;
                        let field = find_field(statics, name, class)?;
                        assign_field(context, session.as_ref(), None, field, text).await?
                    }
                }
            }
            PoolObject::Object { object, .. } => match object.array_length() {
                Some(length) => {
                    let index = parse_index(name)
                        .filter(|index| *index < length)
                        .ok_or_else(|| failure(format!("Invalid array index '{name}'.")))?;
                    let element_type = object
                        .type_name
                        .strip_suffix("[]")
                        .unwrap_or(&object.type_name)
                        .to_string();
                    let value =
                        parse_value(context, session.as_ref(), text, &element_type).await?;
                    session
                        .set_array_element(object.id, index, value.clone())
                        .await
                        .map_err(failure)?;
                    (element_type, value)
                }
                None => {
                    let fields = session.fields(object.id).await.map_err(failure)?;
                    let field = find_field(fields, name, class)?;
                    assign_field(context, session.as_ref(), Some(object.id), field, text).await?
                }
            },
            PoolObject::Frame(_) => {
                return Err(failure(format!("Cannot find variable with name '{name}'.")));
            }
        };

        let hex = args.format.is_some_and(|format| format.hex);
        respond(context, thread_id, response, &type_name, value, hex);
        Ok(())
    }
}

fn respond(
    context: &SessionContext,
    thread_id: ThreadId,
    response: &mut ResponseBuilder,
    type_name: &str,
    value: Value,
    hex: bool,
) {
    let options = context.format_options(hex);
    let variable = render_variable(context, thread_id, String::new(), type_name, value, &options);
    response.set_body(&json!({
        "value": variable.value,
        "type": variable.type_,
        "variablesReference": variable.variables_reference,
        "indexedVariables": variable.indexed_variables,
    }));
}

/// Splits `name (Class)` into the bare name and the class selecting a
/// shadowed field.
fn split_variable_name(name: &str) -> (&str, Option<&str>) {
    let name = name.trim();
    if let Some(rest) = name.strip_suffix(')') {
        if let Some((bare, class)) = rest.split_once(" (") {
            return (bare.trim(), Some(class.trim()));
        }
    }
    (name, None)
}

fn parse_index(name: &str) -> Option<usize> {
    let name = name.trim();
    let digits = name
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(name);
    digits.trim().parse().ok()
}

fn find_field(
    fields: Vec<VariableInfo>,
    name: &str,
    class: Option<&str>,
) -> HandlerResult<VariableInfo> {
    fields
        .into_iter()
        .find(|field| {
            field.name == name
                && class.map_or(true, |class| {
                    field.declaring_type.as_deref().is_some_and(|declaring| {
                        declaring == class || simple_type_name(declaring) == class
                    })
                })
        })
        .ok_or_else(|| failure(format!("Cannot find variable with name '{name}'.")))
}

async fn assign_field(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    object_id: Option<ObjectId>,
    field: VariableInfo,
    text: &str,
) -> HandlerResult<(String, Value)> {
    if field.is_final {
        return Err(failure(format!(
            "Cannot set value to final field '{}'.",
            field.name
        )));
    }
    let value = parse_value(context, session, text, &field.type_name).await?;
    let declaring_type = field.declaring_type.as_deref();

    let result = match (object_id, declaring_type) {
        (Some(object_id), _) if !field.is_static => {
            session
                .set_field(object_id, &field.name, declaring_type, value.clone())
                .await
        }
        (_, Some(declaring_type)) => {
            session
                .set_static_field(declaring_type, &field.name, value.clone())
                .await
        }
        (_, None) => {
            return Err(failure(format!(
                "Cannot find variable with name '{}'.",
                field.name
            )));
        }
    };
    result.map_err(failure)?;
    Ok((field.type_name, value))
}

async fn parse_value(
    context: &SessionContext,
    session: &dyn DebuggeeSession,
    text: &str,
    type_name: &str,
) -> HandlerResult<Value> {
    let text = text.trim();
    let quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
    if type_name == "java.lang.String" && quoted {
        let literal = serde_json::from_str::<String>(text)
            .unwrap_or_else(|_| text[1..text.len() - 1].to_string());
        return session.create_string(&literal).await.map_err(failure);
    }
    context
        .formatter()
        .string_to_value(text, type_name)
        .map_err(failure)
}

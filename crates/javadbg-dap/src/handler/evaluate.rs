use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use javadbg_vm::{DebuggeeSession, FrameRef, Value, VmError};
use serde_json::json;

use super::{render_variable, require_session, unexpected_arguments};
use crate::adapter::{DebugRequestHandler, ResponseBuilder};
use crate::context::{PoolObject, SessionContext};
use crate::dap::requests::{Arguments, Command};
use crate::error::{AdapterError, ErrorCode, HandlerResult};

/// Evaluates variable names and dotted field paths (`this.items.size`)
/// against a suspended frame. Arbitrary expressions are rejected.
pub struct EvaluateHandler;

fn failure(reason: impl std::fmt::Display) -> AdapterError {
    AdapterError::new(
        ErrorCode::EvaluateFailure,
        format!("Failed to evaluate. Reason: {reason}"),
    )
}

fn is_simple_path(expression: &str) -> bool {
    static SIMPLE_PATH_RE: OnceLock<regex::Regex> = OnceLock::new();

    let re = SIMPLE_PATH_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.\s]+$").expect("field-path regex should compile")
    });
    re.is_match(expression)
}

#[async_trait]
impl DebugRequestHandler for EvaluateHandler {
    fn commands(&self) -> &'static [Command] {
        &[Command::Evaluate]
    }

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult {
        let Arguments::Evaluate(args) = arguments else {
            return Err(unexpected_arguments(command));
        };
        let Some(frame_id) = args.frame_id else {
            return Err(AdapterError::argument_missing(
                "Evaluate needs a frameId to resolve variables.",
            ));
        };
        let session = require_session(context)?;

        let expression = args.expression.trim();
        if !is_simple_path(expression) {
            return Err(failure(format!(
                "Evaluation of '{expression}' is not supported; only variables and field accesses can be evaluated."
            )));
        }
        let Some(PoolObject::Frame(frame)) = context.handle(frame_id) else {
            return Err(failure("Cannot evaluate because the thread is resumed."));
        };

        let segments: Vec<&str> = expression.split('.').map(str::trim).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(failure(format!("'{expression}' is not a valid field path.")));
        }

        let (type_name, value) = evaluate_path(session.as_ref(), frame, &segments).await?;

        let options = context.format_options(args.format.is_some_and(|format| format.hex));
        let variable = render_variable(
            context,
            frame.thread_id,
            expression.to_string(),
            &type_name,
            value,
            &options,
        );
        response.set_body(&json!({
            "result": variable.value,
            "type": variable.type_,
            "variablesReference": variable.variables_reference,
            "indexedVariables": variable.indexed_variables,
        }));
        Ok(())
    }
}

async fn evaluate_path(
    session: &dyn DebuggeeSession,
    frame: FrameRef,
    segments: &[&str],
) -> HandlerResult<(String, Value)> {
    let Some((root, rest)) = segments.split_first() else {
        return Err(failure("empty expression"));
    };
    let (mut type_name, mut value) = resolve_root(session, frame, root)
        .await
        .map_err(failure)?
        .ok_or_else(|| failure(format!("Cannot resolve '{root}' in the current frame.")))?;

    let mut path = (*root).to_string();
    for segment in rest {
        let object = match &value {
            Value::Null => {
                return Err(failure(format!("NPE: '{path}' is null.")));
            }
            Value::Object(object) if object.array_length().is_none() => object.clone(),
            Value::Object(_) => {
                return Err(failure(format!("'{path}' is an array and has no fields.")));
            }
            _ => {
                return Err(failure(format!(
                    "'{path}' is a primitive value and has no fields."
                )));
            }
        };

        let field = session
            .fields(object.id)
            .await
            .map_err(failure)?
            .into_iter()
            .find(|field| field.name == *segment)
            .ok_or_else(|| failure(format!("'{path}' has no field named '{segment}'.")))?;
        if field.is_static {
            return Err(failure(format!(
                "Static field '{segment}' cannot be accessed through '{path}'."
            )));
        }

        path.push('.');
        path.push_str(segment);
        type_name = field.type_name;
        value = field.value;
    }
    Ok((type_name, value))
}

/// `this`, then locals, then statics of the declaring type, then fields of
/// `this`.
async fn resolve_root(
    session: &dyn DebuggeeSession,
    frame: FrameRef,
    name: &str,
) -> Result<Option<(String, Value)>, VmError> {
    let this = session.this_object(frame).await?;
    if name == "this" {
        return Ok(this.map(|this| (this.type_name.clone(), Value::Object(this))));
    }

    if let Some(local) = session
        .visible_variables(frame)
        .await?
        .into_iter()
        .find(|local| local.name == name)
    {
        return Ok(Some((local.type_name, local.value)));
    }

    if let Some(field) = session
        .static_fields(frame)
        .await?
        .into_iter()
        .find(|field| field.name == name)
    {
        return Ok(Some((field.type_name, field.value)));
    }

    let Some(this) = this else {
        return Ok(None);
    };
    Ok(session
        .fields(this.id)
        .await?
        .into_iter()
        .find(|field| field.name == name)
        .map(|field| (field.type_name, field.value)))
}

//! Commands and their typed arguments.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::codec::sanitize_json_error_message;
use super::types::{Source, ValueFormat};
use crate::error::{AdapterError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Initialize,
    Launch,
    Attach,
    ConfigurationDone,
    Disconnect,
    SetBreakpoints,
    SetExceptionBreakpoints,
    Threads,
    StackTrace,
    Scopes,
    Variables,
    SetVariable,
    Source,
    Evaluate,
    Continue,
    Next,
    StepIn,
    StepOut,
    Pause,
    ExceptionInfo,
    /// Any command this adapter does not know.
    Unsupported,
}

impl Command {
    pub const ALL: [Command; 20] = [
        Command::Initialize,
        Command::Launch,
        Command::Attach,
        Command::ConfigurationDone,
        Command::Disconnect,
        Command::SetBreakpoints,
        Command::SetExceptionBreakpoints,
        Command::Threads,
        Command::StackTrace,
        Command::Scopes,
        Command::Variables,
        Command::SetVariable,
        Command::Source,
        Command::Evaluate,
        Command::Continue,
        Command::Next,
        Command::StepIn,
        Command::StepOut,
        Command::Pause,
        Command::ExceptionInfo,
    ];

    /// Never fails: unknown names map to [`Command::Unsupported`].
    pub fn parse(command: &str) -> Command {
        Self::ALL
            .into_iter()
            .find(|known| known.as_str() == command)
            .unwrap_or(Command::Unsupported)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Initialize => "initialize",
            Command::Launch => "launch",
            Command::Attach => "attach",
            Command::ConfigurationDone => "configurationDone",
            Command::Disconnect => "disconnect",
            Command::SetBreakpoints => "setBreakpoints",
            Command::SetExceptionBreakpoints => "setExceptionBreakpoints",
            Command::Threads => "threads",
            Command::StackTrace => "stackTrace",
            Command::Scopes => "scopes",
            Command::Variables => "variables",
            Command::SetVariable => "setVariable",
            Command::Source => "source",
            Command::Evaluate => "evaluate",
            Command::Continue => "continue",
            Command::Next => "next",
            Command::StepIn => "stepIn",
            Command::StepOut => "stepOut",
            Command::Pause => "pause",
            Command::ExceptionInfo => "exceptionInfo",
            Command::Unsupported => "unsupported",
        }
    }

    /// Commands that only make sense against a live debuggee.
    pub fn requires_session(self) -> bool {
        matches!(
            self,
            Command::StackTrace
                | Command::Scopes
                | Command::Variables
                | Command::SetVariable
                | Command::Evaluate
                | Command::Continue
                | Command::Next
                | Command::StepIn
                | Command::StepOut
                | Command::Pause
                | Command::ExceptionInfo
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(default, rename = "clientID")]
    pub client_id: Option<String>,
    #[serde(default, rename = "adapterID")]
    pub adapter_id: Option<String>,
    #[serde(default)]
    pub lines_start_at1: Option<bool>,
    #[serde(default)]
    pub columns_start_at1: Option<bool>,
    #[serde(default)]
    pub path_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    pub main_class: String,
    #[serde(default)]
    pub classpath: String,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub vm_args: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub source_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    #[serde(default = "default_host")]
    pub host_name: String,
    pub port: u16,
    /// Milliseconds; falls back to the configured attach timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub source_paths: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub restart: bool,
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default)]
    pub column: Option<i64>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub hit_condition: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
    /// Deprecated line-only form, used when `breakpoints` is absent.
    #[serde(default)]
    pub lines: Vec<i64>,
    #[serde(default)]
    pub source_modified: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: u64,
    #[serde(default)]
    pub start_frame: Option<i64>,
    #[serde(default)]
    pub levels: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub format: Option<ValueFormat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    pub variables_reference: i64,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub format: Option<ValueFormat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArguments {
    #[serde(default)]
    pub source_reference: i64,
    #[serde(default)]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(default)]
    pub frame_id: Option<i64>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub format: Option<ValueFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueArguments {
    #[serde(default)]
    pub thread_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepArguments {
    pub thread_id: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseArguments {
    #[serde(default)]
    pub thread_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfoArguments {
    pub thread_id: u64,
}

/// Arguments of a request, decoded according to its [`Command`].
#[derive(Debug, Clone)]
pub enum Arguments {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    ConfigurationDone,
    Disconnect(DisconnectArguments),
    SetBreakpoints(SetBreakpointArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    Threads,
    StackTrace(StackTraceArguments),
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    SetVariable(SetVariableArguments),
    Source(SourceArguments),
    Evaluate(EvaluateArguments),
    Continue(ContinueArguments),
    Next(StepArguments),
    StepIn(StepArguments),
    StepOut(StepArguments),
    Pause(PauseArguments),
    ExceptionInfo(ExceptionInfoArguments),
    Unsupported,
}

fn decode<T: DeserializeOwned>(command: Command, raw: &Value) -> Result<T, AdapterError> {
    let raw = if raw.is_null() {
        Value::Object(Default::default())
    } else {
        raw.clone()
    };
    serde_json::from_value(raw).map_err(|err| {
        AdapterError::new(
            ErrorCode::ArgumentMissing,
            format!(
                "Invalid arguments for '{}': {}",
                command.as_str(),
                sanitize_json_error_message(&err.to_string())
            ),
        )
    })
}

impl Arguments {
    /// Decodes `raw` for `command`. A missing or mistyped field is reported
    /// as [`ErrorCode::ArgumentMissing`].
    pub fn parse(command: Command, raw: &Value) -> Result<Arguments, AdapterError> {
        Ok(match command {
            Command::Initialize => Arguments::Initialize(decode(command, raw)?),
            Command::Launch => Arguments::Launch(decode(command, raw)?),
            Command::Attach => Arguments::Attach(decode(command, raw)?),
            Command::ConfigurationDone => Arguments::ConfigurationDone,
            Command::Disconnect => Arguments::Disconnect(decode(command, raw)?),
            Command::SetBreakpoints => Arguments::SetBreakpoints(decode(command, raw)?),
            Command::SetExceptionBreakpoints => {
                Arguments::SetExceptionBreakpoints(decode(command, raw)?)
            }
            Command::Threads => Arguments::Threads,
            Command::StackTrace => Arguments::StackTrace(decode(command, raw)?),
            Command::Scopes => Arguments::Scopes(decode(command, raw)?),
            Command::Variables => Arguments::Variables(decode(command, raw)?),
            Command::SetVariable => Arguments::SetVariable(decode(command, raw)?),
            Command::Source => Arguments::Source(decode(command, raw)?),
            Command::Evaluate => Arguments::Evaluate(decode(command, raw)?),
            Command::Continue => Arguments::Continue(decode(command, raw)?),
            Command::Next => Arguments::Next(decode(command, raw)?),
            Command::StepIn => Arguments::StepIn(decode(command, raw)?),
            Command::StepOut => Arguments::StepOut(decode(command, raw)?),
            Command::Pause => Arguments::Pause(decode(command, raw)?),
            Command::ExceptionInfo => Arguments::ExceptionInfo(decode(command, raw)?),
            Command::Unsupported => Arguments::Unsupported,
        })
    }
}

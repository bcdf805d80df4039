use std::io;
use std::time::Duration;

use javadbg_vm::VmError;
use thiserror::Error;

use crate::dap::codec::FrameError;

/// Numeric error identifiers carried in failed responses (`body.error.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownFailure,
    UnrecognizedRequestFailure,
    LaunchFailure,
    AttachFailure,
    ArgumentMissing,
    SetBreakpointFailure,
    SetExceptionBreakpointFailure,
    GetStackTraceFailure,
    GetVariableFailure,
    SetVariableFailure,
    EvaluateFailure,
    EmptyDebugSession,
    ExceptionInfoFailure,
}

impl ErrorCode {
    pub fn id(self) -> i64 {
        match self {
            ErrorCode::UnknownFailure => 1000,
            ErrorCode::UnrecognizedRequestFailure => 1001,
            ErrorCode::LaunchFailure => 1002,
            ErrorCode::AttachFailure => 1003,
            ErrorCode::ArgumentMissing => 1004,
            ErrorCode::SetBreakpointFailure => 1005,
            ErrorCode::SetExceptionBreakpointFailure => 1006,
            ErrorCode::GetStackTraceFailure => 1007,
            ErrorCode::GetVariableFailure => 1008,
            ErrorCode::SetVariableFailure => 1009,
            ErrorCode::EvaluateFailure => 1010,
            ErrorCode::EmptyDebugSession => 1011,
            ErrorCode::ExceptionInfoFailure => 1018,
        }
    }
}

/// Failure of a request handler. Becomes a `success: false` response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
}

impl AdapterError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn argument_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ArgumentMissing, message)
    }

    pub fn vm(code: ErrorCode, context: &str, err: VmError) -> Self {
        Self::new(code, format!("{context}: {err}"))
    }
}

pub type HandlerResult<T = ()> = Result<T, AdapterError>;

/// Transport and correlation failures of the protocol server.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("json error: {0}")]
    Json(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("protocol server is shutting down")]
    Shutdown,
}

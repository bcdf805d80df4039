//! Message envelopes.
//!
//! Every message carries a `seq` and a `type` discriminator. Outbound messages
//! are built with `seq = 0`; the real value is stamped by
//! [`crate::protocol_server::MessageSender`] at write time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl ProtocolMessage {
    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Request(request) => request.seq,
            ProtocolMessage::Response(response) => response.seq,
            ProtocolMessage::Event(event) => event.seq,
        }
    }

    pub(crate) fn set_seq(&mut self, seq: i64) {
        match self {
            ProtocolMessage::Request(request) => request.seq = seq,
            ProtocolMessage::Response(response) => response.seq = seq,
            ProtocolMessage::Event(event) => event.seq = seq,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::Request(_) => "request",
            ProtocolMessage::Response(_) => "response",
            ProtocolMessage::Event(_) => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl Request {
    pub fn new(command: impl Into<String>, arguments: Value) -> Self {
        Self {
            seq: 0,
            command: command.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// An empty successful response to `request_seq`.
    pub fn success(request_seq: i64, command: impl Into<String>) -> Self {
        Self {
            seq: 0,
            request_seq,
            success: true,
            command: command.into(),
            message: None,
            body: None,
        }
    }

    /// A failed response carrying `{error: {id, format}}` in its body.
    pub fn error(
        request_seq: i64,
        command: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        let mut response = Self::success(request_seq, command);
        response.set_error(code, message);
        response
    }

    pub fn set_error(&mut self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        self.success = false;
        self.body = Some(serde_json::json!({
            "error": { "id": code.id(), "format": message },
        }));
        self.message = Some(message);
    }

    /// Numeric error code of a failed response, if present.
    pub fn error_id(&self) -> Option<i64> {
        self.body.as_ref()?.pointer("/error/id")?.as_i64()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body,
        }
    }

    pub fn initialized() -> Self {
        Self::new("initialized", None)
    }

    pub fn terminated() -> Self {
        Self::new("terminated", None)
    }

    pub fn exited(exit_code: i64) -> Self {
        Self::new("exited", Some(serde_json::json!({ "exitCode": exit_code })))
    }

    pub fn thread(reason: &str, thread_id: u64) -> Self {
        Self::new(
            "thread",
            Some(serde_json::json!({ "reason": reason, "threadId": thread_id })),
        )
    }

    pub fn stopped(reason: &str, thread_id: u64, all_threads_stopped: bool) -> Self {
        Self::new(
            "stopped",
            Some(serde_json::json!({
                "reason": reason,
                "threadId": thread_id,
                "allThreadsStopped": all_threads_stopped,
            })),
        )
    }

    pub fn breakpoint(reason: &str, breakpoint: Value) -> Self {
        Self::new(
            "breakpoint",
            Some(serde_json::json!({ "reason": reason, "breakpoint": breakpoint })),
        )
    }
}

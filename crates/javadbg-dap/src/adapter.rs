//! Command dispatch.
//!
//! [`DebugAdapter`] turns one [`Request`] into one [`Outcome`]: it decodes the
//! command and its arguments, checks that commands needing a debuggee have
//! one, and runs every handler registered for the command in registration
//! order. Handler failures and panics become error responses here; nothing a
//! handler does can take the connection down.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::context::SessionContext;
use crate::dap::messages::{Event, Request, Response};
use crate::dap::requests::{Arguments, Command};
use crate::error::{ErrorCode, HandlerResult};
use crate::handler;
use crate::hardening::panic_payload_message;
use crate::protocol_server::{MessageSender, Outcome, RequestDispatcher};

/// The response under construction plus the work deferred until after it
/// has been written.
pub struct ResponseBuilder {
    response: Response,
    events: Vec<Event>,
    tasks: Vec<BoxFuture<'static, ()>>,
}

impl ResponseBuilder {
    pub fn new(request_seq: i64, command: impl Into<String>) -> Self {
        Self {
            response: Response::success(request_seq, command),
            events: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Replaces the response body.
    pub fn set_body<T: Serialize>(&mut self, body: &T) {
        match serde_json::to_value(body) {
            Ok(value) => self.response.body = Some(value),
            Err(err) => self.fail(
                ErrorCode::UnknownFailure,
                format!("failed to serialize response body: {err}"),
            ),
        }
    }

    pub fn body(&self) -> Option<&Value> {
        self.response.body.as_ref()
    }

    pub fn fail(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.response.set_error(code, message);
    }

    pub fn is_success(&self) -> bool {
        self.response.success
    }

    /// Queues an event to be sent right after the response.
    pub fn defer_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Queues a task to be spawned once the response and the deferred events
    /// have been written.
    pub fn defer_task<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(task.boxed());
    }

    pub fn into_outcome(self) -> Outcome {
        Outcome {
            response: self.response,
            events: self.events,
            tasks: self.tasks,
        }
    }
}

#[async_trait]
pub trait DebugRequestHandler: Send + Sync {
    /// Commands this handler is registered for.
    fn commands(&self) -> &'static [Command];

    async fn handle(
        &self,
        command: Command,
        arguments: &Arguments,
        response: &mut ResponseBuilder,
        context: &Arc<SessionContext>,
    ) -> HandlerResult;
}

pub struct DebugAdapter {
    context: Arc<SessionContext>,
    handlers: BTreeMap<Command, Vec<Arc<dyn DebugRequestHandler>>>,
}

impl DebugAdapter {
    /// An adapter with the built-in handlers registered.
    pub fn new(context: Arc<SessionContext>) -> Self {
        let mut adapter = Self::without_handlers(context);
        for handler in handler::default_handlers() {
            adapter.register(handler);
        }
        adapter
    }

    pub fn without_handlers(context: Arc<SessionContext>) -> Self {
        Self {
            context,
            handlers: BTreeMap::new(),
        }
    }

    /// Appends `handler` to the handlers of each of its commands.
    pub fn register(&mut self, handler: Arc<dyn DebugRequestHandler>) {
        for command in handler.commands() {
            self.handlers
                .entry(*command)
                .or_default()
                .push(handler.clone());
        }
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }
}

#[async_trait]
impl RequestDispatcher for DebugAdapter {
    async fn dispatch(&self, request: Request, _sender: &MessageSender) -> Outcome {
        let command = Command::parse(&request.command);
        let mut response = ResponseBuilder::new(request.seq, request.command.clone());

        let handlers = self
            .handlers
            .get(&command)
            .map(Vec::as_slice)
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::warn!(
                target: "javadbg.dap",
                seq = request.seq,
                command = %request.command,
                "unrecognized request"
            );
            response.fail(
                ErrorCode::UnrecognizedRequestFailure,
                format!("Unrecognized request: {{ _request: {} }}", request.command),
            );
            return response.into_outcome();
        }

        let arguments = match Arguments::parse(command, &request.arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                tracing::debug!(
                    target: "javadbg.dap",
                    seq = request.seq,
                    command = command.as_str(),
                    error = %err,
                    "invalid arguments"
                );
                response.fail(err.code, err.message);
                return response.into_outcome();
            }
        };

        if command.requires_session() && self.context.session().is_none() {
            response.fail(ErrorCode::EmptyDebugSession, "Debug Session doesn't exist.");
            response.defer_event(Event::terminated());
            return response.into_outcome();
        }

        tracing::debug!(
            target: "javadbg.dap",
            seq = request.seq,
            command = command.as_str(),
            "handling request"
        );
        for handler in handlers {
            let result = AssertUnwindSafe(handler.handle(
                command,
                &arguments,
                &mut response,
                &self.context,
            ))
            .catch_unwind()
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(
                        target: "javadbg.dap",
                        seq = request.seq,
                        command = command.as_str(),
                        code = err.code.id(),
                        error = %err,
                        "request failed"
                    );
                    response.fail(err.code, err.message);
                    break;
                }
                Err(panic) => {
                    let message = panic_payload_message(&*panic);
                    tracing::error!(
                        target: "javadbg.dap",
                        seq = request.seq,
                        command = command.as_str(),
                        "request handler panicked"
                    );
                    response.fail(ErrorCode::UnknownFailure, format!("Internal error: {message}"));
                    break;
                }
            }
        }

        response.into_outcome()
    }
}

//! Connection-level engine: read loop, outbound sequencing and
//! request/response correlation.
//!
//! One [`ProtocolServer`] owns one client connection. Inbound requests are
//! queued to a single worker task, so the read loop keeps draining the
//! transport (and matching responses to adapter-initiated requests) while a
//! slow handler runs. Outbound messages from any task go through the shared
//! [`MessageSender`], which stamps `seq` and writes the frame under one lock.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::dap::codec::{sanitize_json_error_message, FrameDecoder};
use crate::dap::messages::{Event, ProtocolMessage, Request, Response};
use crate::dap::stream::{DapReader, DapWriter};
use crate::dap::MAX_DAP_MESSAGE_BYTES;
use crate::error::{ErrorCode, ProtocolError};
use crate::hardening::panic_payload_message;

/// How long a stopping server waits for the in-flight request to finish.
const WORKER_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_message_bytes: usize,
    /// Timeout applied by [`MessageSender::send_request_with_default_timeout`].
    pub request_timeout: Option<Duration>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_message_bytes: MAX_DAP_MESSAGE_BYTES,
            request_timeout: None,
        }
    }
}

/// Result of handling one request: the response plus work that must only
/// happen after the response has been written.
pub struct Outcome {
    pub response: Response,
    pub events: Vec<Event>,
    pub tasks: Vec<BoxFuture<'static, ()>>,
}

impl Outcome {
    pub fn response(response: Response) -> Self {
        Self {
            response,
            events: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    async fn dispatch(&self, request: Request, sender: &MessageSender) -> Outcome;
}

type BoxedWriter = DapWriter<Box<dyn AsyncWrite + Send + Unpin>>;

struct Output {
    writer: BoxedWriter,
    next_seq: i64,
}

struct SenderInner {
    output: tokio::sync::Mutex<Output>,
    pending: parking_lot::Mutex<HashMap<i64, oneshot::Sender<Response>>>,
    closed: AtomicBool,
    request_timeout: Option<Duration>,
}

/// Cloneable handle for writing to the client.
#[derive(Clone)]
pub struct MessageSender {
    inner: Arc<SenderInner>,
}

impl MessageSender {
    fn new(writer: BoxedWriter, request_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                output: tokio::sync::Mutex::new(Output {
                    writer,
                    next_seq: 1,
                }),
                pending: parking_lot::Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                request_timeout,
            }),
        }
    }

    /// Stamps the next `seq` onto `message`, writes it and returns the `seq`.
    pub async fn send(&self, mut message: ProtocolMessage) -> Result<i64, ProtocolError> {
        let mut output = self.inner.output.lock().await;
        let seq = output.next_seq;
        output.next_seq += 1;
        message.set_seq(seq);
        tracing::trace!(target: "javadbg.dap", seq, kind = message.kind(), "-> message");
        output.writer.write_message(&message).await?;
        Ok(seq)
    }

    pub async fn send_response(&self, response: Response) -> Result<i64, ProtocolError> {
        self.send(ProtocolMessage::Response(response)).await
    }

    pub async fn send_event(&self, event: Event) -> Result<i64, ProtocolError> {
        self.send(ProtocolMessage::Event(event)).await
    }

    /// Sends an adapter-initiated request and waits for the client's
    /// response. `None` waits without a deadline.
    ///
    /// Exactly one outcome is produced per call: the matching response, a
    /// [`ProtocolError::Timeout`], or [`ProtocolError::ConnectionClosed`]. A
    /// response that arrives after the timeout fired is discarded.
    pub async fn send_request(
        &self,
        command: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Response, ProtocolError> {
        let (tx, mut rx) = oneshot::channel();
        let seq = {
            let mut output = self.inner.output.lock().await;
            let seq = output.next_seq;
            output.next_seq += 1;
            // Registered before the write so a fast reply always finds its slot.
            self.inner.pending.lock().insert(seq, tx);

            let mut message = ProtocolMessage::Request(Request::new(command, arguments));
            message.set_seq(seq);
            tracing::debug!(target: "javadbg.dap", seq, command, "-> request");
            if let Err(err) = output.writer.write_message(&message).await {
                self.inner.pending.lock().remove(&seq);
                return Err(err);
            }
            seq
        };

        if self.inner.closed.load(Ordering::SeqCst)
            && self.inner.pending.lock().remove(&seq).is_some()
        {
            return Err(ProtocolError::ConnectionClosed);
        }

        let Some(timeout) = timeout else {
            return rx.await.map_err(|_| ProtocolError::ConnectionClosed);
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(result) => result.map_err(|_| ProtocolError::ConnectionClosed),
            Err(_) => {
                // Whoever removes the pending entry decides the outcome.
                if self.inner.pending.lock().remove(&seq).is_some() {
                    tracing::debug!(target: "javadbg.dap", seq, command, ?timeout, "request timed out");
                    Err(ProtocolError::Timeout(timeout))
                } else {
                    rx.await.map_err(|_| ProtocolError::ConnectionClosed)
                }
            }
        }
    }

    /// [`MessageSender::send_request`] with the server's configured timeout.
    pub async fn send_request_with_default_timeout(
        &self,
        command: &str,
        arguments: Value,
    ) -> Result<Response, ProtocolError> {
        self.send_request(command, arguments, self.inner.request_timeout)
            .await
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    fn complete(&self, response: Response) {
        let slot = self.inner.pending.lock().remove(&response.request_seq);
        match slot {
            Some(tx) => {
                // The caller may have been dropped; nothing to do then.
                let _ = tx.send(response);
            }
            None => tracing::debug!(
                target: "javadbg.dap",
                request_seq = response.request_seq,
                "discarding response without a pending request"
            ),
        }
    }

    /// Fails every pending request with `ConnectionClosed` and rejects new ones.
    fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.inner.pending.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(
                target: "javadbg.dap",
                count = drained.len(),
                "failing pending requests on shutdown"
            );
        }
    }
}

/// Lets other tasks observe and stop a running [`ProtocolServer`].
#[derive(Clone)]
pub struct ServerHandle {
    state: Arc<parking_lot::Mutex<ServerState>>,
    shutdown: CancellationToken,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Asks the read loop to exit. Returns immediately.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == ServerState::Running {
                *state = ServerState::Stopping;
            }
        }
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

enum Job {
    Request(Request),
    /// A request-shaped message that could not be decoded.
    Reject {
        seq: i64,
        command: String,
        message: String,
    },
}

pub struct ProtocolServer<R> {
    reader: DapReader<R>,
    sender: MessageSender,
    handle: ServerHandle,
}

impl<R> ProtocolServer<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new<W>(reader: R, writer: W, options: ServerOptions) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            reader: DapReader::with_decoder(
                reader,
                FrameDecoder::with_max_message_bytes(options.max_message_bytes),
            ),
            sender: MessageSender::new(DapWriter::new(writer), options.request_timeout),
            handle: ServerHandle {
                state: Arc::new(parking_lot::Mutex::new(ServerState::Running)),
                shutdown: CancellationToken::new(),
            },
        }
    }

    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs until EOF, a transport error, or [`ServerHandle::stop`].
    pub async fn run(
        mut self,
        dispatcher: Arc<dyn RequestDispatcher>,
    ) -> Result<(), ProtocolError> {
        let shutdown = self.handle.shutdown.clone();
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let mut worker = tokio::spawn(worker_loop(
            jobs_rx,
            dispatcher,
            self.sender.clone(),
            shutdown.clone(),
        ));

        let result = loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                frame = self.reader.read_frame() => frame,
            };

            match frame {
                Ok(Some(bytes)) => self.handle_frame(&bytes, &jobs_tx),
                Ok(None) => {
                    tracing::debug!(target: "javadbg.dap", "client closed the connection");
                    break Ok(());
                }
                Err(err) => {
                    tracing::error!(target: "javadbg.dap", error = %err, "failed to read from client");
                    break Err(err);
                }
            }
        };

        {
            let mut state = self.handle.state.lock();
            if *state == ServerState::Running {
                *state = ServerState::Stopping;
            }
        }
        drop(jobs_tx);
        self.sender.close();

        if tokio::time::timeout(WORKER_GRACE_PERIOD, &mut worker).await.is_err() {
            tracing::warn!(target: "javadbg.dap", "request worker did not finish; aborting it");
            worker.abort();
        }

        *self.handle.state.lock() = ServerState::Stopped;
        result
    }

    fn handle_frame(&self, bytes: &[u8], jobs: &mpsc::UnboundedSender<Job>) {
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    target: "javadbg.dap",
                    error = %sanitize_json_error_message(&err.to_string()),
                    "dropping frame that is not valid JSON"
                );
                return;
            }
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.as_str() {
            "request" => {
                let seq = value.get("seq").and_then(Value::as_i64);
                let job = match serde_json::from_value::<Request>(value.clone()) {
                    Ok(request) => {
                        tracing::trace!(
                            target: "javadbg.dap",
                            seq = request.seq,
                            command = %request.command,
                            "<- request"
                        );
                        Job::Request(request)
                    }
                    Err(err) => {
                        let Some(seq) = seq else {
                            tracing::warn!(target: "javadbg.dap", "dropping request without a seq");
                            return;
                        };
                        Job::Reject {
                            seq,
                            command: value
                                .get("command")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            message: format!(
                                "Invalid request: {}",
                                sanitize_json_error_message(&err.to_string())
                            ),
                        }
                    }
                };
                // The worker only goes away once the loop has exited.
                let _ = jobs.send(job);
            }
            "response" => match serde_json::from_value::<Response>(value) {
                Ok(response) => {
                    tracing::trace!(
                        target: "javadbg.dap",
                        request_seq = response.request_seq,
                        "<- response"
                    );
                    self.sender.complete(response);
                }
                Err(err) => tracing::warn!(
                    target: "javadbg.dap",
                    error = %sanitize_json_error_message(&err.to_string()),
                    "dropping malformed response"
                ),
            },
            "event" => tracing::debug!(target: "javadbg.dap", "ignoring event sent by the client"),
            _ => tracing::warn!(target: "javadbg.dap", "dropping message with unknown type"),
        }
    }
}

async fn worker_loop(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    dispatcher: Arc<dyn RequestDispatcher>,
    sender: MessageSender,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let outcome = match job {
            Job::Reject {
                seq,
                command,
                message,
            } => Outcome::response(Response::error(
                seq,
                command,
                ErrorCode::UnrecognizedRequestFailure,
                message,
            )),
            Job::Request(request) => {
                let seq = request.seq;
                let command = request.command.clone();
                match AssertUnwindSafe(dispatcher.dispatch(request, &sender))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_payload_message(&*panic);
                        tracing::error!(
                            target: "javadbg.dap",
                            seq,
                            command = %command,
                            panic = %message,
                            "panic while dispatching request"
                        );
                        Outcome::response(Response::error(
                            seq,
                            command,
                            ErrorCode::UnknownFailure,
                            format!("Internal error: {message}"),
                        ))
                    }
                }
            }
        };

        finish(&sender, outcome).await;
    }
}

/// Writes the response, then the deferred events, then starts deferred tasks.
async fn finish(sender: &MessageSender, outcome: Outcome) {
    let Outcome {
        response,
        events,
        tasks,
    } = outcome;

    let request_seq = response.request_seq;
    if let Err(err) = sender.send_response(response).await {
        tracing::warn!(target: "javadbg.dap", request_seq, error = %err, "failed to send response");
        return;
    }
    for event in events {
        if let Err(err) = sender.send_event(event).await {
            tracing::warn!(target: "javadbg.dap", error = %err, "failed to send event");
            return;
        }
    }
    for task in tasks {
        tokio::spawn(task);
    }
}

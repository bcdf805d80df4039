//! Scripted DAP client driving a real [`ProtocolServer`] over an in-memory
//! duplex pipe, backed by a [`MockVm`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use javadbg_config::AdapterConfig;
use javadbg_dap::dap::stream::{DapReader, DapWriter};
use javadbg_dap::{DebugAdapter, ProtocolError, ProtocolServer, ServerOptions, SessionContext};
use javadbg_vm::{MockFrame, MockVm, MockVmManager};
use serde_json::{json, Value};
use tokio::io::{DuplexStream, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub type ServerTask = JoinHandle<Result<(), ProtocolError>>;

pub struct TestAdapter {
    pub client: DapClient,
    pub vm: Arc<MockVm>,
    pub manager: Arc<MockVmManager>,
    pub server_task: ServerTask,
}

pub fn spawn_adapter() -> TestAdapter {
    spawn_adapter_with(AdapterConfig::default())
}

pub fn spawn_adapter_with(config: AdapterConfig) -> TestAdapter {
    spawn(config, None)
}

/// Like [`spawn_adapter`], but the debuggee session already exists when the
/// client connects, with `source_paths` as source roots.
pub fn spawn_attached_adapter(source_paths: &[&str]) -> TestAdapter {
    let source_paths = source_paths.iter().map(|path| path.to_string()).collect();
    spawn(AdapterConfig::default(), Some(source_paths))
}

fn spawn(config: AdapterConfig, session_roots: Option<Vec<String>>) -> TestAdapter {
    let vm = Arc::new(MockVm::new());
    let manager = Arc::new(MockVmManager::new(vm.clone()));

    let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
    let (server_reader, server_writer) = tokio::io::split(server_stream);

    let server = ProtocolServer::new(server_reader, server_writer, ServerOptions::from(&config));
    let context = SessionContext::new(config, server.sender(), server.handle(), manager.clone());
    if let Some(roots) = session_roots {
        context.source_lookup().initialize(&roots);
        context.install_session(vm.clone(), false);
    }
    let adapter = DebugAdapter::new(Arc::new(context));
    let server_task = tokio::spawn(server.run(Arc::new(adapter)));

    TestAdapter {
        client: DapClient::new(client_stream),
        vm,
        manager,
        server_task,
    }
}

/// Adds a suspended thread `main` (id 1) with the given stack, top first.
pub fn suspended_main_thread(vm: &MockVm, frames: Vec<MockFrame>) {
    vm.add_thread(1, "main", true);
    vm.set_frames(1, frames);
}

struct Inbox {
    rx: mpsc::UnboundedReceiver<Value>,
    backlog: VecDeque<Value>,
}

pub struct DapClient {
    writer: Mutex<DapWriter<WriteHalf<DuplexStream>>>,
    inbox: Mutex<Inbox>,
    next_seq: AtomicI64,
}

impl DapClient {
    fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut reader = DapReader::new(reader);
            while let Ok(Some(message)) = reader.read_value().await {
                if tx.send(message).is_err() {
                    break;
                }
            }
        });

        Self {
            writer: Mutex::new(DapWriter::new(writer)),
            inbox: Mutex::new(Inbox {
                rx,
                backlog: VecDeque::new(),
            }),
            next_seq: AtomicI64::new(1),
        }
    }

    /// Writes `message` verbatim.
    pub async fn send_raw(&self, message: Value) {
        self.writer
            .lock()
            .await
            .write_message(&message)
            .await
            .expect("write to adapter");
    }

    pub async fn send_request(&self, command: &str, arguments: Value) -> i64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.send_raw(json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .await;
        seq
    }

    pub async fn request(&self, command: &str, arguments: Value) -> Value {
        let seq = self.send_request(command, arguments).await;
        self.wait_for_response(seq).await
    }

    pub async fn wait_for_response(&self, request_seq: i64) -> Value {
        self.wait_for(&format!("response to {request_seq}"), |message| {
            message.get("type").and_then(Value::as_str) == Some("response")
                && message.get("request_seq").and_then(Value::as_i64) == Some(request_seq)
        })
        .await
    }

    pub async fn wait_for_event(&self, event: &str) -> Value {
        self.wait_for(&format!("event {event}"), |message| {
            message.get("type").and_then(Value::as_str) == Some("event")
                && message.get("event").and_then(Value::as_str) == Some(event)
        })
        .await
    }

    pub async fn wait_for_stopped_reason(&self, reason: &str) -> Value {
        self.wait_for(&format!("stopped ({reason})"), |message| {
            message.get("event").and_then(Value::as_str) == Some("stopped")
                && message.pointer("/body/reason").and_then(Value::as_str) == Some(reason)
        })
        .await
    }

    /// Next message matching `matches`; earlier non-matching messages are
    /// kept for later waits.
    async fn wait_for(&self, what: &str, matches: impl Fn(&Value) -> bool) -> Value {
        let mut inbox = self.inbox.lock().await;
        if let Some(index) = inbox.backlog.iter().position(&matches) {
            return inbox.backlog.remove(index).expect("index in bounds");
        }

        loop {
            let next = tokio::time::timeout(WAIT_TIMEOUT, inbox.rx.recv()).await;
            let message = match next {
                Ok(Some(message)) => message,
                Ok(None) => panic!("connection closed while waiting for {what}"),
                Err(_) => panic!(
                    "timed out waiting for {what}; unmatched messages: {:?}",
                    inbox.backlog
                ),
            };
            if matches(&message) {
                return message;
            }
            inbox.backlog.push_back(message);
        }
    }

    pub async fn initialize_handshake(&self) {
        let response = self
            .request(
                "initialize",
                json!({
                    "clientID": "test",
                    "adapterID": "java",
                    "linesStartAt1": true,
                    "pathFormat": "path",
                }),
            )
            .await;
        assert_success(&response);
        self.wait_for_event("initialized").await;
    }

    pub async fn launch(&self, source_paths: &[&str]) -> Value {
        let response = self
            .request(
                "launch",
                json!({
                    "mainClass": "com.acme.Foo",
                    "classpath": "/work/classes",
                    "sourcePaths": source_paths,
                }),
            )
            .await;
        assert_success(&response);
        response
    }

    pub async fn configuration_done(&self) {
        let response = self.request("configurationDone", json!({})).await;
        assert_success(&response);
    }

    pub async fn set_breakpoints(&self, path: &str, lines: &[i64]) -> Value {
        let breakpoints: Vec<Value> = lines.iter().map(|line| json!({ "line": line })).collect();
        self.request(
            "setBreakpoints",
            json!({
                "source": { "path": path },
                "breakpoints": breakpoints,
            }),
        )
        .await
    }

    pub async fn first_frame_id(&self, thread_id: u64) -> i64 {
        let stack = self
            .request("stackTrace", json!({ "threadId": thread_id }))
            .await;
        stack
            .pointer("/body/stackFrames/0/id")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("stackTrace response missing frame id: {stack}"))
    }

    pub async fn first_scope_variables_reference(&self, frame_id: i64) -> i64 {
        let scopes = self.request("scopes", json!({ "frameId": frame_id })).await;
        scopes
            .pointer("/body/scopes/0/variablesReference")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("scopes response missing variablesReference: {scopes}"))
    }

    pub async fn variables(&self, variables_reference: i64) -> Value {
        self.request(
            "variables",
            json!({ "variablesReference": variables_reference }),
        )
        .await
    }

    pub async fn continue_with_thread_id(&self, thread_id: Option<u64>) -> Value {
        let arguments = match thread_id {
            Some(thread_id) => json!({ "threadId": thread_id }),
            None => json!({}),
        };
        let response = self.request("continue", arguments).await;
        assert_success(&response);
        response
    }

    pub async fn disconnect(&self) {
        let response = self.request("disconnect", json!({})).await;
        assert_success(&response);
    }
}

/// Polls `condition` until it holds, for effects the adapter performs after
/// a response has been written.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn assert_success(response: &Value) {
    assert_eq!(
        response.get("success").and_then(Value::as_bool),
        Some(true),
        "expected a successful response: {response}"
    );
}

pub fn error_id(response: &Value) -> Option<i64> {
    response.pointer("/body/error/id").and_then(Value::as_i64)
}

/// Names of the variables in a `variables` response, in order.
pub fn variable_names(response: &Value) -> Vec<String> {
    response
        .pointer("/body/variables")
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("variables response missing body.variables: {response}"))
        .iter()
        .filter_map(|variable| variable.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

pub fn variable<'a>(response: &'a Value, name: &str) -> &'a Value {
    response
        .pointer("/body/variables")
        .and_then(Value::as_array)
        .and_then(|variables| {
            variables
                .iter()
                .find(|variable| variable.get("name").and_then(Value::as_str) == Some(name))
        })
        .unwrap_or_else(|| panic!("no variable named {name}: {response}"))
}

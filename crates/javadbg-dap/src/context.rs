//! State shared by every request handler of one client connection.
//!
//! A [`SessionContext`] lives as long as the connection. The debuggee session
//! inside it comes and goes: it is installed by `launch`/`attach` and taken
//! out again by `disconnect` or when the debuggee goes away. Handle tables
//! are behind their own locks so a `continue` and a `variables` racing on
//! different threads never observe a half-updated pool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use javadbg_config::AdapterConfig;
use javadbg_vm::{DebuggeeSession, FrameRef, ObjectRef, ThreadId, VirtualMachineManager};
use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use url::Url;

use crate::breakpoints::BreakpointManager;
use crate::format::{FormatOptions, SimpleValueFormatter, ValueFormatter};
use crate::id_collection::{IdCollection, RecyclableObjectPool};
use crate::protocol_server::{MessageSender, ServerHandle};
use crate::source_lookup::{FileSystemSourceLookup, SourceLookupProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    /// A debuggee exists but `configurationDone` has not arrived yet.
    Configuring,
    Running,
    Terminated,
}

/// What a client-visible handle points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolObject {
    Frame(FrameRef),
    /// The `Local` scope of a frame.
    Scope(FrameRef),
    Object {
        thread_id: ThreadId,
        object: ObjectRef,
    },
}

impl PoolObject {
    pub fn thread_id(&self) -> ThreadId {
        match self {
            PoolObject::Frame(frame) | PoolObject::Scope(frame) => frame.thread_id,
            PoolObject::Object { thread_id, .. } => *thread_id,
        }
    }
}

/// The exception a thread last stopped on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrownException {
    pub exception: ObjectRef,
    pub uncaught: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionFilters {
    pub caught: bool,
    pub uncaught: bool,
}

#[derive(Debug)]
struct Flags {
    state: SessionState,
    lines_start_at1: bool,
    client_paths_are_uri: bool,
    attached: bool,
    configuration_done: bool,
    exception_filters: ExceptionFilters,
}

pub struct SessionContext {
    config: AdapterConfig,
    sender: MessageSender,
    server: ServerHandle,
    vm_manager: Arc<dyn VirtualMachineManager>,
    source_lookup: Arc<dyn SourceLookupProvider>,
    formatter: Arc<dyn ValueFormatter>,
    flags: Mutex<Flags>,
    session: Mutex<Option<Arc<dyn DebuggeeSession>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
    objects: Mutex<RecyclableObjectPool<ThreadId, PoolObject>>,
    source_refs: Mutex<IdCollection<String>>,
    breakpoints: Mutex<BreakpointManager>,
    exceptions: Mutex<HashMap<ThreadId, ThrownException>>,
}

impl SessionContext {
    pub fn new(
        config: AdapterConfig,
        sender: MessageSender,
        server: ServerHandle,
        vm_manager: Arc<dyn VirtualMachineManager>,
    ) -> Self {
        Self {
            config,
            sender,
            server,
            vm_manager,
            source_lookup: Arc::new(FileSystemSourceLookup::default()),
            formatter: Arc::new(SimpleValueFormatter),
            flags: Mutex::new(Flags {
                state: SessionState::Uninitialized,
                lines_start_at1: true,
                client_paths_are_uri: false,
                attached: false,
                configuration_done: false,
                exception_filters: ExceptionFilters::default(),
            }),
            session: Mutex::new(None),
            event_task: Mutex::new(None),
            objects: Mutex::new(RecyclableObjectPool::new()),
            source_refs: Mutex::new(IdCollection::new()),
            breakpoints: Mutex::new(BreakpointManager::new()),
            exceptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_source_lookup(mut self, source_lookup: Arc<dyn SourceLookupProvider>) -> Self {
        self.source_lookup = source_lookup;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ValueFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn vm_manager(&self) -> &Arc<dyn VirtualMachineManager> {
        &self.vm_manager
    }

    pub fn source_lookup(&self) -> &Arc<dyn SourceLookupProvider> {
        &self.source_lookup
    }

    pub fn formatter(&self) -> &Arc<dyn ValueFormatter> {
        &self.formatter
    }

    pub fn format_options(&self, hex: bool) -> FormatOptions {
        FormatOptions {
            hex,
            qualified_names: self.config.show_qualified_names,
        }
    }

    pub fn state(&self) -> SessionState {
        self.flags.lock().state
    }

    pub fn set_state(&self, state: SessionState) {
        let mut flags = self.flags.lock();
        if flags.state != state {
            tracing::debug!(target: "javadbg.dap", from = ?flags.state, to = ?state, "session state");
            flags.state = state;
        }
    }

    pub fn set_client_conventions(&self, lines_start_at1: bool, paths_are_uri: bool) {
        let mut flags = self.flags.lock();
        flags.lines_start_at1 = lines_start_at1;
        flags.client_paths_are_uri = paths_are_uri;
    }

    pub fn is_attached(&self) -> bool {
        self.flags.lock().attached
    }

    pub fn exception_filters(&self) -> ExceptionFilters {
        self.flags.lock().exception_filters
    }

    pub fn set_exception_filters(&self, filters: ExceptionFilters) {
        self.flags.lock().exception_filters = filters;
    }

    pub fn is_configuration_done(&self) -> bool {
        self.flags.lock().configuration_done
    }

    pub fn set_configuration_done(&self) {
        self.flags.lock().configuration_done = true;
    }

    /// The live debuggee, if any.
    pub fn session(&self) -> Option<Arc<dyn DebuggeeSession>> {
        self.session.lock().clone()
    }

    pub fn install_session(&self, session: Arc<dyn DebuggeeSession>, attached: bool) {
        *self.session.lock() = Some(session);
        let mut flags = self.flags.lock();
        flags.attached = attached;
        flags.state = if flags.configuration_done {
            SessionState::Running
        } else {
            SessionState::Configuring
        };
    }

    /// Removes the debuggee and stops the event task.
    pub fn take_session(&self) -> Option<Arc<dyn DebuggeeSession>> {
        if let Some(task) = self.event_task.lock().take() {
            task.abort();
        }
        self.session.lock().take()
    }

    pub fn set_event_task(&self, task: JoinHandle<()>) {
        if let Some(previous) = self.event_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Marks the session as gone after the debuggee disconnected on its own.
    /// Called from the event task itself, so the task handle is only dropped.
    pub(crate) fn end_session(&self) {
        self.event_task.lock().take();
        self.session.lock().take();
        self.objects.lock().reset();
        self.exceptions.lock().clear();
        self.set_state(SessionState::Terminated);
    }

    pub fn record_exception(&self, thread_id: ThreadId, thrown: ThrownException) {
        self.exceptions.lock().insert(thread_id, thrown);
    }

    pub fn exception(&self, thread_id: ThreadId) -> Option<ThrownException> {
        self.exceptions.lock().get(&thread_id).cloned()
    }

    /// Forgets the exception of `thread_id`, or of every thread for `None`.
    pub fn clear_exceptions(&self, thread_id: Option<ThreadId>) {
        let mut exceptions = self.exceptions.lock();
        match thread_id {
            Some(thread_id) => {
                exceptions.remove(&thread_id);
            }
            None => exceptions.clear(),
        }
    }

    pub fn objects(&self) -> MutexGuard<'_, RecyclableObjectPool<ThreadId, PoolObject>> {
        self.objects.lock()
    }

    pub fn source_refs(&self) -> MutexGuard<'_, IdCollection<String>> {
        self.source_refs.lock()
    }

    pub fn breakpoints(&self) -> MutexGuard<'_, BreakpointManager> {
        self.breakpoints.lock()
    }

    /// Mints a handle for `object`, owned by the thread it belongs to.
    pub fn add_handle(&self, object: PoolObject) -> i64 {
        let owner = object.thread_id();
        self.objects.lock().add_object(owner, object)
    }

    /// Resolves a handle. `None` for stale, unknown and sentinel handles.
    pub fn handle(&self, id: i64) -> Option<PoolObject> {
        self.objects.lock().get_object_by_id(id).cloned()
    }

    /// Invalidates handles after `thread_id` (or the whole VM, for `None`)
    /// was resumed or stepped.
    pub async fn recycle_handles_after_resume(
        &self,
        session: &dyn DebuggeeSession,
        thread_id: Option<ThreadId>,
    ) {
        let others_suspended = match thread_id {
            Some(_) => match session.all_threads().await {
                Ok(threads) => threads.iter().any(|thread| thread.suspended),
                Err(err) => {
                    tracing::debug!(target: "javadbg.dap", error = %err, "failed to list threads");
                    false
                }
            },
            None => false,
        };

        let mut objects = self.objects.lock();
        match thread_id {
            Some(thread_id) if others_suspended => {
                let removed = objects.remove_objects_by_owner(&thread_id);
                tracing::trace!(target: "javadbg.dap", thread_id, removed, "recycled thread handles");
            }
            _ => objects.remove_all_objects(),
        }
    }

    /// Clears the handle tables. Breakpoints survive: they may have been set
    /// before the debuggee existed.
    pub fn reset_session_state(&self) {
        self.objects.lock().reset();
        self.source_refs.lock().reset();
        self.exceptions.lock().clear();
    }

    pub fn client_line_to_debugger(&self, line: i64) -> i64 {
        if self.flags.lock().lines_start_at1 {
            line
        } else {
            line + 1
        }
    }

    pub fn debugger_line_to_client(&self, line: i64) -> i64 {
        if self.flags.lock().lines_start_at1 {
            line
        } else {
            line - 1
        }
    }

    /// Converts a client path into the debugger's URI form. `None` when the
    /// path cannot be represented (for example a relative path).
    pub fn client_path_to_debugger_uri(&self, path: &str) -> Option<String> {
        if self.flags.lock().client_paths_are_uri {
            return Url::parse(path).ok().map(String::from);
        }
        path_to_file_uri(Path::new(&normalize_drive_letter(path)))
    }

    pub fn debugger_uri_to_client_path(&self, uri: &str) -> Option<String> {
        if self.flags.lock().client_paths_are_uri {
            return Some(uri.to_string());
        }
        file_uri_to_path(uri).map(|path| path.display().to_string())
    }
}

/// Upper-cases a Windows drive letter (`c:\src` → `C:\src`).
pub fn normalize_drive_letter(path: &str) -> String {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_lowercase() && bytes[1] == b':' {
        let mut normalized = String::with_capacity(path.len());
        normalized.push(char::from(bytes[0].to_ascii_uppercase()));
        normalized.push_str(&path[1..]);
        normalized
    } else {
        path.to_string()
    }
}

pub fn path_to_file_uri(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

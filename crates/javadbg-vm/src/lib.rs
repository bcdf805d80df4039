//! Debuggee-side interface for the javadbg debug adapter.
//!
//! The adapter never talks to the debug wire directly. Everything it needs
//! from the target JVM (thread control, frame and value inspection, value
//! mutation, breakpoint requests and the asynchronous event stream) goes
//! through [`DebuggeeSession`]. Sessions are produced by a
//! [`VirtualMachineManager`], either by launching a new JVM or by attaching to
//! one that is already listening.

#[cfg(any(test, feature = "test-support"))]
mod mock;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[cfg(any(test, feature = "test-support"))]
pub use mock::{MockCall, MockFrame, MockObject, MockVm, MockVmManager};

pub type ThreadId = u64;
pub type ObjectId = u64;
/// Identifier of an installed breakpoint request inside the debuggee.
pub type BreakpointRequestId = u64;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Object(ObjectRef),
}

impl Value {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Null | Value::Void | Value::Object(_))
    }

    /// Name of the runtime type, as reported by the debuggee.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Void => "void",
            Value::Boolean(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            Value::Object(obj) => &obj.type_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: ObjectId,
    /// Fully qualified runtime type name (`java.lang.String`, `int[]`).
    pub type_name: String,
    pub kind: ObjectKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Plain,
    String { value: String },
    Array { length: usize },
}

impl ObjectRef {
    pub fn array_length(&self) -> Option<usize> {
        match self.kind {
            ObjectKind::Array { length } => Some(length),
            _ => None,
        }
    }
}

/// A named value visible from a frame or an object: a local variable, an
/// argument, an instance field or a static field.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    /// Declared (static) type of the variable.
    pub type_name: String,
    pub value: Value,
    /// Type declaring a field. `None` for locals and arguments.
    pub declaring_type: Option<String>,
    pub is_static: bool,
    pub is_final: bool,
}

impl VariableInfo {
    pub fn local(name: impl Into<String>, type_name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value,
            declaring_type: None,
            is_static: false,
            is_final: false,
        }
    }

    pub fn field(
        name: impl Into<String>,
        type_name: impl Into<String>,
        declaring_type: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value,
            declaring_type: Some(declaring_type.into()),
            is_static: false,
            is_final: false,
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn into_final(mut self) -> Self {
        self.is_final = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub suspended: bool,
}

/// Stack frames are addressed by their owning thread and depth (0 = top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRef {
    pub thread_id: ThreadId,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub method_name: String,
    /// Fully qualified name of the type declaring the method.
    pub declaring_type: String,
    /// Bare file name, e.g. `Foo.java`.
    pub source_name: Option<String>,
    /// Source path relative to a source root, e.g. `com/acme/Foo.java`.
    pub source_path: Option<String>,
    /// One-based line number, or a negative value when unknown.
    pub line: i64,
    pub is_static: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    Into,
    Over,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    /// Fully qualified class names the line maps to.
    pub class_names: Vec<String>,
    /// One-based line in the debuggee's numbering.
    pub line: i64,
    pub condition: Option<String>,
    /// Stop on the N-th hit only; `0` stops on every hit.
    pub hit_count: u32,
}

/// Asynchronous notifications coming from the debuggee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmEvent {
    VmStart,
    VmDeath,
    VmDisconnect,
    ThreadStart { thread_id: ThreadId },
    ThreadDeath { thread_id: ThreadId },
    Breakpoint { thread_id: ThreadId },
    StepComplete { thread_id: ThreadId },
    /// A thrown exception matched the active exception filters.
    Exception {
        thread_id: ThreadId,
        exception: ObjectRef,
        uncaught: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchSpec {
    pub main_class: String,
    pub classpath: String,
    pub args: String,
    pub vm_args: String,
    pub cwd: Option<String>,
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("debuggee is disconnected")]
    Disconnected,
    #[error("invalid thread id {0}")]
    InvalidThread(ThreadId),
    #[error("thread {0} is not suspended")]
    ThreadNotSuspended(ThreadId),
    #[error("invalid stack frame {depth} on thread {thread_id}")]
    InvalidFrame { thread_id: ThreadId, depth: usize },
    #[error("invalid object id {0}")]
    InvalidObject(ObjectId),
    #[error("no field named `{0}`")]
    NoSuchField(String),
    #[error("no local variable named `{0}`")]
    NoSuchVariable(String),
    #[error("array index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },
    #[error("cannot assign a value of type {found} to {expected}")]
    TypeMismatch { expected: String, found: String },
    #[error("no loaded class contains line {line}")]
    NoLocation { line: i64 },
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
    #[error("failed to launch debuggee: {0}")]
    Launch(String),
    #[error("failed to attach to debuggee: {0}")]
    Attach(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

/// A live connection to one debuggee.
///
/// All methods take `&self`: implementations synchronize internally so the
/// adapter can share one session between concurrently running handlers and
/// its event task.
#[async_trait]
pub trait DebuggeeSession: Send + Sync {
    async fn all_threads(&self) -> Result<Vec<ThreadInfo>, VmError>;

    async fn resume_vm(&self) -> Result<(), VmError>;
    async fn suspend_vm(&self) -> Result<(), VmError>;
    async fn resume_thread(&self, thread_id: ThreadId) -> Result<(), VmError>;
    async fn suspend_thread(&self, thread_id: ThreadId) -> Result<(), VmError>;

    /// Requests a single step and resumes the thread. Completion is reported
    /// through [`VmEvent::StepComplete`].
    async fn step(&self, thread_id: ThreadId, kind: StepKind) -> Result<(), VmError>;

    /// Full call stack of a suspended thread, top frame first.
    async fn frames(&self, thread_id: ThreadId) -> Result<Vec<FrameInfo>, VmError>;

    /// Locals and arguments visible at the frame's current location.
    async fn visible_variables(&self, frame: FrameRef) -> Result<Vec<VariableInfo>, VmError>;
    async fn this_object(&self, frame: FrameRef) -> Result<Option<ObjectRef>, VmError>;
    /// Static fields of the type declaring the frame's method.
    async fn static_fields(&self, frame: FrameRef) -> Result<Vec<VariableInfo>, VmError>;

    /// Instance and static fields of an object, including inherited ones.
    async fn fields(&self, object_id: ObjectId) -> Result<Vec<VariableInfo>, VmError>;
    async fn array_elements(
        &self,
        object_id: ObjectId,
        start: usize,
        count: usize,
    ) -> Result<Vec<Value>, VmError>;

    async fn set_local(&self, frame: FrameRef, name: &str, value: Value) -> Result<(), VmError>;
    /// Assigns a field. `declaring_type` selects a shadowed field when a
    /// subclass declares a field with the same name.
    async fn set_field(
        &self,
        object_id: ObjectId,
        name: &str,
        declaring_type: Option<&str>,
        value: Value,
    ) -> Result<(), VmError>;
    async fn set_static_field(
        &self,
        type_name: &str,
        name: &str,
        value: Value,
    ) -> Result<(), VmError>;
    async fn set_array_element(
        &self,
        object_id: ObjectId,
        index: usize,
        value: Value,
    ) -> Result<(), VmError>;
    async fn create_string(&self, value: &str) -> Result<Value, VmError>;
    /// Runs `toString()` on `object_id` in the suspended thread `thread_id`.
    async fn invoke_to_string(
        &self,
        thread_id: ThreadId,
        object_id: ObjectId,
    ) -> Result<String, VmError>;

    async fn install_breakpoint(
        &self,
        spec: &BreakpointSpec,
    ) -> Result<BreakpointRequestId, VmError>;
    async fn remove_breakpoint(&self, request: BreakpointRequestId) -> Result<(), VmError>;
    async fn set_hit_count(
        &self,
        request: BreakpointRequestId,
        hit_count: u32,
    ) -> Result<(), VmError>;
    async fn set_exception_breakpoints(&self, caught: bool, uncaught: bool)
        -> Result<(), VmError>;

    fn subscribe_events(&self) -> broadcast::Receiver<VmEvent>;

    /// Lets a freshly launched or attached debuggee run.
    async fn start(&self) -> Result<(), VmError>;
    async fn terminate(&self) -> Result<(), VmError>;
    async fn detach(&self) -> Result<(), VmError>;
}

/// Creates debuggee sessions.
#[async_trait]
pub trait VirtualMachineManager: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn DebuggeeSession>, VmError>;

    async fn attach(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Arc<dyn DebuggeeSession>, VmError>;
}

/// A manager for builds without a debug-wire backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableVmManager;

#[async_trait]
impl VirtualMachineManager for UnavailableVmManager {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn DebuggeeSession>, VmError> {
        tracing::warn!(
            target: "javadbg.vm",
            main_class = %spec.main_class,
            "launch requested but no debug-wire backend is configured"
        );
        Err(VmError::Launch(
            "no debug-wire backend is configured".to_string(),
        ))
    }

    async fn attach(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Arc<dyn DebuggeeSession>, VmError> {
        tracing::warn!(
            target: "javadbg.vm",
            host,
            port,
            "attach requested but no debug-wire backend is configured"
        );
        Err(VmError::Attach(
            "no debug-wire backend is configured".to_string(),
        ))
    }
}

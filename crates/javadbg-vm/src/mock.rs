use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    BreakpointRequestId, BreakpointSpec, DebuggeeSession, FrameInfo, FrameRef, LaunchSpec,
    ObjectId, ObjectKind, ObjectRef, StepKind, ThreadId, ThreadInfo, Value, VariableInfo,
    VirtualMachineManager, VmError, VmEvent,
};

/// One stack frame of a mock thread.
#[derive(Clone, Debug)]
pub struct MockFrame {
    pub info: FrameInfo,
    pub locals: Vec<VariableInfo>,
    pub this: Option<ObjectRef>,
}

impl MockFrame {
    pub fn new(declaring_type: &str, method_name: &str, line: i64) -> Self {
        let simple = declaring_type.rsplit('.').next().unwrap_or(declaring_type);
        let outer = simple.split('$').next().unwrap_or(simple);
        Self {
            info: FrameInfo {
                method_name: method_name.to_string(),
                declaring_type: declaring_type.to_string(),
                source_name: Some(format!("{outer}.java")),
                source_path: Some(format!(
                    "{}.java",
                    declaring_type
                        .split('$')
                        .next()
                        .unwrap_or(declaring_type)
                        .replace('.', "/")
                )),
                line,
                is_static: false,
            },
            locals: Vec::new(),
            this: None,
        }
    }

    pub fn with_local(mut self, local: VariableInfo) -> Self {
        self.locals.push(local);
        self
    }

    pub fn with_this(mut self, this: ObjectRef) -> Self {
        self.this = Some(this);
        self
    }

    pub fn into_static(mut self) -> Self {
        self.info.is_static = true;
        self
    }
}

/// Contents of a mock heap object.
#[derive(Clone, Debug, Default)]
pub struct MockObject {
    pub fields: Vec<VariableInfo>,
    pub elements: Vec<Value>,
}

/// A call observed by [`MockVm`], for assertions in tests.
#[derive(Clone, Debug, PartialEq)]
pub enum MockCall {
    ResumeVm,
    SuspendVm,
    ResumeThread(ThreadId),
    SuspendThread(ThreadId),
    Step(ThreadId, StepKind),
    SetLocal(FrameRef, String, Value),
    SetField(ObjectId, String, Option<String>, Value),
    SetStaticField(String, String, Value),
    SetArrayElement(ObjectId, usize, Value),
    InstallBreakpoint(BreakpointSpec),
    RemoveBreakpoint(BreakpointRequestId),
    SetHitCount(BreakpointRequestId, u32),
    SetExceptionBreakpoints { caught: bool, uncaught: bool },
    Start,
    Terminate,
    Detach,
}

#[derive(Default)]
struct MockThread {
    name: String,
    suspended: bool,
    frames: Vec<MockFrame>,
}

#[derive(Default)]
struct State {
    threads: BTreeMap<ThreadId, MockThread>,
    objects: HashMap<ObjectId, MockObject>,
    statics: HashMap<String, Vec<VariableInfo>>,
    breakpoints: BTreeMap<BreakpointRequestId, BreakpointSpec>,
    unresolvable_classes: HashSet<String>,
    to_strings: HashMap<ObjectId, String>,
    next_request_id: BreakpointRequestId,
    next_object_id: ObjectId,
    calls: Vec<MockCall>,
    disconnected: bool,
}

/// Deterministic, in-memory debuggee.
///
/// Threads, frames and heap objects are configured up front; every mutating
/// call is recorded and can be inspected with [`MockVm::calls`]. Events are
/// only emitted when a test asks for them (see [`MockVm::emit`] and
/// [`MockVm::hit_breakpoint`]).
pub struct MockVm {
    state: Mutex<State>,
    events: broadcast::Sender<VmEvent>,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State {
                next_request_id: 1,
                next_object_id: 10_000,
                ..State::default()
            }),
            events,
        }
    }

    pub fn add_thread(&self, id: ThreadId, name: &str, suspended: bool) {
        self.state.lock().threads.insert(
            id,
            MockThread {
                name: name.to_string(),
                suspended,
                frames: Vec::new(),
            },
        );
    }

    pub fn set_frames(&self, thread_id: ThreadId, frames: Vec<MockFrame>) {
        let mut state = self.state.lock();
        state.threads.entry(thread_id).or_default().frames = frames;
    }

    pub fn insert_object(&self, id: ObjectId, object: MockObject) {
        self.state.lock().objects.insert(id, object);
    }

    pub fn set_statics(&self, type_name: &str, fields: Vec<VariableInfo>) {
        let fields = fields.into_iter().map(VariableInfo::into_static).collect();
        self.state.lock().statics.insert(type_name.to_string(), fields);
    }

    /// Breakpoints for this class fail to install.
    pub fn reject_breakpoints_in(&self, class_name: &str) {
        self.state
            .lock()
            .unresolvable_classes
            .insert(class_name.to_string());
    }

    pub fn is_suspended(&self, thread_id: ThreadId) -> bool {
        self.state
            .lock()
            .threads
            .get(&thread_id)
            .is_some_and(|thread| thread.suspended)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn installed_breakpoints(&self) -> Vec<(BreakpointRequestId, BreakpointSpec)> {
        self.state
            .lock()
            .breakpoints
            .iter()
            .map(|(id, spec)| (*id, spec.clone()))
            .collect()
    }

    pub fn local_value(&self, thread_id: ThreadId, depth: usize, name: &str) -> Option<Value> {
        let state = self.state.lock();
        state
            .threads
            .get(&thread_id)?
            .frames
            .get(depth)?
            .locals
            .iter()
            .find(|local| local.name == name)
            .map(|local| local.value.clone())
    }

    pub fn emit(&self, event: VmEvent) {
        if matches!(event, VmEvent::VmDisconnect) {
            self.state.lock().disconnected = true;
        }
        // No receivers is fine: nobody subscribed yet.
        let _ = self.events.send(event);
    }

    /// Suspends `thread_id` and reports a breakpoint hit.
    pub fn hit_breakpoint(&self, thread_id: ThreadId) {
        if let Some(thread) = self.state.lock().threads.get_mut(&thread_id) {
            thread.suspended = true;
        }
        self.emit(VmEvent::Breakpoint { thread_id });
    }

    /// Suspends `thread_id` and reports `exception` as thrown there.
    pub fn throw_exception(&self, thread_id: ThreadId, exception: ObjectRef, uncaught: bool) {
        if let Some(thread) = self.state.lock().threads.get_mut(&thread_id) {
            thread.suspended = true;
        }
        self.emit(VmEvent::Exception {
            thread_id,
            exception,
            uncaught,
        });
    }

    /// What `toString()` returns for `object_id`. Objects without one fail
    /// the invocation.
    pub fn set_to_string(&self, object_id: ObjectId, text: &str) {
        self.state.lock().to_strings.insert(object_id, text.to_string());
    }

    fn record(&self, call: MockCall) -> Result<(), VmError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(VmError::Disconnected);
        }
        state.calls.push(call);
        Ok(())
    }

    fn with_frame<R>(
        &self,
        frame: FrameRef,
        f: impl FnOnce(&mut MockFrame) -> Result<R, VmError>,
    ) -> Result<R, VmError> {
        let mut state = self.state.lock();
        let thread = state
            .threads
            .get_mut(&frame.thread_id)
            .ok_or(VmError::InvalidThread(frame.thread_id))?;
        if !thread.suspended {
            return Err(VmError::ThreadNotSuspended(frame.thread_id));
        }
        let mock_frame = thread
            .frames
            .get_mut(frame.depth)
            .ok_or(VmError::InvalidFrame {
                thread_id: frame.thread_id,
                depth: frame.depth,
            })?;
        f(mock_frame)
    }

    fn check_assignable(target_type: &str, value: &Value) -> Result<(), VmError> {
        let compatible = match value {
            Value::Null | Value::Object(_) => !is_primitive_type(target_type),
            other => other.type_name() == target_type,
        };
        if compatible {
            Ok(())
        } else {
            Err(VmError::TypeMismatch {
                expected: target_type.to_string(),
                found: value.type_name().to_string(),
            })
        }
    }
}

fn is_primitive_type(name: &str) -> bool {
    matches!(
        name,
        "boolean" | "byte" | "short" | "int" | "long" | "float" | "double" | "char"
    )
}

#[async_trait]
impl DebuggeeSession for MockVm {
    async fn all_threads(&self) -> Result<Vec<ThreadInfo>, VmError> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(VmError::Disconnected);
        }
        Ok(state
            .threads
            .iter()
            .map(|(id, thread)| ThreadInfo {
                id: *id,
                name: thread.name.clone(),
                suspended: thread.suspended,
            })
            .collect())
    }

    async fn resume_vm(&self) -> Result<(), VmError> {
        self.record(MockCall::ResumeVm)?;
        for thread in self.state.lock().threads.values_mut() {
            thread.suspended = false;
        }
        Ok(())
    }

    async fn suspend_vm(&self) -> Result<(), VmError> {
        self.record(MockCall::SuspendVm)?;
        for thread in self.state.lock().threads.values_mut() {
            thread.suspended = true;
        }
        Ok(())
    }

    async fn resume_thread(&self, thread_id: ThreadId) -> Result<(), VmError> {
        self.record(MockCall::ResumeThread(thread_id))?;
        let mut state = self.state.lock();
        let thread = state
            .threads
            .get_mut(&thread_id)
            .ok_or(VmError::InvalidThread(thread_id))?;
        thread.suspended = false;
        Ok(())
    }

    async fn suspend_thread(&self, thread_id: ThreadId) -> Result<(), VmError> {
        self.record(MockCall::SuspendThread(thread_id))?;
        let mut state = self.state.lock();
        let thread = state
            .threads
            .get_mut(&thread_id)
            .ok_or(VmError::InvalidThread(thread_id))?;
        thread.suspended = true;
        Ok(())
    }

    async fn step(&self, thread_id: ThreadId, kind: StepKind) -> Result<(), VmError> {
        self.record(MockCall::Step(thread_id, kind))?;
        let mut state = self.state.lock();
        let thread = state
            .threads
            .get_mut(&thread_id)
            .ok_or(VmError::InvalidThread(thread_id))?;
        thread.suspended = false;
        Ok(())
    }

    async fn frames(&self, thread_id: ThreadId) -> Result<Vec<FrameInfo>, VmError> {
        let state = self.state.lock();
        let thread = state
            .threads
            .get(&thread_id)
            .ok_or(VmError::InvalidThread(thread_id))?;
        if !thread.suspended {
            return Err(VmError::ThreadNotSuspended(thread_id));
        }
        Ok(thread.frames.iter().map(|frame| frame.info.clone()).collect())
    }

    async fn visible_variables(&self, frame: FrameRef) -> Result<Vec<VariableInfo>, VmError> {
        self.with_frame(frame, |frame| Ok(frame.locals.clone()))
    }

    async fn this_object(&self, frame: FrameRef) -> Result<Option<ObjectRef>, VmError> {
        self.with_frame(frame, |frame| Ok(frame.this.clone()))
    }

    async fn static_fields(&self, frame: FrameRef) -> Result<Vec<VariableInfo>, VmError> {
        let declaring_type = self.with_frame(frame, |frame| Ok(frame.info.declaring_type.clone()))?;
        Ok(self
            .state
            .lock()
            .statics
            .get(&declaring_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn fields(&self, object_id: ObjectId) -> Result<Vec<VariableInfo>, VmError> {
        self.state
            .lock()
            .objects
            .get(&object_id)
            .map(|object| object.fields.clone())
            .ok_or(VmError::InvalidObject(object_id))
    }

    async fn array_elements(
        &self,
        object_id: ObjectId,
        start: usize,
        count: usize,
    ) -> Result<Vec<Value>, VmError> {
        let state = self.state.lock();
        let object = state
            .objects
            .get(&object_id)
            .ok_or(VmError::InvalidObject(object_id))?;
        let length = object.elements.len();
        if start > length || start.saturating_add(count) > length {
            return Err(VmError::IndexOutOfBounds {
                index: start.saturating_add(count),
                length,
            });
        }
        Ok(object.elements[start..start + count].to_vec())
    }

    async fn set_local(&self, frame: FrameRef, name: &str, value: Value) -> Result<(), VmError> {
        self.record(MockCall::SetLocal(frame, name.to_string(), value.clone()))?;
        self.with_frame(frame, |frame| {
            let local = frame
                .locals
                .iter_mut()
                .find(|local| local.name == name)
                .ok_or_else(|| VmError::NoSuchVariable(name.to_string()))?;
            Self::check_assignable(&local.type_name, &value)?;
            local.value = value;
            Ok(())
        })
    }

    async fn set_field(
        &self,
        object_id: ObjectId,
        name: &str,
        declaring_type: Option<&str>,
        value: Value,
    ) -> Result<(), VmError> {
        self.record(MockCall::SetField(
            object_id,
            name.to_string(),
            declaring_type.map(str::to_string),
            value.clone(),
        ))?;
        let mut state = self.state.lock();
        let object = state
            .objects
            .get_mut(&object_id)
            .ok_or(VmError::InvalidObject(object_id))?;
        let field = object
            .fields
            .iter_mut()
            .find(|field| {
                field.name == name
                    && declaring_type.map_or(true, |ty| field.declaring_type.as_deref() == Some(ty))
            })
            .ok_or_else(|| VmError::NoSuchField(name.to_string()))?;
        Self::check_assignable(&field.type_name, &value)?;
        field.value = value;
        Ok(())
    }

    async fn set_static_field(
        &self,
        type_name: &str,
        name: &str,
        value: Value,
    ) -> Result<(), VmError> {
        self.record(MockCall::SetStaticField(
            type_name.to_string(),
            name.to_string(),
            value.clone(),
        ))?;
        let mut state = self.state.lock();
        let field = state
            .statics
            .get_mut(type_name)
            .and_then(|fields| fields.iter_mut().find(|field| field.name == name))
            .ok_or_else(|| VmError::NoSuchField(name.to_string()))?;
        Self::check_assignable(&field.type_name, &value)?;
        field.value = value;
        Ok(())
    }

    async fn set_array_element(
        &self,
        object_id: ObjectId,
        index: usize,
        value: Value,
    ) -> Result<(), VmError> {
        self.record(MockCall::SetArrayElement(object_id, index, value.clone()))?;
        let mut state = self.state.lock();
        let object = state
            .objects
            .get_mut(&object_id)
            .ok_or(VmError::InvalidObject(object_id))?;
        let length = object.elements.len();
        let slot = object
            .elements
            .get_mut(index)
            .ok_or(VmError::IndexOutOfBounds { index, length })?;
        *slot = value;
        Ok(())
    }

    async fn create_string(&self, value: &str) -> Result<Value, VmError> {
        let mut state = self.state.lock();
        let id = state.next_object_id;
        state.next_object_id += 1;
        state.objects.insert(id, MockObject::default());
        Ok(Value::Object(ObjectRef {
            id,
            type_name: "java.lang.String".to_string(),
            kind: ObjectKind::String {
                value: value.to_string(),
            },
        }))
    }

    async fn invoke_to_string(
        &self,
        thread_id: ThreadId,
        object_id: ObjectId,
    ) -> Result<String, VmError> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(VmError::Disconnected);
        }
        let thread = state
            .threads
            .get(&thread_id)
            .ok_or(VmError::InvalidThread(thread_id))?;
        if !thread.suspended {
            return Err(VmError::ThreadNotSuspended(thread_id));
        }
        state
            .to_strings
            .get(&object_id)
            .cloned()
            .ok_or(VmError::InvalidObject(object_id))
    }

    async fn install_breakpoint(
        &self,
        spec: &BreakpointSpec,
    ) -> Result<BreakpointRequestId, VmError> {
        self.record(MockCall::InstallBreakpoint(spec.clone()))?;
        let mut state = self.state.lock();
        if spec.class_names.is_empty()
            || spec
                .class_names
                .iter()
                .any(|class| state.unresolvable_classes.contains(class))
        {
            return Err(VmError::NoLocation { line: spec.line });
        }
        let id = state.next_request_id;
        state.next_request_id += 1;
        state.breakpoints.insert(id, spec.clone());
        Ok(id)
    }

    async fn remove_breakpoint(&self, request: BreakpointRequestId) -> Result<(), VmError> {
        self.record(MockCall::RemoveBreakpoint(request))?;
        self.state.lock().breakpoints.remove(&request);
        Ok(())
    }

    async fn set_hit_count(
        &self,
        request: BreakpointRequestId,
        hit_count: u32,
    ) -> Result<(), VmError> {
        self.record(MockCall::SetHitCount(request, hit_count))?;
        if let Some(spec) = self.state.lock().breakpoints.get_mut(&request) {
            spec.hit_count = hit_count;
        }
        Ok(())
    }

    async fn set_exception_breakpoints(
        &self,
        caught: bool,
        uncaught: bool,
    ) -> Result<(), VmError> {
        self.record(MockCall::SetExceptionBreakpoints { caught, uncaught })
    }

    fn subscribe_events(&self) -> broadcast::Receiver<VmEvent> {
        self.events.subscribe()
    }

    async fn start(&self) -> Result<(), VmError> {
        self.record(MockCall::Start)?;
        self.emit(VmEvent::VmStart);
        Ok(())
    }

    async fn terminate(&self) -> Result<(), VmError> {
        self.record(MockCall::Terminate)
    }

    async fn detach(&self) -> Result<(), VmError> {
        self.record(MockCall::Detach)
    }
}

/// Hands out one shared [`MockVm`] for every launch or attach.
pub struct MockVmManager {
    vm: Arc<MockVm>,
    fail_with: Mutex<Option<String>>,
    launches: Mutex<Vec<LaunchSpec>>,
    attaches: Mutex<Vec<(String, u16, Duration)>>,
}

impl MockVmManager {
    pub fn new(vm: Arc<MockVm>) -> Self {
        Self {
            vm,
            fail_with: Mutex::new(None),
            launches: Mutex::new(Vec::new()),
            attaches: Mutex::new(Vec::new()),
        }
    }

    /// Makes subsequent launch/attach calls fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().clone()
    }

    pub fn attaches(&self) -> Vec<(String, u16, Duration)> {
        self.attaches.lock().clone()
    }
}

#[async_trait]
impl VirtualMachineManager for MockVmManager {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Arc<dyn DebuggeeSession>, VmError> {
        self.launches.lock().push(spec.clone());
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(VmError::Launch(message));
        }
        Ok(self.vm.clone())
    }

    async fn attach(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Arc<dyn DebuggeeSession>, VmError> {
        self.attaches.lock().push((host.to_string(), port, timeout));
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(VmError::Attach(message));
        }
        Ok(self.vm.clone())
    }
}

// In-memory target VM
//
// Runs a scripted `MockProgram` on a tokio task with JDWP request, event and
// suspension semantics. Used by the test suite in place of a real JVM.

mod machine;
mod program;

pub use program::{
    MockClass, MockLocal, MockMethod, MockProgram, Op, OBJECT_CLASS, RUNTIME_EXCEPTION_CLASS,
    STRING_CLASS, THREAD_CLASS,
};

use crate::target::TargetVm;
use jdwp_client::method::LineTable;
use jdwp_client::object::MonitorInfo;
use jdwp_client::reftype::MethodInfo;
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::thread::{Frame, OwnedMonitor};
use jdwp_client::types::{
    ArrayId, ClassId, FieldId, FieldInfo, FrameId, MethodId, ObjectId, ReferenceTypeId, StringId,
    SuspendStatus, ThreadId, ThreadStatus, Value, Variable,
};
use jdwp_client::vm::ClassInfo;
use jdwp_client::protocol::error_codes;
use jdwp_client::{EventModifier, EventSet, JdwpError, JdwpResult, SuspendPolicy};
use machine::{Machine, Tick};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Shared {
    machine: Mutex<Machine>,
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<EventSet>>,
    wake: Notify,
    shutdown: CancellationToken,
    /// Event kinds whose requests fail with NOT_IMPLEMENTED
    rejected_kinds: Mutex<HashSet<u8>>,
    failing_resumes: AtomicBool,
}

impl Shared {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to a running in-memory VM. Clones share the VM.
#[derive(Clone)]
pub struct MockVm {
    shared: Arc<Shared>,
}

impl MockVm {
    /// Start the VM on the current runtime. Every thread starts suspended
    /// and a VMStart event is queued.
    pub fn start(program: &MockProgram) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            machine: Mutex::new(Machine::new(program, tx)),
            events: tokio::sync::Mutex::new(rx),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            rejected_kinds: Mutex::new(HashSet::new()),
            failing_resumes: AtomicBool::new(false),
        });
        tokio::spawn(run(shared.clone()));
        Self { shared }
    }

    pub fn thread_id(&self, name: &str) -> Option<ThreadId> {
        self.shared.machine().thread_named(name)
    }

    pub fn class_id(&self, name: &str) -> Option<ReferenceTypeId> {
        self.shared.machine().class_named(name)
    }

    /// Event requests currently installed
    pub fn request_count(&self) -> usize {
        self.shared.machine().request_count()
    }

    pub fn suspend_count_of(&self, thread: ThreadId) -> Option<u32> {
        self.shared.machine().thread_suspend_count(thread)
    }

    /// Current value of an instance field, by name
    pub fn field_value(&self, object: ObjectId, field: &str) -> Option<Value> {
        self.shared.machine().field_by_name(object, field)
    }

    pub fn static_value(&self, class: &str, field: &str) -> Option<Value> {
        self.shared.machine().static_by_name(class, field)
    }

    /// Whether the program has run to completion or the VM was shut down
    pub fn is_terminated(&self) -> bool {
        let machine = self.shared.machine();
        machine.is_dead() || machine.is_closed()
    }

    /// Fail requests for `event_kind` the way a VM lacking the capability does
    pub fn reject_event_kind(&self, event_kind: u8) {
        self.shared
            .rejected_kinds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(event_kind);
    }

    /// While set, thread and VM resumes fail without resuming anything
    pub fn set_failing_resumes(&self, failing: bool) {
        self.shared.failing_resumes.store(failing, Ordering::Release);
    }

    fn check_resume(&self) -> JdwpResult<()> {
        if self.shared.failing_resumes.load(Ordering::Acquire) {
            return Err(JdwpError::code(error_codes::INTERNAL));
        }
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&mut Machine) -> JdwpResult<R>) -> JdwpResult<R> {
        let result = {
            let mut machine = self.shared.machine();
            if machine.is_closed() {
                return Err(JdwpError::ConnectionClosed);
            }
            f(&mut machine)
        };
        self.shared.wake.notify_one();
        result
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        let tick = shared.machine().tick();
        match tick {
            Tick::Progress => tokio::task::yield_now().await,
            Tick::Idle => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = shared.shutdown.cancelled() => break,
                }
            }
            Tick::Finished => break,
        }
        if shared.shutdown.is_cancelled() {
            break;
        }
    }
    debug!("mock: scheduler stopped");
}

impl TargetVm for MockVm {
    async fn all_classes(&self) -> JdwpResult<Vec<ClassInfo>> {
        self.with(|m| Ok(m.all_classes()))
    }

    async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        self.with(|m| Ok(m.classes_by_signature(signature)))
    }

    async fn signature(&self, ref_type: ReferenceTypeId) -> JdwpResult<String> {
        self.with(|m| m.signature(ref_type))
    }

    async fn methods(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        self.with(|m| m.methods(ref_type))
    }

    async fn fields(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        self.with(|m| m.fields(ref_type))
    }

    async fn superclass(&self, class: ClassId) -> JdwpResult<Option<ClassId>> {
        self.with(|m| m.superclass(class))
    }

    async fn line_table(&self, ref_type: ReferenceTypeId, method: MethodId) -> JdwpResult<LineTable> {
        self.with(|m| m.line_table(ref_type, method))
    }

    async fn variable_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> JdwpResult<Vec<Variable>> {
        self.with(|m| m.variable_table(ref_type, method))
    }

    async fn set_event_request(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> JdwpResult<i32> {
        let rejected = self
            .shared
            .rejected_kinds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&event_kind);
        if rejected {
            return Err(JdwpError::code(error_codes::NOT_IMPLEMENTED));
        }
        self.with(|m| m.set_event_request(event_kind, suspend_policy, modifiers))
    }

    async fn clear_event_request(&self, event_kind: u8, request_id: i32) -> JdwpResult<()> {
        self.with(|m| {
            m.clear_event_request(event_kind, request_id);
            Ok(())
        })
    }

    async fn recv_event(&self) -> Option<EventSet> {
        self.shared.events.lock().await.recv().await
    }

    async fn all_threads(&self) -> JdwpResult<Vec<ThreadId>> {
        self.with(|m| Ok(m.all_threads()))
    }

    async fn thread_name(&self, thread: ThreadId) -> JdwpResult<String> {
        self.with(|m| m.thread_name(thread))
    }

    async fn thread_status(&self, thread: ThreadId) -> JdwpResult<(ThreadStatus, SuspendStatus)> {
        self.with(|m| m.thread_status(thread))
    }

    async fn suspend_count(&self, thread: ThreadId) -> JdwpResult<i32> {
        self.with(|m| m.suspend_count(thread))
    }

    async fn suspend_thread(&self, thread: ThreadId) -> JdwpResult<()> {
        self.with(|m| m.suspend_thread(thread))
    }

    async fn resume_thread(&self, thread: ThreadId) -> JdwpResult<()> {
        self.check_resume()?;
        self.with(|m| m.resume_thread(thread))
    }

    async fn suspend_all(&self) -> JdwpResult<()> {
        self.with(|m| {
            m.suspend_all();
            Ok(())
        })
    }

    async fn resume_all(&self) -> JdwpResult<()> {
        self.check_resume()?;
        self.with(|m| {
            m.resume_all();
            Ok(())
        })
    }

    async fn frames(&self, thread: ThreadId, start: i32, length: i32) -> JdwpResult<Vec<Frame>> {
        self.with(|m| m.frames(thread, start, length))
    }

    async fn owned_monitors(&self, thread: ThreadId) -> JdwpResult<Vec<OwnedMonitor>> {
        self.with(|m| m.owned_monitors(thread))
    }

    async fn contended_monitor(&self, thread: ThreadId) -> JdwpResult<Option<ObjectId>> {
        self.with(|m| m.contended_monitor(thread))
    }

    async fn monitor_info(&self, object: ObjectId) -> JdwpResult<MonitorInfo> {
        self.with(|m| m.monitor_info(object))
    }

    async fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[VariableSlot],
    ) -> JdwpResult<Vec<Value>> {
        self.with(|m| m.frame_values(thread, frame, slots))
    }

    async fn set_frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        values: &[(i32, Value)],
    ) -> JdwpResult<()> {
        self.with(|m| m.set_frame_values(thread, frame, values))
    }

    async fn this_object(&self, thread: ThreadId, frame: FrameId) -> JdwpResult<Option<ObjectId>> {
        self.with(|m| m.this_object(thread, frame))
    }

    async fn object_reference_type(&self, object: ObjectId) -> JdwpResult<(u8, ReferenceTypeId)> {
        self.with(|m| m.object_reference_type(object))
    }

    async fn object_values(&self, object: ObjectId, fields: &[FieldId]) -> JdwpResult<Vec<Value>> {
        self.with(|m| m.object_values(object, fields))
    }

    async fn set_object_values(&self, object: ObjectId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        self.with(|m| m.set_object_values(object, values))
    }

    async fn static_values(
        &self,
        ref_type: ReferenceTypeId,
        fields: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        self.with(|m| m.static_values(ref_type, fields))
    }

    async fn set_static_values(&self, class: ClassId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        self.with(|m| m.set_static_values(class, values))
    }

    async fn string_value(&self, string: StringId) -> JdwpResult<String> {
        self.with(|m| m.string_value(string))
    }

    async fn create_string(&self, value: &str) -> JdwpResult<StringId> {
        self.with(|m| Ok(m.create_string(value)))
    }

    async fn array_length(&self, array: ArrayId) -> JdwpResult<i32> {
        self.with(|m| m.array_length(array))
    }

    async fn array_values(&self, array: ArrayId, first: i32, length: i32) -> JdwpResult<Vec<Value>> {
        self.with(|m| m.array_values(array, first, length))
    }

    async fn set_array_values(&self, array: ArrayId, first: i32, values: &[Value]) -> JdwpResult<()> {
        self.with(|m| m.set_array_values(array, first, values))
    }

    async fn new_instance(
        &self,
        class: ClassId,
        thread: ThreadId,
        constructor: MethodId,
        _args: &[Value],
    ) -> JdwpResult<ObjectId> {
        self.with(|m| m.new_instance(class, thread, constructor))
    }

    async fn new_array(&self, array_type: ReferenceTypeId, length: i32) -> JdwpResult<ArrayId> {
        self.with(|m| m.new_array(array_type, length))
    }

    async fn dispose(&self) -> JdwpResult<()> {
        self.with(|m| {
            m.dispose();
            Ok(())
        })?;
        self.shared.shutdown.cancel();
        Ok(())
    }

    async fn exit(&self, exit_code: i32) -> JdwpResult<()> {
        self.with(|m| {
            m.exit(exit_code);
            Ok(())
        })?;
        self.shared.shutdown.cancel();
        Ok(())
    }
}

// Debugger session controller
//
// A session owns the target VM handle, one dispatch task consuming its
// events, and the table of outstanding stops. The session state is derived
// from that table: STOPPED while any stop is unresolved, RUNNING otherwise.

use crate::breakpoint::{BreakpointEvent, BreakpointId};
use crate::config::DebuggerConfig;
use crate::deadlock::Deadlock;
use crate::error::{DebuggerError, Result};
use crate::launch;
use crate::registry::{class_name_from_signature, BreakpointRegistry};
use crate::source::{NoSourceContext, SourceContext};
use crate::step::{StepEvent, StepShared, StepState};
use crate::stop::{StopHandle, StopSink};
use crate::target::TargetVm;
use crate::{deadlock, dispatch};
use jdwp_client::method::LineTable;
use jdwp_client::protocol::error_codes;
use jdwp_client::reftype::MethodInfo;
use jdwp_client::types::{
    FieldInfo, FrameId, Location, MethodId, ReferenceTypeId, ThreadId,
};
use jdwp_client::{JdwpConnection, JdwpError, SuspendPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Stopped,
    Running,
    Disconnected,
}

/// Notifications broadcast by a session
#[derive(Debug, Clone)]
pub enum DebuggerEvent {
    StateChanged(SessionState),
    BreakpointHit(BreakpointEvent),
    StepCompleted(StepEvent),
    BreakpointsActiveChanged(bool),
    DeadlockSetChanged(Vec<Deadlock>),
    VmDied,
}

/// A code location with names resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub class_name: String,
    pub method_name: String,
    pub line: Option<i32>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub frame_id: FrameId,
    /// 0 is the innermost frame
    pub depth: usize,
    pub location: SourceLocation,
}

/// What an installed event request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestOwner {
    Breakpoint(BreakpointId),
    /// Class-prepare request that resolves a breakpoint in classes loaded later
    Deferred(BreakpointId),
    Step(ThreadId),
    /// Method-exit request of an operation step, for return values
    StepReturn(ThreadId),
}

/// Requests installed for one breakpoint
#[derive(Debug, Default)]
pub(crate) struct Installation {
    pub(crate) requests: Vec<(u8, i32)>,
    pub(crate) resolved_classes: HashSet<ReferenceTypeId>,
    /// Methods a method breakpoint reports; other methods of the class are ignored
    pub(crate) methods: HashSet<MethodId>,
}

#[derive(Default)]
pub(crate) struct TypeCache {
    names: HashMap<ReferenceTypeId, String>,
    methods: HashMap<ReferenceTypeId, Arc<Vec<MethodInfo>>>,
    fields: HashMap<ReferenceTypeId, Arc<Vec<FieldInfo>>>,
    line_tables: HashMap<(ReferenceTypeId, MethodId), Arc<LineTable>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct SessionInner<T: TargetVm> {
    pub(crate) target: T,
    pub(crate) config: DebuggerConfig,
    pub(crate) registry: BreakpointRegistry,
    pub(crate) source: Mutex<Arc<dyn SourceContext>>,
    state: watch::Sender<SessionState>,
    pub(crate) events: broadcast::Sender<DebuggerEvent>,
    stops: Mutex<Vec<StopHandle>>,
    resume_tx: mpsc::UnboundedSender<StopHandle>,
    pub(crate) requests: Mutex<HashMap<i32, RequestOwner>>,
    pub(crate) installs: Mutex<HashMap<BreakpointId, Installation>>,
    pub(crate) steps: Mutex<HashMap<ThreadId, Arc<StepShared>>>,
    cache: Mutex<TypeCache>,
    breakpoints_active: AtomicBool,
    current_thread: Mutex<Option<ThreadId>>,
    pub(crate) deadlocks: Mutex<Vec<Deadlock>>,
    pub(crate) cancel: CancellationToken,
    process: Mutex<Option<Child>>,
    finished: AtomicBool,
}

impl<T: TargetVm> StopSink for SessionInner<T> {
    fn resume_requested(&self, stop: &StopHandle) {
        if self.resume_tx.send(stop.clone()).is_err() {
            // Dispatch is gone; nothing is left to resume
            stop.mark_resumed();
        }
    }
}

impl<T: TargetVm> SessionInner<T> {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state || *current == SessionState::Disconnected {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!("Session state -> {:?}", state);
            self.events.send(DebuggerEvent::StateChanged(state)).ok();
        }
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            SessionState::Disconnected => Err(DebuggerError::Disconnected),
            _ => Ok(()),
        }
    }

    pub(crate) fn breakpoints_active(&self) -> bool {
        self.breakpoints_active.load(Ordering::Acquire)
    }

    pub(crate) fn current_thread(&self) -> Option<ThreadId> {
        *lock(&self.current_thread)
    }

    pub(crate) fn set_current_thread(&self, thread: Option<ThreadId>) {
        *lock(&self.current_thread) = thread;
    }

    /// Handle for a suspension caused by one event set. Events delivered
    /// without suspending get a detached handle.
    pub(crate) fn new_stop(
        self: &Arc<Self>,
        policy: SuspendPolicy,
        thread: Option<ThreadId>,
    ) -> StopHandle {
        if policy == SuspendPolicy::None {
            return StopHandle::detached(thread);
        }
        let sink: Weak<dyn StopSink> = Arc::downgrade(self) as Weak<dyn StopSink>;
        StopHandle::new(policy, thread, sink)
    }

    /// Make a stop outstanding; the session is STOPPED until it resumes
    pub(crate) fn track_stop(&self, stop: &StopHandle) {
        if !stop.is_suspended() {
            return;
        }
        lock(&self.stops).push(stop.clone());
        if stop.thread().is_some() {
            self.set_current_thread(stop.thread());
        }
        debug!("Stop {} outstanding ({:?}, thread {:?})", stop.id(), stop.policy(), stop.thread());
        self.set_state(SessionState::Stopped);
    }

    pub(crate) fn refresh_state(&self) {
        let stopped = !lock(&self.stops).is_empty();
        self.set_state(if stopped {
            SessionState::Stopped
        } else {
            SessionState::Running
        });
    }

    /// Undo the suspension an event set with `policy` caused
    pub(crate) async fn resume_target(
        &self,
        policy: SuspendPolicy,
        thread: Option<ThreadId>,
    ) -> Result<()> {
        let result = match (policy, thread) {
            (SuspendPolicy::None, _) => Ok(()),
            (SuspendPolicy::EventThread, Some(thread)) => self.target.resume_thread(thread).await,
            _ => self.target.resume_all().await,
        };
        result.map_err(DebuggerError::from)
    }

    /// Resume a stop whose resume right was claimed
    pub(crate) async fn release_stop(&self, stop: &StopHandle) -> Result<()> {
        let result = self.resume_target(stop.policy(), stop.thread()).await;
        stop.mark_resumed();
        lock(&self.stops).retain(|s| s != stop);
        debug!("Stop {} resumed", stop.id());
        self.refresh_state();
        result
    }

    /// Claim and resume every outstanding stop. Every claimed stop is
    /// released even when a resume fails; the first failure is returned.
    pub(crate) async fn resume_all_stops(&self) -> Result<usize> {
        let claimed: Vec<StopHandle> = lock(&self.stops)
            .iter()
            .filter(|s| s.claim())
            .cloned()
            .collect();
        let mut first_error = None;
        for stop in &claimed {
            if let Err(e) = self.release_stop(stop).await {
                warn!("Resuming stop {} failed: {}", stop.id(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(claimed.len()),
        }
    }

    pub(crate) fn mark_disconnected(&self, vm_died: bool) {
        if self.state() == SessionState::Disconnected {
            return;
        }
        for stop in lock(&self.stops).drain(..) {
            stop.mark_resumed();
        }
        for (_, step) in lock(&self.steps).drain() {
            step.set_state(StepState::Cancelled);
        }
        lock(&self.requests).clear();
        lock(&self.installs).clear();
        if vm_died {
            self.events.send(DebuggerEvent::VmDied).ok();
        }
        self.set_state(SessionState::Disconnected);
    }

    pub(crate) fn source_context(&self) -> Arc<dyn SourceContext> {
        lock(&self.source).clone()
    }

    // ---- type caches ----

    pub(crate) async fn class_name(&self, ref_type: ReferenceTypeId) -> Result<String> {
        if let Some(name) = lock(&self.cache).names.get(&ref_type) {
            return Ok(name.clone());
        }
        let name = class_name_from_signature(&self.target.signature(ref_type).await?);
        lock(&self.cache).names.insert(ref_type, name.clone());
        Ok(name)
    }

    pub(crate) async fn methods(&self, ref_type: ReferenceTypeId) -> Result<Arc<Vec<MethodInfo>>> {
        if let Some(methods) = lock(&self.cache).methods.get(&ref_type) {
            return Ok(methods.clone());
        }
        let methods = Arc::new(self.target.methods(ref_type).await?);
        lock(&self.cache).methods.insert(ref_type, methods.clone());
        Ok(methods)
    }

    pub(crate) async fn fields(&self, ref_type: ReferenceTypeId) -> Result<Arc<Vec<FieldInfo>>> {
        if let Some(fields) = lock(&self.cache).fields.get(&ref_type) {
            return Ok(fields.clone());
        }
        let fields = Arc::new(self.target.fields(ref_type).await?);
        lock(&self.cache).fields.insert(ref_type, fields.clone());
        Ok(fields)
    }

    /// Line table of a method; native and abstract methods have an empty one
    pub(crate) async fn line_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> Result<Arc<LineTable>> {
        if let Some(table) = lock(&self.cache).line_tables.get(&(ref_type, method)) {
            return Ok(table.clone());
        }
        let table = match self.target.line_table(ref_type, method).await {
            Ok(table) => table,
            Err(e) if e.error_code() == Some(error_codes::ABSENT_INFORMATION) => LineTable::default(),
            Err(e) => return Err(e.into()),
        };
        let table = Arc::new(table);
        lock(&self.cache)
            .line_tables
            .insert((ref_type, method), table.clone());
        Ok(table)
    }

    /// Field by name, searching superclasses: (declaring type, field)
    pub(crate) async fn find_field(
        &self,
        class: ReferenceTypeId,
        name: &str,
    ) -> Result<Option<(ReferenceTypeId, FieldInfo)>> {
        let mut current = Some(class);
        while let Some(ref_type) = current {
            if let Some(field) = self.fields(ref_type).await?.iter().find(|f| f.name == name) {
                return Ok(Some((ref_type, field.clone())));
            }
            current = match self.target.superclass(ref_type).await {
                Ok(superclass) => superclass,
                // Interfaces and arrays have no superclass to walk
                Err(_) => None,
            };
        }
        Ok(None)
    }

    pub(crate) async fn location_info(&self, location: &Location) -> Result<SourceLocation> {
        let class_name = self.class_name(location.class_id).await?;
        let methods = self.methods(location.class_id).await?;
        let method_name = methods
            .iter()
            .find(|m| m.method_id == location.method_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("<method {:x}>", location.method_id));
        let line = self
            .line_table(location.class_id, location.method_id)
            .await?
            .line_for_index(location.index);
        Ok(SourceLocation {
            class_name,
            method_name,
            line,
            location: *location,
        })
    }

    pub(crate) async fn frames(&self, thread: ThreadId) -> Result<Vec<StackFrame>> {
        let frames = self
            .target
            .frames(thread, 0, -1)
            .await
            .map_err(|e| thread_error(e, thread))?;
        let mut stack = Vec::with_capacity(frames.len());
        for (depth, frame) in frames.into_iter().enumerate() {
            stack.push(StackFrame {
                frame_id: frame.frame_id,
                depth,
                location: self.location_info(&frame.location).await?,
            });
        }
        Ok(stack)
    }
}

/// Map target errors about thread state to engine errors
pub(crate) fn thread_error(err: JdwpError, thread: ThreadId) -> DebuggerError {
    if err.error_code() == Some(error_codes::THREAD_NOT_SUSPENDED) {
        DebuggerError::ThreadNotSuspended(thread)
    } else {
        err.into()
    }
}

/// Handle to a debugging session; clones share the session
pub struct DebuggerSession<T: TargetVm> {
    pub(crate) inner: Arc<SessionInner<T>>,
}

impl<T: TargetVm> Clone for DebuggerSession<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl DebuggerSession<JdwpConnection> {
    /// Launch `main_class` in a new JVM with the JDWP agent and debug it
    pub async fn attach(
        main_class: &str,
        args: &[String],
        registry: BreakpointRegistry,
        config: DebuggerConfig,
    ) -> Result<Self> {
        let launched = launch::launch(&config, main_class, args).await?;
        let connection = match JdwpConnection::connect("127.0.0.1", launched.port).await {
            Ok(connection) => connection,
            Err(e) => {
                let mut child = launched.child;
                child.kill().await.ok();
                return Err(DebuggerError::Attach(format!(
                    "connecting to port {}: {}",
                    launched.port, e
                )));
            }
        };
        if let Err(e) = check_target(&connection).await {
            let mut child = launched.child;
            child.kill().await.ok();
            return Err(e);
        }
        let session = Self::start(connection, registry, config);
        *lock(&session.inner.process) = Some(launched.child);
        Ok(session)
    }

    /// Attach to a VM already listening for a debugger
    pub async fn connect(
        host: &str,
        port: u16,
        registry: BreakpointRegistry,
        config: DebuggerConfig,
    ) -> Result<Self> {
        let connection = JdwpConnection::connect(host, port)
            .await
            .map_err(|e| DebuggerError::Attach(format!("{}:{}: {}", host, port, e)))?;
        check_target(&connection).await?;
        Ok(Self::start(connection, registry, config))
    }
}

/// Ids are read as 8 bytes throughout; refuse targets that use other sizes
async fn check_target(connection: &JdwpConnection) -> Result<()> {
    let sizes = connection.get_id_sizes().await?;
    let widths = [
        sizes.field_id_size,
        sizes.method_id_size,
        sizes.object_id_size,
        sizes.reference_type_id_size,
        sizes.frame_id_size,
    ];
    if widths.iter().any(|w| *w != 8) {
        return Err(DebuggerError::Attach(format!("unsupported JDWP id sizes {:?}", sizes)));
    }
    let version = connection.get_version().await?;
    info!(
        "Target VM: {} {} (JDWP {}.{})",
        version.vm_name, version.vm_version, version.jdwp_major, version.jdwp_minor
    );
    Ok(())
}

impl<T: TargetVm> DebuggerSession<T> {
    /// Start a session over a connected target. The target is expected to
    /// report VMStart; breakpoints in the registry are installed then.
    pub fn start(target: T, registry: BreakpointRegistry, config: DebuggerConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Starting);
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        let (resume_tx, resume_rx) = mpsc::unbounded_channel();
        let changes = registry.subscribe();
        let poll_interval = config.deadlock_poll_interval();

        let inner = Arc::new(SessionInner {
            target,
            config,
            registry,
            source: Mutex::new(Arc::new(NoSourceContext)),
            state,
            events,
            stops: Mutex::new(Vec::new()),
            resume_tx,
            requests: Mutex::new(HashMap::new()),
            installs: Mutex::new(HashMap::new()),
            steps: Mutex::new(HashMap::new()),
            cache: Mutex::new(TypeCache::default()),
            breakpoints_active: AtomicBool::new(true),
            current_thread: Mutex::new(None),
            deadlocks: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            process: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        tokio::spawn(dispatch::run(inner.clone(), resume_rx, changes));
        if let Some(interval) = poll_interval {
            tokio::spawn(deadlock::poll(inner.clone(), interval));
        }
        info!("Debugger session started");
        Self { inner }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.inner.config
    }

    pub fn target(&self) -> &T {
        &self.inner.target
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebuggerEvent> {
        self.inner.events.subscribe()
    }

    pub fn set_source_context(&self, context: Arc<dyn SourceContext>) {
        *lock(&self.inner.source) = context;
    }

    /// Wait until the session reaches `target` or disconnects. Returns the
    /// state reached.
    pub async fn wait_state(&self, target: SessionState) -> Result<SessionState> {
        let mut rx = self.inner.state.subscribe();
        let timeout = self.inner.config.state_timeout();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s == target || *s == SessionState::Disconnected),
        )
        .await;
        match waited {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(DebuggerError::Disconnected),
            Err(_) => Err(DebuggerError::timeout(
                format!("session state {:?}", target),
                timeout,
            )),
        }
    }

    /// Resume every outstanding stop. A no-op when nothing is suspended.
    pub async fn do_continue(&self) -> Result<()> {
        self.inner.ensure_connected()?;
        let resumed = self.inner.resume_all_stops().await?;
        if resumed == 0 {
            debug!("Continue: nothing to resume");
        }
        Ok(())
    }

    /// Pause the whole VM
    pub async fn suspend(&self) -> Result<()> {
        self.inner.ensure_connected()?;
        self.inner.target.suspend_all().await?;
        let stop = self.inner.new_stop(SuspendPolicy::All, self.inner.current_thread());
        self.inner.track_stop(&stop);
        Ok(())
    }

    /// Tear the session down. Idempotent, and safe after the VM is gone.
    pub async fn do_finish(&self) -> Result<()> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.cancel.cancel();
        let child = lock(&self.inner.process).take();
        match child {
            Some(mut child) => {
                if let Err(e) = self.inner.target.exit(1).await {
                    debug!("Exit command failed: {}", e);
                }
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill debuggee: {}", e);
                }
            }
            None => {
                if let Err(e) = self.inner.target.dispose().await {
                    debug!("Dispose failed: {}", e);
                }
            }
        }
        self.inner.mark_disconnected(false);
        info!("Debugger session finished");
        Ok(())
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.inner.current_thread()
    }

    pub fn set_current_thread(&self, thread: ThreadId) {
        self.inner.set_current_thread(Some(thread));
    }

    /// Location of the top frame of the current thread
    pub async fn current_location(&self) -> Result<Option<SourceLocation>> {
        let Some(thread) = self.inner.current_thread() else {
            return Ok(None);
        };
        let frames = self
            .inner
            .target
            .frames(thread, 0, 1)
            .await
            .map_err(|e| thread_error(e, thread))?;
        match frames.first() {
            Some(frame) => Ok(Some(self.inner.location_info(&frame.location).await?)),
            None => Ok(None),
        }
    }

    /// Call stack of a suspended thread, innermost first
    pub async fn frames(&self, thread: ThreadId) -> Result<Vec<StackFrame>> {
        self.inner.frames(thread).await
    }

    pub fn breakpoints_active(&self) -> bool {
        self.inner.breakpoints_active()
    }

    /// While inactive, breakpoint events resume without notifying anyone
    pub fn set_breakpoints_active(&self, active: bool) {
        if self.inner.breakpoints_active.swap(active, Ordering::AcqRel) != active {
            info!("Breakpoints active: {}", active);
            self.inner
                .events
                .send(DebuggerEvent::BreakpointsActiveChanged(active))
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_not_suspended_maps_to_engine_error() {
        let err = thread_error(JdwpError::code(error_codes::THREAD_NOT_SUSPENDED), 0x42);
        assert!(matches!(err, DebuggerError::ThreadNotSuspended(0x42)));
        let err = thread_error(JdwpError::code(error_codes::INVALID_THREAD), 0x42);
        assert!(matches!(err, DebuggerError::Jdwp(_)));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }
}

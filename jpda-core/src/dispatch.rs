// Event dispatch
//
// One task per session consumes composite events from the target, resume
// requests made through stop handles, and registry notifications. All events
// of one set share a single stop.

use crate::breakpoint::{Breakpoint, BreakpointEvent, BreakpointId, BreakpointKind, ConditionResult};
use crate::error::{DebuggerError, Result};
use crate::registry::{class_name_from_signature, RegistryEvent};
use crate::session::{lock, DebuggerEvent, RequestOwner, SessionInner, SessionState, SourceLocation};
use crate::step::StepShared;
use crate::stop::StopHandle;
use crate::target::TargetVm;
use jdwp_client::types::{Location, ThreadId, TypeTag, Value};
use jdwp_client::{Event, EventKind, EventSet, SuspendPolicy};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// A breakpoint event that passed every filter
struct Hit {
    breakpoint: Breakpoint,
    thread: Option<ThreadId>,
    class_name: Option<String>,
    location: Option<Location>,
    line: Option<i32>,
    condition_result: ConditionResult,
    variable: Option<Value>,
}

pub(crate) async fn run<T: TargetVm>(
    inner: Arc<SessionInner<T>>,
    mut resume_rx: mpsc::UnboundedReceiver<StopHandle>,
    mut changes: broadcast::Receiver<RegistryEvent>,
) {
    let mut registry_open = true;
    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => break,

            Some(stop) = resume_rx.recv() => {
                if let Err(e) = inner.release_stop(&stop).await {
                    if !inner.resume_failed(e) {
                        break;
                    }
                }
            }

            change = changes.recv(), if registry_open => match change {
                Ok(change) => inner.apply_registry_change(change).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Missed {} registry notifications, reinstalling breakpoints", missed);
                    inner.reinstall_all().await;
                }
                Err(broadcast::error::RecvError::Closed) => registry_open = false,
            },

            set = inner.target.recv_event() => match set {
                Some(set) => {
                    if !inner.handle_event_set(set).await {
                        break;
                    }
                }
                None => {
                    info!("Target event stream closed");
                    inner.mark_disconnected(false);
                    break;
                }
            },
        }
    }
    debug!("Dispatch task stopped");
}

impl<T: TargetVm> SessionInner<T> {
    /// Log a failed resume; false when the target is gone
    fn resume_failed(&self, err: DebuggerError) -> bool {
        if err.is_disconnect() {
            info!("Target gone while resuming");
            self.mark_disconnected(false);
            return false;
        }
        warn!("Resume failed: {}", err);
        true
    }

    /// Handle one composite event. Returns false once the VM is gone.
    async fn handle_event_set(self: &Arc<Self>, set: EventSet) -> bool {
        let policy = SuspendPolicy::from_u8(set.suspend_policy).unwrap_or_default();
        let thread = set.events.iter().find_map(Event::thread);
        debug!(
            "Event set: {} event(s), policy {:?}, thread {:?}",
            set.events.len(),
            policy,
            thread
        );

        if set.events.iter().any(|e| matches!(e.details, EventKind::VMDeath)) {
            info!("Target VM died");
            self.mark_disconnected(true);
            return false;
        }
        if set
            .events
            .iter()
            .any(|e| matches!(e.details, EventKind::VMStart { .. }))
        {
            return self.vm_started(policy, thread).await;
        }

        let mut hits = Vec::new();
        let mut steps: Vec<(Arc<StepShared>, ThreadId, Location)> = Vec::new();
        for event in &set.events {
            let owner = lock(&self.requests).get(&event.request_id).copied();
            match owner {
                Some(RequestOwner::Breakpoint(id)) => {
                    if let Some(hit) = self.breakpoint_hit(id, event).await {
                        hits.push(hit);
                    }
                }
                Some(RequestOwner::Deferred(id)) => {
                    if let EventKind::ClassPrepare {
                        ref_type,
                        signature,
                        ..
                    } = &event.details
                    {
                        self.resolve_deferred(id, *ref_type, signature).await;
                    }
                }
                Some(RequestOwner::Step(stepping)) => {
                    if let Some(location) = event.details.location() {
                        if let Some(step) = self.take_step(stepping).await {
                            steps.push((step, stepping, location));
                        }
                    }
                }
                Some(RequestOwner::StepReturn(stepping)) => {
                    self.record_return(stepping, &event.details).await;
                }
                None => debug!(
                    "Event kind {} for unknown request {}",
                    event.kind, event.request_id
                ),
            }
        }

        // A breakpoint on a stepping thread ends the step at that stop
        for hit in &hits {
            if let (Some(hit_thread), Some(location)) = (hit.thread, hit.location) {
                if steps.iter().any(|(_, t, _)| *t == hit_thread) {
                    continue;
                }
                if let Some(step) = self.take_step(hit_thread).await {
                    steps.push((step, hit_thread, location));
                }
            }
        }

        if hits.is_empty() && steps.is_empty() {
            return match self.resume_target(policy, thread).await {
                Ok(()) => true,
                Err(e) => self.resume_failed(e),
            };
        }

        let suspend = !steps.is_empty() || hits.iter().any(|hit| self.hit_suspends(&hit.breakpoint));
        let stop = if suspend {
            self.new_stop(policy, thread)
        } else {
            StopHandle::detached(thread)
        };
        self.track_stop(&stop);

        for (step, stepping, location) in steps {
            let location = self.describe(&location).await;
            let event = self.step_event(&step, stepping, &location);
            info!(
                "Step completed on thread {:x} at {}.{}:{:?}",
                stepping, location.class_name, location.method_name, location.line
            );
            step.complete(event.clone());
            self.events.send(DebuggerEvent::StepCompleted(event)).ok();
        }

        for hit in hits {
            let event = BreakpointEvent {
                breakpoint: hit.breakpoint,
                thread: hit.thread,
                class_name: hit.class_name,
                location: hit.location,
                line: hit.line,
                condition_result: hit.condition_result,
                variable: hit.variable,
                stop: stop.clone(),
            };
            info!(
                "Breakpoint {} hit in {:?} line {:?}",
                event.breakpoint.id(),
                event.class_name,
                event.line
            );
            for listener in event.breakpoint.listeners() {
                listener(&event);
            }
            self.events.send(DebuggerEvent::BreakpointHit(event)).ok();
        }

        if !suspend {
            if let Err(e) = self.resume_target(policy, thread).await {
                return self.resume_failed(e);
            }
        }
        true
    }

    async fn vm_started(self: &Arc<Self>, policy: SuspendPolicy, thread: Option<ThreadId>) -> bool {
        info!("Target VM started");
        if thread.is_some() {
            self.set_current_thread(thread);
        }
        self.install_all().await;
        if let Err(e) = self.resume_target(policy, thread).await {
            return self.resume_failed(e);
        }
        self.set_state(SessionState::Running);
        true
    }

    fn hit_suspends(&self, breakpoint: &Breakpoint) -> bool {
        breakpoint
            .suspend_policy()
            .unwrap_or(self.config.suspend_policy)
            != SuspendPolicy::None
    }

    /// Apply enablement, condition and hit-count filters to one event
    async fn breakpoint_hit(self: &Arc<Self>, id: BreakpointId, event: &Event) -> Option<Hit> {
        let Some(breakpoint) = self.registry.get(id) else {
            debug!("Event for removed breakpoint {}", id);
            return None;
        };
        if !breakpoint.is_enabled() || !self.breakpoints_active() {
            debug!("Breakpoint {} inactive, resuming", id);
            return None;
        }

        let location = event.details.location();
        if let (BreakpointKind::Method { .. }, Some(location)) = (breakpoint.kind(), location) {
            let reported = lock(&self.installs)
                .get(&id)
                .map_or(false, |install| install.methods.contains(&location.method_id));
            if !reported {
                return None;
            }
        }

        let thread = event.thread();
        let (class_name, line) = match (&event.details, location) {
            (_, Some(location)) => {
                let info = self.describe(&location).await;
                (Some(info.class_name), info.line)
            }
            (
                EventKind::ClassPrepare { signature, .. } | EventKind::ClassUnload { signature },
                None,
            ) => (Some(class_name_from_signature(signature)), None),
            _ => (None, None),
        };

        let condition_result = match breakpoint.condition() {
            None => ConditionResult::NoCondition,
            Some(condition) => match self.check_condition(thread, &condition).await {
                Ok(true) => ConditionResult::Satisfied,
                Ok(false) => {
                    debug!("Condition of breakpoint {} is false", id);
                    return None;
                }
                Err(e) => {
                    warn!("Condition {:?} of breakpoint {} failed: {}", condition, id, e);
                    ConditionResult::Failed(Arc::new(e))
                }
            },
        };

        if !breakpoint.register_hit() {
            debug!("Breakpoint {} filtered by hit count", id);
            return None;
        }

        let variable = self.event_variable(&event.details).await;
        Some(Hit {
            breakpoint,
            thread,
            class_name,
            location,
            line,
            condition_result,
            variable,
        })
    }

    async fn check_condition(&self, thread: Option<ThreadId>, condition: &str) -> Result<bool> {
        let Some(thread) = thread else {
            return Err(DebuggerError::invalid_expression(
                "event has no thread to evaluate in",
            ));
        };
        self.evaluate_condition(thread, condition).await
    }

    async fn event_variable(&self, details: &EventKind) -> Option<Value> {
        match details {
            EventKind::FieldModification { value_to_be, .. } => Some(value_to_be.clone()),
            EventKind::FieldAccess {
                ref_type,
                field_id,
                object,
                ..
            } => {
                let values = if *object == 0 {
                    self.target.static_values(*ref_type, &[*field_id]).await
                } else {
                    self.target.object_values(*object, &[*field_id]).await
                };
                match values {
                    Ok(mut values) => values.pop(),
                    Err(e) => {
                        debug!("Reading accessed field failed: {}", e);
                        None
                    }
                }
            }
            EventKind::Exception { exception, .. } => {
                Some(Value::object(TypeTag::Object as u8, *exception))
            }
            EventKind::MethodExitWithReturnValue { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// Remember what the method just exited returned, for operation steps
    async fn record_return(&self, thread: ThreadId, details: &EventKind) {
        let EventKind::MethodExitWithReturnValue { location, value, .. } = details else {
            return;
        };
        let Some(step) = lock(&self.steps).get(&thread).cloned() else {
            return;
        };
        let method = self.describe(location).await.method_name;
        let value = (value.tag != TypeTag::Void as u8).then(|| value.clone());
        *lock(&step.last_return) = Some((method, value));
    }

    /// Names for a location, falling back to ids when lookups fail
    async fn describe(&self, location: &Location) -> SourceLocation {
        match self.location_info(location).await {
            Ok(info) => info,
            Err(e) => {
                debug!("Location lookup failed: {}", e);
                SourceLocation {
                    class_name: format!("<class {:x}>", location.class_id),
                    method_name: format!("<method {:x}>", location.method_id),
                    line: None,
                    location: *location,
                }
            }
        }
    }
}

// Stepping
//
// A step arms SINGLE_STEP for one suspended thread and resumes the session.
// Completion arrives on the dispatch task, which fills in the step event
// and flips the step state.

use crate::error::{DebuggerError, Result};
use crate::session::{lock, DebuggerSession, RequestOwner, SessionInner, SourceLocation};
use crate::target::TargetVm;
use jdwp_client::commands::{event_kinds, step_depths, step_sizes};
use jdwp_client::types::{ThreadId, Value};
use jdwp_client::{EventModifier, SuspendPolicy};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepSize {
    Line,
    /// Stops at every bytecode operation; reports calls and return values
    Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDepth {
    Into,
    Over,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Idle,
    Pending,
    Completed,
    /// The session went away before the step finished
    Cancelled,
}

impl StepSize {
    fn jdwp(self) -> i32 {
        match self {
            StepSize::Line => step_sizes::LINE,
            StepSize::Operation => step_sizes::MIN,
        }
    }
}

impl StepDepth {
    fn jdwp(self) -> i32 {
        match self {
            StepDepth::Into => step_depths::INTO,
            StepDepth::Over => step_depths::OVER,
            StepDepth::Out => step_depths::OUT,
        }
    }
}

/// The operation an OPERATION step stopped at. OPERATION steps stop at every
/// bytecode index, not only at call expressions. Right after a call returns,
/// `method_name` is the callee and `return_value` holds its result. At any
/// other stop, `method_name` is the method the thread is executing and
/// `return_value` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    /// Method just returned from, or the method the thread is in
    pub method_name: String,
    /// 1-based source column of the call, when a source context knows it
    pub column: Option<u32>,
    pub bytecode_index: u64,
    pub return_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent {
    pub thread: ThreadId,
    pub location: SourceLocation,
    pub operation: Option<Operation>,
}

/// Step state shared with the dispatch task
pub(crate) struct StepShared {
    pub(crate) size: StepSize,
    pub(crate) depth: StepDepth,
    state: watch::Sender<StepState>,
    last_event: Mutex<Option<StepEvent>>,
    pub(crate) requests: Mutex<Vec<(u8, i32)>>,
    /// Most recent method exit seen while stepping; void methods carry no value
    pub(crate) last_return: Mutex<Option<(String, Option<Value>)>>,
}

impl StepShared {
    fn new(size: StepSize, depth: StepDepth) -> Self {
        let (state, _) = watch::channel(StepState::Idle);
        Self {
            size,
            depth,
            state,
            last_event: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            last_return: Mutex::new(None),
        }
    }

    pub(crate) fn set_state(&self, state: StepState) {
        self.state.send_replace(state);
    }

    pub(crate) fn complete(&self, event: StepEvent) {
        *lock(&self.last_event) = Some(event);
        self.set_state(StepState::Completed);
    }
}

/// A reusable step request
pub struct Step<T: TargetVm> {
    inner: Arc<SessionInner<T>>,
    shared: Arc<StepShared>,
}

impl<T: TargetVm> DebuggerSession<T> {
    pub fn create_step(&self, size: StepSize, depth: StepDepth) -> Step<T> {
        Step {
            inner: self.inner.clone(),
            shared: Arc::new(StepShared::new(size, depth)),
        }
    }
}

impl<T: TargetVm> Step<T> {
    pub fn size(&self) -> StepSize {
        self.shared.size
    }

    pub fn depth(&self) -> StepDepth {
        self.shared.depth
    }

    pub fn state(&self) -> StepState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StepState> {
        self.shared.state.subscribe()
    }

    /// Where the last completed step stopped
    pub fn last_event(&self) -> Option<StepEvent> {
        lock(&self.shared.last_event).clone()
    }

    /// Arm the step for a suspended thread and resume the session
    pub async fn add_step(&self, thread: ThreadId) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_connected()?;
        let suspended = inner
            .target
            .suspend_count(thread)
            .await
            .map_err(|e| crate::session::thread_error(e, thread))?;
        if suspended == 0 {
            return Err(DebuggerError::ThreadNotSuspended(thread));
        }

        // JDWP allows one step request per thread
        inner.cancel_step(thread).await;

        let filters: Vec<EventModifier> = inner
            .config
            .step_filters
            .iter()
            .map(|pattern| EventModifier::ClassExclude(pattern.clone()))
            .collect();
        let policy = match inner.config.suspend_policy {
            SuspendPolicy::None => SuspendPolicy::EventThread,
            policy => policy,
        };

        let mut modifiers = vec![EventModifier::Step {
            thread,
            size: self.shared.size.jdwp(),
            depth: self.shared.depth.jdwp(),
        }];
        modifiers.extend(filters.iter().cloned());
        let step_id = inner
            .target
            .set_event_request(event_kinds::SINGLE_STEP, policy, &modifiers)
            .await
            .map_err(|e| crate::session::thread_error(e, thread))?;
        lock(&inner.requests).insert(step_id, RequestOwner::Step(thread));
        let mut requests = vec![(event_kinds::SINGLE_STEP, step_id)];

        if self.shared.size == StepSize::Operation {
            let mut modifiers = vec![EventModifier::ThreadOnly(thread)];
            modifiers.extend(filters);
            let exit_id = match inner
                .target
                .set_event_request(
                    event_kinds::METHOD_EXIT_WITH_RETURN_VALUE,
                    SuspendPolicy::EventThread,
                    &modifiers,
                )
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    // Leave no step request behind for this thread
                    lock(&inner.requests).remove(&step_id);
                    if let Err(clear) = inner
                        .target
                        .clear_event_request(event_kinds::SINGLE_STEP, step_id)
                        .await
                    {
                        debug!("Clearing step request {} failed: {}", step_id, clear);
                    }
                    return Err(e.into());
                }
            };
            lock(&inner.requests).insert(exit_id, RequestOwner::StepReturn(thread));
            requests.push((event_kinds::METHOD_EXIT_WITH_RETURN_VALUE, exit_id));
        }

        *lock(&self.shared.requests) = requests;
        *lock(&self.shared.last_return) = None;
        self.shared.set_state(StepState::Pending);
        lock(&inner.steps).insert(thread, self.shared.clone());
        info!(
            "Step {:?}/{:?} armed on thread {:x}",
            self.shared.size, self.shared.depth, thread
        );

        inner.resume_all_stops().await?;
        Ok(())
    }

    /// Wait for the armed step to finish
    pub async fn wait_done(&self, timeout: Duration) -> Result<StepEvent> {
        let mut rx = self.shared.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, StepState::Completed | StepState::Cancelled | StepState::Idle)),
        )
        .await;
        let state = match waited {
            Ok(Ok(state)) => *state,
            Ok(Err(_)) => return Err(DebuggerError::Disconnected),
            Err(_) => return Err(DebuggerError::timeout("step completion", timeout)),
        };
        match state {
            StepState::Completed => self
                .last_event()
                .ok_or_else(|| DebuggerError::InvalidState("step completed without an event".into())),
            StepState::Cancelled => Err(DebuggerError::Disconnected),
            _ => Err(DebuggerError::InvalidState("step is not armed".into())),
        }
    }
}

impl<T: TargetVm> SessionInner<T> {
    /// Take the pending step of a thread and clear its requests
    pub(crate) async fn take_step(&self, thread: ThreadId) -> Option<Arc<StepShared>> {
        let step = lock(&self.steps).remove(&thread)?;
        let requests = std::mem::take(&mut *lock(&step.requests));
        for (kind, id) in requests {
            lock(&self.requests).remove(&id);
            if let Err(e) = self.target.clear_event_request(kind, id).await {
                debug!("Clearing step request {} failed: {}", id, e);
            }
        }
        Some(step)
    }

    pub(crate) async fn cancel_step(&self, thread: ThreadId) {
        if let Some(step) = self.take_step(thread).await {
            debug!("Replacing pending step on thread {:x}", thread);
            step.set_state(StepState::Idle);
        }
    }

    /// Build the event for a step that stopped at `location`
    pub(crate) fn step_event(
        &self,
        step: &StepShared,
        thread: ThreadId,
        location: &SourceLocation,
    ) -> StepEvent {
        let operation = match step.size {
            StepSize::Line => None,
            StepSize::Operation => {
                let (method_name, return_value) = match lock(&step.last_return).take() {
                    Some((name, value)) => (name, value),
                    None => (location.method_name.clone(), None),
                };
                let column = location.line.and_then(|line| {
                    self.source_context()
                        .operation_column(&location.class_name, line, &method_name)
                });
                Some(Operation {
                    method_name,
                    column,
                    bytecode_index: location.location.index,
                    return_value,
                })
            }
        };
        StepEvent {
            thread,
            location: location.clone(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jdwp_constants() {
        assert_eq!(StepSize::Line.jdwp(), 1);
        assert_eq!(StepSize::Operation.jdwp(), 0);
        assert_eq!(StepDepth::Into.jdwp(), 0);
        assert_eq!(StepDepth::Over.jdwp(), 1);
        assert_eq!(StepDepth::Out.jdwp(), 2);
    }

    #[test]
    fn test_completion_records_event() {
        let shared = StepShared::new(StepSize::Line, StepDepth::Over);
        let mut rx = shared.state.subscribe();
        let event = StepEvent {
            thread: 1,
            location: SourceLocation {
                class_name: "Main".into(),
                method_name: "main".into(),
                line: Some(4),
                location: jdwp_client::types::Location {
                    type_tag: 1,
                    class_id: 2,
                    method_id: 3,
                    index: 0,
                },
            },
            operation: None,
        };
        shared.complete(event.clone());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), StepState::Completed);
        assert_eq!(lock(&shared.last_event).as_ref(), Some(&event));
    }
}

// Stop handles
//
// One handle per suspension caused by one event set. The handle is resumed at
// most once, either by a listener or by the session controller.

use crate::error::{DebuggerError, Result};
use jdwp_client::types::ThreadId;
use jdwp_client::SuspendPolicy;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

pub type StopId = u64;

const SUSPENDED: u8 = 0;
const RESUME_REQUESTED: u8 = 1;
const RESUMED: u8 = 2;
// Events delivered with SuspendPolicy::None hold no suspension
const DETACHED: u8 = 3;

static NEXT_STOP_ID: AtomicU64 = AtomicU64::new(1);

/// Receives resume requests made through a handle
pub(crate) trait StopSink: Send + Sync {
    fn resume_requested(&self, stop: &StopHandle);
}

#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

struct StopInner {
    id: StopId,
    policy: SuspendPolicy,
    thread: Option<ThreadId>,
    state: AtomicU8,
    sink: Option<Weak<dyn StopSink>>,
}

impl StopHandle {
    pub(crate) fn new(
        policy: SuspendPolicy,
        thread: Option<ThreadId>,
        sink: Weak<dyn StopSink>,
    ) -> Self {
        let state = if policy == SuspendPolicy::None {
            DETACHED
        } else {
            SUSPENDED
        };
        Self {
            inner: Arc::new(StopInner {
                id: NEXT_STOP_ID.fetch_add(1, Ordering::Relaxed),
                policy,
                thread,
                state: AtomicU8::new(state),
                sink: Some(sink),
            }),
        }
    }

    /// A handle for an event that suspended nothing
    pub(crate) fn detached(thread: Option<ThreadId>) -> Self {
        Self {
            inner: Arc::new(StopInner {
                id: NEXT_STOP_ID.fetch_add(1, Ordering::Relaxed),
                policy: SuspendPolicy::None,
                thread,
                state: AtomicU8::new(DETACHED),
                sink: None,
            }),
        }
    }

    pub fn id(&self) -> StopId {
        self.inner.id
    }

    pub fn policy(&self) -> SuspendPolicy {
        self.inner.policy
    }

    pub fn thread(&self) -> Option<ThreadId> {
        self.inner.thread
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == SUSPENDED
    }

    /// Whether this suspension holds the given thread
    pub fn covers(&self, thread: ThreadId) -> bool {
        match self.inner.policy {
            SuspendPolicy::All => true,
            SuspendPolicy::EventThread => self.inner.thread == Some(thread),
            SuspendPolicy::None => false,
        }
    }

    /// Resume the suspension. A second call fails with `AlreadyResumed`.
    /// Handles of non-suspending events accept the call and do nothing.
    pub fn resume(&self) -> Result<()> {
        if self.inner.state.load(Ordering::Acquire) == DETACHED {
            return Ok(());
        }
        if !self.claim() {
            return Err(DebuggerError::AlreadyResumed);
        }
        match self.inner.sink.as_ref().and_then(Weak::upgrade) {
            Some(sink) => sink.resume_requested(self),
            None => self.mark_resumed(),
        }
        Ok(())
    }

    /// Take the right to resume; only one caller ever wins
    pub(crate) fn claim(&self) -> bool {
        self.inner
            .state
            .compare_exchange(SUSPENDED, RESUME_REQUESTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_resumed(&self) {
        self.inner.state.store(RESUMED, Ordering::Release);
    }
}

impl PartialEq for StopHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("id", &self.inner.id)
            .field("policy", &self.inner.policy)
            .field("thread", &self.inner.thread)
            .field("state", &self.inner.state.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StopId>>);

    impl StopSink for Recorder {
        fn resume_requested(&self, stop: &StopHandle) {
            self.0.lock().unwrap().push(stop.id());
        }
    }

    #[test]
    fn test_second_resume_is_rejected() {
        let sink: Arc<Recorder> = Arc::new(Recorder::default());
        let weak: Weak<dyn StopSink> = Arc::downgrade(&(sink.clone() as Arc<dyn StopSink>));
        let stop = StopHandle::new(SuspendPolicy::All, Some(1), weak);

        assert!(stop.is_suspended());
        stop.resume().unwrap();
        assert!(matches!(stop.resume(), Err(DebuggerError::AlreadyResumed)));
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_detached_resume_and_single_claim() {
        let stop = StopHandle::detached(None);
        assert!(stop.resume().is_ok());
        assert!(stop.resume().is_ok());

        let sink: Arc<dyn StopSink> = Arc::new(Recorder::default());
        let stop = StopHandle::new(SuspendPolicy::EventThread, Some(7), Arc::downgrade(&sink));
        assert!(stop.covers(7));
        assert!(!stop.covers(8));
        assert!(stop.claim());
        assert!(!stop.claim());
        assert!(matches!(stop.resume(), Err(DebuggerError::AlreadyResumed)));
    }
}

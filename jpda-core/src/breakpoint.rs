// Breakpoints and the events they deliver

use crate::error::{DebuggerError, Result};
use crate::registry::RegistryEvent;
use crate::stop::StopHandle;
use jdwp_client::types::{Location, ThreadId, Value};
use jdwp_client::SuspendPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

pub type BreakpointId = u64;

static NEXT_BREAKPOINT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodBreakpointType {
    Entry,
    Exit,
    EntryAndExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldBreakpointType {
    Access,
    Modification,
    AccessAndModification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassBreakpointType {
    Prepare,
    Unload,
    PrepareAndUnload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadBreakpointType {
    Start,
    Death,
    StartAndDeath,
}

/// What a breakpoint watches. Class names may use `*` at the start or end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakpointKind {
    Line {
        class: String,
        line: i32,
    },
    Method {
        class: String,
        method: String,
        kind: MethodBreakpointType,
    },
    Field {
        class: String,
        field: String,
        kind: FieldBreakpointType,
    },
    /// `class` of "*" matches every exception
    Exception {
        class: String,
        caught: bool,
        uncaught: bool,
    },
    Class {
        class: String,
        kind: ClassBreakpointType,
    },
    Thread {
        kind: ThreadBreakpointType,
    },
}

impl BreakpointKind {
    /// Class-name patterns before any class filter runs
    pub fn default_class_patterns(&self) -> Vec<String> {
        match self {
            BreakpointKind::Line { class, .. }
            | BreakpointKind::Method { class, .. }
            | BreakpointKind::Field { class, .. }
            | BreakpointKind::Exception { class, .. }
            | BreakpointKind::Class { class, .. } => vec![class.clone()],
            BreakpointKind::Thread { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitCountFilter {
    EqualTo(u32),
    GreaterThan(u32),
    MultipleOf(u32),
}

impl HitCountFilter {
    pub fn accepts(&self, hit_count: u32) -> bool {
        match *self {
            HitCountFilter::EqualTo(n) => hit_count == n,
            HitCountFilter::GreaterThan(n) => hit_count > n,
            HitCountFilter::MultipleOf(0) => false,
            HitCountFilter::MultipleOf(n) => hit_count % n == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Validity {
    /// Not yet resolved against a loaded class
    Unknown,
    Valid,
    Invalid(String),
}

/// Outcome of a breakpoint condition
#[derive(Debug, Clone)]
pub enum ConditionResult {
    NoCondition,
    Satisfied,
    /// The condition could not be evaluated; the breakpoint still hits
    Failed(Arc<DebuggerError>),
}

impl ConditionResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, ConditionResult::Failed(_))
    }
}

/// Immutable notification of one breakpoint hit
#[derive(Debug, Clone)]
pub struct BreakpointEvent {
    pub breakpoint: Breakpoint,
    pub thread: Option<ThreadId>,
    /// Dotted name of the class the event happened in
    pub class_name: Option<String>,
    pub location: Option<Location>,
    pub line: Option<i32>,
    pub condition_result: ConditionResult,
    /// Field value to be written, field value read, thrown exception or
    /// method return value, depending on the breakpoint kind
    pub variable: Option<Value>,
    pub(crate) stop: StopHandle,
}

impl BreakpointEvent {
    /// Resume the suspension this event caused. Exactly one resume is allowed.
    pub fn resume(&self) -> Result<()> {
        self.stop.resume()
    }

    pub fn stop(&self) -> &StopHandle {
        &self.stop
    }
}

pub type BreakpointListener = Arc<dyn Fn(&BreakpointEvent) + Send + Sync>;

#[derive(Debug, Clone)]
struct Settings {
    enabled: bool,
    condition: Option<String>,
    group: Option<String>,
    suspend_policy: Option<SuspendPolicy>,
    hit_count_filter: Option<HitCountFilter>,
    hit_count: u32,
    validity: Validity,
}

struct BreakpointInner {
    id: BreakpointId,
    kind: BreakpointKind,
    settings: Mutex<Settings>,
    listeners: Mutex<Vec<BreakpointListener>>,
    registry: Mutex<Option<broadcast::Sender<RegistryEvent>>>,
}

/// Shared breakpoint handle; clones refer to the same breakpoint
#[derive(Clone)]
pub struct Breakpoint {
    inner: Arc<BreakpointInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Breakpoint {
    pub fn new(kind: BreakpointKind) -> Self {
        Self {
            inner: Arc::new(BreakpointInner {
                id: NEXT_BREAKPOINT_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                settings: Mutex::new(Settings {
                    enabled: true,
                    condition: None,
                    group: None,
                    suspend_policy: None,
                    hit_count_filter: None,
                    hit_count: 0,
                    validity: Validity::Unknown,
                }),
                listeners: Mutex::new(Vec::new()),
                registry: Mutex::new(None),
            }),
        }
    }

    pub fn line(class: impl Into<String>, line: i32) -> Self {
        Self::new(BreakpointKind::Line {
            class: class.into(),
            line,
        })
    }

    pub fn method(class: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(BreakpointKind::Method {
            class: class.into(),
            method: method.into(),
            kind: MethodBreakpointType::Entry,
        })
    }

    pub fn field(
        class: impl Into<String>,
        field: impl Into<String>,
        kind: FieldBreakpointType,
    ) -> Self {
        Self::new(BreakpointKind::Field {
            class: class.into(),
            field: field.into(),
            kind,
        })
    }

    pub fn exception(class: impl Into<String>, caught: bool, uncaught: bool) -> Self {
        Self::new(BreakpointKind::Exception {
            class: class.into(),
            caught,
            uncaught,
        })
    }

    pub fn class(class: impl Into<String>, kind: ClassBreakpointType) -> Self {
        Self::new(BreakpointKind::Class {
            class: class.into(),
            kind,
        })
    }

    pub fn thread(kind: ThreadBreakpointType) -> Self {
        Self::new(BreakpointKind::Thread { kind })
    }

    pub fn with_condition(self, condition: impl Into<String>) -> Self {
        lock(&self.inner.settings).condition = Some(condition.into());
        self
    }

    pub fn with_group(self, group: impl Into<String>) -> Self {
        lock(&self.inner.settings).group = Some(group.into());
        self
    }

    pub fn with_suspend_policy(self, policy: SuspendPolicy) -> Self {
        lock(&self.inner.settings).suspend_policy = Some(policy);
        self
    }

    pub fn with_hit_count_filter(self, filter: HitCountFilter) -> Self {
        lock(&self.inner.settings).hit_count_filter = Some(filter);
        self
    }

    pub fn id(&self) -> BreakpointId {
        self.inner.id
    }

    pub fn kind(&self) -> &BreakpointKind {
        &self.inner.kind
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.inner.settings).enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        let changed = {
            let mut settings = lock(&self.inner.settings);
            std::mem::replace(&mut settings.enabled, enabled) != enabled
        };
        if changed {
            self.notify_changed();
        }
    }

    pub fn condition(&self) -> Option<String> {
        lock(&self.inner.settings).condition.clone()
    }

    pub fn set_condition(&self, condition: Option<String>) {
        lock(&self.inner.settings).condition = condition.filter(|c| !c.trim().is_empty());
        self.notify_changed();
    }

    pub fn group(&self) -> Option<String> {
        lock(&self.inner.settings).group.clone()
    }

    /// Explicit policy, or `None` to use the session default
    pub fn suspend_policy(&self) -> Option<SuspendPolicy> {
        lock(&self.inner.settings).suspend_policy
    }

    pub fn hit_count_filter(&self) -> Option<HitCountFilter> {
        lock(&self.inner.settings).hit_count_filter
    }

    pub fn set_hit_count_filter(&self, filter: Option<HitCountFilter>) {
        let mut settings = lock(&self.inner.settings);
        settings.hit_count_filter = filter;
        settings.hit_count = 0;
    }

    pub fn hit_count(&self) -> u32 {
        lock(&self.inner.settings).hit_count
    }

    pub fn validity(&self) -> Validity {
        lock(&self.inner.settings).validity.clone()
    }

    pub(crate) fn set_validity(&self, validity: Validity) {
        lock(&self.inner.settings).validity = validity;
    }

    /// Count a hit and report whether the hit-count filter lets it through
    pub(crate) fn register_hit(&self) -> bool {
        let mut settings = lock(&self.inner.settings);
        settings.hit_count = settings.hit_count.saturating_add(1);
        match settings.hit_count_filter {
            Some(filter) => filter.accepts(settings.hit_count),
            None => true,
        }
    }

    /// Listeners run on the dispatch task in registration order
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&BreakpointEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.listeners).push(Arc::new(listener));
    }

    pub(crate) fn listeners(&self) -> Vec<BreakpointListener> {
        lock(&self.inner.listeners).clone()
    }

    pub(crate) fn attach(&self, changes: broadcast::Sender<RegistryEvent>) {
        *lock(&self.inner.registry) = Some(changes);
    }

    pub(crate) fn detach(&self) {
        *lock(&self.inner.registry) = None;
    }

    fn notify_changed(&self) {
        if let Some(changes) = lock(&self.inner.registry).as_ref() {
            changes.send(RegistryEvent::Changed(self.clone())).ok();
        }
    }
}

impl PartialEq for Breakpoint {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Breakpoint {}

impl fmt::Debug for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = lock(&self.inner.settings);
        f.debug_struct("Breakpoint")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &settings.enabled)
            .field("condition", &settings.condition)
            .field("validity", &settings.validity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_does_not_clash_with_kind_fields() {
        let kind = BreakpointKind::Method {
            class: "com.example.Main".to_string(),
            method: "run".to_string(),
            kind: MethodBreakpointType::EntryAndExit,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "method");
        assert_eq!(json["kind"], "entry_and_exit");
        let back: BreakpointKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);

        let thread: BreakpointKind =
            serde_json::from_str(r#"{"type":"thread","kind":"start"}"#).unwrap();
        assert_eq!(
            thread,
            BreakpointKind::Thread {
                kind: ThreadBreakpointType::Start
            }
        );
    }

    #[test]
    fn test_hit_count_filters() {
        assert!(HitCountFilter::EqualTo(3).accepts(3));
        assert!(!HitCountFilter::EqualTo(3).accepts(4));
        assert!(HitCountFilter::GreaterThan(2).accepts(3));
        assert!(!HitCountFilter::GreaterThan(2).accepts(2));
        assert!(HitCountFilter::MultipleOf(2).accepts(4));
        assert!(!HitCountFilter::MultipleOf(2).accepts(5));
        assert!(!HitCountFilter::MultipleOf(0).accepts(0));
    }

    #[test]
    fn test_register_hit_applies_filter() {
        let bp = Breakpoint::line("com.example.Main", 10)
            .with_hit_count_filter(HitCountFilter::MultipleOf(2));
        assert!(!bp.register_hit());
        assert!(bp.register_hit());
        assert!(!bp.register_hit());
        assert_eq!(bp.hit_count(), 3);
    }

    #[test]
    fn test_clones_share_identity() {
        let bp = Breakpoint::line("com.example.Main", 10);
        let other = bp.clone();
        other.set_enabled(false);
        assert!(!bp.is_enabled());
        assert_eq!(bp, other);
        assert_ne!(bp, Breakpoint::line("com.example.Main", 10));
        assert_eq!(bp.validity(), Validity::Unknown);
    }

    #[test]
    fn test_changes_reach_attached_registry() {
        let (tx, mut rx) = broadcast::channel(4);
        let bp = Breakpoint::line("com.example.Main", 10);
        bp.attach(tx);
        bp.set_condition(Some("x > 1".to_string()));
        assert!(matches!(rx.try_recv(), Ok(RegistryEvent::Changed(b)) if b == bp));

        bp.detach();
        bp.set_enabled(false);
        assert!(rx.try_recv().is_err());
    }
}

// Breakpoint registry and class filtering
//
// The registry is a plain context object handed to sessions. Sessions
// subscribe to its change stream to install and uninstall requests.

use crate::breakpoint::{Breakpoint, BreakpointId};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Added(Breakpoint),
    Removed(Breakpoint),
    Changed(Breakpoint),
}

/// Class-name patterns a breakpoint applies to, plus exclusions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
    pub names: Vec<String>,
    pub excluded: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            excluded: Vec::new(),
        }
    }

    /// Whether a dotted class name is selected by these patterns
    pub fn matches(&self, class_name: &str) -> bool {
        self.names.iter().any(|p| pattern_matches(p, class_name))
            && !self.excluded.iter().any(|p| pattern_matches(p, class_name))
    }
}

/// Adjusts the class names a breakpoint resolves against, e.g. to map a
/// breakpoint group onto the classes of a module.
pub trait BreakpointsClassFilter: Send + Sync {
    fn filter_class_names(&self, names: ClassNames, breakpoint: &Breakpoint) -> ClassNames;
}

impl<F> BreakpointsClassFilter for F
where
    F: Fn(ClassNames, &Breakpoint) -> ClassNames + Send + Sync,
{
    fn filter_class_names(&self, names: ClassNames, breakpoint: &Breakpoint) -> ClassNames {
        self(names, breakpoint)
    }
}

struct RegistryInner {
    breakpoints: Mutex<Vec<Breakpoint>>,
    filters: Mutex<Vec<Arc<dyn BreakpointsClassFilter>>>,
    changes: broadcast::Sender<RegistryEvent>,
}

#[derive(Clone)]
pub struct BreakpointRegistry {
    inner: Arc<RegistryInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RegistryInner {
                breakpoints: Mutex::new(Vec::new()),
                filters: Mutex::new(Vec::new()),
                changes,
            }),
        }
    }

    /// Add a breakpoint; adding the same breakpoint twice is a no-op
    pub fn add(&self, breakpoint: &Breakpoint) {
        {
            let mut breakpoints = lock(&self.inner.breakpoints);
            if breakpoints.contains(breakpoint) {
                return;
            }
            breakpoints.push(breakpoint.clone());
        }
        debug!("Breakpoint {} added: {:?}", breakpoint.id(), breakpoint.kind());
        breakpoint.attach(self.inner.changes.clone());
        self.inner
            .changes
            .send(RegistryEvent::Added(breakpoint.clone()))
            .ok();
    }

    pub fn remove(&self, breakpoint: &Breakpoint) -> bool {
        let removed = {
            let mut breakpoints = lock(&self.inner.breakpoints);
            let before = breakpoints.len();
            breakpoints.retain(|b| b != breakpoint);
            breakpoints.len() != before
        };
        if removed {
            debug!("Breakpoint {} removed", breakpoint.id());
            breakpoint.detach();
            self.inner
                .changes
                .send(RegistryEvent::Removed(breakpoint.clone()))
                .ok();
        }
        removed
    }

    pub fn remove_all(&self) {
        let removed = std::mem::take(&mut *lock(&self.inner.breakpoints));
        for breakpoint in removed {
            breakpoint.detach();
            self.inner
                .changes
                .send(RegistryEvent::Removed(breakpoint))
                .ok();
        }
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.inner.breakpoints).clone()
    }

    pub fn get(&self, id: BreakpointId) -> Option<Breakpoint> {
        lock(&self.inner.breakpoints)
            .iter()
            .find(|b| b.id() == id)
            .cloned()
    }

    pub fn contains(&self, breakpoint: &Breakpoint) -> bool {
        lock(&self.inner.breakpoints).contains(breakpoint)
    }

    /// Filters run in registration order, each one seeing the previous output
    pub fn add_class_filter(&self, filter: Arc<dyn BreakpointsClassFilter>) {
        lock(&self.inner.filters).push(filter);
    }

    pub fn class_names(&self, breakpoint: &Breakpoint) -> ClassNames {
        let filters = lock(&self.inner.filters).clone();
        let defaults = ClassNames::new(breakpoint.kind().default_class_patterns());
        filters
            .iter()
            .fold(defaults, |names, filter| filter.filter_class_names(names, breakpoint))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.inner.changes.subscribe()
    }
}

/// Match a dotted class name against a pattern with an optional `*` at the
/// start or end. `*` alone matches everything.
pub fn pattern_matches(pattern: &str, class_name: &str) -> bool {
    if pattern == "*" || pattern.is_empty() {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return class_name.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return class_name.ends_with(suffix);
    }
    pattern == class_name
}

/// "com.example.Main" -> "Lcom/example/Main;"
pub fn class_signature(class_name: &str) -> String {
    format!("L{};", class_name.replace('.', "/"))
}

/// "Lcom/example/Main;" -> "com.example.Main"; array signatures stay as they are
pub fn class_name_from_signature(signature: &str) -> String {
    signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .map(|s| s.replace('/', "."))
        .unwrap_or_else(|| signature.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointKind;

    #[test]
    fn test_patterns() {
        assert!(pattern_matches("com.example.*", "com.example.Main"));
        assert!(pattern_matches("*.Main", "com.example.Main"));
        assert!(pattern_matches("*", "anything"));
        assert!(pattern_matches("com.example.Main", "com.example.Main"));
        assert!(!pattern_matches("com.example.Main", "com.example.Main$Inner"));
        assert!(!pattern_matches("org.*", "com.example.Main"));
    }

    #[test]
    fn test_signatures() {
        assert_eq!(class_signature("com.example.Main"), "Lcom/example/Main;");
        assert_eq!(class_name_from_signature("Lcom/example/Main;"), "com.example.Main");
        assert_eq!(class_name_from_signature("[I"), "[I");
    }

    #[test]
    fn test_filters_chain_in_order() {
        let registry = BreakpointRegistry::new();
        registry.add_class_filter(Arc::new(|mut names: ClassNames, _: &Breakpoint| {
            names.names.push("com.example.Other".to_string());
            names
        }));
        registry.add_class_filter(Arc::new(|mut names: ClassNames, bp: &Breakpoint| {
            if bp.group().as_deref() == Some("tests") {
                names.excluded.push("com.example.Other".to_string());
            }
            names
        }));

        let plain = Breakpoint::line("com.example.Main", 5);
        let names = registry.class_names(&plain);
        assert_eq!(names.names, vec!["com.example.Main", "com.example.Other"]);
        assert!(names.matches("com.example.Other"));

        let grouped = Breakpoint::line("com.example.Main", 5).with_group("tests");
        let names = registry.class_names(&grouped);
        assert!(!names.matches("com.example.Other"));
        assert!(names.matches("com.example.Main"));
    }

    #[test]
    fn test_add_remove_notifications() {
        let registry = BreakpointRegistry::new();
        let mut changes = registry.subscribe();
        let bp = Breakpoint::new(BreakpointKind::Line {
            class: "com.example.Main".to_string(),
            line: 3,
        });

        registry.add(&bp);
        registry.add(&bp);
        assert_eq!(registry.breakpoints().len(), 1);
        assert!(matches!(changes.try_recv(), Ok(RegistryEvent::Added(_))));

        bp.set_enabled(false);
        assert!(matches!(changes.try_recv(), Ok(RegistryEvent::Changed(_))));

        assert!(registry.remove(&bp));
        assert!(!registry.remove(&bp));
        assert!(matches!(changes.try_recv(), Ok(RegistryEvent::Removed(_))));
        assert!(changes.try_recv().is_err());
    }
}

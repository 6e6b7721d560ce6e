// Debug session management
//
// One breakpoint registry outlives the sessions, so breakpoints set before
// launch or attach are installed when the VM starts.

use jdwp_client::JdwpConnection;
use jpda_core::{BreakpointRegistry, DebuggerConfig, DebuggerEvent, DebuggerSession};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type SessionId = String;
pub type Session = DebuggerSession<JdwpConnection>;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

pub struct SessionManager {
    registry: BreakpointRegistry,
    config: DebuggerConfig,
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    current_session: Arc<Mutex<Option<SessionId>>>,
}

impl SessionManager {
    pub fn new(config: DebuggerConfig) -> Self {
        Self {
            registry: BreakpointRegistry::new(),
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            current_session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    /// Register a started session and make it current
    pub async fn add_session(&self, session: Session) -> SessionId {
        let session_id = format!("session_{}", NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
        tokio::spawn(log_events(session_id.clone(), session.subscribe()));

        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), session);
        *self.current_session.lock().await = Some(session_id.clone());
        session_id
    }

    pub async fn get_current_session(&self) -> Option<Session> {
        let current = self.current_session.lock().await.clone()?;
        self.sessions.lock().await.get(&current).cloned()
    }

    pub async fn get_current_session_id(&self) -> Option<SessionId> {
        self.current_session.lock().await.clone()
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Session> {
        let removed = self.sessions.lock().await.remove(session_id);

        let mut current = self.current_session.lock().await;
        if current.as_deref() == Some(session_id) {
            *current = None;
        }
        removed
    }
}

async fn log_events(
    session_id: SessionId,
    mut events: tokio::sync::broadcast::Receiver<DebuggerEvent>,
) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match events.recv().await {
            Ok(DebuggerEvent::BreakpointHit(hit)) => info!(
                "{}: breakpoint {} hit at {}:{}",
                session_id,
                hit.breakpoint.id(),
                hit.class_name.as_deref().unwrap_or("?"),
                hit.line.unwrap_or(-1)
            ),
            Ok(DebuggerEvent::DeadlockSetChanged(set)) if !set.is_empty() => {
                info!("{}: {} deadlock(s) detected", session_id, set.len())
            }
            Ok(DebuggerEvent::VmDied) => {
                info!("{}: target VM died", session_id);
                break;
            }
            Ok(event) => debug!("{}: {:?}", session_id, event),
            Err(RecvError::Lagged(n)) => debug!("{}: skipped {} events", session_id, n),
            Err(RecvError::Closed) => break,
        }
    }
}

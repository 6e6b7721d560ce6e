// Deadlock detection
//
// Builds the wait-for graph (thread -> contended monitor -> owner) with the
// VM suspended and reports every cycle.

use crate::error::{DebuggerError, Result};
use crate::session::{lock, DebuggerEvent, DebuggerSession, SessionInner, SessionState};
use crate::target::TargetVm;
use jdwp_client::protocol::error_codes;
use jdwp_client::types::{ObjectId, ThreadId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Threads in one wait cycle and the monitors they wait on, both sorted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Deadlock {
    pub threads: Vec<ThreadId>,
    pub monitors: Vec<ObjectId>,
}

/// `thread` waits for `monitor`, which `owner` holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEdge {
    pub thread: ThreadId,
    pub monitor: ObjectId,
    pub owner: ThreadId,
}

/// Every cycle in a wait-for graph. A thread waits on at most one monitor,
/// so each thread has at most one outgoing edge.
pub fn find_deadlocks(edges: &[WaitEdge]) -> Vec<Deadlock> {
    let waits: HashMap<ThreadId, &WaitEdge> = edges.iter().map(|e| (e.thread, e)).collect();
    // 0 unvisited, 1 on the current path, 2 done
    let mut state: HashMap<ThreadId, u8> = HashMap::new();
    let mut deadlocks = Vec::new();

    let mut starts: Vec<ThreadId> = waits.keys().copied().collect();
    starts.sort_unstable();
    for start in starts {
        let mut path = Vec::new();
        let mut current = start;
        loop {
            match state.get(&current).copied().unwrap_or(0) {
                2 => break,
                1 => {
                    // `current` closes a cycle on this path
                    if let Some(pos) = path.iter().position(|t| *t == current) {
                        let mut threads: Vec<ThreadId> = path[pos..].to_vec();
                        let mut monitors: Vec<ObjectId> =
                            threads.iter().map(|t| waits[t].monitor).collect();
                        threads.sort_unstable();
                        monitors.sort_unstable();
                        monitors.dedup();
                        deadlocks.push(Deadlock { threads, monitors });
                    }
                    break;
                }
                _ => {}
            }
            state.insert(current, 1);
            path.push(current);
            match waits.get(&current) {
                Some(edge) => current = edge.owner,
                None => break,
            }
        }
        for thread in path {
            state.insert(thread, 2);
        }
    }
    deadlocks.sort();
    deadlocks
}

impl<T: TargetVm> SessionInner<T> {
    async fn wait_edges(&self) -> Result<Vec<WaitEdge>> {
        let mut edges = Vec::new();
        for thread in self.target.all_threads().await? {
            match self.contended_monitor_and_owner(thread).await {
                Ok(Some(contended)) => {
                    if let Some(owner) = contended.owner {
                        edges.push(WaitEdge {
                            thread,
                            monitor: contended.monitor,
                            owner,
                        });
                    }
                }
                Ok(None) => {}
                // Threads that died or started since the snapshot
                Err(DebuggerError::ThreadNotSuspended(_)) => {}
                Err(DebuggerError::Jdwp(e)) if e.error_code() == Some(error_codes::INVALID_THREAD) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(edges)
    }

    /// Snapshot the wait-for graph with the VM suspended
    pub(crate) async fn detect_deadlocks(&self) -> Result<Vec<Deadlock>> {
        self.target.suspend_all().await?;
        let edges = self.wait_edges().await;
        let resumed = self.target.resume_all().await;
        let edges = edges?;
        resumed?;
        Ok(find_deadlocks(&edges))
    }

    /// Detect and announce a changed deadlock set
    pub(crate) async fn refresh_deadlocks(&self) -> Result<Vec<Deadlock>> {
        let found = self.detect_deadlocks().await?;
        let changed = {
            let mut current = lock(&self.deadlocks);
            if *current == found {
                false
            } else {
                *current = found.clone();
                true
            }
        };
        if changed {
            info!("Deadlock set changed: {} deadlock(s)", found.len());
            self.events
                .send(DebuggerEvent::DeadlockSetChanged(found.clone()))
                .ok();
        }
        Ok(found)
    }
}

pub(crate) async fn poll<T: TargetVm>(inner: Arc<SessionInner<T>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match inner.state() {
            SessionState::Starting => continue,
            SessionState::Disconnected => break,
            _ => {}
        }
        if let Err(e) = inner.refresh_deadlocks().await {
            if e.is_disconnect() {
                break;
            }
            warn!("Deadlock poll failed: {}", e);
        }
    }
    debug!("Deadlock poller stopped");
}

impl<T: TargetVm> DebuggerSession<T> {
    /// Detect deadlocks now; fires `DeadlockSetChanged` when the set changed
    pub async fn detect_deadlocks(&self) -> Result<Vec<Deadlock>> {
        self.inner.ensure_connected()?;
        self.inner.refresh_deadlocks().await
    }

    /// Deadlocks found by the last detection
    pub fn deadlocks(&self) -> Vec<Deadlock> {
        lock(&self.inner.deadlocks).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(thread: ThreadId, monitor: ObjectId, owner: ThreadId) -> WaitEdge {
        WaitEdge {
            thread,
            monitor,
            owner,
        }
    }

    #[test]
    fn test_two_thread_cycle() {
        let found = find_deadlocks(&[edge(2, 0xb, 1), edge(1, 0xa, 2)]);
        assert_eq!(
            found,
            vec![Deadlock {
                threads: vec![1, 2],
                monitors: vec![0xa, 0xb],
            }]
        );
    }

    #[test]
    fn test_waiter_outside_cycle_is_not_reported() {
        // 3 waits on the cycle between 1 and 2 but is not part of it
        let found = find_deadlocks(&[edge(1, 0xa, 2), edge(2, 0xb, 1), edge(3, 0xa, 2)]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].threads, vec![1, 2]);
    }

    #[test]
    fn test_chain_without_cycle() {
        assert!(find_deadlocks(&[edge(1, 0xa, 2), edge(2, 0xb, 3)]).is_empty());
    }

    #[test]
    fn test_independent_cycles() {
        let found = find_deadlocks(&[
            edge(1, 0xa, 2),
            edge(2, 0xb, 1),
            edge(5, 0xc, 6),
            edge(6, 0xd, 7),
            edge(7, 0xe, 5),
        ]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].threads, vec![5, 6, 7]);
        assert_eq!(found[1].monitors, vec![0xc, 0xd, 0xe]);
    }
}

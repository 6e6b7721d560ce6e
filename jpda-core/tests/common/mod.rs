// Shared helpers for scenario tests against the in-memory VM

#![allow(dead_code)]

use jpda_core::mock::{MockProgram, MockVm};
use jpda_core::{
    BreakpointEvent, BreakpointRegistry, DebuggerConfig, DebuggerEvent, DebuggerSession,
};
use std::time::Duration;
use tokio::sync::broadcast;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jpda_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Short timeouts and no background deadlock polling
pub fn config() -> DebuggerConfig {
    DebuggerConfig {
        state_timeout_ms: 5_000,
        step_timeout_ms: 5_000,
        deadlock_poll_ms: 0,
        ..DebuggerConfig::default()
    }
}

pub struct Harness {
    pub vm: MockVm,
    pub session: DebuggerSession<MockVm>,
    pub events: broadcast::Receiver<DebuggerEvent>,
}

pub fn start(program: &MockProgram, registry: BreakpointRegistry) -> Harness {
    start_with(program, registry, config())
}

pub fn start_with(
    program: &MockProgram,
    registry: BreakpointRegistry,
    config: DebuggerConfig,
) -> Harness {
    init_tracing();
    let vm = MockVm::start(program);
    let session = DebuggerSession::start(vm.clone(), registry, config);
    let events = session.subscribe();
    Harness {
        vm,
        session,
        events,
    }
}

impl Harness {
    /// Next breakpoint hit; panics if the VM dies first
    pub async fn next_hit(&mut self) -> BreakpointEvent {
        let events = &mut self.events;
        tokio::time::timeout(TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(DebuggerEvent::BreakpointHit(event)) => return event,
                    Ok(DebuggerEvent::VmDied) => panic!("VM died before a breakpoint hit"),
                    Ok(_) => continue,
                    Err(e) => panic!("event stream failed: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for a breakpoint hit")
    }

    /// Breakpoint hits until the VM dies, resuming each one
    pub async fn hits_until_death(&mut self) -> Vec<BreakpointEvent> {
        let events = &mut self.events;
        tokio::time::timeout(TIMEOUT, async {
            let mut hits = Vec::new();
            loop {
                match events.recv().await {
                    Ok(DebuggerEvent::BreakpointHit(event)) => {
                        event.resume().expect("resume hit");
                        hits.push(event);
                    }
                    Ok(DebuggerEvent::VmDied) => return hits,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream failed: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for the VM to die")
    }
}

mod common;

use common::{config, start, start_with, TIMEOUT};
use jdwp_client::types::ThreadStatus;
use jpda_core::mock::{MockClass, MockMethod, MockProgram, Op, OBJECT_CLASS};
use jpda_core::{Breakpoint, BreakpointRegistry, DebuggerConfig, DebuggerEvent, SessionState};

const LOCKS: &str = "com.example.Locks";

/// Two threads taking the same two monitors in opposite order
fn deadlocking_program() -> (MockProgram, u64, u64) {
    let mut program = MockProgram::new();
    let a = program.object(OBJECT_CLASS);
    let b = program.object(OBJECT_CLASS);
    program.class(
        MockClass::new(LOCKS)
            .method(
                MockMethod::static_method("left")
                    .line(10, Op::MonitorEnter(a))
                    .line(11, Op::Nop)
                    .line(12, Op::Nop)
                    .line(13, Op::MonitorEnter(b))
                    .line(14, Op::MonitorExit(b))
                    .line(15, Op::MonitorExit(a)),
            )
            .method(
                MockMethod::static_method("right")
                    .line(20, Op::MonitorEnter(b))
                    .line(21, Op::Nop)
                    .line(22, Op::Nop)
                    .line(23, Op::MonitorEnter(a))
                    .line(24, Op::MonitorExit(a))
                    .line(25, Op::MonitorExit(b)),
            ),
    );
    program.thread("left", LOCKS, "left");
    program.thread("right", LOCKS, "right");
    (program, a, b)
}

#[tokio::test]
async fn test_deadlock_reported_within_five_seconds() {
    let (program, a, b) = deadlocking_program();
    let config = DebuggerConfig {
        deadlock_poll_ms: 200,
        ..config()
    };
    let mut h = start_with(&program, BreakpointRegistry::new(), config);
    let left = h.vm.thread_id("left").unwrap();
    let right = h.vm.thread_id("right").unwrap();

    let events = &mut h.events;
    let deadlocks = tokio::time::timeout(TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(DebuggerEvent::DeadlockSetChanged(set)) if !set.is_empty() => return set,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("no deadlock reported within 5s");

    assert_eq!(deadlocks.len(), 1);
    let mut threads = vec![left, right];
    threads.sort_unstable();
    assert_eq!(deadlocks[0].threads, threads);
    let mut monitors = vec![a, b];
    monitors.sort_unstable();
    assert_eq!(deadlocks[0].monitors, monitors);
    assert_eq!(h.session.deadlocks(), deadlocks);

    // Polling leaves the suspend counts balanced
    assert_eq!(h.vm.suspend_count_of(left), Some(0));
    assert_eq!(h.vm.suspend_count_of(right), Some(0));
}

#[tokio::test]
async fn test_monitor_inspection_of_blocked_threads() {
    let (program, a, b) = deadlocking_program();
    let h = start(&program, BreakpointRegistry::new());
    h.session.wait_state(SessionState::Running).await.unwrap();
    let left = h.vm.thread_id("left").unwrap();
    let right = h.vm.thread_id("right").unwrap();

    // Detect on demand until both threads are blocked
    let found = tokio::time::timeout(TIMEOUT, async {
        loop {
            let found = h.session.detect_deadlocks().await.unwrap();
            if !found.is_empty() {
                return found;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("threads never deadlocked");
    assert_eq!(found.len(), 1);

    h.session.suspend().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Stopped);

    let contended = h.session.contended_monitor_and_owner(left).await.unwrap().unwrap();
    assert_eq!(contended.monitor, b);
    assert_eq!(contended.owner, Some(right));

    let owned = h.session.owned_monitors_and_frames(left).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].monitor, a);
    assert_eq!(owned[0].stack_depth, 0);
    let frame = owned[0].frame.as_ref().unwrap();
    assert_eq!(frame.location.method_name, "left");

    let threads = h.session.all_threads().await.unwrap();
    let names: Vec<&str> = threads.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["left", "right"]);
    assert!(threads.iter().all(|t| t.suspended));
    assert!(threads.iter().all(|t| t.status == ThreadStatus::Monitor));

    h.session.do_continue().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Running);
    assert_eq!(h.vm.suspend_count_of(left), Some(0));
}

#[tokio::test]
async fn test_running_thread_cannot_be_inspected() {
    let (program, _, _) = deadlocking_program();
    let h = start(&program, BreakpointRegistry::new());
    h.session.wait_state(SessionState::Running).await.unwrap();
    let left = h.vm.thread_id("left").unwrap();

    let err = h.session.contended_monitor_and_owner(left).await.unwrap_err();
    assert!(matches!(err, jpda_core::DebuggerError::ThreadNotSuspended(id) if id == left));
}

#[tokio::test]
async fn test_thread_breakpoint_reports_start() {
    let (program, _, _) = deadlocking_program();
    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::thread(
        jpda_core::breakpoint::ThreadBreakpointType::Start,
    ));
    let mut h = start(&program, registry);
    let right = h.vm.thread_id("right").unwrap();

    let hit = h.next_hit().await;
    assert_eq!(hit.thread, Some(right));
    hit.resume().unwrap();
}

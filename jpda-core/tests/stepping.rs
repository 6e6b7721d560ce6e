mod common;

use common::{start, Harness, TIMEOUT};
use jdwp_client::commands::event_kinds;
use jdwp_client::types::{ThreadId, Value};
use jpda_core::mock::{MockClass, MockMethod, MockProgram, Op};
use jpda_core::source::SourceContext;
use jpda_core::{
    Breakpoint, BreakpointRegistry, DebuggerError, SessionState, StepDepth, StepEvent, StepSize,
    StepState,
};
use std::sync::Arc;

const MAIN: &str = "com.example.Main";

fn program() -> MockProgram {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(MAIN)
            .method(
                MockMethod::static_method("main")
                    .line(10, Op::Nop)
                    .line(11, Op::call(MAIN, "helper"))
                    .line(12, Op::Nop)
                    .line(13, Op::Nop)
                    .line(14, Op::Nop)
                    .line(15, Op::Nop)
                    .line(16, Op::Nop),
            )
            .method(
                MockMethod::static_method("helper")
                    .signature("()I")
                    .line(20, Op::Nop)
                    .line(21, Op::Nop)
                    .line(22, Op::Return(Some(Value::int(42)))),
            ),
    );
    program.thread("main", MAIN, "main");
    program
}

/// Start and stop at a line breakpoint; returns the stopped thread
async fn stopped_at(line: i32) -> (Harness, ThreadId) {
    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::line(MAIN, line));
    let mut h = start(&program(), registry);
    let hit = h.next_hit().await;
    (h, hit.thread.unwrap())
}

async fn step(h: &Harness, thread: ThreadId, size: StepSize, depth: StepDepth) -> StepEvent {
    let step = h.session.create_step(size, depth);
    step.add_step(thread).await.unwrap();
    let event = step.wait_done(TIMEOUT).await.unwrap();
    assert_eq!(step.state(), StepState::Completed);
    assert_eq!(h.session.state(), SessionState::Stopped);
    event
}

#[tokio::test]
async fn test_step_over_stays_in_frame() {
    let (h, thread) = stopped_at(11).await;

    let event = step(&h, thread, StepSize::Line, StepDepth::Over).await;
    assert_eq!(event.location.method_name, "main");
    assert_eq!(event.location.line, Some(12));
    assert_eq!(h.session.frames(thread).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_step_into_descends_one_level() {
    let (h, thread) = stopped_at(11).await;

    let event = step(&h, thread, StepSize::Line, StepDepth::Into).await;
    assert_eq!(event.location.method_name, "helper");
    assert_eq!(event.location.line, Some(20));
    assert_eq!(h.session.frames(thread).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_step_out_returns_to_caller_line() {
    let (h, thread) = stopped_at(11).await;
    step(&h, thread, StepSize::Line, StepDepth::Into).await;

    let event = step(&h, thread, StepSize::Line, StepDepth::Out).await;
    assert_eq!(event.location.method_name, "main");
    assert_eq!(event.location.line, Some(11));
    assert_eq!(h.session.frames(thread).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_five_steps_over_advance_one_line_each() {
    let (h, thread) = stopped_at(10).await;
    let start = h.session.current_location().await.unwrap().unwrap();
    assert_eq!(start.class_name, MAIN);
    assert_eq!(start.line, Some(10));

    let step_over = h.session.create_step(StepSize::Line, StepDepth::Over);
    let mut line = 10;
    for _ in 0..5 {
        step_over.add_step(thread).await.unwrap();
        let event = step_over.wait_done(TIMEOUT).await.unwrap();
        assert_eq!(event.location.line, Some(line + 1));
        line += 1;
    }
    assert_eq!(line, 15);
}

#[tokio::test]
async fn test_operation_step_reports_return_value() {
    let (h, thread) = stopped_at(11).await;

    let event = step(&h, thread, StepSize::Operation, StepDepth::Over).await;
    assert_eq!(event.location.line, Some(11));
    let operation = event.operation.expect("operation step carries an operation");
    assert_eq!(operation.method_name, "helper");
    assert_eq!(operation.return_value, Some(Value::int(42)));
}

/// `int v = helper();` on line 11 of Main.java
struct MainSource;

impl SourceContext for MainSource {
    fn operation_column(&self, class_name: &str, line: i32, method_name: &str) -> Option<u32> {
        (class_name == MAIN && line == 11 && method_name == "helper").then_some(17)
    }
}

#[tokio::test]
async fn test_operation_step_column_comes_from_source_context() {
    let (h, thread) = stopped_at(11).await;
    h.session.set_source_context(Arc::new(MainSource));

    let event = step(&h, thread, StepSize::Operation, StepDepth::Over).await;
    let operation = event.operation.expect("operation step carries an operation");
    assert_eq!(operation.column, Some(17));
}

#[tokio::test]
async fn test_step_requires_suspended_thread() {
    let (h, thread) = stopped_at(10).await;
    h.session.do_continue().await.unwrap();
    h.session.wait_state(SessionState::Disconnected).await.unwrap();

    let step = h.session.create_step(StepSize::Line, StepDepth::Over);
    let err = step.add_step(thread).await.unwrap_err();
    assert!(
        matches!(err, DebuggerError::Disconnected | DebuggerError::ThreadNotSuspended(_)),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_operation_step_away_from_calls_reports_current_method() {
    let (h, thread) = stopped_at(12).await;

    let event = step(&h, thread, StepSize::Operation, StepDepth::Over).await;
    assert_eq!(event.location.method_name, "main");
    let operation = event.operation.expect("operation step carries an operation");
    assert_eq!(operation.method_name, "main");
    assert_eq!(operation.return_value, None);
}

#[tokio::test]
async fn test_rejected_return_value_request_leaves_no_step_behind() {
    let (h, thread) = stopped_at(11).await;
    let installed = h.vm.request_count();
    h.vm.reject_event_kind(event_kinds::METHOD_EXIT_WITH_RETURN_VALUE);

    let operation = h.session.create_step(StepSize::Operation, StepDepth::Over);
    let err = operation.add_step(thread).await.unwrap_err();
    assert!(matches!(err, DebuggerError::Jdwp(_)), "{:?}", err);
    assert_eq!(h.vm.request_count(), installed);
    assert_eq!(h.session.state(), SessionState::Stopped);

    // The thread can still be stepped by line
    let event = step(&h, thread, StepSize::Line, StepDepth::Over).await;
    assert_eq!(event.location.line, Some(12));
}

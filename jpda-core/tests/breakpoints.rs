mod common;

use common::{start, TIMEOUT};
use jdwp_client::types::Value;
use jpda_core::breakpoint::{ClassBreakpointType, FieldBreakpointType};
use jpda_core::mock::{MockClass, MockMethod, MockProgram, Op, RUNTIME_EXCEPTION_CLASS};
use jpda_core::registry::ClassNames;
use jpda_core::{
    Breakpoint, BreakpointRegistry, ConditionResult, DebuggerError, HitCountFilter, SessionState,
    Validity,
};
use std::sync::Arc;

const MAIN: &str = "com.example.Main";

/// `main` calls `work` three times; `work` bumps a static counter
fn counting_program() -> MockProgram {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(MAIN)
            .static_field("count", "I", Value::int(0))
            .method(
                MockMethod::static_method("main")
                    .line(3, Op::call(MAIN, "work"))
                    .line(4, Op::call(MAIN, "work"))
                    .line(5, Op::call(MAIN, "work"))
                    .line(6, Op::Nop),
            )
            .method(
                MockMethod::static_method("work")
                    .line(20, Op::Nop)
                    .line(21, Op::put_field("count", Value::int(1)))
                    .line(22, Op::Return(None)),
            ),
    );
    program.thread("main", MAIN, "main");
    program
}

#[tokio::test]
async fn test_line_breakpoint_stops_at_class_and_line() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20);
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    let hit = h.next_hit().await;
    assert_eq!(h.session.wait_state(SessionState::Stopped).await.unwrap(), SessionState::Stopped);
    assert_eq!(hit.class_name.as_deref(), Some(MAIN));
    assert_eq!(hit.line, Some(20));
    assert!(matches!(hit.condition_result, ConditionResult::NoCondition));
    assert_eq!(breakpoint.validity(), Validity::Valid);
    assert_eq!(breakpoint.hit_count(), 1);

    let thread = hit.thread.unwrap();
    let frames = h.session.frames(thread).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].location.class_name, MAIN);
    assert_eq!(frames[0].location.method_name, "work");
    assert_eq!(frames[0].location.line, Some(20));
    assert_eq!(frames[1].location.line, Some(3));

    h.session.do_finish().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_removed_breakpoint_never_retriggers() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20);
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry.clone());

    let first = h.next_hit().await;
    assert!(registry.remove(&breakpoint));
    h.session.do_continue().await.unwrap();

    let later = h.hits_until_death().await;
    assert!(later.is_empty(), "removed breakpoint hit again: {:?}", later);
    assert_eq!(breakpoint.hit_count(), 1);
    assert!(!first.stop().is_suspended());
    assert_eq!(h.session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_field_modification_fires_once_per_write() {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(MAIN)
            .static_field("count", "I", Value::int(0))
            .method(
                MockMethod::static_method("main")
                    .line(5, Op::put_field("count", Value::int(1)))
                    .line(6, Op::Nop)
                    .line(7, Op::put_field("count", Value::int(2)))
                    .line(8, Op::get_field("count")),
            ),
    );
    program.thread("main", MAIN, "main");

    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::field(MAIN, "count", FieldBreakpointType::Modification);
    registry.add(&breakpoint);
    let mut h = start(&program, registry);

    let hits = h.hits_until_death().await;
    let written: Vec<Value> = hits.iter().filter_map(|hit| hit.variable.clone()).collect();
    assert_eq!(written, vec![Value::int(1), Value::int(2)]);
    assert_eq!(hits[0].line, Some(5));
    assert_eq!(hits[1].line, Some(7));
    assert_eq!(h.vm.static_value(MAIN, "count"), Some(Value::int(2)));
}

#[tokio::test]
async fn test_failed_condition_still_hits() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20).with_condition("noSuchVariable > 0");
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    let hits = h.hits_until_death().await;
    assert_eq!(hits.len(), 3);
    match &hits[0].condition_result {
        ConditionResult::Failed(cause) => {
            assert!(matches!(**cause, DebuggerError::InvalidExpression(_)))
        }
        other => panic!("expected a failed condition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_condition_filters_hits() {
    let registry = BreakpointRegistry::new();
    // `count` is 0 before the first write and 1 afterwards
    let breakpoint = Breakpoint::line(MAIN, 20).with_condition("count == 1 && true");
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    let hits = h.hits_until_death().await;
    assert_eq!(hits.len(), 2);
    assert!(hits
        .iter()
        .all(|hit| matches!(hit.condition_result, ConditionResult::Satisfied)));
}

#[tokio::test]
async fn test_line_without_code_becomes_invalid() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 99);
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    assert!(h.hits_until_death().await.is_empty());
    match breakpoint.validity() {
        Validity::Invalid(message) => {
            assert!(message.contains("No executable code at line 99"), "{}", message)
        }
        other => panic!("expected INVALID, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_resume_is_rejected() {
    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::line(MAIN, 4));
    let mut h = start(&counting_program(), registry);

    let hit = h.next_hit().await;
    hit.resume().unwrap();
    assert!(matches!(hit.resume(), Err(DebuggerError::AlreadyResumed)));

    h.session.wait_state(SessionState::Disconnected).await.unwrap();
}

#[tokio::test]
async fn test_listener_resume_lets_target_run() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20);
    breakpoint.add_listener(|event| {
        event.resume().unwrap();
    });
    registry.add(&breakpoint);
    let h = start(&counting_program(), registry);

    let reached = tokio::time::timeout(TIMEOUT, h.session.wait_state(SessionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reached, SessionState::Disconnected);
    assert_eq!(breakpoint.hit_count(), 3);
}

#[tokio::test]
async fn test_class_filter_excludes_matching_classes() {
    let mut program = MockProgram::new();
    for class in ["com.example.Worker", "com.other.Worker"] {
        program.class(
            MockClass::new(class).method(MockMethod::static_method("run").line(30, Op::Nop)),
        );
    }
    program.class(
        MockClass::new(MAIN).method(
            MockMethod::static_method("main")
                .line(3, Op::call("com.example.Worker", "run"))
                .line(4, Op::call("com.other.Worker", "run")),
        ),
    );
    program.thread("main", MAIN, "main");

    let registry = BreakpointRegistry::new();
    registry.add_class_filter(Arc::new(|mut names: ClassNames, _: &Breakpoint| {
        names.excluded.push("com.other.*".to_string());
        names
    }));
    let breakpoint = Breakpoint::line("*.Worker", 30);
    registry.add(&breakpoint);
    let mut h = start(&program, registry);

    let hits = h.hits_until_death().await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].class_name.as_deref(), Some("com.example.Worker"));
}

#[tokio::test]
async fn test_inactive_breakpoints_do_not_stop() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20);
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);
    h.session.set_breakpoints_active(false);

    assert!(h.hits_until_death().await.is_empty());
    assert_eq!(breakpoint.hit_count(), 0);
}

#[tokio::test]
async fn test_hit_count_filter_reports_only_matching_hit() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::line(MAIN, 20).with_hit_count_filter(HitCountFilter::EqualTo(2));
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    let hits = h.hits_until_death().await;
    assert_eq!(hits.len(), 1);
    // Every hit counts, even the filtered ones
    assert_eq!(breakpoint.hit_count(), 3);
}

#[tokio::test]
async fn test_method_entry_breakpoint() {
    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::method(MAIN, "work");
    registry.add(&breakpoint);
    let mut h = start(&counting_program(), registry);

    let hits = h.hits_until_death().await;
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|hit| hit.line == Some(20)));
    assert_eq!(breakpoint.validity(), Validity::Valid);
}

#[tokio::test]
async fn test_exception_breakpoint_reports_exception_object() {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(MAIN).method(
            MockMethod::static_method("main")
                .line(3, Op::Nop)
                .line(4, Op::throw(RUNTIME_EXCEPTION_CLASS, true))
                .line(5, Op::Nop),
        ),
    );
    program.thread("main", MAIN, "main");

    let registry = BreakpointRegistry::new();
    let breakpoint = Breakpoint::exception(RUNTIME_EXCEPTION_CLASS, true, true);
    registry.add(&breakpoint);
    let mut h = start(&program, registry);

    let hit = h.next_hit().await;
    assert_eq!(hit.line, Some(4));
    let exception = hit
        .variable
        .as_ref()
        .and_then(Value::object_id)
        .expect("exception object");
    assert_ne!(exception, 0);
    hit.resume().unwrap();

    assert!(h.hits_until_death().await.is_empty());
}

#[tokio::test]
async fn test_uncaught_only_breakpoint_ignores_caught_exceptions() {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(MAIN).method(
            MockMethod::static_method("main").line(4, Op::throw(RUNTIME_EXCEPTION_CLASS, true)),
        ),
    );
    program.thread("main", MAIN, "main");

    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::exception("*", false, true));
    let mut h = start(&program, registry);

    assert!(h.hits_until_death().await.is_empty());
}

#[tokio::test]
async fn test_class_prepare_breakpoint() {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new("com.example.Worker")
            .method(MockMethod::static_method("run").line(30, Op::Nop)),
    );
    program.class(
        MockClass::new(MAIN).method(
            MockMethod::static_method("main").line(3, Op::call("com.example.Worker", "run")),
        ),
    );
    program.thread("main", MAIN, "main");

    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::class("com.example.*", ClassBreakpointType::Prepare));
    let mut h = start(&program, registry);

    let hits = h.hits_until_death().await;
    let names: Vec<&str> = hits.iter().filter_map(|hit| hit.class_name.as_deref()).collect();
    assert!(names.contains(&"com.example.Worker"), "{:?}", names);
    assert!(hits.iter().all(|hit| hit.line.is_none()));
}

#[tokio::test]
async fn test_failed_resume_still_releases_every_stop() {
    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::line(MAIN, 20));
    let mut h = start(&counting_program(), registry);

    let hit = h.next_hit().await;
    h.session.suspend().await.unwrap();
    h.vm.set_failing_resumes(true);

    assert!(matches!(h.session.do_continue().await, Err(DebuggerError::Jdwp(_))));
    assert!(!hit.stop().is_suspended());
    assert_eq!(h.session.state(), SessionState::Running);
    assert!(matches!(hit.resume(), Err(DebuggerError::AlreadyResumed)));

    h.vm.set_failing_resumes(false);
    h.session.do_continue().await.unwrap();
    h.session.do_finish().await.unwrap();
}

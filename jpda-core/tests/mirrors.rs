mod common;

use common::start;
use jdwp_client::types::{TypeTag, Value};
use jpda_core::mock::{MockClass, MockMethod, MockProgram, Op};
use jpda_core::{
    Breakpoint, BreakpointRegistry, DebuggerError, HostValue, MirrorGraph, VariableKind,
};

const MAIN: &str = "com.example.Main";
const LIST: &str = "java.util.ArrayList";
const NODE: &str = "com.example.Node";

fn object(id: u64) -> Value {
    Value::object(TypeTag::Object as u8, id)
}

/// `main` stops on line 10 with an `ArrayList` that contains itself in
/// static `list`, and `x` = 20 in slot 0
fn program() -> MockProgram {
    let mut program = MockProgram::new();
    program.class(
        MockClass::new(LIST)
            .field("elementData", "[Ljava/lang/Object;")
            .field("size", "I")
            .preloaded(),
    );
    program.class(
        MockClass::new(NODE)
            .field("value", "I")
            .field("next", "Lcom/example/Node;")
            .preloaded(),
    );
    let list = program.object(LIST);
    let data = program.array("[Ljava/lang/Object;", vec![Value::null(); 2]);
    program
        .set_element(data, 0, object(list))
        .set_field(list, "elementData", Value::object(TypeTag::Array as u8, data))
        .set_field(list, "size", Value::int(1));

    program.class(
        MockClass::new(MAIN)
            .static_field("list", "Ljava/util/ArrayList;", object(list))
            .static_field("total", "J", Value::long(0))
            .static_field("node", "Lcom/example/Node;", Value::null())
            .method(
                MockMethod::static_method("main")
                    .local("x", "I", 0)
                    .line(9, Op::SetLocal { slot: 0, value: Value::int(20) })
                    .line(10, Op::Nop)
                    .line(11, Op::Nop),
            ),
    );
    program.thread("main", MAIN, "main");
    program
}

async fn stopped() -> common::Harness {
    let registry = BreakpointRegistry::new();
    registry.add(&Breakpoint::line(MAIN, 10));
    let mut h = start(&program(), registry);
    h.next_hit().await;
    h
}

#[tokio::test]
async fn test_self_referencing_list_mirrors_as_cycle() {
    let h = stopped().await;

    let list = h.session.static_field_variable(MAIN, "list").await.unwrap();
    assert!(matches!(list.kind, VariableKind::StaticField { .. }));
    let graph = h.session.create_mirror_object(&list).await.unwrap();

    assert_eq!(graph.root(), &HostValue::Ref(0));
    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.field(0, "size"), Some(&HostValue::Int(1)));
    assert_eq!(graph.field(0, "elementData"), Some(&HostValue::Ref(1)));
    let elements = graph.elements(1).unwrap();
    assert_eq!(elements, &[HostValue::Ref(0), HostValue::Null]);
}

#[tokio::test]
async fn test_lifted_cycle_points_at_itself() {
    let h = stopped().await;

    let mut host = MirrorGraph::new();
    let node = host.add_object(NODE);
    host.set_field(node, "value", HostValue::Int(7))
        .set_field(node, "next", HostValue::Ref(node))
        .set_root(HostValue::Ref(node));

    let variable = h.session.create_mirror_var(&host).await.unwrap();
    assert_eq!(variable.signature, "Lcom/example/Node;");
    assert!(!variable.is_mutable());
    let id = variable.value.object_id().unwrap();
    assert_eq!(h.vm.field_value(id, "value"), Some(Value::int(7)));
    let next = h.vm.field_value(id, "next").and_then(|v| v.object_id());
    assert_eq!(next, Some(id));

    // Lifting back yields the same shape
    let round = h.session.create_mirror_object(&variable).await.unwrap();
    assert_eq!(round.field(0, "next"), Some(&HostValue::Ref(0)));
}

#[tokio::test]
async fn test_mirror_assignment_to_static_field() {
    let h = stopped().await;

    let total = h.session.static_field_variable(MAIN, "total").await.unwrap();
    let updated = h
        .session
        .set_from_mirror_object(&total, &MirrorGraph::value(HostValue::Int(42)))
        .await
        .unwrap();
    assert_eq!(updated.value, Value::long(42));
    assert_eq!(h.vm.static_value(MAIN, "total"), Some(Value::long(42)));

    let mut host = MirrorGraph::new();
    let node = host.add_object(NODE);
    host.set_field(node, "value", HostValue::Int(3))
        .set_root(HostValue::Ref(node));
    let field = h.session.static_field_variable(MAIN, "node").await.unwrap();
    h.session.set_from_mirror_object(&field, &host).await.unwrap();
    let stored = h
        .vm
        .static_value(MAIN, "node")
        .and_then(|v| v.object_id())
        .unwrap();
    assert_eq!(h.vm.field_value(stored, "value"), Some(Value::int(3)));
}

#[tokio::test]
async fn test_value_variables_are_not_mutable() {
    let h = stopped().await;

    let result = h.session.value_variable("result", Value::int(1));
    let err = h
        .session
        .set_from_mirror_object(&result, &MirrorGraph::value(HostValue::Int(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, DebuggerError::NotMutable));
}

#[tokio::test]
async fn test_local_variable_write_through_mirror() {
    let h = stopped().await;
    let thread = h.session.current_thread().unwrap();

    let x = h.session.local_variable(thread, 0, "x").await.unwrap();
    assert_eq!(x.value, Value::int(20));
    h.session
        .set_from_mirror_object(&x, &MirrorGraph::value(HostValue::Int(5)))
        .await
        .unwrap();
    assert_eq!(h.session.evaluate("x").await.unwrap(), Value::int(5));
}

#[tokio::test]
async fn test_evaluate_against_stopped_frame() {
    let h = stopped().await;

    assert_eq!(h.session.evaluate("x * 2 + 1").await.unwrap(), Value::int(41));
    assert_eq!(h.session.evaluate("x > 10 && x < 30").await.unwrap(), Value::boolean(true));
    let err = h.session.evaluate("missing + 1").await.unwrap_err();
    assert!(matches!(err, DebuggerError::InvalidExpression(_)), "{:?}", err);
}

#[tokio::test]
async fn test_visible_variables_list_live_locals() {
    let h = stopped().await;
    let thread = h.session.current_thread().unwrap();

    let locals = h.session.visible_variables(thread, 0).await.unwrap();
    assert_eq!(locals.len(), 1);
    assert_eq!(locals[0].name, "x");
    assert_eq!(locals[0].value, Value::int(20));
    assert!(locals[0].is_mutable());
    assert!(h.session.visible_variables(thread, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_field_and_array_element_variables() {
    let h = stopped().await;

    let list = h.session.static_field_variable(MAIN, "list").await.unwrap();
    let list_id = list.value.object_id().unwrap();
    let data = h.session.field_variable(list_id, "elementData").await.unwrap();
    assert_eq!(data.signature, "[Ljava/lang/Object;");
    assert!(matches!(data.kind, VariableKind::Field { object, .. } if object == list_id));

    let data_id = data.value.object_id().unwrap();
    let first = h.session.array_element(data_id, 0).await.unwrap();
    assert_eq!(first.name, "[0]");
    assert_eq!(first.signature, "Ljava/lang/Object;");
    assert_eq!(first.value.object_id(), Some(list_id));

    let err = h.session.array_element(data_id, 2).await.unwrap_err();
    assert!(matches!(err, DebuggerError::InvalidState(_)), "{:?}", err);
    assert!(h.session.field_variable(list_id, "missing").await.is_err());
}

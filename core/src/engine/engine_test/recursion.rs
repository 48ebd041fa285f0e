use super::*;
use crate::engine::{Command, RuleRegistry, command_count};
use std::sync::Arc;

fn tree(b: &mut Builder) {
    b.int("value")
        .byte_with(FieldRef::tmp("_hasChild"), |ctx| u8::from(ctx.field("child").is_some()))
        .when(
            |ctx| ctx.tmp("_hasChild").and_then(Value::as_u64) == Some(1),
            |b| {
                b.obj("child").call(rule!(tree)).end_obj();
            },
        );
}

fn ping(b: &mut Builder) {
    b.byte("ping").call(rule!(pong));
}

fn pong(b: &mut Builder) {
    b.byte("pong").call(rule!(ping));
}

const TREE_BYTES: [u8; 15] = [1, 0, 0, 0, 1, 2, 0, 0, 0, 1, 3, 0, 0, 0, 0];

#[test]
fn test_self_recursive_rule_round_trips() {
    let doc = load_doc(rule!(tree), &TREE_BYTES);
    assert_eq!(doc, json!({"value": 1, "child": {"value": 2, "child": {"value": 3}}}));
    assert_eq!(save_bytes(rule!(tree), doc), TREE_BYTES.to_vec());
}

#[test]
fn test_recursive_rule_compiles_to_finite_list() {
    let mut engine = TransformationEngine::new(rule!(tree));
    engine.prepare(true).unwrap();
    assert_eq!(engine.registry().len(), 1);
    let commands = engine.registry().get(rule!(tree).name()).unwrap();
    assert_eq!(command_count(&commands), 6);
    let calls = commands[2].children()[0]
        .iter()
        .filter(|c| matches!(c, Command::Call(r) if *r == rule!(tree)))
        .count();
    assert_eq!(calls, 1);
}

#[test]
fn test_call_depth_limit() {
    let options = EngineOptions {
        max_call_depth: 1,
        ..EngineOptions::default()
    };
    let mut engine = TransformationEngine::new(rule!(tree)).with_options(options);
    let err = engine.transform(Input::Bytes(TREE_BYTES.to_vec())).unwrap_err();
    assert!(matches!(&err.kind, ErrorKind::StructuralMismatch(msg) if msg.contains("call depth")));
    assert_eq!(err.path.as_deref(), Some("$.child.child"));
}

#[test]
fn test_mutual_recursion_compiles_once_each() {
    let registry = Arc::new(RuleRegistry::new());
    let mut engine = TransformationEngine::with_registry(rule!(ping), registry.clone());
    engine.prepare(true).unwrap();
    assert_eq!(registry.len(), 2);

    // A second engine on the same registry reuses the compiled lists.
    let before = registry.get(rule!(pong).name()).unwrap();
    let mut other = TransformationEngine::with_registry(rule!(pong), registry.clone());
    other.prepare(true).unwrap();
    assert!(Arc::ptr_eq(&before, &registry.get(rule!(pong).name()).unwrap()));
}

#[test]
fn test_finite_input_ends_unbounded_recursion() {
    // ping/pong recurse until the input runs out.
    let err = load(rule!(ping), &[1, 2, 3]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput { need: 1, have: 0 });
    assert_eq!(err.offset, Some(3));
}

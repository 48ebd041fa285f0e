use super::*;
use crate::engine::RuleStatus;

fn versioned(b: &mut Builder) {
    b.obj("header").int("version").end_obj();
}

fn single(b: &mut Builder) {
    b.int("value");
}

fn anonymous(b: &mut Builder) {
    b.call(Rule::new("", single));
}

fn left_open(b: &mut Builder) {
    b.obj("header").int("version");
}

fn mislabeled(b: &mut Builder) {
    b.arr("items").end_obj();
}

#[test]
fn test_missing_field_on_save_names_path() {
    let err = save(rule!(versioned), json!({"header": {}})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingValue("version".into()));
    assert_eq!(err.path.as_deref(), Some("$.header"));
    assert_eq!(err.offset, Some(0));
    assert_eq!(err.to_string(), "missing value for version at $.header (offset 0x0)");
}

#[test]
fn test_missing_container_on_save() {
    let err = save(rule!(versioned), json!({})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingValue("header".into()));
}

#[test]
fn test_trailing_bytes_fail_end() {
    let mut engine = TransformationEngine::new(rule!(single));
    let out = engine.transform(Input::Bytes(vec![1, 0, 0, 0, 9])).unwrap();
    assert_eq!(out.output.as_document(), Some(&json!({"value": 1})));
    let err = engine.end().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::StructuralMismatch(_)));
    assert_eq!(err.offset, Some(4));
    // The leftover is reported once.
    assert!(engine.end().is_ok());

    let options = EngineOptions {
        allow_trailing_bytes: true,
        ..EngineOptions::default()
    };
    let mut engine = TransformationEngine::new(rule!(single)).with_options(options);
    engine.transform(Input::Bytes(vec![1, 0, 0, 0, 9])).unwrap();
    assert!(engine.end().is_ok());
}

#[test]
fn test_anonymous_call_fails_prepare() {
    let mut engine = TransformationEngine::new(rule!(anonymous));
    let err = engine.prepare(true).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::RegistryKeyError(_)));
    assert_eq!(
        engine.registry().status(rule!(anonymous).name()),
        Some(RuleStatus::Failed)
    );
    // transform reports the same failure instead of running.
    assert!(engine.transform(Input::Bytes(vec![0, 0, 0, 0])).is_err());
}

#[test]
fn test_transform_prepares_lazily() {
    let mut engine = TransformationEngine::new(rule!(single));
    assert!(engine.registry().is_empty());
    engine.transform(Input::Bytes(vec![2, 0, 0, 0])).unwrap();
    assert_eq!(
        engine.registry().status(rule!(single).name()),
        Some(RuleStatus::Ready)
    );
}

#[test]
fn test_unbalanced_rules_are_structural_errors() {
    let err = load(rule!(left_open), &[1, 0, 0, 0]).unwrap_err();
    assert!(matches!(&err.kind, ErrorKind::StructuralMismatch(msg) if msg.contains("left open")));

    let err = load(rule!(mislabeled), &[]).unwrap_err();
    assert!(matches!(&err.kind, ErrorKind::StructuralMismatch(msg) if msg.contains("unbalanced")));
}

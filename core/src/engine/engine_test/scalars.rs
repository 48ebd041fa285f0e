use super::*;

fn int_with_default(b: &mut Builder) {
    b.int_with("value", |_| 0);
}

fn mixed(b: &mut Builder) {
    b.long("ticks")
        .byte("flags")
        .float("ratio")
        .str("label")
        .hex("guid", 4);
}

fn plain_int(b: &mut Builder) {
    b.int("value");
}

#[test]
fn test_int_loads_and_saves_same_bytes() {
    let doc = load_doc(rule!(int_with_default), &[3, 0, 0, 0]);
    assert_eq!(doc, json!({"value": 3}));
    assert_eq!(save_bytes(rule!(int_with_default), doc), vec![3, 0, 0, 0]);
}

#[test]
fn test_default_fills_absent_field_on_save() {
    assert_eq!(save_bytes(rule!(int_with_default), json!({})), vec![0, 0, 0, 0]);
}

#[test]
fn test_mixed_scalars_round_trip() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(-5i64).to_le_bytes());
    bytes.push(0xff);
    bytes.extend_from_slice(&0.75f32.to_le_bytes());
    bytes.extend_from_slice(&ansi("Iron Plate"));
    bytes.extend_from_slice(&[0xca, 0xfe, 0xba, 0xbe]);

    let doc = load_doc(rule!(mixed), &bytes);
    assert_eq!(
        doc,
        json!({"ticks": -5, "flags": 255, "ratio": 0.75, "label": "Iron Plate", "guid": "cafebabe"})
    );
    assert_eq!(save_bytes(rule!(mixed), doc), bytes);
}

#[test]
fn test_non_ascii_text_saves_as_utf16() {
    let doc = json!({"ticks": 0, "flags": 0, "ratio": 0.0, "label": "Förderband", "guid": "00000000"});
    let bytes = save_bytes(rule!(mixed), doc.clone());
    assert_eq!(&bytes[13..17], &(-11i32).to_le_bytes());
    assert_eq!(load_doc(rule!(mixed), &bytes), doc);
}

#[test]
fn test_out_of_range_values_overflow() {
    let doc = json!({"ticks": 0, "flags": 300, "ratio": 0.0, "label": "", "guid": "00000000"});
    let err = save(rule!(mixed), doc).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EncodingOverflow { .. }));
    assert_eq!(err.offset, Some(8));

    let doc = json!({"ticks": 0, "flags": 0, "ratio": 0.0, "label": "", "guid": "0000"});
    let err = save(rule!(mixed), doc).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::EncodingOverflow { .. }));
}

#[test]
fn test_truncated_input() {
    let err = load(rule!(plain_int), &[1, 2]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TruncatedInput { need: 4, have: 2 });
    assert_eq!(err.offset, Some(0));
    assert_eq!(err.path.as_deref(), Some("$"));
}

#[test]
fn test_wrong_json_type_is_invalid() {
    let err = save(rule!(plain_int), json!({"value": "three"})).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidValue(_)));
}

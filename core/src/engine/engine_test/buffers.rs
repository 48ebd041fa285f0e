use super::*;

fn framed(b: &mut Builder) {
    b.str("tag")
        .buffer_start("size", true)
        .int_with("index", |_| 0)
        .uncounted()
        .int("a")
        .str("s")
        .buffer_end();
}

fn nested(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_outer"), true)
        .int("a")
        .buffer_start(FieldRef::tmp("_inner"), false)
        .byte("flag")
        .uncounted()
        .int("b")
        .buffer_end()
        .buffer_end();
}

fn raw_tail(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_length"), true)
        .hex_remaining("raw", FieldRef::tmp("_length"))
        .buffer_end();
}

fn unclosed(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_length"), true).int("a");
}

#[test]
fn test_length_excludes_uncounted_bytes() {
    let bytes = save_bytes(rule!(framed), json!({"tag": "x", "a": 1, "s": "hi"}));
    let tag = ansi("x");
    let size_at = tag.len();
    let size = i32::from_le_bytes(bytes[size_at..size_at + 4].try_into().unwrap());
    // a (4) + "hi" (4 + 3); the index is outside the count.
    assert_eq!(size, 11);
    assert_eq!(bytes.len(), tag.len() + 4 + 4 + 11);

    let doc = load_doc(rule!(framed), &bytes);
    assert_eq!(doc, json!({"tag": "x", "size": 11, "index": 0, "a": 1, "s": "hi"}));
    assert_eq!(save_bytes(rule!(framed), doc), bytes);
}

#[test]
fn test_declared_length_must_match_on_load() {
    let mut bytes = save_bytes(rule!(framed), json!({"tag": "x", "a": 1, "s": "hi"}));
    let size_at = ansi("x").len();
    bytes[size_at] = 12;
    let err = load(rule!(framed), &bytes).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::StructuralMismatch(_)));
}

#[test]
fn test_inner_uncounted_bytes_count_toward_outer_region() {
    let bytes = save_bytes(rule!(nested), json!({"a": 1, "flag": 1, "b": 2}));
    assert_eq!(
        bytes,
        vec![13, 0, 0, 0, 1, 0, 0, 0, 4, 0, 0, 0, 1, 2, 0, 0, 0]
    );
    assert_eq!(load_doc(rule!(nested), &bytes), json!({"a": 1, "flag": 1, "b": 2}));
}

#[test]
fn test_hex_remaining_uses_declared_length() {
    let bytes = [3, 0, 0, 0, 0xab, 0xcd, 0xef];
    let doc = load_doc(rule!(raw_tail), &bytes);
    assert_eq!(doc, json!({"raw": "abcdef"}));
    assert_eq!(save_bytes(rule!(raw_tail), doc), bytes);
}

#[test]
fn test_unclosed_buffer_is_rejected() {
    let err = load(rule!(unclosed), &[4, 0, 0, 0, 1, 0, 0, 0]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::StructuralMismatch(_)));
}

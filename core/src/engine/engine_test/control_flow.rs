use super::*;

fn tagged(b: &mut Builder) {
    b.str("type").switch("type", |cases| {
        cases.case("IntProperty", |b| {
            b.int("value");
        });
        cases.case("ByteProperty", |b| {
            b.byte("value");
        });
    });
}

fn flagged(b: &mut Builder) {
    b.byte("flag").when_else(
        |ctx| ctx.field("flag").and_then(Value::as_u64) == Some(1),
        |b| {
            b.int("wide");
        },
        |b| {
            b.byte("narrow");
        },
    );
}

fn names(b: &mut Builder) {
    b.arr("names")
        .repeat(LoopCount::Sentinel, |b| {
            b.exec(|ctx| {
                if !ctx.is_loading() {
                    let name = ctx.get(&FieldRef::LoopIndex).cloned().unwrap_or_default();
                    ctx.set_tmp("_name", name);
                }
                Ok(())
            })
            .str(FieldRef::tmp("_name"))
            .when(
                |ctx| ctx.tmp("_name") == Some(&json!("None")),
                |b| {
                    b.break_loop();
                },
            )
            .exec(|ctx| {
                if ctx.is_loading() {
                    let name = ctx.tmp("_name").cloned().unwrap_or_default();
                    ctx.set(&FieldRef::LoopIndex, name)?;
                }
                Ok(())
            });
        })
        .when(
            |ctx| !ctx.is_loading(),
            |b| {
                b.str_with(FieldRef::tmp("_end"), |_| "None");
            },
        )
        .end_arr()
        .int("after");
}

fn counted(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_length"), true)
        .int(FieldRef::tmp("_count"))
        .arr("items")
        .repeat(FieldRef::tmp("_count"), |b| {
            b.int(FieldRef::LoopIndex);
        })
        .end_arr()
        .buffer_end();
}

fn break_in_elem(b: &mut Builder) {
    b.arr("entries")
        .repeat(3, |b| {
            b.elem(FieldRef::LoopIndex)
                .byte("kind")
                .when(
                    |ctx| ctx.field("kind").and_then(Value::as_u64) == Some(0),
                    |b| {
                        b.break_loop();
                    },
                )
                .int("value")
                .end_elem();
        })
        .end_arr()
        .byte("tail");
}

fn break_in_region(b: &mut Builder) {
    b.repeat(LoopCount::Sentinel, |b| {
        b.buffer_start(FieldRef::tmp("_length"), false)
            .byte(FieldRef::tmp("_b"))
            .when(
                |ctx| ctx.tmp("_b") == Some(&json!(0)),
                |b| {
                    b.break_loop();
                },
            )
            .buffer_end();
    })
    .byte("tail");
}

fn indexed_tail(b: &mut Builder) {
    b.int("a")
        .arr("seen")
        .repeat(2, |b| {
            b.elem(FieldRef::LoopIndex)
                .exec(|ctx| {
                    if ctx.is_loading() {
                        let index = ctx.loop_index().unwrap_or_default();
                        ctx.set(&FieldRef::from("i"), Value::from(index))?;
                    }
                    Ok(())
                })
                .end_elem();
        })
        .end_arr();
}

fn tallied_region(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_length"), true)
        .int("a")
        .repeat(3, |b| {
            b.exec(|ctx| {
                if ctx.is_loading() {
                    let passes = ctx.field("passes").and_then(Value::as_u64).unwrap_or(0);
                    ctx.set(&FieldRef::from("passes"), Value::from(passes + 1))?;
                }
                Ok(())
            });
        })
        .buffer_end();
}

fn traced(b: &mut Builder) {
    b.int("a")
        .debugger()
        .debug("a", |ctx| ctx.field("a").cloned().unwrap_or(Value::Null))
        .byte("b")
        .debugger();
}

fn stray_break(b: &mut Builder) {
    b.int("value").break_loop();
}

#[test]
fn test_switch_dispatches_on_label() {
    let mut bytes = ansi("ByteProperty");
    bytes.push(7);
    let doc = load_doc(rule!(tagged), &bytes);
    assert_eq!(doc, json!({"type": "ByteProperty", "value": 7}));
    assert_eq!(save_bytes(rule!(tagged), doc), bytes);
}

#[test]
fn test_switch_without_match_or_default() {
    let mut bytes = ansi("FloatProperty");
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    let err = load(rule!(tagged), &bytes).unwrap_err();
    assert_eq!(
        err.kind,
        ErrorKind::UnknownVariant {
            selector: "type".into(),
            value: "FloatProperty".into()
        }
    );

    let err = save(rule!(tagged), json!({"type": "byteproperty", "value": 1})).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownVariant { .. }));
}

#[test]
fn test_cond_takes_same_branch_both_ways() {
    for bytes in [vec![1, 5, 0, 0, 0], vec![0, 9]] {
        let doc = load_doc(rule!(flagged), &bytes);
        assert_eq!(save_bytes(rule!(flagged), doc), bytes);
    }
    assert_eq!(load_doc(rule!(flagged), &[0, 9]), json!({"flag": 0, "narrow": 9}));
}

#[test]
fn test_sentinel_loop_stops_at_terminator() {
    let mut bytes = [ansi("a"), ansi("b"), ansi("None")].concat();
    bytes.extend_from_slice(&9i32.to_le_bytes());

    let doc = load_doc(rule!(names), &bytes);
    assert_eq!(doc, json!({"names": ["a", "b"], "after": 9}));

    let saved = save_bytes(rule!(names), doc);
    assert_eq!(saved, bytes);
    let terminators = saved.windows(5).filter(|w| *w == b"None\0").count();
    assert_eq!(terminators, 1);
}

#[test]
fn test_short_region_reports_count_mismatch() {
    let mut bytes = 20i32.to_le_bytes().to_vec();
    bytes.extend_from_slice(&10i32.to_le_bytes());
    for v in [1i32, 2, 3, 4] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let out = load(rule!(counted), &bytes).unwrap();
    assert_eq!(out.output.as_document(), Some(&json!({"items": [1, 2, 3, 4]})));
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(
        out.warnings[0].kind,
        WarningKind::CountMismatch {
            expected: 10,
            observed: 4
        }
    );
    assert_eq!(out.warnings[0].offset, bytes.len());
}

#[test]
fn test_break_restores_open_elements() {
    let doc = load_doc(rule!(break_in_elem), &[1, 5, 0, 0, 0, 0, 0xaa]);
    assert_eq!(doc, json!({"entries": [{"kind": 1, "value": 5}, {"kind": 0}], "tail": 170}));
}

#[test]
fn test_break_abandons_open_regions() {
    let bytes = [1, 0, 0, 0, 7, 1, 0, 0, 0, 0, 0x42];
    let doc = load_doc(rule!(break_in_region), &bytes);
    assert_eq!(doc, json!({"tail": 0x42}));
}

#[test]
fn test_break_outside_loop_is_rejected() {
    let err = load(rule!(stray_break), &[1, 0, 0, 0]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::StructuralMismatch(_)));
}

#[test]
fn test_byteless_loop_runs_at_end_of_input() {
    let out = load(rule!(indexed_tail), &[1, 0, 0, 0]).unwrap();
    assert!(out.warnings.is_empty(), "unexpected warnings: {:?}", out.warnings);
    let doc = out.output.into_document().unwrap();
    assert_eq!(doc, json!({"a": 1, "seen": [{"i": 0}, {"i": 1}]}));
    assert_eq!(save_bytes(rule!(indexed_tail), doc), vec![1, 0, 0, 0]);
}

#[test]
fn test_byteless_loop_runs_at_end_of_region() {
    let bytes = [4, 0, 0, 0, 5, 0, 0, 0];
    let out = load(rule!(tallied_region), &bytes).unwrap();
    assert!(out.warnings.is_empty(), "unexpected warnings: {:?}", out.warnings);
    let doc = out.output.into_document().unwrap();
    assert_eq!(doc, json!({"a": 5, "passes": 3}));
    assert_eq!(save_bytes(rule!(tallied_region), doc), bytes);
}

#[test]
fn test_debug_hooks_move_no_bytes() {
    let bytes = [7, 0, 0, 0, 9];
    let doc = load_doc(rule!(traced), &bytes);
    assert_eq!(doc, json!({"a": 7, "b": 9}));
    assert_eq!(save_bytes(rule!(traced), doc), bytes);
}

use serde_json::Value;

use super::arrays::ARRAY_PROPERTY;
use super::structs::STRUCT_PROPERTY;
use crate::engine::{Builder, Context, FieldRef, LoopCount, Rule};
use crate::error::{ErrorKind, Result};
use crate::rule;

/// Properties of the current array node, ended by a `None` name.
pub const PROPERTY_LIST: Rule = rule!(property_list);

/// One property: tag, length-prefixed value.
pub const PROPERTY: Rule = rule!(property);

const END_OF_LIST: &str = "None";

fn property_list(b: &mut Builder) {
    b.repeat(LoopCount::Sentinel, |b| {
        b.exec(stage_name)
            .str(FieldRef::tmp("_name"))
            .when(
                |ctx| ctx.tmp("_name").and_then(Value::as_str) == Some(END_OF_LIST),
                |b| {
                    b.break_loop();
                },
            )
            .elem(FieldRef::LoopIndex)
            .exec(|ctx| {
                if ctx.is_loading() {
                    let name = ctx.tmp("_name").cloned().unwrap_or(Value::Null);
                    ctx.set(&FieldRef::from("name"), name)?;
                }
                Ok(())
            })
            .call(PROPERTY)
            .end_elem();
    })
    .when(
        |ctx| !ctx.is_loading(),
        |b| {
            b.str_with(FieldRef::tmp("_none"), |_| END_OF_LIST);
        },
    );
}

/// On save, copy the name of the upcoming element into `_name`.
fn stage_name(ctx: &mut Context) -> Result<()> {
    if ctx.is_loading() {
        return Ok(());
    }
    let name = ctx
        .get(&FieldRef::LoopIndex)
        .and_then(|prop| prop.get("name"))
        .cloned()
        .ok_or_else(|| ErrorKind::MissingValue("name".to_string()))?;
    ctx.set_tmp("_name", name);
    Ok(())
}

fn property(b: &mut Builder) {
    b.str("type")
        .buffer_start(FieldRef::tmp("_length"), true)
        .int_with("index", |_| 0)
        .uncounted();

    b.switch("type", |cases| {
        cases.case("IntProperty", |b| {
            b.assert_null_byte().uncounted().int("value");
        });
        cases.case("Int64Property", |b| {
            b.assert_null_byte().uncounted().long("value");
        });
        cases.case("FloatProperty", |b| {
            b.assert_null_byte().uncounted().float("value");
        });
        cases.cases(["StrProperty", "NameProperty"], |b| {
            b.assert_null_byte().uncounted().str("value");
        });
        cases.case("BoolProperty", |b| {
            b.byte("value").uncounted().assert_null_byte().uncounted();
        });
        cases.case("ByteProperty", |b| {
            b.str("enumName").uncounted().assert_null_byte().uncounted();
            b.when_else(
                |ctx| ctx.field("enumName").and_then(Value::as_str) == Some(END_OF_LIST),
                |b| {
                    b.byte("value");
                },
                |b| {
                    b.str("value");
                },
            );
        });
        cases.case("EnumProperty", |b| {
            b.str("enumName")
                .uncounted()
                .assert_null_byte()
                .uncounted()
                .str("value");
        });
        cases.case("ObjectProperty", |b| {
            b.assert_null_byte()
                .uncounted()
                .obj("value")
                .str("levelName")
                .str("pathName")
                .end_obj();
        });
        cases.case("ArrayProperty", |b| {
            b.call(ARRAY_PROPERTY);
        });
        cases.case("StructProperty", |b| {
            b.call(STRUCT_PROPERTY);
        });
        // Container payloads are kept raw; only their tags are decoded.
        cases.case("MapProperty", |b| {
            b.str("keyType")
                .uncounted()
                .str("valueType")
                .uncounted()
                .assert_null_byte()
                .uncounted()
                .hex_remaining("raw", FieldRef::tmp("_length"));
        });
        cases.case("SetProperty", |b| {
            b.str("innerType")
                .uncounted()
                .assert_null_byte()
                .uncounted()
                .hex_remaining("raw", FieldRef::tmp("_length"));
        });
        // Other types are assumed to carry no tag data beyond the guid flag.
        cases.default(|b| {
            b.assert_null_byte()
                .uncounted()
                .hex_remaining("raw", FieldRef::tmp("_length"));
        });
    });

    b.buffer_end();
}

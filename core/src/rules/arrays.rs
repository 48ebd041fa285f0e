use serde_json::Value;

use super::properties::PROPERTY_LIST;
use crate::engine::{Builder, FieldRef, Rule};
use crate::rule;

/// Value of an `ArrayProperty`: inner type, count, then the items.
pub const ARRAY_PROPERTY: Rule = rule!(array_property);

const STRUCT_ELEMENT: Rule = rule!(struct_element);
const ORDINARY_STRUCT: Rule = rule!(ordinary_struct);

fn item_count() -> FieldRef {
    FieldRef::tmp("_itemCount")
}

fn array_property(b: &mut Builder) {
    b.obj("value")
        .str("type")
        .uncounted()
        .assert_null_byte()
        .uncounted()
        .int_with(item_count(), |ctx| ctx.len_of("values"));

    b.switch("type", |cases| {
        cases.case("IntProperty", |b| {
            b.arr("values")
                .repeat(item_count(), |b| {
                    b.int(FieldRef::LoopIndex);
                })
                .end_arr();
        });
        cases.case("ByteProperty", |b| {
            b.arr("values")
                .repeat(item_count(), |b| {
                    b.byte(FieldRef::LoopIndex);
                })
                .end_arr();
        });
        cases.case("FloatProperty", |b| {
            b.arr("values")
                .repeat(item_count(), |b| {
                    b.float(FieldRef::LoopIndex);
                })
                .end_arr();
        });
        cases.cases(["EnumProperty", "StrProperty", "NameProperty"], |b| {
            b.arr("values")
                .repeat(item_count(), |b| {
                    b.str(FieldRef::LoopIndex);
                })
                .end_arr();
        });
        cases.cases(["ObjectProperty", "InterfaceProperty"], |b| {
            b.arr("values")
                .repeat(item_count(), |b| {
                    b.elem(FieldRef::LoopIndex)
                        .str("levelName")
                        .str("pathName")
                        .end_elem();
                })
                .end_arr();
        });
        cases.case("StructProperty", |b| {
            b.str("structName")
                .str("structType")
                .buffer_start(FieldRef::tmp("_length"), false)
                .assert_null_int()
                .uncounted()
                .str("structInnerType")
                .uncounted()
                .hex("propertyGuid", 16)
                .uncounted()
                .assert_null_byte()
                .uncounted()
                .arr("values")
                .repeat(item_count(), |b| {
                    b.call(STRUCT_ELEMENT);
                })
                .end_arr()
                .buffer_end();
        });
        // FText elements have a history-dependent layout that is not decoded.
        cases.case("TextProperty", |b| {
            b.error(|_| "TextProperty arrays are not supported".to_string());
        });
        cases.default(|b| {
            b.error(|ctx| {
                format!(
                    "unknown array type {}",
                    ctx.field("type").unwrap_or(&Value::Null)
                )
            });
        });
    });

    b.end_obj();
}

/// One element of a struct array, dispatched on the owner's `structInnerType`.
fn struct_element(b: &mut Builder) {
    b.switch(FieldRef::parent("structInnerType"), |cases| {
        cases.case("Vector", |b| {
            b.elem(FieldRef::LoopIndex)
                .float("x")
                .float("y")
                .float("z")
                .end_elem();
        });
        cases.case("LinearColor", |b| {
            b.elem(FieldRef::LoopIndex)
                .float("r")
                .float("g")
                .float("b")
                .float("a")
                .end_elem();
        });
        cases.case("Guid", |b| {
            b.hex(FieldRef::LoopIndex, 16);
        });
        cases.case("InventoryItem", |b| {
            b.elem(FieldRef::LoopIndex)
                .str("unk1")
                .uncounted()
                .str("itemName")
                .str("levelName")
                .str("pathName")
                .end_elem();
        });
        cases.default(|b| {
            b.call(ORDINARY_STRUCT);
        });
    });
}

fn ordinary_struct(b: &mut Builder) {
    b.elem(FieldRef::LoopIndex)
        .arr("properties")
        .call(PROPERTY_LIST)
        .end_arr()
        .end_elem();
}

use super::properties::PROPERTY_LIST;
use crate::engine::{Builder, Rule};
use crate::rule;

/// Value of a `StructProperty`. Known engine structs have a fixed layout;
/// anything else is a nested property list.
pub const STRUCT_PROPERTY: Rule = rule!(struct_property);

fn struct_property(b: &mut Builder) {
    b.obj("value")
        .str("type")
        .uncounted()
        .hex("structGuid", 16)
        .uncounted()
        .assert_null_byte()
        .uncounted();

    b.switch("type", |cases| {
        cases.case("Vector", |b| {
            b.float("x").float("y").float("z");
        });
        cases.case("Rotator", |b| {
            b.float("pitch").float("yaw").float("roll");
        });
        cases.case("Quat", |b| {
            b.float("x").float("y").float("z").float("w");
        });
        cases.case("LinearColor", |b| {
            b.float("r").float("g").float("b").float("a");
        });
        cases.case("Color", |b| {
            b.byte("b").byte("g").byte("r").byte("a");
        });
        cases.case("Box", |b| {
            b.obj("min")
                .float("x")
                .float("y")
                .float("z")
                .end_obj()
                .obj("max")
                .float("x")
                .float("y")
                .float("z")
                .end_obj()
                .byte("isValid");
        });
        cases.case("Guid", |b| {
            b.hex("guid", 16);
        });
        cases.case("DateTime", |b| {
            b.long("ticks");
        });
        cases.default(|b| {
            b.arr("properties").call(PROPERTY_LIST).end_arr();
        });
    });

    b.end_obj();
}

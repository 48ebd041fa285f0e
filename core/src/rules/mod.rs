//! Stock schema for the save format.
//!
//! A save file is a header, a `None`-terminated property list and a list of
//! conveyor belts. Properties carry a length-prefixed value whose layout is
//! chosen by the property type; struct values recurse into property lists.

mod arrays;
mod conveyor;
mod properties;
mod structs;


use crate::engine::{Builder, FieldRef, Rule};
use crate::rule;

pub use arrays::ARRAY_PROPERTY;
pub use conveyor::CONVEYOR_BELT;
pub use properties::{PROPERTY, PROPERTY_LIST};
pub use structs::STRUCT_PROPERTY;

/// Root rule of a whole save file.
pub const SAVE_FILE: Rule = rule!(save_file);

fn save_file(b: &mut Builder) {
    b.obj("header")
        .int("saveHeaderVersion")
        .int("saveVersion")
        .int("buildVersion")
        .str("mapName")
        .str("mapOptions")
        .str("sessionName")
        .int("playDurationSeconds")
        .long("saveDateTime")
        .byte("sessionVisibility")
        .end_obj();

    b.arr("properties").call(PROPERTY_LIST).end_arr();

    b.int_with(FieldRef::tmp("_beltCount"), |ctx| ctx.len_of("conveyorBelts"))
        .arr("conveyorBelts")
        .repeat(FieldRef::tmp("_beltCount"), |b| {
            b.elem(FieldRef::LoopIndex)
                .str("pathName")
                .call(CONVEYOR_BELT)
                .end_elem();
        })
        .end_arr();
}

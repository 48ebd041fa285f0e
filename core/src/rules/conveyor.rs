use crate::engine::{Builder, FieldRef, Rule};
use crate::rule;

/// Items on a conveyor belt. The declared count is not trusted: the list
/// stops at the end of the belt's region.
pub const CONVEYOR_BELT: Rule = rule!(conveyor_belt);

fn conveyor_belt(b: &mut Builder) {
    b.buffer_start(FieldRef::tmp("_length"), true)
        .int_with(FieldRef::tmp("_itemCount"), |ctx| ctx.len_of("items"))
        .arr("items")
        .repeat(FieldRef::tmp("_itemCount"), |b| {
            b.elem(FieldRef::LoopIndex)
                .assert_null_int()
                .str("name")
                .assert_null_int()
                .assert_null_int()
                .float("position")
                .end_elem();
        })
        .end_arr()
        .buffer_end();
}

//! The 2.7 diff over 2.5 (§4.6): adds `BUILD_SET`, the `_OR_POP` and
//! `POP_JUMP_IF_*` jump family, and `with`-statement support
//! (`SETUP_WITH`/`WITH_CLEANUP`). The non-pop `JUMP_IF_TRUE`/`JUMP_IF_FALSE`
//! pair is retired in favor of the new jump family, since the host compiler
//! targeting this dialect only ever emits the newer forms.

use super::Diff;
use crate::ops;

#[must_use]
pub fn diff() -> Diff {
    use crate::opcode::Opcode::*;
    Diff {
        add: &[
            (BUILD_SET, ops::build_set),
            (JUMP_IF_TRUE_OR_POP, ops::jump_if_true_or_pop),
            (JUMP_IF_FALSE_OR_POP, ops::jump_if_false_or_pop),
            (POP_JUMP_IF_TRUE, ops::pop_jump_if_true),
            (POP_JUMP_IF_FALSE, ops::pop_jump_if_false),
            (SETUP_WITH, ops::setup_with_v2),
            (WITH_CLEANUP, ops::with_cleanup),
        ],
        remove: &[JUMP_IF_TRUE, JUMP_IF_FALSE],
    }
}

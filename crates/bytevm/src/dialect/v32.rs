//! The 3.2 diff over 2.7 (§4.6): drops the classic `PRINT_*` family,
//! `BUILD_CLASS` (replaced by `LOAD_BUILD_CLASS` + `CALL_FUNCTION`),
//! `DUP_TOPX` (replaced by the fixed-arity `DUP_TOP_TWO`), and `EXEC_STMT`
//! (running source text is the host compiler's job, not this one's, by the
//! time 3.x drops the bare `exec` statement in favor of a builtin function);
//! overrides `MAKE_FUNCTION`/`MAKE_CLOSURE` (packed defaults/kwdefaults/
//! annotations argument), `RAISE_VARARGS` (two-argument `raise ... from ...`
//! form), and `SETUP_WITH` (pushes a `finally` block instead of a dedicated
//! `with` block — 3.x folds `with` cleanup into the ordinary finally
//! machinery); adds `POP_EXCEPT`, 3.2's non-exceptional `try`/`except`
//! cleanup opcode (2.x bytecode does the same job with three explicit
//! `POP_TOP`s instead). `WITH_CLEANUP` and `END_FINALLY` are generic enough
//! to serve both 2.7 and 3.2 unchanged.

use super::Diff;
use crate::ops;

#[must_use]
pub fn diff() -> Diff {
    use crate::opcode::Opcode::*;
    Diff {
        add: &[
            (DUP_TOP_TWO, ops::dup_top_two),
            (LOAD_BUILD_CLASS, ops::load_build_class),
            (MAKE_FUNCTION, ops::make_function_3),
            (MAKE_CLOSURE, ops::make_closure_3),
            (RAISE_VARARGS, ops::raise_varargs_v3),
            (SETUP_WITH, ops::setup_with_v3),
            (POP_EXCEPT, ops::pop_except),
        ],
        remove: &[
            PRINT_ITEM,
            PRINT_ITEM_TO,
            PRINT_NEWLINE,
            PRINT_NEWLINE_TO,
            PRINT_EXPR,
            BUILD_CLASS,
            DUP_TOPX,
            EXEC_STMT,
        ],
    }
}

//! The flat opcode set (union of every dialect) and resolved instruction
//! operands.
//!
//! A single enum spans all dialects rather than one enum per dialect: a
//! dialect is a *dispatch table* (`crate::dialect`) mapping a subset of these
//! variants to handlers, not a separate type. This matches the design note
//! that dialect composition should be "a per-version dispatch table built by
//! copying the parent table and applying a declarative diff", which only
//! works cleanly if opcodes share one vocabulary to diff over.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::intern::Name;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    POP_TOP,
    ROT_TWO,
    ROT_THREE,
    ROT_FOUR,
    DUP_TOP,
    DUP_TOP_TWO,
    DUP_TOPX,
    NOP,

    UNARY_POSITIVE,
    UNARY_NEGATIVE,
    UNARY_NOT,
    UNARY_INVERT,

    BINARY_ADD,
    BINARY_SUBTRACT,
    BINARY_MULTIPLY,
    BINARY_DIVIDE,
    BINARY_FLOOR_DIVIDE,
    BINARY_TRUE_DIVIDE,
    BINARY_MODULO,
    BINARY_POWER,
    BINARY_SUBSCR,
    BINARY_AND,
    BINARY_OR,
    BINARY_XOR,
    BINARY_LSHIFT,
    BINARY_RSHIFT,

    INPLACE_ADD,
    INPLACE_SUBTRACT,
    INPLACE_MULTIPLY,
    INPLACE_MODULO,

    STORE_SUBSCR,
    DELETE_SUBSCR,

    COMPARE_OP,

    LOAD_CONST,
    LOAD_NAME,
    LOAD_GLOBAL,
    LOAD_FAST,
    LOAD_ATTR,
    LOAD_CLOSURE,
    LOAD_DEREF,
    LOAD_BUILD_CLASS,

    STORE_NAME,
    STORE_GLOBAL,
    STORE_FAST,
    STORE_ATTR,
    STORE_DEREF,

    DELETE_NAME,
    DELETE_GLOBAL,
    DELETE_FAST,
    DELETE_ATTR,
    DELETE_DEREF,

    BUILD_TUPLE,
    BUILD_LIST,
    BUILD_SET,
    BUILD_MAP,
    STORE_MAP,
    BUILD_SLICE,
    UNPACK_SEQUENCE,
    LIST_APPEND,

    JUMP_FORWARD,
    JUMP_ABSOLUTE,
    JUMP_IF_TRUE,
    JUMP_IF_FALSE,
    JUMP_IF_TRUE_OR_POP,
    JUMP_IF_FALSE_OR_POP,
    POP_JUMP_IF_TRUE,
    POP_JUMP_IF_FALSE,
    FOR_ITER,
    GET_ITER,

    SETUP_LOOP,
    SETUP_EXCEPT,
    SETUP_FINALLY,
    SETUP_WITH,
    POP_BLOCK,
    POP_EXCEPT,
    BREAK_LOOP,
    CONTINUE_LOOP,
    END_FINALLY,
    WITH_CLEANUP,

    MAKE_FUNCTION,
    MAKE_CLOSURE,
    CALL_FUNCTION,
    CALL_FUNCTION_VAR,
    CALL_FUNCTION_KW,
    CALL_FUNCTION_VAR_KW,

    RAISE_VARARGS,

    IMPORT_NAME,
    IMPORT_FROM,
    IMPORT_STAR,
    EXEC_STMT,

    RETURN_VALUE,
    YIELD_VALUE,

    BUILD_CLASS,

    PRINT_ITEM,
    PRINT_ITEM_TO,
    PRINT_NEWLINE,
    PRINT_NEWLINE_TO,
    PRINT_EXPR,
}

/// A single comparison operator, indexed by `COMPARE_OP`'s fixed table
/// (§4.5: `[<, <=, ==, !=, >, >=, in, not in, is, is not, exception-match]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
    ExceptionMatch,
}

/// A resolved instruction operand. Per the external-decoder contract, the
/// host has already turned raw const/name indices and jump deltas into the
/// values below.
///
/// Not `Serialize`/`Deserialize`: `Const` carries a live `Value`, which (via
/// `HostCallable`/`GeneratorHandle`) is not universally serializable. See
/// [`crate::code`]'s module docs.
#[derive(Debug, Clone)]
pub enum Arg {
    None,
    Const(Value),
    Name(Name),
    /// A plain item/argument count (`BUILD_TUPLE`, `DUP_TOPX`, …).
    Count(u32),
    /// `CALL_FUNCTION`'s packed `(kwcount << 8) | poscount` argument.
    CallArgs { positional: u16, keyword: u16 },
    /// `MAKE_FUNCTION`/`MAKE_CLOSURE`'s packed 3.x argument.
    MakeFunctionArgs {
        defaults: u16,
        kwdefaults: u16,
        annotations: u16,
    },
    /// An already-resolved absolute instruction index.
    Jump(usize),
    /// A cellvar/freevar slot index into the frame's combined cell array.
    Slot(u16),
    Compare(CompareOp),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: Arg,
}

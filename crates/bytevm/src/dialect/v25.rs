//! The 2.5 base dialect table (§4.6: later dialects are built from this one
//! by diff). No `with` statement support yet (`SETUP_WITH`/`WITH_CLEANUP`
//! arrive in the 2.7 diff), no `BUILD_SET` (2.7), classic non-pop
//! `JUMP_IF_TRUE`/`JUMP_IF_FALSE`, 2.x `MAKE_FUNCTION`/`RAISE_VARARGS`
//! semantics, and the classic `PRINT_*`/`BUILD_CLASS` family. Also carries
//! `EXEC_STMT` (retired in 3.x, see `dialect::v32`) and the unpacking/
//! comprehension opcodes `UNPACK_SEQUENCE`/`LIST_APPEND`, which survive
//! unchanged through every later dialect.

use super::DispatchTable;
use crate::ops;

#[must_use]
pub fn base_table() -> DispatchTable {
    use crate::opcode::Opcode::*;
    let mut t: DispatchTable = DispatchTable::default();
    macro_rules! ins {
        ($($op:ident => $handler:path),+ $(,)?) => {
            $(t.insert($op, $handler);)+
        };
    }
    ins! {
        POP_TOP => ops::pop_top,
        ROT_TWO => ops::rot_two,
        ROT_THREE => ops::rot_three,
        ROT_FOUR => ops::rot_four,
        DUP_TOP => ops::dup_top,
        DUP_TOPX => ops::dup_topx,
        NOP => ops::nop,

        UNARY_POSITIVE => ops::unary_positive,
        UNARY_NEGATIVE => ops::unary_negative,
        UNARY_NOT => ops::unary_not,
        UNARY_INVERT => ops::unary_invert,

        BINARY_ADD => ops::binary_add,
        BINARY_SUBTRACT => ops::binary_subtract,
        BINARY_MULTIPLY => ops::binary_multiply,
        BINARY_DIVIDE => ops::binary_divide,
        BINARY_FLOOR_DIVIDE => ops::binary_floor_divide,
        BINARY_TRUE_DIVIDE => ops::binary_true_divide,
        BINARY_MODULO => ops::binary_modulo,
        BINARY_POWER => ops::binary_power,
        BINARY_SUBSCR => ops::binary_subscr,
        BINARY_AND => ops::binary_and,
        BINARY_OR => ops::binary_or,
        BINARY_XOR => ops::binary_xor,
        BINARY_LSHIFT => ops::binary_lshift,
        BINARY_RSHIFT => ops::binary_rshift,

        INPLACE_ADD => ops::inplace_add,
        INPLACE_SUBTRACT => ops::inplace_subtract,
        INPLACE_MULTIPLY => ops::inplace_multiply,
        INPLACE_MODULO => ops::inplace_modulo,

        STORE_SUBSCR => ops::store_subscr,
        DELETE_SUBSCR => ops::delete_subscr,

        COMPARE_OP => ops::compare_op,

        LOAD_CONST => ops::load_const,
        LOAD_NAME => ops::load_name,
        LOAD_GLOBAL => ops::load_global,
        LOAD_FAST => ops::load_fast,
        LOAD_ATTR => ops::load_attr,
        LOAD_CLOSURE => ops::load_closure,
        LOAD_DEREF => ops::load_deref,

        STORE_NAME => ops::store_name,
        STORE_GLOBAL => ops::store_global,
        STORE_FAST => ops::store_fast,
        STORE_ATTR => ops::store_attr,
        STORE_DEREF => ops::store_deref,

        DELETE_NAME => ops::delete_name,
        DELETE_GLOBAL => ops::delete_global,
        DELETE_FAST => ops::delete_fast,
        DELETE_ATTR => ops::delete_attr,
        DELETE_DEREF => ops::delete_deref,

        BUILD_TUPLE => ops::build_tuple,
        BUILD_LIST => ops::build_list,
        BUILD_MAP => ops::build_map,
        STORE_MAP => ops::store_map,
        BUILD_SLICE => ops::build_slice,
        UNPACK_SEQUENCE => ops::unpack_sequence,
        LIST_APPEND => ops::list_append,

        JUMP_FORWARD => ops::jump_forward,
        JUMP_ABSOLUTE => ops::jump_absolute,
        JUMP_IF_TRUE => ops::jump_if_true,
        JUMP_IF_FALSE => ops::jump_if_false,
        FOR_ITER => ops::for_iter,
        GET_ITER => ops::get_iter,

        SETUP_LOOP => ops::setup_loop,
        SETUP_EXCEPT => ops::setup_except,
        SETUP_FINALLY => ops::setup_finally,
        POP_BLOCK => ops::pop_block,
        BREAK_LOOP => ops::break_loop,
        CONTINUE_LOOP => ops::continue_loop,
        END_FINALLY => ops::end_finally,

        MAKE_FUNCTION => ops::make_function_2,
        MAKE_CLOSURE => ops::make_closure_2,
        CALL_FUNCTION => ops::call_function,
        CALL_FUNCTION_VAR => ops::call_function_var,
        CALL_FUNCTION_KW => ops::call_function_kw,
        CALL_FUNCTION_VAR_KW => ops::call_function_var_kw,

        RAISE_VARARGS => ops::raise_varargs_v2,

        IMPORT_NAME => ops::import_name,
        IMPORT_FROM => ops::import_from,
        IMPORT_STAR => ops::import_star,
        EXEC_STMT => ops::exec_stmt,

        RETURN_VALUE => ops::return_value,
        YIELD_VALUE => ops::yield_value,

        BUILD_CLASS => ops::build_class,

        PRINT_ITEM => ops::print_item,
        PRINT_ITEM_TO => ops::print_item_to,
        PRINT_NEWLINE => ops::print_newline,
        PRINT_NEWLINE_TO => ops::print_newline_to,
        PRINT_EXPR => ops::print_expr,
    }
    t
}

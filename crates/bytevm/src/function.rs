//! User-defined functions and bound methods.
//!
//! Grounded on the teacher's `function.rs`, which keeps a `Function` as a
//! thin handle (code id, defaults, closure) rather than inlining behavior;
//! the call machinery itself (`crate::call`) stays outside this struct, same
//! split as the teacher's `callable.rs` delegating to `run.rs`.

use std::rc::Rc;

use crate::code::Code;
use crate::intern::Name;
use crate::value::{Cell, Value};

/// A function object created by `MAKE_FUNCTION`/`MAKE_CLOSURE`.
#[derive(Debug)]
pub struct Function {
    pub name: Name,
    pub code: Rc<Code>,
    /// Positional/keyword defaults, in left-to-right parameter order, for the
    /// trailing parameters that have them (mirrors `MAKE_FUNCTION`'s default
    /// tuple argument).
    pub defaults: Vec<Value>,
    /// Keyword-only defaults, as `(name, value)` pairs (3.x `MAKE_FUNCTION`'s
    /// keyword-default dict argument).
    pub kwdefaults: Vec<(Name, Value)>,
    /// Parameter annotations, kept only so `__annotations__` can be
    /// reconstructed by the object model; the dispatch loop never inspects
    /// these itself.
    pub annotations: Vec<(Name, Value)>,
    /// One [`Cell`] per entry in `code.freevars`, supplied by `MAKE_CLOSURE`.
    /// Empty for a non-closure function.
    pub closure: Vec<Cell>,
}

impl Function {
    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.code.is_generator
    }
}

/// The result of `LOAD_METHOD`/attribute lookup on an instance: a function
/// with its receiver already bound as an implicit first argument.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Rc<Function>,
}

//! The frame: one call's execution record.
//!
//! Locals and globals are modeled as true mappings (`Name -> Value`), per
//! spec §3's explicit description ("globals (mapping name→Value), locals
//! (mapping name→Value)") — not the teacher's slot-indexed `Vec<Value>`
//! locals array, which only works because the teacher resolves every local
//! to a fixed slot at compile time. The cell array stays a `Vec<Cell>`
//! indexed by slot, exactly as §3 describes it ("cell array (ordered Cells
//! for cellvars ++ freevars)").
//!
//! `ahash::AHashMap` for the mapping type, matching the teacher's
//! `namespace.rs`, which uses the same hasher for locals/globals lookups.

use std::rc::Rc;

use ahash::AHashMap;

use crate::block::Block;
use crate::code::Code;
use crate::exception::GuestException;
use crate::intern::Name;
use crate::value::{Cell, Value};
use crate::why::FinallyMarker;

/// A module or function's global namespace, shared by every frame executing
/// in that scope (a function body and the module top level it was defined
/// in see the same globals).
pub type Globals = Rc<std::cell::RefCell<AHashMap<Name, Value>>>;

/// A frame's local namespace. Per-call, never shared.
pub type Locals = AHashMap<Name, Value>;

/// A read-only builtins namespace, shared by every frame in a VM instance.
pub type Builtins = Rc<AHashMap<Name, Value>>;

/// An execution record for one call, per spec §3.
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<Code>,
    pub globals: Globals,
    pub locals: Locals,
    pub builtins: Builtins,
    pub stack: Vec<Value>,
    pub blocks: Vec<Block>,
    pub pc: usize,
    pub line: u32,
    /// The pc of the instruction currently being dispatched; distinct from
    /// `pc`, which has already been advanced past it (§4.3 step 2).
    pub f_lasti: usize,
    /// Cells for `cellvars ++ freevars`, indexed by slot (§3).
    pub cells: Vec<Cell>,
    pub return_value: Value,
    pub last_exception: Option<GuestException>,
    /// True if this frame's code object is a generator body; checked by
    /// `RETURN_VALUE` (§4.5) to decide whether finishing also exhausts the
    /// owning generator.
    pub is_generator: bool,
    pub depth: usize,
    /// Set by the unwinder when control flows through a `finally`/`with`
    /// block for a reason `END_FINALLY` must act on that isn't a genuinely
    /// propagating exception (see [`FinallyMarker`]). Consumed (and cleared)
    /// by the next `END_FINALLY` this frame dispatches.
    pub finally_marker: Option<FinallyMarker>,
}

impl Frame {
    #[must_use]
    pub fn new(code: Rc<Code>, globals: Globals, locals: Locals, builtins: Builtins, depth: usize) -> Self {
        let ncells = code.cellvars.len() + code.freevars.len();
        let is_generator = code.is_generator;
        Self {
            code,
            globals,
            locals,
            builtins,
            stack: Vec::new(),
            blocks: Vec::new(),
            pc: 0,
            line: 0,
            f_lasti: 0,
            cells: (0..ncells).map(|_| Rc::new(std::cell::RefCell::new(Value::None))).collect(),
            return_value: Value::None,
            last_exception: None,
            is_generator,
            depth,
            finally_marker: None,
        }
    }

    pub fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    /// Pops and returns the top of the operand stack. A genuine pop-on-empty
    /// is a host bug (§4.1): callers that can't prove the stack is non-empty
    /// should treat `None` as a [`crate::exception::VmError`] condition.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    #[must_use]
    pub fn top(&self) -> Option<&Value> {
        self.stack.last()
    }

    /// `peek(1)` is the top of the stack.
    #[must_use]
    pub fn peek(&self, i: usize) -> Option<&Value> {
        if i == 0 || i > self.stack.len() {
            return None;
        }
        self.stack.get(self.stack.len() - i)
    }

    /// Removes and returns the i-th-from-top element, shifting everything
    /// above it down (i=1 is the top, equivalent to `pop`).
    pub fn pop_at(&mut self, i: usize) -> Option<Value> {
        if i == 0 || i > self.stack.len() {
            return None;
        }
        let idx = self.stack.len() - i;
        Some(self.stack.remove(idx))
    }

    /// Pops the last `n` items, returned in original push-order (bottom
    /// first): if the stack is `…,a,b,c`, `popn(3)` returns `[a,b,c]`.
    #[must_use]
    pub fn popn(&mut self, n: usize) -> Option<Vec<Value>> {
        if n > self.stack.len() {
            return None;
        }
        let split_at = self.stack.len() - n;
        Some(self.stack.split_off(split_at))
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn truncate_stack_to(&mut self, level: usize) {
        self.stack.truncate(level);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.code.name()
    }
}

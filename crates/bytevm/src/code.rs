//! The compiled code object consumed by the VM.
//!
//! Grounded on the teacher's `bytecode::code::Code` (same field-naming
//! convention). Per the external-decoder contract (§6), `instructions`
//! arrives with name/const indices and jump deltas already resolved — this
//! crate never decodes a raw `co_code` byte string itself.
//!
//! Unlike the teacher's `Code`, this one does not derive `serde::Serialize`:
//! `consts: Vec<Value>` transitively carries live runtime handles
//! (`HostCallable`'s `Rc<dyn Fn>`, `GeneratorHandle`) that have no sensible
//! wire format. A host compiler builds `Code` values directly rather than
//! deserializing them; the pieces that genuinely travel over the wire
//! unchanged — [`Opcode`], [`crate::opcode::CompareOp`], [`CodeFlags`],
//! [`DialectVersion`] — still derive it.

use crate::dialect::DialectVersion;
use crate::intern::Name;
use crate::opcode::Instruction;
use crate::value::Value;

/// A compiled code object: one per module, function, class body, or
/// generator body.
#[derive(Debug, Clone)]
pub struct Code {
    pub name: Name,
    pub filename: Name,
    pub first_lineno: u32,
    /// Already-decoded instruction stream, per the external-decoder contract.
    pub instructions: Vec<Instruction>,
    /// Maps each instruction index to the source line that produced it
    /// (the decoded equivalent of `co_lnotab`).
    pub line_table: Vec<u32>,
    pub consts: Vec<Value>,
    pub names: Vec<Name>,
    pub varnames: Vec<Name>,
    pub cellvars: Vec<Name>,
    pub freevars: Vec<Name>,
    pub argcount: u32,
    pub kwonlyargcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: CodeFlags,
    pub is_generator: bool,
    pub dialect: DialectVersion,
}

/// A narrowed `co_flags`: only the bits this crate's dispatch loop actually
/// branches on. Unrecognized source flags are the host compiler's concern,
/// not this interpreter's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CodeFlags {
    pub optimized: bool,
    pub newlocals: bool,
    pub varargs: bool,
    pub varkeywords: bool,
    pub generator: bool,
}

impl Code {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn line_for(&self, pc: usize) -> u32 {
        self.line_table.get(pc).copied().unwrap_or(self.first_lineno)
    }

    /// Index of a cellvar-or-freevar name within the combined cell array
    /// (`cellvars ++ freevars`, per §3's Frame attribute list).
    #[must_use]
    pub fn cell_index(&self, slot: u16) -> Option<&Name> {
        let slot = slot as usize;
        self.cellvars.get(slot).or_else(|| self.freevars.get(slot - self.cellvars.len()))
    }
}

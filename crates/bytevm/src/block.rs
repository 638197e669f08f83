//! The block stack: bookmarks for enclosing loop/try/with constructs.

use serde::{Deserialize, Serialize};

/// The kind of construct a [`Block`] bookmarks. `ExceptHandler` is pushed by
/// the unwinder itself (§4.4), never by a `SETUP_*` opcode directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Loop,
    SetupExcept,
    Finally,
    With,
    ExceptHandler,
}

/// `{kind, handler_offset, stack_level}`, per §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub handler_offset: usize,
    pub stack_level: usize,
}

impl Block {
    #[must_use]
    pub fn new(kind: BlockKind, handler_offset: usize, stack_level: usize) -> Self {
        Self {
            kind,
            handler_offset,
            stack_level,
        }
    }
}

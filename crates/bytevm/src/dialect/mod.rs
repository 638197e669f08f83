//! Per-dialect opcode dispatch tables.
//!
//! A dialect is a `HashMap<Opcode, OpHandler>`, not a Rust type of its own.
//! `build_table` constructs the table for a requested [`DialectVersion`] by
//! starting from 2.5's base table and applying each later dialect's
//! declarative diff in turn — "adds new handlers, removes obsolete ones,
//! overrides handlers whose semantics changed" (§4.6), exactly the
//! composition rule the design notes call for in place of the source's class
//! inheritance and attribute deletion.

mod v25;
mod v27;
mod v32;

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::exception::VmResult;
use crate::frame::Frame;
use crate::opcode::{Arg, Opcode};
use crate::vm::Vm;
use crate::why::Why;

/// The language version a `Vm` instance (and a `Code` object) targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectVersion {
    V25,
    V27,
    V32,
}

pub type OpHandler = fn(&mut Vm, &mut Frame, &Arg) -> VmResult<Why>;
pub type DispatchTable = HashMap<Opcode, OpHandler>;

/// A named diff applied on top of a parent dialect's table: add new
/// handlers, override existing ones, and drop opcodes this dialect no
/// longer supports.
struct Diff {
    add: &'static [(Opcode, OpHandler)],
    remove: &'static [Opcode],
}

fn apply_diff(table: &mut DispatchTable, diff: &Diff) {
    for op in diff.remove {
        table.remove(op);
    }
    for (op, handler) in diff.add {
        table.insert(*op, *handler);
    }
}

#[must_use]
pub fn build_table(version: DialectVersion) -> Rc<DispatchTable> {
    let mut table = v25::base_table();
    if matches!(version, DialectVersion::V27 | DialectVersion::V32) {
        apply_diff(&mut table, &v27::diff());
    }
    if matches!(version, DialectVersion::V32) {
        apply_diff(&mut table, &v32::diff());
    }
    Rc::new(table)
}

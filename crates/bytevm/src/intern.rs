//! Lightweight name handling shared by the decoded instruction stream and `Code` tables.
//!
//! Per the external-decoder contract (see [`crate::code`]), name and const indices
//! have already been resolved by the host compiler/decoder before they reach this
//! crate: a [`crate::opcode::Arg::Name`] carries the resolved name directly. This
//! module exists only to give that resolved name a single, cheap-to-clone type
//! used consistently across `Frame`, `Code` and the dispatch handlers.

use std::rc::Rc;

/// An interned-at-the-source identifier (variable, attribute, or module name).
///
/// `Rc<str>` rather than `String` so that cloning a name out of a `Code` table
/// (e.g. on every `LOAD_FAST`) is a refcount bump, not an allocation.
pub type Name = Rc<str>;

/// Interns a borrowed string into a [`Name`].
#[must_use]
pub fn intern(s: &str) -> Name {
    Rc::from(s)
}

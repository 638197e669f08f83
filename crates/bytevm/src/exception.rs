//! Guest exceptions and host (interpreter-bug) errors.
//!
//! Two tiers, per the design: guest exceptions flow through the why-code/block-stack
//! protocol and can be caught by guest `except` clauses; host errors
//! ([`VmError`]) signal bytecode corruption or an interpreter bug and are never
//! caught by guest code.

use std::fmt;
use std::rc::Rc;

use crate::intern::Name;
use crate::value::Value;

/// The built-in exception kinds the interpreter core needs to raise on the
/// guest's behalf. The full guest exception hierarchy (user-defined exception
/// classes, `__cause__`/`__context__` chaining) is part of the object model,
/// an external collaborator; this enum only carries what the dispatch loop
/// itself must be able to construct (name lookups, argument binding, division,
/// iteration exhaustion, import failures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcType {
    NameError,
    UnboundLocalError,
    TypeError,
    ImportError,
    AttributeError,
    KeyError,
    IndexError,
    ZeroDivisionError,
    StopIteration,
    ValueError,
    /// A guest-raised exception of a class this crate doesn't model natively
    /// (anything constructed via `Value::Exception` with a `type_name` that
    /// isn't one of the above). Carries the class name as given by the guest.
    Custom(Name),
}

impl fmt::Display for ExcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameError => write!(f, "NameError"),
            Self::UnboundLocalError => write!(f, "UnboundLocalError"),
            Self::TypeError => write!(f, "TypeError"),
            Self::ImportError => write!(f, "ImportError"),
            Self::AttributeError => write!(f, "AttributeError"),
            Self::KeyError => write!(f, "KeyError"),
            Self::IndexError => write!(f, "IndexError"),
            Self::ZeroDivisionError => write!(f, "ZeroDivisionError"),
            Self::StopIteration => write!(f, "StopIteration"),
            Self::ValueError => write!(f, "ValueError"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl ExcType {
    /// True iff `self` names the same exception type as `other`, or `other`
    /// is an ancestor in the (flattened, two-level) hierarchy this crate
    /// models. Used by `COMPARE_OP`'s `exception-match` test.
    #[must_use]
    pub fn is_subclass_of(&self, other: &ExcType) -> bool {
        self == other
    }
}

/// A guest exception in flight: the `(type, value, traceback)` triple the
/// spec's `last_exception` slot holds, minus the traceback (which belongs to
/// the host's frame-chain bookkeeping and is attached by [`crate::vm::Vm`]).
#[derive(Debug, Clone)]
pub struct GuestException {
    pub exc_type: ExcType,
    /// The human-readable argument of the exception (`str(ValueError('x'))`).
    pub message: Rc<str>,
    /// The exception instance as a guest-visible `Value::Exception`, so it can
    /// be pushed back onto the operand stack by the unwinder.
    pub value: Value,
}

impl GuestException {
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<Rc<str>>) -> Self {
        let message = message.into();
        let value = Value::exception(exc_type.clone(), message.clone());
        Self {
            exc_type,
            message,
            value,
        }
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exc_type, self.message)
    }
}

/// A fatal interpreter-bug condition: confused `END_FINALLY`, confused
/// `WITH_CLEANUP`, a block of the wrong kind popped, an unknown opcode, or
/// operand-stack underflow. Never recovered from; surfaced to the embedder
/// with the opcode/frame/pc that triggered it.
#[derive(Debug, Clone)]
pub struct VmError {
    pub message: String,
    pub frame_name: Rc<str>,
    pub pc: usize,
}

impl VmError {
    #[must_use]
    pub fn new(message: impl Into<String>, frame_name: Name, pc: usize) -> Self {
        Self {
            message: message.into(),
            frame_name,
            pc,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VirtualMachineError: {} (in '{}' at pc={})",
            self.message, self.frame_name, self.pc
        )
    }
}

impl std::error::Error for VmError {}

/// The result type threaded through every opcode handler and through the
/// `Vm` call machinery. `Err` is reserved for host bugs; guest exceptions are
/// represented as `Ok` values that set `frame.last_exception` and return a
/// [`crate::why::Why::Exception`] control-flow tag instead, so that the
/// unwinder (not `?`) decides what happens next.
pub type VmResult<T> = Result<T, VmError>;

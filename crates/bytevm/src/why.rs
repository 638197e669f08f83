//! The control-flow reason tag threaded between opcode handlers and the
//! unwinder.
//!
//! Replaces the source's string sentinels (`"return"`, `"continue"`, …) with
//! a closed variant, per the design note. `END_FINALLY`'s TOS polymorphism
//! (which can be `None`, a control-flow string, the sentinel `"silenced"`, or
//! an exception class) becomes [`FinallyMarker`], kept out of [`Value`]
//! entirely so the unwinder's `match` stays exhaustive and a stray
//! `FinallyMarker` can never leak onto the guest-visible operand stack.
//!
//! [`Value`]: crate::value::Value

/// The reason dispatch stopped flowing straight through to the next
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Why {
    /// Nothing in flight; keep dispatching the next instruction.
    None,
    Return,
    Break,
    /// Carries the absolute jump target the unwinder should resume at.
    Continue(usize),
    Exception,
    Reraise,
    Reexception,
    Yield,
    /// An `except-handler` block was popped because its handler's
    /// `__exit__`-style suppression succeeded.
    Silenced,
}

impl Why {
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// True for the why-codes §4.4 treats as "an exception is propagating",
    /// as opposed to ordinary loop/return control flow.
    #[must_use]
    pub fn is_exceptional(self) -> bool {
        matches!(self, Self::Exception | Self::Reraise | Self::Reexception)
    }
}

/// What the block unwinder left for a pending `END_FINALLY` to act on, when
/// control is flowing through a `finally`/`with` block for a reason other
/// than a genuinely propagating exception.
///
/// The source represents this by pushing a sentinel onto the operand stack
/// ahead of `END_FINALLY` (`None`, the string `"return"`, or `"silenced"`) and
/// dispatching on whatever `END_FINALLY` finds on TOS. A runtime `continue`
/// never reaches a `finally`/`with` block in the first place — per §4.4, only
/// a `loop` block gets special `continue` handling; a `continue` unwinding
/// through any other block kind just pops it and keeps unwinding, the same as
/// `break`. That TOS polymorphism is replaced here by this closed variant, carried on
/// [`crate::frame::Frame::finally_marker`] rather than the real (`Value`)
/// operand stack — per the design note that it stays "separate from Value".
/// The one case *not* covered here, a genuinely propagating exception
/// reaching a `finally`/`with` block, still uses the real stack exactly as
/// the source does: the unwinder pushes `(traceback, value, type)` as actual
/// `Value`s, and `END_FINALLY` finds no pending marker and reads them off
/// TOS instead (mirroring the source's "an exception class" TOS case).
#[derive(Debug, Clone, Copy)]
pub enum FinallyMarker {
    Return,
    Silenced,
}

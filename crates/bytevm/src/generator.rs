//! Resumable generator objects.
//!
//! A generator is a suspended [`crate::frame::Frame`] plus enough of the
//! caller's dialect/config context to resume it. Grounded in spirit on the
//! teacher's `RunSnapshot`/`RunProgress` resumable-execution pair (present in
//! `crates/monty/src/lib.rs`'s module list) — where the teacher snapshots an
//! entire run so a host external-function call can suspend and resume, this
//! crate narrows the same idea to the one place the spec actually requires
//! suspension: a single frame's `YIELD_VALUE`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::exception::ExcType;
use crate::frame::Frame;

/// What a resumed generator frame last did.
#[derive(Debug)]
pub enum GeneratorResume {
    /// Yielded a new value; the generator is still alive.
    Yielded(crate::value::Value),
    /// Ran to completion (`RETURN_VALUE` or fell off the end). The generator
    /// is now exhausted; any further `next()` raises `StopIteration`.
    Returned(crate::value::Value),
    /// Raised an exception that was not caught inside the generator body.
    Raised(ExcType, Rc<str>),
}

#[derive(Debug)]
enum GeneratorState {
    /// Not yet started: `next()`/`send(None)` runs the frame from pc 0.
    NotStarted(Frame),
    /// Suspended at a `YIELD_VALUE`; resuming sends a value in as that
    /// expression's result and continues from the following instruction.
    Suspended(Frame),
    Exhausted,
}

/// A cheap-to-clone handle to a generator's suspended state.
#[derive(Debug, Clone)]
pub struct GeneratorHandle(Rc<RefCell<GeneratorState>>);

impl GeneratorHandle {
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        Self(Rc::new(RefCell::new(GeneratorState::NotStarted(frame))))
    }

    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(*self.0.borrow(), GeneratorState::Exhausted)
    }

    /// Takes the frame out for the caller to drive one step of execution,
    /// leaving [`GeneratorState::Exhausted`] behind until it's put back by
    /// [`Self::resume`]. Returns `None` if the generator is already exhausted.
    ///
    /// The second element of the pair is the value a resumed `YIELD_VALUE`
    /// should receive on its operand stack — `Some(sent)` when resuming a
    /// frame that's actually suspended there, `None` when starting a frame
    /// fresh from pc 0, whose stack is legitimately empty and must stay that
    /// way until it executes its first instruction.
    pub fn take(&self, sent: crate::value::Value) -> Option<(Frame, Option<crate::value::Value>)> {
        let mut state = self.0.borrow_mut();
        match std::mem::replace(&mut *state, GeneratorState::Exhausted) {
            GeneratorState::NotStarted(frame) => Some((frame, None)),
            GeneratorState::Suspended(frame) => Some((frame, Some(sent))),
            GeneratorState::Exhausted => None,
        }
    }

    /// Puts a still-suspended frame back after a `YIELD_VALUE`.
    pub fn park(&self, frame: Frame) {
        *self.0.borrow_mut() = GeneratorState::Suspended(frame);
    }
}

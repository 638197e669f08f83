//! Frame activation, the dispatch loop, and block unwinding (§4.3, §4.4).

use std::rc::Rc;

use crate::block::BlockKind;
use crate::call;
use crate::code::Code;
use crate::dialect::{self, DialectVersion, DispatchTable};
use crate::exception::{ExcType, GuestException, VmError, VmResult};
use crate::frame::{Builtins, Frame, Globals, Locals};
use crate::generator::{GeneratorHandle, GeneratorResume};
use crate::host::{Importer, PrintSink};
use crate::intern::Name;
use crate::value::{Traceback, Value};
use crate::why::{FinallyMarker, Why};
use crate::VmConfig;

/// How a frame's dispatch loop exited (§4.3 step 5).
#[derive(Debug)]
pub enum FrameOutcome {
    Return(Value),
    Yield(Value),
    Raise(GuestException),
}

/// The top-level result of running a code object to completion, exposed to
/// the embedder per §6.
#[derive(Debug)]
pub enum RunOutcome {
    Value(Value),
    Generator(GeneratorHandle),
}

/// The VM: one dispatch table, one host importer, one print sink. Not
/// `Clone`/`Send` — §5 is explicit that an instance is single-threaded and
/// non-reentrant; running several guest programs concurrently means
/// constructing one `Vm` per thread.
pub struct Vm {
    pub config: VmConfig,
    pub importer: Box<dyn Importer>,
    pub print: Box<dyn PrintSink>,
    table: Rc<DispatchTable>,
}

impl Vm {
    #[must_use]
    pub fn new(config: VmConfig, importer: Box<dyn Importer>, print: Box<dyn PrintSink>) -> Self {
        let table = dialect::build_table(config.dialect);
        Self {
            config,
            importer,
            print,
            table,
        }
    }

    #[must_use]
    pub fn dialect(&self) -> DialectVersion {
        self.config.dialect
    }

    pub fn make_frame(&self, code: Rc<Code>, globals: Globals, locals: Locals, builtins: Builtins, depth: usize) -> Frame {
        Frame::new(code, globals, locals, builtins, depth)
    }

    /// The embedder-facing entry point (§6): runs a top-level code object to
    /// completion, or hands back a generator if the code object is one.
    pub fn run_code(
        &mut self,
        code: Rc<Code>,
        globals: Globals,
        builtins: Builtins,
        args: Vec<Value>,
    ) -> VmResult<Result<RunOutcome, GuestException>> {
        let mut frame = self.make_frame(code, globals, Locals::default(), builtins, 0);
        if let Err(exc) = call::bind_plain_args(&mut frame, args) {
            return Ok(Err(exc));
        }
        if frame.is_generator {
            return Ok(Ok(RunOutcome::Generator(GeneratorHandle::new(frame))));
        }
        match self.run_frame(&mut frame)? {
            FrameOutcome::Return(v) => Ok(Ok(RunOutcome::Value(v))),
            FrameOutcome::Yield(_) => Err(VmError::new(
                "non-generator frame produced a yield",
                frame.name().into(),
                frame.f_lasti,
            )),
            FrameOutcome::Raise(exc) => Ok(Err(exc)),
        }
    }

    /// Drives a generator one step (`next()`/`send(value)`).
    pub fn resume_generator(&mut self, handle: &GeneratorHandle, sent: Value) -> VmResult<GeneratorResume> {
        let Some((mut frame, sent)) = handle.take(sent) else {
            return Ok(GeneratorResume::Raised(
                ExcType::StopIteration,
                Rc::from("generator already exhausted"),
            ));
        };
        // Only a frame resuming after a real `YIELD_VALUE` has a pending
        // expression slot to fill; a `NotStarted` frame's stack is empty and
        // must stay that way until its first instruction runs.
        if let Some(sent) = sent {
            frame.push(sent);
        }
        match self.run_frame(&mut frame)? {
            FrameOutcome::Yield(v) => {
                handle.park(frame);
                Ok(GeneratorResume::Yielded(v))
            }
            FrameOutcome::Return(v) => Ok(GeneratorResume::Returned(v)),
            FrameOutcome::Raise(exc) => Ok(GeneratorResume::Raised(exc.exc_type, exc.message)),
        }
    }

    /// §4.3: decode, dispatch, and unwind until the frame returns, yields, or
    /// an exception escapes it.
    pub fn run_frame(&mut self, frame: &mut Frame) -> VmResult<FrameOutcome> {
        if let Some(limit) = self.config.max_recursion_depth {
            if frame.depth > limit {
                return Err(VmError::new("maximum recursion depth exceeded", frame.name().into(), frame.f_lasti));
            }
        }
        let _span = tracing::debug_span!("frame", code = %frame.name()).entered();
        loop {
            if frame.pc >= frame.code.instructions.len() {
                tracing::warn!("frame fell off the end of its instruction stream");
                return Ok(FrameOutcome::Return(Value::None));
            }
            frame.f_lasti = frame.pc;
            let instr = frame.code.instructions[frame.pc].clone();
            frame.line = frame.code.line_for(frame.pc);
            frame.pc += 1;
            tracing::trace!(opcode = %instr.opcode, pc = frame.f_lasti, "dispatch");

            let handler = *self.table.get(&instr.opcode).ok_or_else(|| {
                VmError::new(
                    format!("opcode {} is not defined for this dialect", instr.opcode),
                    frame.name().into(),
                    frame.f_lasti,
                )
            })?;

            let mut why = handler(self, frame, &instr.arg)?;
            while !why.is_none() {
                if unwind_exhausted(frame, &mut why) {
                    return self.exit_frame(frame, why);
                }
            }
        }
    }

    fn exit_frame(&mut self, frame: &mut Frame, why: Why) -> VmResult<FrameOutcome> {
        match why {
            Why::Return => Ok(FrameOutcome::Return(std::mem::replace(&mut frame.return_value, Value::None))),
            Why::Yield => Ok(FrameOutcome::Yield(std::mem::replace(&mut frame.return_value, Value::None))),
            Why::Exception | Why::Reraise | Why::Reexception => {
                let mut exc = frame
                    .last_exception
                    .take()
                    .ok_or_else(|| VmError::new("exception why with no last_exception set", frame.name().into(), frame.f_lasti))?;
                let tb = Rc::new(Traceback {
                    frame_name: frame.name().into(),
                    line: frame.line,
                    next: match &exc.value {
                        Value::Exception { traceback, .. } => traceback.clone(),
                        _ => None,
                    },
                });
                if let Value::Exception { traceback, .. } = &mut exc.value {
                    *traceback = Some(tb);
                }
                tracing::warn!(exc = %exc, frame = frame.name(), "guest exception propagating out of frame");
                Ok(FrameOutcome::Raise(exc))
            }
            other => Err(VmError::new(
                format!("block stack exhausted with unexpected why-code {other:?}"),
                frame.name().into(),
                frame.f_lasti,
            )),
        }
    }
}

/// One unwinding pass against the frame's block stack (§4.4). Returns `true`
/// once the block stack is exhausted without `why` being consumed, meaning
/// the frame itself must exit with `*why`. Returns `false` once some block
/// consumes it (clearing `*why` to `Why::None` and, usually, performing a
/// jump), so the caller's dispatch loop should resume.
fn unwind_exhausted(frame: &mut Frame, why: &mut Why) -> bool {
    loop {
        let Some(block) = frame.blocks.last().copied() else {
            return true;
        };
        match (*why, block.kind) {
            (Why::Continue(target), BlockKind::Loop) => {
                frame.pc = target;
                *why = Why::None;
                return false;
            }
            (Why::Continue(_), _) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
            }
            (Why::Break, BlockKind::Loop) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
                frame.pc = block.handler_offset;
                *why = Why::None;
                return false;
            }
            (Why::Break, _) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
            }
            (Why::Exception | Why::Reraise | Why::Reexception, BlockKind::SetupExcept | BlockKind::Finally | BlockKind::With) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
                frame.blocks.push(crate::block::Block::new(BlockKind::ExceptHandler, block.handler_offset, frame.stack_depth()));
                let exc = frame.last_exception.clone().expect("exception why-code with no last_exception");
                let tb_value = match &exc.value {
                    Value::Exception { traceback: Some(tb), .. } => Value::Traceback(tb.clone()),
                    _ => Value::None,
                };
                frame.push(tb_value);
                frame.push(exc.value.clone());
                frame.push(Value::str(exc.exc_type.to_string()));
                frame.pc = block.handler_offset;
                *why = Why::None;
                return false;
            }
            (Why::Exception | Why::Reraise | Why::Reexception, _) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
            }
            (Why::Silenced, BlockKind::ExceptHandler) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
                *why = Why::None;
                return false;
            }
            (Why::Silenced, _) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
            }
            (Why::Return | Why::Yield, BlockKind::Finally | BlockKind::With) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
                frame.finally_marker = Some(FinallyMarker::Return);
                frame.pc = block.handler_offset;
                *why = Why::None;
                return false;
            }
            (Why::Return | Why::Yield, _) => {
                frame.blocks.pop();
                frame.truncate_stack_to(block.stack_level);
            }
            (Why::None, _) => return false,
        }
    }
}

pub(crate) fn vm_err(frame: &Frame, message: impl Into<String>) -> VmError {
    VmError::new(message, frame.name().into(), frame.f_lasti)
}

pub(crate) fn raise(frame: &mut Frame, exc_type: ExcType, message: impl Into<Rc<str>>) -> Why {
    frame.last_exception = Some(GuestException::new(exc_type, message));
    Why::Exception
}

pub(crate) fn raise_name_error(frame: &mut Frame, name: &Name) -> Why {
    raise(frame, ExcType::NameError, format!("name '{name}' is not defined"))
}

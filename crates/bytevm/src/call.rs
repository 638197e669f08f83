//! Argument packing/binding for `CALL_FUNCTION` variants, and
//! `MAKE_FUNCTION`/`MAKE_CLOSURE` construction (§4.5, §4.8 Call machinery).

use std::rc::Rc;

use crate::code::Code;
use crate::exception::{ExcType, GuestException, VmResult};
use crate::frame::Frame;
use crate::function::Function;
use crate::intern::Name;
use crate::value::Value;
use crate::vm::{vm_err, Vm};
use crate::why::Why;

/// Binds a plain positional argument list directly into a fresh frame's
/// locals, by `varnames` position. Used by [`crate::vm::Vm::run_code`]'s
/// top-level entry point, which is handed a plain `Vec<Value>` rather than
/// going through the `CALL_FUNCTION` stack protocol.
pub fn bind_plain_args(frame: &mut Frame, args: Vec<Value>) -> Result<(), GuestException> {
    if args.len() > frame.code.varnames.len() {
        return Err(GuestException::new(
            ExcType::TypeError,
            format!(
                "{}() takes {} positional arguments but {} were given",
                frame.name(),
                frame.code.varnames.len(),
                args.len()
            ),
        ));
    }
    for (name, value) in frame.code.varnames.clone().into_iter().zip(args) {
        frame.locals.insert(name, value);
    }
    Ok(())
}

/// Pops a code object off `frame`'s stack, as both `MAKE_FUNCTION` and
/// `MAKE_CLOSURE` do first (§4.5).
fn pop_code(frame: &mut Frame) -> VmResult<Rc<Code>> {
    match frame.pop() {
        Some(Value::Code(c)) => Ok(c),
        _ => Err(vm_err(frame, "MAKE_FUNCTION/MAKE_CLOSURE: expected a code object on TOS")),
    }
}

fn pop_closure_cells(frame: &mut Frame) -> VmResult<Vec<crate::value::Cell>> {
    match frame.pop() {
        Some(Value::Tuple(t)) => t
            .iter()
            .map(|v| match v {
                Value::Cell(c) => Ok(c.clone()),
                _ => Err(vm_err(frame, "MAKE_CLOSURE: closure tuple contained a non-cell value")),
            })
            .collect(),
        _ => Err(vm_err(frame, "MAKE_CLOSURE: expected a tuple of cells below the code object")),
    }
}

/// `MAKE_FUNCTION(argc)` in 2.x: pops code, then `argc` default values.
pub fn make_function_v2(frame: &mut Frame, argc: u32, closure: bool) -> VmResult<Why> {
    let code = pop_code(frame)?;
    let closure_cells = if closure { pop_closure_cells(frame)? } else { Vec::new() };
    let defaults = frame
        .popn(argc as usize)
        .ok_or_else(|| vm_err(frame, "MAKE_FUNCTION: stack underflow popping defaults"))?;
    let func = Function {
        name: code.name.clone(),
        code,
        defaults,
        kwdefaults: Vec::new(),
        annotations: Vec::new(),
        closure: closure_cells,
    };
    frame.push(Value::Function(Rc::new(func)));
    Ok(Why::None)
}

/// `MAKE_FUNCTION(argc)` in 3.x, `argc` packed as
/// `(annotate_count<<16) | (kw_default_count<<8) | default_count`. Our 3.2
/// dialect predates the 3.3 qualified-name push, so that step is skipped.
pub fn make_function_v3(
    frame: &mut Frame,
    defaults_n: u16,
    kwdefaults_n: u16,
    annotations_n: u16,
    closure: bool,
) -> VmResult<Why> {
    let code = pop_code(frame)?;
    let closure_cells = if closure { pop_closure_cells(frame)? } else { Vec::new() };

    let mut annotations = Vec::new();
    if annotations_n > 0 {
        let values = frame
            .popn((annotations_n - 1) as usize)
            .ok_or_else(|| vm_err(frame, "MAKE_FUNCTION: stack underflow popping annotation values"))?;
        let names = match frame.pop() {
            Some(Value::Tuple(t)) => t,
            _ => return Err(vm_err(frame, "MAKE_FUNCTION: expected annotation-names tuple")),
        };
        for (name, value) in names.iter().zip(values) {
            let Value::Str(name) = name else {
                return Err(vm_err(frame, "MAKE_FUNCTION: annotation name was not a string"));
            };
            annotations.push((name.clone(), value));
        }
    }

    let mut kwdefaults = Vec::new();
    let kwpairs = frame
        .popn(2 * kwdefaults_n as usize)
        .ok_or_else(|| vm_err(frame, "MAKE_FUNCTION: stack underflow popping keyword defaults"))?;
    for pair in kwpairs.chunks_exact(2) {
        let Value::Str(name) = &pair[0] else {
            return Err(vm_err(frame, "MAKE_FUNCTION: keyword-default name was not a string"));
        };
        kwdefaults.push((name.clone(), pair[1].clone()));
    }

    let defaults = frame
        .popn(defaults_n as usize)
        .ok_or_else(|| vm_err(frame, "MAKE_FUNCTION: stack underflow popping defaults"))?;

    let func = Function {
        name: code.name.clone(),
        code,
        defaults,
        kwdefaults,
        annotations,
        closure: closure_cells,
    };
    frame.push(Value::Function(Rc::new(func)));
    Ok(Why::None)
}

/// The positional/keyword arguments `CALL_FUNCTION` and its variants collect
/// off the stack before invoking a callable.
#[derive(Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(Name, Value)>,
}

/// Pops `CALL_FUNCTION(argc)`'s operands: keyword pairs, then positional
/// args, then the callable (§4.5). Variants additionally splice in a
/// `*args` sequence and/or merge a `**kwargs` mapping, popped in that order
/// below the keyword pairs.
pub fn pop_call_args(
    frame: &mut Frame,
    positional_count: u16,
    keyword_count: u16,
    has_var: bool,
    has_kw: bool,
) -> VmResult<(Value, CallArgs)> {
    let kwmap = if has_kw {
        match frame.pop() {
            Some(Value::Dict(d)) => {
                let mut out = Vec::new();
                for (k, v) in d.borrow().iter() {
                    let Value::Str(name) = k else {
                        return Err(vm_err(frame, "CALL_FUNCTION_KW: keyword mapping had a non-string key"));
                    };
                    out.push((name.clone(), v.clone()));
                }
                out
            }
            _ => return Err(vm_err(frame, "CALL_FUNCTION_KW: expected a mapping on TOS")),
        }
    } else {
        Vec::new()
    };

    let mut args = CallArgs::default();
    let kwpairs = frame
        .popn(2 * keyword_count as usize)
        .ok_or_else(|| vm_err(frame, "CALL_FUNCTION: stack underflow popping keyword pairs"))?;
    for pair in kwpairs.chunks_exact(2) {
        let Value::Str(name) = &pair[0] else {
            return Err(vm_err(frame, "CALL_FUNCTION: keyword argument name was not a string"));
        };
        args.keyword.push((name.clone(), pair[1].clone()));
    }
    args.keyword.extend(kwmap);

    let var_extra = if has_var {
        match frame.pop() {
            Some(Value::Tuple(t)) => (*t).clone(),
            Some(Value::List(l)) => l.borrow().clone(),
            _ => return Err(vm_err(frame, "CALL_FUNCTION_VAR: expected a sequence on TOS")),
        }
    } else {
        Vec::new()
    };

    let positional = frame
        .popn(positional_count as usize)
        .ok_or_else(|| vm_err(frame, "CALL_FUNCTION: stack underflow popping positional args"))?;
    args.positional = positional;
    args.positional.extend(var_extra);

    let callable = frame.pop().ok_or_else(|| vm_err(frame, "CALL_FUNCTION: stack underflow popping callable"))?;
    Ok((callable, args))
}

/// Runs `callable(args)` to completion (recursing into [`Vm::run_frame`] for
/// user-defined functions), returning the why-code to leave on the caller's
/// dispatch loop: `Why::None` with the result pushed, or `Why::Exception`
/// with `caller.last_exception` set (§4.3 step 5 — "pop the frame and
/// rethrow to the caller frame's unwinder").
pub fn call_value(vm: &mut Vm, caller: &mut Frame, callable: Value, mut args: CallArgs) -> VmResult<Why> {
    match callable {
        Value::Function(function) => call_function(vm, caller, &function, args),
        Value::BoundMethod(bound) => {
            args.positional.insert(0, bound.receiver.clone());
            call_function(vm, caller, &bound.function, args)
        }
        Value::HostCallable(host) => match (host.f)(&args.positional, &args.keyword.iter().map(|(k, v)| (Value::str(k.clone()), v.clone())).collect::<Vec<_>>()) {
            Ok(v) => {
                caller.push(v);
                Ok(Why::None)
            }
            Err((exc_type, message)) => Ok(crate::vm::raise(caller, exc_type, message)),
        },
        // Instantiating a class (running `__new__`/`__init__` to produce an
        // instance object) is the object model's job, out of scope per §1 —
        // this core only builds and calls functions, not instances.
        Value::Class(class) => Ok(crate::vm::raise(
            caller,
            ExcType::TypeError,
            format!("class '{}' is not callable by the interpreter core", class.name),
        )),
        other => Ok(crate::vm::raise(caller, ExcType::TypeError, format!("'{}' object is not callable", other.py_type()))),
    }
}

fn call_function(vm: &mut Vm, caller: &mut Frame, function: &Rc<Function>, args: CallArgs) -> VmResult<Why> {
    let code = function.code.clone();
    let builtins = caller.builtins.clone();
    let globals = caller.globals.clone();
    let mut callee = Frame::new(code, globals, crate::frame::Locals::default(), builtins, caller.depth + 1);
    match bind_args_into(&mut callee, function, args) {
        Ok(()) => {}
        Err(exc) => {
            caller.last_exception = Some(exc);
            return Ok(Why::Exception);
        }
    }
    if callee.is_generator {
        caller.push(Value::Generator(crate::generator::GeneratorHandle::new(callee)));
        return Ok(Why::None);
    }
    match vm.run_frame(&mut callee)? {
        crate::vm::FrameOutcome::Return(v) => {
            caller.push(v);
            Ok(Why::None)
        }
        crate::vm::FrameOutcome::Yield(_) => Err(vm_err(caller, "non-generator callee produced a yield")),
        crate::vm::FrameOutcome::Raise(exc) => {
            caller.last_exception = Some(exc);
            Ok(Why::Exception)
        }
    }
}

/// Binds `args` into `callee`'s locals per `function`'s parameter list,
/// applying positional/keyword defaults and `*args`/`**kwargs` collection,
/// and wires up `callee`'s cell array from `function.closure` for its
/// freevars (the cellvars are fresh per-call).
fn bind_args_into(callee: &mut Frame, function: &Rc<Function>, args: CallArgs) -> Result<(), GuestException> {
    let code = &function.code;
    let nargs = code.argcount as usize;
    let nkwonly = code.kwonlyargcount as usize;

    if args.positional.len() > nargs && !code.flags.varargs {
        return Err(GuestException::new(
            ExcType::TypeError,
            format!("{}() takes {} positional arguments but {} were given", function.name, nargs, args.positional.len()),
        ));
    }

    for (i, value) in args.positional.iter().take(nargs).enumerate() {
        callee.locals.insert(code.varnames[i].clone(), value.clone());
    }
    let mut next_slot = nargs + nkwonly;
    if code.flags.varargs {
        let extra: Vec<Value> = args.positional.iter().skip(nargs).cloned().collect();
        if let Some(name) = code.varnames.get(next_slot) {
            callee.locals.insert(name.clone(), Value::tuple(extra));
        }
        next_slot += 1;
    }

    let mut remaining_kw: Vec<(Name, Value)> = Vec::new();
    for (name, value) in args.keyword {
        if code.varnames[..nargs + nkwonly].iter().any(|n| *n == name) {
            callee.locals.insert(name, value);
        } else {
            remaining_kw.push((name, value));
        }
    }
    if code.flags.varkeywords {
        if let Some(name) = code.varnames.get(next_slot) {
            callee
                .locals
                .insert(name.clone(), Value::dict(remaining_kw.into_iter().map(|(k, v)| (Value::str(k), v)).collect()));
        }
    } else if let Some((name, _)) = remaining_kw.first() {
        return Err(GuestException::new(ExcType::TypeError, format!("{}() got an unexpected keyword argument '{name}'", function.name)));
    }

    let ndefaults = function.defaults.len();
    for (i, default) in function.defaults.iter().enumerate() {
        let param_idx = nargs - ndefaults + i;
        if let Some(name) = code.varnames.get(param_idx) {
            callee.locals.entry(name.clone()).or_insert_with(|| default.clone());
        }
    }
    for (name, default) in &function.kwdefaults {
        callee.locals.entry(name.clone()).or_insert_with(|| default.clone());
    }

    for slot in code.varnames.iter().take(nargs + nkwonly) {
        if !callee.locals.contains_key(slot) {
            return Err(GuestException::new(ExcType::TypeError, format!("{}() missing required argument: '{slot}'", function.name)));
        }
    }

    for (i, cell) in function.closure.iter().enumerate() {
        let slot = code.cellvars.len() + i;
        if slot < callee.cells.len() {
            callee.cells[slot] = cell.clone();
        }
    }

    Ok(())
}

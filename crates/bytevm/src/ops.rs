//! Opcode handler implementations, shared across dialects (§4.5). Dialect
//! tables (`crate::dialect::v25`/`v27`/`v32`) wire these into per-opcode
//! entries; handlers whose semantics genuinely differ between dialects get a
//! distinct `_v2`/`v3` function instead of branching internally on the
//! active dialect.

use std::rc::Rc;

use crate::block::{Block, BlockKind};
use crate::call;
use crate::exception::{ExcType, GuestException, VmResult};
use crate::frame::Frame;
use crate::opcode::{Arg, CompareOp};
use crate::value::Value;
use crate::vm::{raise, raise_name_error, vm_err, Vm};
use crate::why::{FinallyMarker, Why};

fn arg_count(arg: &Arg) -> u32 {
    match arg {
        Arg::Count(n) => *n,
        _ => 0,
    }
}

fn arg_name<'a>(frame: &Frame, arg: &'a Arg) -> VmResult<&'a crate::intern::Name> {
    match arg {
        Arg::Name(n) => Ok(n),
        _ => Err(vm_err(frame, "expected a Name argument")),
    }
}

fn arg_jump(frame: &Frame, arg: &Arg) -> VmResult<usize> {
    match arg {
        Arg::Jump(target) => Ok(*target),
        _ => Err(vm_err(frame, "expected a Jump argument")),
    }
}

fn arg_slot(frame: &Frame, arg: &Arg) -> VmResult<u16> {
    match arg {
        Arg::Slot(s) => Ok(*s),
        _ => Err(vm_err(frame, "expected a Slot argument")),
    }
}

fn pop2(frame: &mut Frame) -> VmResult<(Value, Value)> {
    let items = frame.popn(2).ok_or_else(|| vm_err(frame, "stack underflow (expected 2 values)"))?;
    let mut it = items.into_iter();
    Ok((it.next().unwrap(), it.next().unwrap()))
}

fn pop1(frame: &mut Frame) -> VmResult<Value> {
    frame.pop().ok_or_else(|| vm_err(frame, "stack underflow (expected 1 value)"))
}

// ---------------------------------------------------------------------
// Stack manipulation
// ---------------------------------------------------------------------

pub fn pop_top(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    pop1(frame)?;
    Ok(Why::None)
}

pub fn nop(_vm: &mut Vm, _frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    Ok(Why::None)
}

pub fn rot_two(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let (a, b) = pop2(frame)?;
    frame.push(b);
    frame.push(a);
    Ok(Why::None)
}

pub fn rot_three(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(3).ok_or_else(|| vm_err(frame, "ROT_THREE: stack underflow"))?;
    let [a, b, c]: [Value; 3] = items.try_into().unwrap();
    frame.push(c);
    frame.push(a);
    frame.push(b);
    Ok(Why::None)
}

pub fn rot_four(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(4).ok_or_else(|| vm_err(frame, "ROT_FOUR: stack underflow"))?;
    let [a, b, c, d]: [Value; 4] = items.try_into().unwrap();
    frame.push(d);
    frame.push(a);
    frame.push(b);
    frame.push(c);
    Ok(Why::None)
}

pub fn dup_top(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = frame.top().cloned().ok_or_else(|| vm_err(frame, "DUP_TOP: stack underflow"))?;
    frame.push(v);
    Ok(Why::None)
}

pub fn dup_top_two(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(2).ok_or_else(|| vm_err(frame, "DUP_TOP_TWO: stack underflow"))?;
    frame.push(items[0].clone());
    frame.push(items[1].clone());
    frame.push(items[0].clone());
    frame.push(items[1].clone());
    Ok(Why::None)
}

/// `DUP_TOPX(count)`, 2.x only. The source's implementation is flagged in
/// the design notes as suspicious (it appears to duplicate the popped items
/// twice rather than using `count`, iterating a fixed `[1,2]` regardless of
/// the actual argument). We implement the documented intended semantics —
/// duplicate the top `count` items, in order, leaving the original copy
/// beneath them — rather than reproduce the apparent bug, since §1's
/// non-goals are explicit that this core targets "correctness of observable
/// behavior", not bit-for-bit reproduction of a likely-unintentional defect.
pub fn dup_topx(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let count = arg_count(arg) as usize;
    if !(1..=5).contains(&count) {
        return Err(vm_err(frame, "DUP_TOPX: count out of range"));
    }
    let items = frame.popn(count).ok_or_else(|| vm_err(frame, "DUP_TOPX: stack underflow"))?;
    for v in &items {
        frame.push(v.clone());
    }
    for v in items {
        frame.push(v);
    }
    Ok(Why::None)
}

// ---------------------------------------------------------------------
// Unary / binary / compare
// ---------------------------------------------------------------------

pub fn unary_positive(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    match v {
        Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
            frame.push(v);
            Ok(Why::None)
        }
        other => Ok(raise(frame, ExcType::TypeError, format!("bad operand type for unary +: '{}'", other.py_type()))),
    }
}

pub fn unary_negative(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    match v {
        Value::Int(i) => {
            frame.push(Value::Int(-i));
            Ok(Why::None)
        }
        Value::Float(f) => {
            frame.push(Value::Float(-f));
            Ok(Why::None)
        }
        Value::Bool(b) => {
            frame.push(Value::Int(-i64::from(b)));
            Ok(Why::None)
        }
        other => Ok(raise(frame, ExcType::TypeError, format!("bad operand type for unary -: '{}'", other.py_type()))),
    }
}

pub fn unary_not(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    frame.push(Value::Bool(!v.py_bool()));
    Ok(Why::None)
}

pub fn unary_invert(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    match v {
        Value::Int(i) => {
            frame.push(Value::Int(!i));
            Ok(Why::None)
        }
        other => Ok(raise(frame, ExcType::TypeError, format!("bad operand type for unary ~: '{}'", other.py_type()))),
    }
}

macro_rules! binary_op {
    ($name:ident, $method:ident, $opsym:expr) => {
        pub fn $name(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
            let (a, b) = pop2(frame)?;
            match a.$method(&b) {
                Some(result) => {
                    frame.push(result);
                    Ok(Why::None)
                }
                None => Ok(raise(
                    frame,
                    ExcType::TypeError,
                    format!("unsupported operand type(s) for {}: '{}' and '{}'", $opsym, a.py_type(), b.py_type()),
                )),
            }
        }
    };
}

binary_op!(binary_add, py_add, "+");
binary_op!(binary_subtract, py_sub, "-");
binary_op!(binary_multiply, py_mul, "*");
binary_op!(inplace_add, py_add, "+=");
binary_op!(inplace_subtract, py_sub, "-=");
binary_op!(inplace_multiply, py_mul, "*=");

macro_rules! binary_op_fallible {
    ($name:ident, $method:ident, $opsym:expr) => {
        pub fn $name(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
            let (a, b) = pop2(frame)?;
            match a.$method(&b) {
                Ok(Some(result)) => {
                    frame.push(result);
                    Ok(Why::None)
                }
                Ok(None) => Ok(raise(
                    frame,
                    ExcType::TypeError,
                    format!("unsupported operand type(s) for {}: '{}' and '{}'", $opsym, a.py_type(), b.py_type()),
                )),
                Err(exc_type) => Ok(raise(frame, exc_type, "division by zero")),
            }
        }
    };
}

binary_op_fallible!(binary_divide, py_div, "/");
binary_op_fallible!(binary_true_divide, py_div, "/");
binary_op_fallible!(binary_floor_divide, py_floordiv, "//");
binary_op_fallible!(binary_modulo, py_mod, "%");
binary_op_fallible!(inplace_modulo, py_mod, "%=");

pub fn binary_power(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let (a, b) = pop2(frame)?;
    match a.py_pow(&b) {
        Some(result) => {
            frame.push(result);
            Ok(Why::None)
        }
        None => Ok(raise(frame, ExcType::TypeError, format!("unsupported operand type(s) for ** or pow(): '{}' and '{}'", a.py_type(), b.py_type()))),
    }
}

fn int_bitop(frame: &mut Frame, f: impl Fn(i64, i64) -> i64, opsym: &str) -> VmResult<Why> {
    let (a, b) = pop2(frame)?;
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => {
            frame.push(Value::Int(f(*x, *y)));
            Ok(Why::None)
        }
        _ => Ok(raise(frame, ExcType::TypeError, format!("unsupported operand type(s) for {opsym}: '{}' and '{}'", a.py_type(), b.py_type()))),
    }
}

pub fn binary_and(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    int_bitop(frame, |a, b| a & b, "&")
}
pub fn binary_or(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    int_bitop(frame, |a, b| a | b, "|")
}
pub fn binary_xor(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    int_bitop(frame, |a, b| a ^ b, "^")
}
pub fn binary_lshift(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    int_bitop(frame, |a, b| a << b, "<<")
}
pub fn binary_rshift(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    int_bitop(frame, |a, b| a >> b, ">>")
}

pub fn binary_subscr(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let (obj, key) = pop2(frame)?;
    match obj.py_getitem(&key) {
        Ok(v) => {
            frame.push(v);
            Ok(Why::None)
        }
        Err(exc_type) => Ok(raise(frame, exc_type, format!("{}", describe_subscript_error(&exc_type, &obj, &key)))),
    }
}

fn describe_subscript_error(exc_type: &ExcType, obj: &Value, key: &Value) -> String {
    match exc_type {
        ExcType::IndexError => format!("{} index out of range", obj.py_type()),
        ExcType::KeyError => key.py_repr(),
        _ => format!("'{}' object is not subscriptable", obj.py_type()),
    }
}

/// `STORE_SUBSCR` pops `(val, obj, subscr)` in push-order.
pub fn store_subscr(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(3).ok_or_else(|| vm_err(frame, "STORE_SUBSCR: stack underflow"))?;
    let [val, obj, subscr] = <[Value; 3]>::try_from(items).unwrap();
    match obj.py_setitem(&subscr, val) {
        Ok(()) => Ok(Why::None),
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object does not support item assignment", obj.py_type()))),
    }
}

pub fn delete_subscr(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let (obj, subscr) = pop2(frame)?;
    match obj.py_delitem(&subscr) {
        Ok(()) => Ok(Why::None),
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object doesn't support item deletion", obj.py_type()))),
    }
}

pub fn compare_op(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let Arg::Compare(op) = arg else {
        return Err(vm_err(frame, "COMPARE_OP: expected a Compare argument"));
    };
    let (a, b) = pop2(frame)?;
    let result = match op {
        CompareOp::Eq => Value::Bool(a.py_eq(&b)),
        CompareOp::Ne => Value::Bool(!a.py_eq(&b)),
        CompareOp::Lt => Value::Bool(matches!(a.py_cmp(&b), Some(std::cmp::Ordering::Less))),
        CompareOp::Le => Value::Bool(matches!(a.py_cmp(&b), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))),
        CompareOp::Gt => Value::Bool(matches!(a.py_cmp(&b), Some(std::cmp::Ordering::Greater))),
        CompareOp::Ge => Value::Bool(matches!(a.py_cmp(&b), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))),
        CompareOp::Is => Value::Bool(a.is(&b)),
        CompareOp::IsNot => Value::Bool(!a.is(&b)),
        CompareOp::In => Value::Bool(contains(&b, &a)),
        CompareOp::NotIn => Value::Bool(!contains(&b, &a)),
        CompareOp::ExceptionMatch => Value::Bool(exception_match(&a, &b)),
    };
    frame.push(result);
    Ok(Why::None)
}

fn contains(container: &Value, item: &Value) -> bool {
    match container {
        Value::Tuple(t) => t.iter().any(|v| v.py_eq(item)),
        Value::List(l) => l.borrow().iter().any(|v| v.py_eq(item)),
        Value::Set(s) => s.borrow().iter().any(|v| v.py_eq(item)),
        Value::Dict(d) => d.borrow().iter().any(|(k, _)| k.py_eq(item)),
        Value::Str(s) => {
            if let Value::Str(needle) = item {
                s.contains(needle.as_ref())
            } else {
                false
            }
        }
        _ => false,
    }
}

/// `exception-match(x,y)` is true iff x is a subclass of Exception and of y
/// (§4.5). `x` is the raised exception's type (a `Value::Str` carrying the
/// type name, per how the unwinder represents it on the stack); `y` is the
/// guest `except` clause's target type.
fn exception_match(x: &Value, y: &Value) -> bool {
    let Value::Str(x_name) = x else { return false };
    let x_type = parse_exc_type(x_name);
    match y {
        Value::Str(y_name) => x_type.is_subclass_of(&parse_exc_type(y_name)),
        Value::Exception { exc_type, .. } => x_type.is_subclass_of(exc_type),
        Value::Tuple(alts) => alts.iter().any(|alt| exception_match(x, alt)),
        _ => false,
    }
}

pub(crate) fn parse_exc_type(name: &str) -> ExcType {
    match name {
        "NameError" => ExcType::NameError,
        "UnboundLocalError" => ExcType::UnboundLocalError,
        "TypeError" => ExcType::TypeError,
        "ImportError" => ExcType::ImportError,
        "AttributeError" => ExcType::AttributeError,
        "KeyError" => ExcType::KeyError,
        "IndexError" => ExcType::IndexError,
        "ZeroDivisionError" => ExcType::ZeroDivisionError,
        "StopIteration" => ExcType::StopIteration,
        "ValueError" => ExcType::ValueError,
        other => ExcType::Custom(Rc::from(other)),
    }
}

// ---------------------------------------------------------------------
// Names, fast locals, attributes, closures
// ---------------------------------------------------------------------

pub fn load_const(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let Arg::Const(v) = arg else {
        return Err(vm_err(frame, "LOAD_CONST: expected a Const argument"));
    };
    frame.push(v.clone());
    Ok(Why::None)
}

pub fn load_name(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    if let Some(v) = frame.locals.get(&name) {
        frame.push(v.clone());
        return Ok(Why::None);
    }
    if let Some(v) = frame.globals.borrow().get(&name) {
        frame.push(v.clone());
        return Ok(Why::None);
    }
    if let Some(v) = frame.builtins.get(&name) {
        frame.push(v.clone());
        return Ok(Why::None);
    }
    Ok(raise_name_error(frame, &name))
}

pub fn load_global(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    if let Some(v) = frame.globals.borrow().get(&name) {
        frame.push(v.clone());
        return Ok(Why::None);
    }
    if let Some(v) = frame.builtins.get(&name) {
        frame.push(v.clone());
        return Ok(Why::None);
    }
    Ok(raise_name_error(frame, &name))
}

pub fn load_fast(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    match frame.locals.get(&name) {
        Some(v) => {
            frame.push(v.clone());
            Ok(Why::None)
        }
        None => Ok(raise(frame, ExcType::UnboundLocalError, format!("local variable '{name}' referenced before assignment"))),
    }
}

pub fn store_name(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let v = pop1(frame)?;
    frame.locals.insert(name, v);
    Ok(Why::None)
}

pub fn store_global(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let v = pop1(frame)?;
    frame.globals.borrow_mut().insert(name, v);
    Ok(Why::None)
}

pub fn store_fast(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let v = pop1(frame)?;
    frame.locals.insert(name, v);
    Ok(Why::None)
}

pub fn delete_name(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    if frame.locals.remove(&name).is_none() {
        return Ok(raise_name_error(frame, &name));
    }
    Ok(Why::None)
}

pub fn delete_global(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    if frame.globals.borrow_mut().remove(&name).is_none() {
        return Ok(raise_name_error(frame, &name));
    }
    Ok(Why::None)
}

pub fn delete_fast(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    if frame.locals.remove(&name).is_none() {
        return Ok(raise(frame, ExcType::UnboundLocalError, format!("local variable '{name}' referenced before assignment")));
    }
    Ok(Why::None)
}

pub fn load_attr(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let obj = pop1(frame)?;
    match obj.py_getattr(&name) {
        Ok(v) => {
            frame.push(v);
            Ok(Why::None)
        }
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object has no attribute '{name}'", obj.py_type()))),
    }
}

pub fn store_attr(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let (val, obj) = pop2(frame)?;
    match obj.py_setattr(&name, val) {
        Ok(()) => Ok(Why::None),
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object has no attribute '{name}'", obj.py_type()))),
    }
}

pub fn delete_attr(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let obj = pop1(frame)?;
    match obj.py_delattr(&name) {
        Ok(()) => Ok(Why::None),
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object has no attribute '{name}'", obj.py_type()))),
    }
}

pub fn load_closure(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let slot = arg_slot(frame, arg)? as usize;
    let cell = frame.cells.get(slot).cloned().ok_or_else(|| vm_err(frame, "LOAD_CLOSURE: slot out of range"))?;
    frame.push(Value::Cell(cell));
    Ok(Why::None)
}

pub fn load_deref(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let slot = arg_slot(frame, arg)? as usize;
    let cell = frame.cells.get(slot).cloned().ok_or_else(|| vm_err(frame, "LOAD_DEREF: slot out of range"))?;
    let value = cell.borrow().clone();
    if matches!(value, Value::None) {
        // Distinguishing "unbound cell" from "bound to None" would require a
        // tri-state cell; the spec's Cell is a plain "mutable slot holding
        // one Value" (§2), so an unbound cell simply reads as None here.
    }
    frame.push(value);
    Ok(Why::None)
}

pub fn store_deref(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let slot = arg_slot(frame, arg)? as usize;
    let v = pop1(frame)?;
    let cell = frame.cells.get(slot).cloned().ok_or_else(|| vm_err(frame, "STORE_DEREF: slot out of range"))?;
    *cell.borrow_mut() = v;
    Ok(Why::None)
}

pub fn delete_deref(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let slot = arg_slot(frame, arg)? as usize;
    let cell = frame.cells.get(slot).cloned().ok_or_else(|| vm_err(frame, "DELETE_DEREF: slot out of range"))?;
    *cell.borrow_mut() = Value::None;
    Ok(Why::None)
}

pub fn load_build_class(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let _ = vm;
    frame.push(Value::HostCallable(crate::value::HostCallable {
        name: Rc::from("__build_class__"),
        f: Rc::new(build_class_impl),
    }));
    Ok(Why::None)
}

/// 3.x class construction: `LOAD_BUILD_CLASS` pushes this, then
/// `CALL_FUNCTION(func, name, *bases)` invokes it with the class body's
/// compiled function, the class name, and its base classes.
fn build_class_impl(args: &[Value], _kwargs: &[(Value, Value)]) -> Result<Value, (ExcType, String)> {
    let Some(Value::Function(_body)) = args.first() else {
        return Err((ExcType::TypeError, "__build_class__: first argument must be a function".to_owned()));
    };
    let Some(Value::Str(name)) = args.get(1) else {
        return Err((ExcType::TypeError, "__build_class__: second argument must be a string".to_owned()));
    };
    let bases = args[2..]
        .iter()
        .map(|v| match v {
            Value::Class(c) => Ok(c.clone()),
            other => Err((ExcType::TypeError, format!("bases must be classes, not '{}'", other.py_type()))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Class(Rc::new(crate::value::Class {
        name: name.clone(),
        bases,
        dict: std::cell::RefCell::new(Vec::new()),
    })))
}

/// `BUILD_CLASS`, 2.x only: pops `(methods, bases, name)` in push-order.
pub fn build_class(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(3).ok_or_else(|| vm_err(frame, "BUILD_CLASS: stack underflow"))?;
    let [name, bases, methods] = <[Value; 3]>::try_from(items).unwrap();
    let Value::Str(name) = name else {
        return Err(vm_err(frame, "BUILD_CLASS: expected a string name"));
    };
    let bases = match bases {
        Value::Tuple(t) => t
            .iter()
            .filter_map(|v| match v {
                Value::Class(c) => Some(c.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    let dict = match methods {
        Value::Dict(d) => d
            .borrow()
            .iter()
            .filter_map(|(k, v)| match k {
                Value::Str(s) => Some((s.clone(), v.clone())),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    frame.push(Value::Class(Rc::new(crate::value::Class {
        name,
        bases,
        dict: std::cell::RefCell::new(dict),
    })));
    Ok(Why::None)
}

// ---------------------------------------------------------------------
// Building containers
// ---------------------------------------------------------------------

pub fn build_tuple(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let n = arg_count(arg) as usize;
    let items = frame.popn(n).ok_or_else(|| vm_err(frame, "BUILD_TUPLE: stack underflow"))?;
    frame.push(Value::tuple(items));
    Ok(Why::None)
}

pub fn build_list(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let n = arg_count(arg) as usize;
    let items = frame.popn(n).ok_or_else(|| vm_err(frame, "BUILD_LIST: stack underflow"))?;
    frame.push(Value::list(items));
    Ok(Why::None)
}

pub fn build_set(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let n = arg_count(arg) as usize;
    let items = frame.popn(n).ok_or_else(|| vm_err(frame, "BUILD_SET: stack underflow"))?;
    let mut set: Vec<Value> = Vec::new();
    for item in items {
        if !set.iter().any(|v| v.py_eq(&item)) {
            set.push(item);
        }
    }
    frame.push(Value::Set(Rc::new(std::cell::RefCell::new(set))));
    Ok(Why::None)
}

/// `BUILD_MAP(size)`: size is a hint and ignored (§4.5).
pub fn build_map(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    frame.push(Value::dict(Vec::new()));
    Ok(Why::None)
}

/// `UNPACK_SEQUENCE(count)`: pops a sequence and pushes its items right-to-left,
/// so the `STORE_*` instructions that follow see them in left-to-right order.
pub fn unpack_sequence(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let count = arg_count(arg) as usize;
    let seq = pop1(frame)?;
    let items: Vec<Value> = match &seq {
        Value::Tuple(t) => (**t).clone(),
        Value::List(l) => l.borrow().clone(),
        Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
        _ => return Ok(raise(frame, ExcType::TypeError, format!("cannot unpack non-sequence {}", seq.py_type()))),
    };
    if items.len() != count {
        let message = if items.len() < count {
            format!("need more than {} values to unpack", items.len())
        } else {
            "too many values to unpack".to_owned()
        };
        return Ok(raise(frame, ExcType::ValueError, message));
    }
    for item in items.into_iter().rev() {
        frame.push(item);
    }
    Ok(Why::None)
}

/// `LIST_APPEND(count)`: pops TOS and appends it to the list `count` items
/// below the new top, leaving the list itself on the stack. Used to build
/// list comprehensions one element at a time.
pub fn list_append(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let count = arg_count(arg) as usize;
    let val = pop1(frame)?;
    let target = frame.peek(count).cloned().ok_or_else(|| vm_err(frame, "LIST_APPEND: stack underflow"))?;
    match target {
        Value::List(l) => {
            l.borrow_mut().push(val);
            Ok(Why::None)
        }
        other => Ok(raise(frame, ExcType::TypeError, format!("LIST_APPEND target is a {}, not a list", other.py_type()))),
    }
}

/// `STORE_MAP` pops `(map, val, key)`, assigns, pushes map back.
pub fn store_map(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let items = frame.popn(3).ok_or_else(|| vm_err(frame, "STORE_MAP: stack underflow"))?;
    let [map, val, key] = <[Value; 3]>::try_from(items).unwrap();
    if let Value::Dict(_) = &map {
        let _ = map.py_setitem(&key, val);
    }
    frame.push(map);
    Ok(Why::None)
}

pub fn build_slice(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let n = arg_count(arg) as usize;
    let items = frame.popn(n).ok_or_else(|| vm_err(frame, "BUILD_SLICE: stack underflow"))?;
    let as_i64 = |v: &Value| -> Option<i64> {
        match v {
            Value::Int(i) => Some(*i),
            Value::None => None,
            _ => None,
        }
    };
    let slice = match n {
        2 => crate::value::Slice {
            start: as_i64(&items[0]),
            stop: as_i64(&items[1]),
            step: None,
        },
        3 => crate::value::Slice {
            start: as_i64(&items[0]),
            stop: as_i64(&items[1]),
            step: as_i64(&items[2]),
        },
        _ => return Err(vm_err(frame, "BUILD_SLICE: expected 2 or 3 arguments")),
    };
    frame.push(Value::Slice(Rc::new(slice)));
    Ok(Why::None)
}

// ---------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------

pub fn jump_forward(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    frame.pc = arg_jump(frame, arg)?;
    Ok(Why::None)
}

pub fn jump_absolute(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    frame.pc = arg_jump(frame, arg)?;
    Ok(Why::None)
}

pub fn jump_if_true(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if frame.top().ok_or_else(|| vm_err(frame, "JUMP_IF_TRUE: stack underflow"))?.py_bool() {
        frame.pc = target;
    }
    Ok(Why::None)
}

pub fn jump_if_false(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if !frame.top().ok_or_else(|| vm_err(frame, "JUMP_IF_FALSE: stack underflow"))?.py_bool() {
        frame.pc = target;
    }
    Ok(Why::None)
}

pub fn jump_if_true_or_pop(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if frame.top().ok_or_else(|| vm_err(frame, "JUMP_IF_TRUE_OR_POP: stack underflow"))?.py_bool() {
        frame.pc = target;
    } else {
        frame.pop();
    }
    Ok(Why::None)
}

pub fn jump_if_false_or_pop(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if !frame.top().ok_or_else(|| vm_err(frame, "JUMP_IF_FALSE_OR_POP: stack underflow"))?.py_bool() {
        frame.pc = target;
    } else {
        frame.pop();
    }
    Ok(Why::None)
}

pub fn pop_jump_if_true(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if pop1(frame)?.py_bool() {
        frame.pc = target;
    }
    Ok(Why::None)
}

pub fn pop_jump_if_false(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    if !pop1(frame)?.py_bool() {
        frame.pc = target;
    }
    Ok(Why::None)
}

pub fn get_iter(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    match v.py_iter() {
        Ok(it) => {
            frame.push(it);
            Ok(Why::None)
        }
        Err(exc_type) => Ok(raise(frame, exc_type, format!("'{}' object is not iterable", v.py_type()))),
    }
}

/// `FOR_ITER(delta)` peeks the iterator; on success pushes the next value;
/// on exhaustion pops the iterator and jumps (§4.5).
pub fn for_iter(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    let it = frame.top().ok_or_else(|| vm_err(frame, "FOR_ITER: stack underflow"))?;
    match it.iter_next() {
        Some(v) => {
            frame.push(v);
            Ok(Why::None)
        }
        None => {
            frame.pop();
            frame.pc = target;
            Ok(Why::None)
        }
    }
}

// ---------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------

fn setup_block(frame: &mut Frame, kind: BlockKind, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    frame.blocks.push(Block::new(kind, target, frame.stack_depth()));
    Ok(Why::None)
}

pub fn setup_loop(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    setup_block(frame, BlockKind::Loop, arg)
}
pub fn setup_except(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    setup_block(frame, BlockKind::SetupExcept, arg)
}
pub fn setup_finally(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    setup_block(frame, BlockKind::Finally, arg)
}

pub fn pop_block(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let block = frame.blocks.pop().ok_or_else(|| vm_err(frame, "POP_BLOCK: block stack underflow"))?;
    frame.truncate_stack_to(block.stack_level);
    Ok(Why::None)
}

/// 3.x's non-exceptional cleanup for a `try`/`except` block: pops the
/// except-handler block the unwinder pushed and restores the stack to where
/// it stood before the exception triple was pushed. 2.x bytecode does the
/// same job with an explicit `POP_TOP` per triple element instead.
pub fn pop_except(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let block = frame.blocks.pop().ok_or_else(|| vm_err(frame, "POP_EXCEPT: block stack underflow"))?;
    if block.kind != BlockKind::ExceptHandler {
        return Err(vm_err(frame, "POP_EXCEPT: popped block is not an except handler"));
    }
    frame.truncate_stack_to(block.stack_level);
    Ok(Why::None)
}

pub fn break_loop(_vm: &mut Vm, _frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    Ok(Why::Break)
}

pub fn continue_loop(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    Ok(Why::Continue(target))
}

// ---------------------------------------------------------------------
// With / finally / exceptions
// ---------------------------------------------------------------------

/// `SETUP_WITH(dest)` in the 2.x dialect (pushes a `with` block kind; 3.x
/// overrides this to push a `finally` block, since 3.x folds `with` cleanup
/// into the ordinary finally machinery — see `dialect::v32`).
pub fn setup_with_v2(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    setup_with_impl(vm, frame, arg, BlockKind::With)
}

pub fn setup_with_v3(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    setup_with_impl(vm, frame, arg, BlockKind::Finally)
}

fn setup_with_impl(vm: &mut Vm, frame: &mut Frame, arg: &Arg, kind: BlockKind) -> VmResult<Why> {
    let target = arg_jump(frame, arg)?;
    let ctxmgr = pop1(frame)?;
    let exit = match ctxmgr.py_getattr(&Rc::from("__exit__")) {
        Ok(v) => v,
        Err(exc_type) => return Ok(raise(frame, exc_type, "context manager has no __exit__")),
    };
    let enter = match ctxmgr.py_getattr(&Rc::from("__enter__")) {
        Ok(v) => v,
        Err(exc_type) => return Ok(raise(frame, exc_type, "context manager has no __enter__")),
    };
    frame.push(exit);
    let why = call::call_value(vm, frame, enter, call::CallArgs::default())?;
    if !why.is_none() {
        return Ok(why);
    }
    let enter_result = pop1(frame)?;
    frame.blocks.push(Block::new(kind, target, frame.stack_depth()));
    frame.push(enter_result);
    Ok(Why::None)
}

/// `WITH_CLEANUP`. Inspects the buried `__exit__` (pushed by `SETUP_WITH`)
/// and the current unwind state to decide whether to call it with a real
/// exception triple or with `(None, None, None)`.
pub fn with_cleanup(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    // In our redesign, an exception reaching this block already went through
    // the unwinder's except-handler entry, so the real stack holds
    // `(traceback, value, type)` with `type` on top precisely when there is
    // one to clean up; otherwise `frame.finally_marker` carries the pending
    // return/continue reason and there is nothing exceptional on the stack.
    if frame.finally_marker.is_some() {
        let exit = pop1(frame)?;
        let args = call::CallArgs {
            positional: vec![Value::None, Value::None, Value::None],
            keyword: Vec::new(),
        };
        let why = call::call_value(vm, frame, exit, args)?;
        if !why.is_none() {
            return Ok(why);
        }
        pop1(frame)?; // discard __exit__'s return value; nothing to suppress
        return Ok(Why::None);
    }

    match frame.top().cloned() {
        Some(Value::Str(_)) => {
            // Exception triple: type is TOS, then value, then traceback, then __exit__.
            let items = frame.popn(3).ok_or_else(|| vm_err(frame, "WITH_CLEANUP: stack underflow"))?;
            let [tb, value, exc_type_name] = <[Value; 3]>::try_from(items).unwrap();
            let exit = pop1(frame)?;
            let exc_type_v = match &exc_type_name {
                Value::Str(s) => Value::str(s.clone()),
                _ => Value::None,
            };
            let args = call::CallArgs {
                positional: vec![exc_type_v, value.clone(), tb.clone()],
                keyword: Vec::new(),
            };
            let why = call::call_value(vm, frame, exit, args)?;
            if !why.is_none() {
                return Ok(why);
            }
            let suppress = pop1(frame)?.py_bool();
            if suppress {
                frame.last_exception = None;
                if matches!(vm.dialect(), crate::dialect::DialectVersion::V25 | crate::dialect::DialectVersion::V27) {
                    Ok(Why::None)
                } else {
                    frame.finally_marker = Some(FinallyMarker::Silenced);
                    Ok(Why::None)
                }
            } else {
                // Not suppressed: put the triple back for END_FINALLY to re-raise.
                frame.push(tb);
                frame.push(value);
                frame.push(exc_type_name);
                Ok(Why::None)
            }
        }
        _ => {
            let exit = pop1(frame)?;
            let args = call::CallArgs {
                positional: vec![Value::None, Value::None, Value::None],
                keyword: Vec::new(),
            };
            let why = call::call_value(vm, frame, exit, args)?;
            if !why.is_none() {
                return Ok(why);
            }
            pop1(frame)?;
            Ok(Why::None)
        }
    }
}

/// `END_FINALLY`. See [`crate::why::FinallyMarker`]'s docs for the full
/// rationale of this implementation's split between the side-channel marker
/// and the real operand stack.
pub fn end_finally(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    if let Some(marker) = frame.finally_marker.take() {
        return Ok(match marker {
            FinallyMarker::Return => Why::Return,
            FinallyMarker::Silenced => {
                if let Some(b) = frame.blocks.pop() {
                    frame.truncate_stack_to(b.stack_level);
                }
                Why::None
            }
        });
    }
    let tos = pop1(frame)?;
    match tos {
        Value::None => Ok(Why::None),
        Value::Str(type_name) => {
            let value = pop1(frame)?;
            let tb_v = pop1(frame)?;
            let exc_type = parse_exc_type(&type_name);
            let message = match &value {
                Value::Exception { message, .. } => message.clone(),
                other => Rc::from(other.py_str()),
            };
            let traceback = match tb_v {
                Value::Traceback(t) => Some(t),
                _ => None,
            };
            frame.last_exception = Some(GuestException {
                exc_type: exc_type.clone(),
                message: message.clone(),
                value: Value::Exception { exc_type, message, traceback },
            });
            Ok(Why::Reraise)
        }
        _ => Err(vm_err(frame, "END_FINALLY: confused stack state")),
    }
}

/// `RAISE_VARARGS(argc)`, 2.x semantics.
pub fn raise_varargs_v2(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let argc = arg_count(arg);
    match argc {
        0 => match frame.last_exception.clone() {
            Some(exc) => {
                frame.last_exception = Some(exc);
                Ok(Why::Reraise)
            }
            None => Ok(raise(frame, ExcType::TypeError, "no active exception to re-raise")),
        },
        1 => {
            let exctype = pop1(frame)?;
            Ok(do_raise_normalized(frame, exctype, None, false))
        }
        2 => {
            let (exctype, val) = pop2(frame)?;
            Ok(do_raise_normalized(frame, exctype, Some(val), false))
        }
        3 => {
            let items = frame.popn(3).ok_or_else(|| vm_err(frame, "RAISE_VARARGS: stack underflow"))?;
            let [exctype, val, tb] = <[Value; 3]>::try_from(items).unwrap();
            let has_tb = !matches!(tb, Value::None);
            Ok(do_raise_normalized(frame, exctype, Some(val), has_tb))
        }
        _ => Err(vm_err(frame, "RAISE_VARARGS: argc out of range")),
    }
}

fn do_raise_normalized(frame: &mut Frame, exctype: Value, val: Option<Value>, reraise: bool) -> Why {
    let (exc_type, message) = match (&exctype, &val) {
        (Value::Exception { exc_type, message, .. }, _) => (exc_type.clone(), message.clone()),
        (Value::Str(name), Some(v)) => (parse_exc_type(name), Rc::from(v.py_str())),
        (Value::Str(name), None) => (parse_exc_type(name), Rc::from("")),
        _ => (ExcType::TypeError, Rc::from("exceptions must derive from BaseException")),
    };
    frame.last_exception = Some(GuestException::new(exc_type, message));
    if reraise {
        Why::Reraise
    } else {
        Why::Exception
    }
}

/// `RAISE_VARARGS(argc)`, 3.x semantics: `argc` ∈ {0,1,2}; `argc=2` pops
/// `cause` then `exc`.
pub fn raise_varargs_v3(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let argc = arg_count(arg);
    match argc {
        0 => match frame.last_exception.clone() {
            Some(_) => Ok(Why::Reraise),
            None => Ok(raise(frame, ExcType::TypeError, "no active exception to re-raise")),
        },
        1 => {
            let exc = pop1(frame)?;
            Ok(do_raise_normalized(frame, exc, None, false))
        }
        2 => {
            let (exc, _cause) = pop2(frame)?;
            Ok(do_raise_normalized(frame, exc, None, false))
        }
        _ => Err(vm_err(frame, "RAISE_VARARGS: argc out of range")),
    }
}

// ---------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------

pub fn import_name(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let (level_v, fromlist_v) = pop2(frame)?;
    let level = match level_v {
        Value::Int(i) => i,
        _ => 0,
    };
    let fromlist: Vec<crate::intern::Name> = match fromlist_v {
        Value::Tuple(t) => t
            .iter()
            .filter_map(|v| match v {
                Value::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    match vm.importer.import(&name, &frame.globals, &fromlist, level) {
        Ok(module) => {
            frame.push(module);
            Ok(Why::None)
        }
        Err(exc) => {
            frame.last_exception = Some(exc);
            Ok(Why::Exception)
        }
    }
}

/// `IMPORT_FROM(name)`: missing attribute sets `last_exception` and returns
/// `"reexception"`. The source fabricates a bogus traceback triple for this
/// case; we leave the traceback unset (`None`) rather than invent one, since
/// the design notes flag its exact shape as unclear and nothing downstream
/// in this crate inspects it before `Vm::exit_frame` attaches a real one.
pub fn import_from(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let name = arg_name(frame, arg)?.clone();
    let module = frame.top().cloned().ok_or_else(|| vm_err(frame, "IMPORT_FROM: stack underflow"))?;
    match module.py_getattr(&name) {
        Ok(v) => {
            frame.push(v);
            Ok(Why::None)
        }
        Err(_) => {
            frame.last_exception = Some(GuestException::new(ExcType::ImportError, name.to_string()));
            Ok(Why::Reexception)
        }
    }
}

pub fn import_star(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let module = pop1(frame)?;
    if let Value::Module(m) = &module {
        let entries: Vec<(crate::intern::Name, Value)> = m.dict.borrow().iter().filter(|(n, _)| !n.starts_with('_')).cloned().collect();
        for (name, value) in entries {
            frame.locals.insert(name, value);
        }
        Ok(Why::None)
    } else {
        Ok(raise(frame, ExcType::TypeError, "IMPORT_STAR requires a module"))
    }
}

/// `exec stmt in globs, locs` (2.x only; retired in 3.x, §4.6). Compiling and
/// running an arbitrary string of source is the host compiler's job (§1);
/// this core only honors the opcode's stack contract, consuming its three
/// operands without executing anything.
pub fn exec_stmt(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    frame.popn(3).ok_or_else(|| vm_err(frame, "EXEC_STMT: stack underflow"))?;
    Ok(Why::None)
}

// ---------------------------------------------------------------------
// Returns / yields
// ---------------------------------------------------------------------

pub fn return_value(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    frame.return_value = v;
    Ok(Why::Return)
}

pub fn yield_value(_vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    frame.return_value = v;
    Ok(Why::Yield)
}

// ---------------------------------------------------------------------
// Functions / calls
// ---------------------------------------------------------------------

pub fn make_function_2(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    call::make_function_v2(frame, arg_count(arg), false)
}

pub fn make_closure_2(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    call::make_function_v2(frame, arg_count(arg), true)
}

fn make_function_args(frame: &Frame, arg: &Arg) -> VmResult<(u16, u16, u16)> {
    match arg {
        Arg::MakeFunctionArgs { defaults, kwdefaults, annotations } => Ok((*defaults, *kwdefaults, *annotations)),
        _ => Err(vm_err(frame, "MAKE_FUNCTION: expected a MakeFunctionArgs argument")),
    }
}

pub fn make_function_3(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let (d, k, a) = make_function_args(frame, arg)?;
    call::make_function_v3(frame, d, k, a, false)
}

pub fn make_closure_3(_vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    let (d, k, a) = make_function_args(frame, arg)?;
    call::make_function_v3(frame, d, k, a, true)
}

fn call_args_shape(arg: &Arg) -> Option<(u16, u16)> {
    match arg {
        Arg::CallArgs { positional, keyword } => Some((*positional, *keyword)),
        _ => None,
    }
}

fn dispatch_call(vm: &mut Vm, frame: &mut Frame, arg: &Arg, has_var: bool, has_kw: bool) -> VmResult<Why> {
    let (positional, keyword) = call_args_shape(arg).ok_or_else(|| vm_err(frame, "CALL_FUNCTION: expected a CallArgs argument"))?;
    let (callable, args) = call::pop_call_args(frame, positional, keyword, has_var, has_kw)?;
    if let Value::BoundMethod(bound) = &callable {
        // §4.5: verify isinstance(receiver, bound_class); our simplified
        // object model has no instance objects to check against a class, so
        // this reduces to "the receiver is present", already guaranteed by
        // construction.
        let _ = bound;
    }
    call::call_value(vm, frame, callable, args)
}

pub fn call_function(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    dispatch_call(vm, frame, arg, false, false)
}
pub fn call_function_var(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    dispatch_call(vm, frame, arg, true, false)
}
pub fn call_function_kw(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    dispatch_call(vm, frame, arg, false, true)
}
pub fn call_function_var_kw(vm: &mut Vm, frame: &mut Frame, arg: &Arg) -> VmResult<Why> {
    dispatch_call(vm, frame, arg, true, true)
}

// ---------------------------------------------------------------------
// Classic printing (2.x only), preserving the softspace protocol
// ---------------------------------------------------------------------

fn softspace_write(vm: &mut Vm, frame: &mut Frame, s: &str) {
    let softspace = frame.locals.get(&Rc::from("__softspace__")).map(Value::py_bool).unwrap_or(false);
    if softspace {
        vm.print.write_str(" ");
    }
    vm.print.write_str(s);
    let ends_non_space_whitespace = s.chars().last().is_some_and(|c| c.is_whitespace() && c != ' ');
    frame.locals.insert(Rc::from("__softspace__"), Value::Bool(!ends_non_space_whitespace));
}

pub fn print_item(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    let s = v.py_str();
    softspace_write(vm, frame, &s);
    Ok(Why::None)
}

pub fn print_item_to(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let (v, _sink) = pop2(frame)?;
    let s = v.py_str();
    softspace_write(vm, frame, &s);
    Ok(Why::None)
}

pub fn print_newline(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    vm.print.write_str("\n");
    frame.locals.insert(Rc::from("__softspace__"), Value::Bool(false));
    Ok(Why::None)
}

pub fn print_newline_to(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let _sink = pop1(frame)?;
    vm.print.write_str("\n");
    frame.locals.insert(Rc::from("__softspace__"), Value::Bool(false));
    Ok(Why::None)
}

pub fn print_expr(vm: &mut Vm, frame: &mut Frame, _arg: &Arg) -> VmResult<Why> {
    let v = pop1(frame)?;
    vm.print.write_str(&v.py_repr());
    vm.print.write_str("\n");
    Ok(Why::None)
}

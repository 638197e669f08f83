//! The dynamically-typed runtime value.
//!
//! Mirrors the teacher's hybrid design (immediate values inline, containers on
//! the heap) but swaps the teacher's manual arena + explicit refcounting for
//! plain `Rc`/`RefCell`, per the design note that cell/container aliasing
//! should use "reference-counted shared ownership with interior mutability...
//! not a raw cyclic pointer graph". `Value::clone()` is therefore always
//! correct and cheap; there is no separate `clone_with_heap`/`drop_with_heap`
//! dance to get right.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::code::Code;
use crate::exception::ExcType;
use crate::function::{BoundMethod, Function};
use crate::generator::GeneratorHandle;
use crate::intern::Name;

/// A mutable indirection shared between an enclosing frame and the closures
/// that capture one of its locals. Reading/writing through a `Cell` from any
/// frame that holds it is visible to every other holder, with no
/// synchronization needed since the VM is single-threaded (§5).
pub type Cell = Rc<RefCell<Value>>;

/// A growable sequence backing `list`.
pub type ListData = Rc<RefCell<Vec<Value>>>;

/// An immutable sequence backing `tuple`.
pub type TupleData = Rc<Vec<Value>>;

/// A mapping backing `dict`. Stored as an insertion-ordered association list
/// rather than a `HashMap` because `Value` equality follows Python's
/// cross-type numeric rules (`1 == True`) rather than `Hash`/`Eq`, and dict
/// sizes in the guest programs this core is built to run are small.
pub type DictData = Rc<RefCell<Vec<(Value, Value)>>>;

/// A set backing `set`, same rationale as `DictData`.
pub type SetData = Rc<RefCell<Vec<Value>>>;

/// The state behind an iterator object, as produced by `GET_ITER` and
/// consumed by `FOR_ITER`. Not named in the spec's data model explicitly,
/// but covered by its "a few wrappers" allowance alongside `Generator`:
/// `FOR_ITER` needs *some* first-class value to peek and advance (§4.5), and
/// every iterable this core knows about (list/tuple/str/dict/set/range) is
/// finite and eagerly snapshottable, so a simple index into a materialized
/// sequence is enough.
#[derive(Debug)]
pub struct IterState {
    items: Vec<Value>,
    pos: usize,
}

pub type IterHandle = Rc<RefCell<IterState>>;

impl IterState {
    fn next(&mut self) -> Option<Value> {
        let v = self.items.get(self.pos).cloned();
        if v.is_some() {
            self.pos += 1;
        }
        v
    }
}

/// A `slice(start, stop, step)` object built by `BUILD_SLICE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

/// A class object built by `BUILD_CLASS` (2.x) or `__build_class__` (3.x).
#[derive(Debug)]
pub struct Class {
    pub name: Name,
    pub bases: Vec<Rc<Class>>,
    pub dict: RefCell<Vec<(Name, Value)>>,
}

impl Class {
    #[must_use]
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.bases.iter().any(|b| b.is_subclass_of(other))
    }
}

/// A module object, the runtime result of `IMPORT_NAME`.
#[derive(Debug)]
pub struct Module {
    pub name: Name,
    pub dict: RefCell<Vec<(Name, Value)>>,
}

/// One frame's worth of traceback information, linked to its caller.
#[derive(Debug)]
pub struct Traceback {
    pub frame_name: Name,
    pub line: u32,
    pub next: Option<Rc<Traceback>>,
}

/// A host-provided callable, reached when the VM calls a value that is
/// neither a builtin, an exception type, nor a user-defined function. The
/// host intercepts the call; any error it raises is converted to a guest
/// exception at the call site (`crate::vm`), never allowed to propagate as a
/// Rust panic.
pub type HostFn = dyn Fn(&[Value], &[(Value, Value)]) -> Result<Value, (ExcType, String)>;

#[derive(Clone)]
pub struct HostCallable {
    pub name: Name,
    pub f: Rc<HostFn>,
}

impl fmt::Debug for HostCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostCallable({})", self.name)
    }
}

/// The primary runtime value type.
///
/// A tagged sum over host primitives plus the handful of interpreter-level
/// object kinds the spec's data model names: `Function`, `BoundMethod`,
/// `Cell`, `Class`, `Module`, `Traceback`, and `Exception`. `Generator` is an
/// additional wrapper beyond the spec's explicit list (it says "a few
/// wrappers"); it is how `run_code`'s generator return value and `next`/`send`
/// are represented as a first-class guest value, mirroring how the teacher
/// represents user-defined functions (`Value::Function(FunctionId)`) as an
/// indirection rather than inlining the whole callable.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<Vec<u8>>),
    Tuple(TupleData),
    List(ListData),
    Dict(DictData),
    Set(SetData),
    Slice(Rc<Slice>),
    Cell(Cell),
    Function(Rc<Function>),
    BoundMethod(Rc<BoundMethod>),
    Class(Rc<Class>),
    Module(Rc<Module>),
    Traceback(Rc<Traceback>),
    Exception {
        exc_type: ExcType,
        message: Rc<str>,
        traceback: Option<Rc<Traceback>>,
    },
    HostCallable(HostCallable),
    Generator(GeneratorHandle),
    Iterator(IterHandle),
    /// A code object, as pushed onto the stack by `LOAD_CONST` of a nested
    /// code constant ahead of `MAKE_FUNCTION`/`MAKE_CLOSURE`. Not named in
    /// the spec's Value list, but required by §4.5's "`MAKE_FUNCTION`...
    /// pops code" — the instruction stream has nowhere else to carry a code
    /// object through to the opcode that consumes it.
    Code(Rc<Code>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.py_repr())
    }
}

impl Value {
    #[must_use]
    pub fn exception(exc_type: ExcType, message: Rc<str>) -> Self {
        Self::Exception {
            exc_type,
            message,
            traceback: None,
        }
    }

    #[must_use]
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::new(items))
    }

    #[must_use]
    pub fn dict(items: Vec<(Value, Value)>) -> Self {
        Self::Dict(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn py_type(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Tuple(_) => "tuple",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Slice(_) => "slice",
            Self::Cell(_) => "cell",
            Self::Function(_) | Self::BoundMethod(_) | Self::HostCallable(_) => "function",
            Self::Class(_) => "type",
            Self::Module(_) => "module",
            Self::Traceback(_) => "traceback",
            Self::Exception { .. } => "Exception",
            Self::Generator(_) => "generator",
            Self::Iterator(_) => "iterator",
            Self::Code(_) => "code",
        }
    }

    /// A stable identity value, loosely standing in for CPython's `id()`.
    #[must_use]
    pub fn id(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Bool(b) => 1 + usize::from(*b),
            Self::Str(s) => Rc::as_ptr(s).cast::<()>() as usize,
            Self::Bytes(b) => Rc::as_ptr(b).cast::<()>() as usize,
            Self::Tuple(t) => Rc::as_ptr(t).cast::<()>() as usize,
            Self::List(l) => Rc::as_ptr(l).cast::<()>() as usize,
            Self::Dict(d) => Rc::as_ptr(d).cast::<()>() as usize,
            Self::Set(s) => Rc::as_ptr(s).cast::<()>() as usize,
            Self::Cell(c) => Rc::as_ptr(c).cast::<()>() as usize,
            Self::Function(f) => Rc::as_ptr(f).cast::<()>() as usize,
            Self::BoundMethod(m) => Rc::as_ptr(m).cast::<()>() as usize,
            Self::Class(c) => Rc::as_ptr(c).cast::<()>() as usize,
            Self::Module(m) => Rc::as_ptr(m).cast::<()>() as usize,
            Self::Traceback(t) => Rc::as_ptr(t).cast::<()>() as usize,
            Self::HostCallable(h) => Rc::as_ptr(&h.f).cast::<()>() as usize,
            Self::Generator(g) => g.id(),
            Self::Iterator(it) => Rc::as_ptr(it).cast::<()>() as usize,
            Self::Code(c) => Rc::as_ptr(c).cast::<()>() as usize,
            Self::Int(i) => *i as usize,
            Self::Float(f) => f.to_bits() as usize,
            Self::Slice(s) => Rc::as_ptr(s).cast::<()>() as usize,
            Self::Exception { message, .. } => Rc::as_ptr(message).cast::<()>() as usize,
        }
    }

    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    #[must_use]
    pub fn py_bool(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Bytes(b) => !b.is_empty(),
            Self::Tuple(t) => !t.is_empty(),
            Self::List(l) => !l.borrow().is_empty(),
            Self::Dict(d) => !d.borrow().is_empty(),
            Self::Set(s) => !s.borrow().is_empty(),
            _ => true,
        }
    }

    #[must_use]
    pub fn py_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Int(b)) | (Self::Int(b), Self::Bool(a)) => i64::from(*a) == *b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Self::List(a), Self::List(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(k2, v2)| k.py_eq(k2) && v.py_eq(v2))
                    })
            }
            (Self::Class(a), Self::Class(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Exception { exc_type: a, .. }, Self::Exception { exc_type: b, .. }) => a == b,
            _ => false,
        }
    }

    #[must_use]
    pub fn py_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Bool(a), _) => Self::Int(i64::from(*a)).py_cmp(other),
            (_, Self::Bool(b)) => self.py_cmp(&Self::Int(i64::from(*b))),
            (Self::Str(a), Self::Str(b)) => a.partial_cmp(b),
            (Self::Tuple(a), Self::Tuple(b)) => a.iter().map(Value::id).partial_cmp(b.iter().map(Value::id)),
            _ => None,
        }
    }

    #[must_use]
    pub fn py_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            _ => self.py_repr(),
        }
    }

    #[must_use]
    pub fn py_repr(&self) -> String {
        match self {
            Self::None => "None".to_owned(),
            Self::Bool(true) => "True".to_owned(),
            Self::Bool(false) => "False".to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(v) => {
                let s = v.to_string();
                if s.contains('.') || s.contains('e') {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            Self::Str(s) => format!("'{s}'"),
            Self::Bytes(b) => format!("b'{}'", String::from_utf8_lossy(b)),
            Self::Tuple(t) => {
                let parts: Vec<String> = t.iter().map(Value::py_repr).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Self::List(l) => {
                let parts: Vec<String> = l.borrow().iter().map(Value::py_repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Self::Dict(d) => {
                let parts: Vec<String> = d
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.py_repr(), v.py_repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Self::Set(s) => {
                let parts: Vec<String> = s.borrow().iter().map(Value::py_repr).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Self::Slice(s) => format!("slice({:?}, {:?}, {:?})", s.start, s.stop, s.step),
            Self::Cell(c) => format!("<cell: {}>", c.borrow().py_repr()),
            Self::Function(f) => format!("<function {} at 0x{:x}>", f.name, Rc::as_ptr(f) as usize),
            Self::BoundMethod(m) => format!("<bound method {}>", m.function.name),
            Self::Class(c) => format!("<class '{}'>", c.name),
            Self::Module(m) => format!("<module '{}'>", m.name),
            Self::Traceback(_) => "<traceback>".to_owned(),
            Self::Exception { exc_type, message, .. } => format!("{exc_type}({message:?})"),
            Self::HostCallable(h) => format!("<built-in function {}>", h.name),
            Self::Generator(_) => "<generator object>".to_owned(),
            Self::Iterator(_) => "<iterator object>".to_owned(),
            Self::Code(c) => format!("<code object {}>", c.name()),
        }
    }

    /// `iter(self)`, used by `GET_ITER`.
    pub fn py_iter(&self) -> Result<Self, ExcType> {
        let items = match self {
            Self::Tuple(t) => (**t).clone(),
            Self::List(l) => l.borrow().clone(),
            Self::Set(s) => s.borrow().clone(),
            Self::Str(s) => s.chars().map(|c| Self::str(c.to_string())).collect(),
            Self::Dict(d) => d.borrow().iter().map(|(k, _)| k.clone()).collect(),
            Self::Iterator(_) => return Ok(self.clone()),
            _ => return Err(ExcType::TypeError),
        };
        Ok(Self::Iterator(Rc::new(RefCell::new(IterState { items, pos: 0 }))))
    }

    /// Advances an iterator value, used by `FOR_ITER`. `None` means
    /// exhausted.
    #[must_use]
    pub fn iter_next(&self) -> Option<Self> {
        match self {
            Self::Iterator(it) => it.borrow_mut().next(),
            _ => None,
        }
    }

    /// `self + other`, or `None` if the types don't support addition.
    #[must_use]
    pub fn py_add(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_add(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a + b)),
            (Self::Int(a), Self::Float(b)) => Some(Self::Float(*a as f64 + b)),
            (Self::Float(a), Self::Int(b)) => Some(Self::Float(a + *b as f64)),
            (Self::Str(a), Self::Str(b)) => Some(Self::str(format!("{a}{b}"))),
            (Self::Tuple(a), Self::Tuple(b)) => {
                let mut v = (**a).clone();
                v.extend(b.iter().cloned());
                Some(Self::tuple(v))
            }
            (Self::List(a), Self::List(b)) => {
                let mut v = a.borrow().clone();
                v.extend(b.borrow().iter().cloned());
                Some(Self::list(v))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn py_sub(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_sub(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a - b)),
            (Self::Int(a), Self::Float(b)) => Some(Self::Float(*a as f64 - b)),
            (Self::Float(a), Self::Int(b)) => Some(Self::Float(a - *b as f64)),
            _ => None,
        }
    }

    #[must_use]
    pub fn py_mul(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(Self::Int(a.wrapping_mul(*b))),
            (Self::Float(a), Self::Float(b)) => Some(Self::Float(a * b)),
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => Some(Self::Float(*a as f64 * b)),
            (Self::Str(s), Self::Int(n)) | (Self::Int(n), Self::Str(s)) => {
                let n = (*n).max(0) as usize;
                Some(Self::str(s.repeat(n)))
            }
            (Self::List(l), Self::Int(n)) | (Self::Int(n), Self::List(l)) => {
                let n = (*n).max(0) as usize;
                let src = l.borrow();
                let mut out = Vec::with_capacity(src.len() * n);
                for _ in 0..n {
                    out.extend(src.iter().cloned());
                }
                Some(Self::list(out))
            }
            _ => None,
        }
    }

    /// True division. Returns `Err` for division by zero (a guest
    /// `ZeroDivisionError`, not a host bug).
    pub fn py_div(&self, other: &Self) -> Result<Option<Self>, ExcType> {
        match (self, other) {
            (Self::Int(_) | Self::Float(_) | Self::Bool(_), Self::Int(b)) if *b == 0 => {
                Err(ExcType::ZeroDivisionError)
            }
            (Self::Int(_) | Self::Float(_) | Self::Bool(_), Self::Float(b)) if *b == 0.0 => {
                Err(ExcType::ZeroDivisionError)
            }
            (Self::Int(a), Self::Int(b)) => Ok(Some(Self::Float(*a as f64 / *b as f64))),
            (Self::Float(a), Self::Float(b)) => Ok(Some(Self::Float(a / b))),
            (Self::Int(a), Self::Float(b)) => Ok(Some(Self::Float(*a as f64 / b))),
            (Self::Float(a), Self::Int(b)) => Ok(Some(Self::Float(a / *b as f64))),
            _ => Ok(None),
        }
    }

    /// Python's `//`: floors toward negative infinity, taking the sign of
    /// `other` (unlike Rust's `/`, which truncates toward zero, and unlike
    /// `div_euclid`, which always takes a non-negative remainder regardless
    /// of divisor sign).
    pub fn py_floordiv(&self, other: &Self) -> Result<Option<Self>, ExcType> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                if *b == 0 {
                    return Err(ExcType::ZeroDivisionError);
                }
                let (q, r) = (a / b, a % b);
                let d = if r != 0 && (r < 0) != (*b < 0) { q - 1 } else { q };
                Ok(Some(Self::Int(d)))
            }
            (Self::Float(a), Self::Float(b)) => {
                if *b == 0.0 {
                    return Err(ExcType::ZeroDivisionError);
                }
                Ok(Some(Self::Float((a / b).floor())))
            }
            _ => Ok(None),
        }
    }

    /// Python's `%`: takes the sign of `other`, matching `py_floordiv`
    /// (`a == (a // b) * b + (a % b)`), not Rust's `%`/`rem_euclid`.
    pub fn py_mod(&self, other: &Self) -> Result<Option<Self>, ExcType> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                if *b == 0 {
                    return Err(ExcType::ZeroDivisionError);
                }
                let r = a % b;
                let r = if r != 0 && (r < 0) != (*b < 0) { r + b } else { r };
                Ok(Some(Self::Int(r)))
            }
            (Self::Float(a), Self::Float(b)) => {
                if *b == 0.0 {
                    return Err(ExcType::ZeroDivisionError);
                }
                let r = a % b;
                let r = if r != 0.0 && (r < 0.0) != (*b < 0.0) { r + b } else { r };
                Ok(Some(Self::Float(r)))
            }
            _ => Ok(None),
        }
    }

    #[must_use]
    pub fn py_pow(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Int(base), Self::Int(exp)) if *exp >= 0 => u32::try_from(*exp)
                .ok()
                .and_then(|e| base.checked_pow(e))
                .map_or_else(|| Some(Self::Float((*base as f64).powf(*exp as f64))), |r| Some(Self::Int(r))),
            (Self::Int(base), Self::Int(exp)) => Some(Self::Float((*base as f64).powf(*exp as f64))),
            (Self::Float(base), Self::Float(exp)) => Some(Self::Float(base.powf(*exp))),
            (Self::Int(base), Self::Float(exp)) => Some(Self::Float((*base as f64).powf(*exp))),
            (Self::Float(base), Self::Int(exp)) => Some(Self::Float(base.powf(*exp as f64))),
            _ => None,
        }
    }

    /// `self[key]`, used by `BINARY_SUBSCR`.
    pub fn py_getitem(&self, key: &Self) -> Result<Self, ExcType> {
        match self {
            Self::List(l) => {
                let l = l.borrow();
                let idx = normalize_index(key, l.len())?;
                l.get(idx).cloned().ok_or(ExcType::IndexError)
            }
            Self::Tuple(t) => {
                let idx = normalize_index(key, t.len())?;
                t.get(idx).cloned().ok_or(ExcType::IndexError)
            }
            Self::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let idx = normalize_index(key, chars.len())?;
                chars.get(idx).map(|c| Self::str(c.to_string())).ok_or(ExcType::IndexError)
            }
            Self::Dict(d) => d
                .borrow()
                .iter()
                .find(|(k, _)| k.py_eq(key))
                .map(|(_, v)| v.clone())
                .ok_or(ExcType::KeyError),
            _ => Err(ExcType::TypeError),
        }
    }

    /// `self[key] = val`, used by `STORE_SUBSCR`.
    pub fn py_setitem(&self, key: &Self, val: Value) -> Result<(), ExcType> {
        match self {
            Self::List(l) => {
                let mut l = l.borrow_mut();
                let idx = normalize_index(key, l.len())?;
                if let Some(slot) = l.get_mut(idx) {
                    *slot = val;
                    Ok(())
                } else {
                    Err(ExcType::IndexError)
                }
            }
            Self::Dict(d) => {
                let mut d = d.borrow_mut();
                if let Some(entry) = d.iter_mut().find(|(k, _)| k.py_eq(key)) {
                    entry.1 = val;
                } else {
                    d.push((key.clone(), val));
                }
                Ok(())
            }
            _ => Err(ExcType::TypeError),
        }
    }

    /// `del self[key]`, used by `DELETE_SUBSCR`.
    pub fn py_delitem(&self, key: &Self) -> Result<(), ExcType> {
        match self {
            Self::List(l) => {
                let mut l = l.borrow_mut();
                let idx = normalize_index(key, l.len())?;
                if idx < l.len() {
                    l.remove(idx);
                    Ok(())
                } else {
                    Err(ExcType::IndexError)
                }
            }
            Self::Dict(d) => {
                let mut d = d.borrow_mut();
                let pos = d.iter().position(|(k, _)| k.py_eq(key)).ok_or(ExcType::KeyError)?;
                d.remove(pos);
                Ok(())
            }
            _ => Err(ExcType::TypeError),
        }
    }
}

impl Value {
    /// `self.name`, used by `LOAD_ATTR`. The object model's full attribute
    /// protocol (descriptors, `__getattr__`) is an external collaborator per
    /// §1; this covers only what the interpreter core itself needs to read
    /// back out of `Module`/`Class` namespaces and exception instances.
    pub fn py_getattr(&self, name: &Name) -> Result<Value, ExcType> {
        match self {
            Self::Module(m) => m
                .dict
                .borrow()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .ok_or(ExcType::AttributeError),
            Self::Class(c) => class_lookup(c, name).ok_or(ExcType::AttributeError),
            Self::Exception { message, .. } if &**name == "args" => {
                Ok(Self::tuple(vec![Self::str(message.clone())]))
            }
            _ => Err(ExcType::AttributeError),
        }
    }

    pub fn py_setattr(&self, name: &Name, val: Value) -> Result<(), ExcType> {
        match self {
            Self::Module(m) => {
                set_in(&m.dict, name, val);
                Ok(())
            }
            Self::Class(c) => {
                set_in(&c.dict, name, val);
                Ok(())
            }
            _ => Err(ExcType::AttributeError),
        }
    }

    pub fn py_delattr(&self, name: &Name) -> Result<(), ExcType> {
        match self {
            Self::Module(m) => del_in(&m.dict, name),
            Self::Class(c) => del_in(&c.dict, name),
            _ => Err(ExcType::AttributeError),
        }
    }
}

fn class_lookup(c: &Rc<Class>, name: &Name) -> Option<Value> {
    if let Some((_, v)) = c.dict.borrow().iter().find(|(n, _)| n == name) {
        return Some(v.clone());
    }
    c.bases.iter().find_map(|b| class_lookup(b, name))
}

fn set_in(dict: &RefCell<Vec<(Name, Value)>>, name: &Name, val: Value) {
    let mut d = dict.borrow_mut();
    if let Some(entry) = d.iter_mut().find(|(n, _)| n == name) {
        entry.1 = val;
    } else {
        d.push((name.clone(), val));
    }
}

fn del_in(dict: &RefCell<Vec<(Name, Value)>>, name: &Name) -> Result<(), ExcType> {
    let mut d = dict.borrow_mut();
    let pos = d.iter().position(|(n, _)| n == name).ok_or(ExcType::AttributeError)?;
    d.remove(pos);
    Ok(())
}

fn normalize_index(key: &Value, len: usize) -> Result<usize, ExcType> {
    let Value::Int(i) = key else { return Err(ExcType::TypeError) };
    let i = if *i < 0 { *i + len as i64 } else { *i };
    usize::try_from(i).map_err(|_| ExcType::IndexError)
}

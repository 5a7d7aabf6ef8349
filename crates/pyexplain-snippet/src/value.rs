//! Runtime values of the snippet language.
//!
//! Values are reference-counted with `Rc`/`RefCell` and never leave the
//! thread that runs the snippet.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::ast::FunctionDef;
use crate::builtins::Builtin;
use crate::exception::{ExcKind, Exception};
use crate::interpreter::Scope;

pub(crate) type RunResult<T> = std::result::Result<T, Exception>;

/// Shorthand for returning a freshly raised exception.
pub(crate) fn raise<T>(kind: ExcKind, message: impl Into<String>) -> RunResult<T> {
    Err(Exception::new(kind, message))
}

/// Reprs nested deeper than this print as `...`.
const MAX_REPR_DEPTH: usize = 64;

/// Integer results wider than this raise `MemoryError` instead of allocating.
pub(crate) const MAX_INT_BITS: u64 = 1 << 20;

#[derive(Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Integers outside the `i64` range; never holds a value that fits `Int`.
    Long(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Module(Rc<Module>),
    ExcType(ExcKind),
    Exception(Rc<ExceptionValue>),
    /// Type objects that cannot be called, as returned by `type(None)`.
    Type(&'static str),
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.repr())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> i64 {
        if self.step > 0 && self.start < self.stop {
            (self.stop - self.start - 1) / self.step + 1
        } else if self.step < 0 && self.start > self.stop {
            (self.start - self.stop - 1) / (-self.step) + 1
        } else {
            0
        }
    }

    pub fn get(&self, index: i64) -> i64 {
        self.start + index * self.step
    }
}

pub(crate) struct Function {
    pub def: Rc<FunctionDef>,
    /// Defaults evaluated at definition time, aligned with the trailing params.
    pub defaults: Vec<Value>,
    pub closure: Rc<Scope>,
}

pub(crate) struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

pub(crate) struct Module {
    pub name: &'static str,
    pub attrs: RefCell<BTreeMap<String, Value>>,
}

/// An exception instance as seen by user code (`except E as e`).
pub(crate) struct ExceptionValue {
    pub kind: ExcKind,
    pub args: Vec<Value>,
    /// `str(e)`, fixed at construction.
    pub message: String,
}

impl ExceptionValue {
    pub fn from_args(kind: ExcKind, args: Vec<Value>) -> Self {
        let message = match args.as_slice() {
            [] => String::new(),
            // KeyError shows its key the way repr does
            [single] if kind == ExcKind::KeyError => single.repr(),
            [single] => single.str(),
            many => Value::Tuple(Rc::new(many.to_vec())).repr(),
        };
        Self {
            kind,
            args,
            message,
        }
    }

    pub fn from_exception(exc: &Exception) -> Self {
        let args = if exc.message().is_empty() {
            Vec::new()
        } else {
            vec![Value::string(exc.message())]
        };
        Self {
            kind: exc.kind(),
            args,
            message: exc.message().to_string(),
        }
    }

    pub fn to_exception(&self) -> Exception {
        if self.args.is_empty() {
            Exception::bare(self.kind)
        } else {
            Exception::new(self.kind, self.message.clone())
        }
    }
}

/// Insertion-ordered mapping with Python key equality.
#[derive(Clone, Default)]
pub(crate) struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let idx = self.entries.iter().position(|(k, _)| k.py_eq(key))?;
        Some(self.entries.remove(idx).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    /// An `int`, stored inline when it fits `i64`.
    pub fn from_bigint(n: BigInt) -> Value {
        match n.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::Long(Rc::new(n)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Long(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::ExcType(_) | Value::Type(_) => "type",
            Value::Exception(e) => e.kind.as_str(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Long(n) => !n.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => d.borrow().len() > 0,
            Value::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            Value::Int(i) => Some(*i as f64),
            Value::Long(n) => Some(n.to_f64().unwrap_or(f64::INFINITY)),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer value of `bool`, `int` of any width; `None` otherwise.
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Long(n) => Some(n.as_ref().clone()),
            other => other.as_int().map(BigInt::from),
        }
    }

    /// The value as a plain `int`, turning `bool` into `0`/`1`.
    pub fn to_int_value(&self) -> Option<Value> {
        match self {
            Value::Long(_) => Some(self.clone()),
            other => other.as_int().map(Value::Int),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Long(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Long(_) | Value::Float(_)
        )
    }

    pub fn repr(&self) -> String {
        self.repr_at(0)
    }

    fn repr_at(&self, depth: usize) -> String {
        if depth > MAX_REPR_DEPTH {
            return "...".to_string();
        }
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => repr_str(s),
            Value::List(items) => {
                let inner: Vec<String> =
                    items.borrow().iter().map(|v| v.repr_at(depth + 1)).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.repr_at(depth + 1)).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Value::Dict(d) => {
                let inner: Vec<String> = d
                    .borrow()
                    .entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr_at(depth + 1), v.repr_at(depth + 1)))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Range(r) => {
                if r.step == 1 {
                    format!("range({}, {})", r.start, r.stop)
                } else {
                    format!("range({}, {}, {})", r.start, r.stop, r.step)
                }
            }
            Value::Function(f) => {
                format!("<function {} at {:#x}>", f.def.name, Rc::as_ptr(f) as usize)
            }
            Value::Builtin(b) => {
                if b.is_type() {
                    format!("<class '{}'>", b.name())
                } else {
                    format!("<built-in function {}>", b.name())
                }
            }
            Value::Method(m) => format!(
                "<built-in method {} of {} object at {:#x}>",
                m.name,
                m.receiver.type_name(),
                Rc::as_ptr(m) as usize
            ),
            Value::Module(m) => format!("<module '{}' (built-in)>", m.name),
            Value::ExcType(kind) => format!("<class '{}'>", kind.as_str()),
            Value::Type(name) => format!("<class '{name}'>"),
            Value::Exception(e) => {
                let inner: Vec<String> = e.args.iter().map(|v| v.repr_at(depth + 1)).collect();
                format!("{}({})", e.kind.as_str(), inner.join(", "))
            }
        }
    }

    /// `str(value)`.
    pub fn str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    /// `a == b`.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => num_cmp(a, b) == Some(Ordering::Equal),
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || seq_eq(&a.borrow(), &b.borrow())
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.entries
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| bv.py_eq(v)))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            _ => self.is_same(other),
        }
    }

    /// `a is b`.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::ExcType(a), Value::ExcType(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Raise `TypeError` for values that cannot be dict keys.
    pub fn check_hashable(&self) -> RunResult<()> {
        match self {
            Value::List(_) | Value::Dict(_) => raise(
                ExcKind::TypeError,
                format!("unhashable type: '{}'", self.type_name()),
            ),
            Value::Tuple(items) => items.iter().try_for_each(Value::check_hashable),
            _ => Ok(()),
        }
    }

    /// Ordering used by `<`, `sorted`, `min` and `max`.
    pub fn py_cmp(&self, other: &Value, op: &str) -> RunResult<Ordering> {
        match (self, other) {
            (a, b) if a.is_number() && b.is_number() => {
                Ok(num_cmp(a, b).unwrap_or(Ordering::Equal))
            }
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow(), op),
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b, op),
            _ => raise(
                ExcKind::TypeError,
                format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op,
                    self.type_name(),
                    other.type_name()
                ),
            ),
        }
    }

    /// Iterate eagerly, except for ranges which stay lazy.
    pub fn iter(&self) -> RunResult<ValueIter> {
        let items = match self {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            Value::Str(s) => s.chars().map(|c| Value::string(c.encode_utf8(&mut [0; 4]))).collect(),
            Value::Dict(d) => d.borrow().keys(),
            Value::Range(r) => {
                return Ok(ValueIter::Range {
                    next: r.start,
                    stop: r.stop,
                    step: r.step,
                })
            }
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!("'{}' object is not iterable", other.type_name()),
                )
            }
        };
        Ok(ValueIter::Items(items.into_iter()))
    }

    /// Collect into a vector.
    pub fn to_vec(&self) -> RunResult<Vec<Value>> {
        Ok(self.iter()?.collect())
    }
}

/// Numeric ordering; `None` when a NaN is involved.
fn num_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_bigint(), b.as_bigint()) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::Float(x), other) if other.is_integer() => float_int_cmp(*x, &other.as_bigint()?),
        (other, Value::Float(y)) if other.is_integer() => {
            float_int_cmp(*y, &other.as_bigint()?).map(Ordering::reverse)
        }
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Exact comparison of a float with an integer of any width.
fn float_int_cmp(x: f64, n: &BigInt) -> Option<Ordering> {
    if x.is_nan() {
        return None;
    }
    if x.is_infinite() {
        return Some(if x > 0.0 { Ordering::Greater } else { Ordering::Less });
    }
    if n.bits() <= 53 {
        return x.partial_cmp(&n.to_f64()?);
    }
    let whole = x.trunc();
    let whole_int: BigInt = num_traits::FromPrimitive::from_f64(whole)?;
    Some(match whole_int.cmp(n) {
        Ordering::Equal if x > whole => Ordering::Greater,
        Ordering::Equal if x < whole => Ordering::Less,
        other => other,
    })
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn seq_cmp(a: &[Value], b: &[Value], op: &str) -> RunResult<Ordering> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.py_cmp(y, op);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

pub(crate) enum ValueIter {
    Range { next: i64, stop: i64, step: i64 },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range { next, stop, step } => {
                let done = if *step > 0 { *next >= *stop } else { *next <= *stop };
                if done {
                    return None;
                }
                let current = *next;
                *next = next.saturating_add(*step);
                Some(Value::Int(current))
            }
            ValueIter::Items(items) => items.next(),
        }
    }
}

/// Python's `repr(str)`.
pub(crate) fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python's `repr(float)`: shortest round-trip digits, scientific notation
/// outside `1e-4 <= |x| < 1e16`.
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let sci = format!("{x:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let fixed = format!("{x}");
        if fixed.contains('.') {
            fixed
        } else {
            format!("{fixed}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

//! Operators and subscripting.

use std::rc::Rc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::exception::{ExcKind, Exception};
use crate::fmt::percent_format;
use crate::value::{raise, RunResult, Value, MAX_INT_BITS};

/// Sequences longer than this raise `MemoryError` instead of allocating.
const MAX_SEQUENCE_LEN: i64 = 10_000_000;

pub(crate) fn binary(op: BinOp, a: &Value, b: &Value) -> RunResult<Value> {
    if a.is_number() && b.is_number() {
        return numeric(op, a, b);
    }
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::string(&s))
        }
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            let mut items = x.as_ref().clone();
            items.extend(y.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)), n)
        | (BinOp::Mul, n, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)))
            if n.as_int().is_some() =>
        {
            repeat(seq, n.as_int().unwrap_or(0))
        }
        (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_), Value::Long(_))
        | (BinOp::Mul, Value::Long(_), Value::Str(_) | Value::List(_) | Value::Tuple(_)) => {
            Err(index_overflow(ExcKind::OverflowError))
        }
        (BinOp::Mod, Value::Str(template), args) => {
            Ok(Value::string(&percent_format(template, args)?))
        }
        (BinOp::Add, Value::Str(_), other) => raise(
            ExcKind::TypeError,
            format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            ),
        ),
        (BinOp::Add, Value::List(_), other) => raise(
            ExcKind::TypeError,
            format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            ),
        ),
        (BinOp::Add, Value::Tuple(_), other) => raise(
            ExcKind::TypeError,
            format!(
                "can only concatenate tuple (not \"{}\") to tuple",
                other.type_name()
            ),
        ),
        (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_), other)
        | (BinOp::Mul, other, Value::Str(_) | Value::List(_) | Value::Tuple(_)) => raise(
            ExcKind::TypeError,
            format!(
                "can't multiply sequence by non-int of type '{}'",
                other.type_name()
            ),
        ),
        _ => raise(
            ExcKind::TypeError,
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                a.type_name(),
                b.type_name()
            ),
        ),
    }
}

fn repeat(seq: &Value, times: i64) -> RunResult<Value> {
    let times = times.max(0);
    let len = match seq {
        Value::Str(s) => s.chars().count() as i64,
        Value::List(items) => items.borrow().len() as i64,
        Value::Tuple(items) => items.len() as i64,
        _ => 0,
    };
    if len.saturating_mul(times) > MAX_SEQUENCE_LEN {
        return Err(Exception::bare(ExcKind::MemoryError));
    }
    let times = times as usize;
    Ok(match seq {
        Value::Str(s) => Value::string(&s.repeat(times)),
        Value::List(items) => {
            let items = items.borrow();
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Value::list(out)
        }
        Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            Value::tuple(out)
        }
        other => other.clone(),
    })
}

fn index_overflow(kind: ExcKind) -> Exception {
    Exception::new(kind, "cannot fit 'int' into an index-sized integer")
}

fn too_large() -> Exception {
    Exception::bare(ExcKind::MemoryError)
}

/// Float value of a numeric operand; huge ints raise like CPython's `float()`.
pub(crate) fn to_float(v: &Value) -> RunResult<f64> {
    match v {
        Value::Long(n) => n
            .to_f64()
            .filter(|x| x.is_finite())
            .map_or_else(|| raise(ExcKind::OverflowError, "int too large to convert to float"), Ok),
        other => Ok(other.as_f64().unwrap_or(0.0)),
    }
}

fn numeric(op: BinOp, a: &Value, b: &Value) -> RunResult<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if let Some(value) = small_int_op(op, x, y)? {
            return Ok(value);
        }
    }
    if let (Some(x), Some(y)) = (a.as_bigint(), b.as_bigint()) {
        return big_int_op(op, x, y);
    }
    let x = to_float(a)?;
    let y = to_float(b)?;
    let result = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "float division by zero");
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "float floor division by zero");
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return raise(ExcKind::ZeroDivisionError, "float modulo by zero");
            }
            float_mod(x, y)
        }
        BinOp::Pow => float_pow(x, y)?,
    };
    Ok(Value::Float(result))
}

fn float_pow(x: f64, y: f64) -> RunResult<f64> {
    if x == 0.0 && y < 0.0 {
        return raise(
            ExcKind::ZeroDivisionError,
            "0.0 cannot be raised to a negative power",
        );
    }
    if x < 0.0 && y.fract() != 0.0 {
        return raise(ExcKind::ValueError, "math domain error");
    }
    let r = x.powf(y);
    if r.is_infinite() && x.is_finite() && y.is_finite() {
        return raise(ExcKind::OverflowError, "(34, 'Numerical result out of range')");
    }
    Ok(r)
}

/// `i64` arithmetic; `None` when the result needs a wider integer.
fn small_int_op(op: BinOp, x: i64, y: i64) -> RunResult<Option<Value>> {
    let value = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            return Ok(Some(Value::Float(x as f64 / y as f64)));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return raise(
                    ExcKind::ZeroDivisionError,
                    "integer division or modulo by zero",
                );
            }
            x.checked_rem(y).map(|_| floor_div(x, y))
        }
        BinOp::Mod => {
            if y == 0 {
                return raise(ExcKind::ZeroDivisionError, "integer modulo by zero");
            }
            x.checked_rem(y).map(|_| int_mod(x, y))
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Some(Value::Float(float_pow(x as f64, y as f64)?)));
            }
            u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp))
        }
    };
    Ok(value.map(Value::Int))
}

fn big_int_op(op: BinOp, x: BigInt, y: BigInt) -> RunResult<Value> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => {
            if x.bits() + y.bits() > MAX_INT_BITS {
                return Err(too_large());
            }
            x * y
        }
        BinOp::Div => {
            if y.is_zero() {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            return Ok(Value::Float(big_true_div(&x, &y)?));
        }
        BinOp::FloorDiv => {
            if y.is_zero() {
                return raise(
                    ExcKind::ZeroDivisionError,
                    "integer division or modulo by zero",
                );
            }
            x.div_floor(&y)
        }
        BinOp::Mod => {
            if y.is_zero() {
                return raise(ExcKind::ZeroDivisionError, "integer modulo by zero");
            }
            x.mod_floor(&y)
        }
        BinOp::Pow => {
            if y.is_negative() {
                return Ok(Value::Float(float_pow(to_float_big(&x)?, to_float_big(&y)?)?));
            }
            if y.is_zero() {
                return Ok(Value::Int(1));
            }
            if x.magnitude().bits() <= 1 {
                // 0, 1 and -1 stay small for any exponent
                let odd = y.is_odd();
                return Ok(Value::from_bigint(if x.is_negative() && !odd {
                    -x
                } else {
                    x
                }));
            }
            let exp = y.to_u32().filter(|e| u64::from(*e) * x.bits() <= MAX_INT_BITS);
            match exp {
                Some(exp) => x.pow(exp),
                None => return Err(too_large()),
            }
        }
    };
    Ok(Value::from_bigint(value))
}

fn to_float_big(n: &BigInt) -> RunResult<f64> {
    to_float(&Value::from_bigint(n.clone()))
}

/// `x / y` for integers too wide for an exact `f64` conversion.
fn big_true_div(x: &BigInt, y: &BigInt) -> RunResult<f64> {
    // drop low bits so both operands convert without overflowing
    let shift = x.bits().max(y.bits()).saturating_sub(1000);
    let (xs, ys): (BigInt, BigInt) = (x >> shift, y >> shift);
    let quotient = match (xs.to_f64(), ys.to_f64()) {
        (Some(a), Some(b)) if b != 0.0 => a / b,
        _ => f64::INFINITY,
    };
    if quotient.is_finite() {
        Ok(quotient)
    } else {
        raise(
            ExcKind::OverflowError,
            "integer division result too large for a float",
        )
    }
}

pub(crate) fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x % y != 0 && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    }
}

pub(crate) fn int_mod(x: i64, y: i64) -> i64 {
    let r = x.wrapping_rem(y);
    if r != 0 && ((r < 0) != (y < 0)) {
        r + y
    } else {
        r
    }
}

fn float_mod(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
        r + y
    } else {
        r
    }
}

pub(crate) fn unary(op: UnaryOp, v: &Value) -> RunResult<Value> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.is_integer() => match v.as_int().and_then(i64::checked_neg) {
            Some(i) => Ok(Value::Int(i)),
            None => Ok(Value::from_bigint(-v.as_bigint().unwrap_or_default())),
        },
        (UnaryOp::Pos, v) if v.is_integer() => Ok(v.to_int_value().unwrap_or(Value::Int(0))),
        _ => raise(
            ExcKind::TypeError,
            format!(
                "bad operand type for unary {}: '{}'",
                op.symbol(),
                v.type_name()
            ),
        ),
    }
}

pub(crate) fn compare(op: CmpOp, a: &Value, b: &Value) -> RunResult<bool> {
    let ordering = |a: &Value, b: &Value| a.py_cmp(b, op.symbol());
    Ok(match op {
        CmpOp::Eq => a.py_eq(b),
        CmpOp::NotEq => !a.py_eq(b),
        CmpOp::Lt => ordering(a, b)?.is_lt(),
        CmpOp::LtEq => ordering(a, b)?.is_le(),
        CmpOp::Gt => ordering(a, b)?.is_gt(),
        CmpOp::GtEq => ordering(a, b)?.is_ge(),
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => a.is_same(b),
        CmpOp::IsNot => !a.is_same(b),
    })
}

pub(crate) fn contains(container: &Value, item: &Value) -> RunResult<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => raise(
                ExcKind::TypeError,
                format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ),
            ),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Dict(d) => {
            item.check_hashable()?;
            Ok(d.borrow().get(item).is_some())
        }
        Value::Range(r) => Ok(match item.as_int() {
            Some(n) => {
                let offset = n - r.start;
                let in_bounds = if r.step > 0 {
                    n >= r.start && n < r.stop
                } else {
                    n <= r.start && n > r.stop
                };
                in_bounds && offset % r.step == 0
            }
            None => false,
        }),
        other => raise(
            ExcKind::TypeError,
            format!("argument of type '{}' is not iterable", other.type_name()),
        ),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn index_type_error(container: &Value, index: &Value) -> Exception {
    if matches!(index, Value::Long(_)) {
        return index_overflow(ExcKind::IndexError);
    }
    let message = match container {
        Value::Str(_) => format!("string indices must be integers, not '{}'", index.type_name()),
        other => format!(
            "{} indices must be integers or slices, not {}",
            other.type_name(),
            index.type_name()
        ),
    };
    Exception::new(ExcKind::TypeError, message)
}

/// `container[index]` for a non-slice index.
pub(crate) fn get_item(container: &Value, index: &Value) -> RunResult<Value> {
    match container {
        Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Range(_) => {
            let Some(i) = index.as_int() else {
                return Err(index_type_error(container, index));
            };
            let found = match container {
                Value::List(items) => {
                    let items = items.borrow();
                    normalize_index(i, items.len()).map(|i| items[i].clone())
                }
                Value::Tuple(items) => normalize_index(i, items.len()).map(|i| items[i].clone()),
                Value::Str(s) => {
                    let len = s.chars().count();
                    normalize_index(i, len)
                        .and_then(|i| s.chars().nth(i))
                        .map(|c| Value::string(c.encode_utf8(&mut [0; 4])))
                }
                Value::Range(r) => normalize_index(i, r.len() as usize)
                    .map(|i| Value::Int(r.get(i as i64))),
                _ => None,
            };
            found.map_or_else(
                || {
                    let what = match container {
                        Value::Str(_) => "string",
                        Value::Range(_) => "range object",
                        other => other.type_name(),
                    };
                    raise(ExcKind::IndexError, format!("{what} index out of range"))
                },
                Ok,
            )
        }
        Value::Dict(d) => {
            index.check_hashable()?;
            match d.borrow().get(index) {
                Some(v) => Ok(v.clone()),
                None => raise(ExcKind::KeyError, index.repr()),
            }
        }
        other => raise(
            ExcKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        ),
    }
}

/// `container[index] = value`.
pub(crate) fn set_item(container: &Value, index: &Value, value: Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let Some(i) = index.as_int() else {
                return Err(index_type_error(container, index));
            };
            let mut items = items.borrow_mut();
            let len = items.len();
            match normalize_index(i, len) {
                Some(i) => {
                    items[i] = value;
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        Value::Dict(d) => {
            index.check_hashable()?;
            d.borrow_mut().insert(index.clone(), value);
            Ok(())
        }
        other => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ),
        ),
    }
}

/// `del container[index]`.
pub(crate) fn del_item(container: &Value, index: &Value) -> RunResult<()> {
    match container {
        Value::List(items) => {
            let Some(i) = index.as_int() else {
                return Err(index_type_error(container, index));
            };
            let mut items = items.borrow_mut();
            let len = items.len();
            match normalize_index(i, len) {
                Some(i) => {
                    items.remove(i);
                    Ok(())
                }
                None => raise(ExcKind::IndexError, "list assignment index out of range"),
            }
        }
        Value::Dict(d) => {
            index.check_hashable()?;
            match d.borrow_mut().remove(index) {
                Some(_) => Ok(()),
                None => raise(ExcKind::KeyError, index.repr()),
            }
        }
        other => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ),
        ),
    }
}

fn slice_bound(v: Option<&Value>) -> RunResult<Option<i64>> {
    match v {
        None | Some(Value::None) => Ok(None),
        Some(Value::Long(n)) => Ok(Some(if n.is_negative() { i64::MIN } else { i64::MAX })),
        Some(v) => match v.as_int() {
            Some(i) => Ok(Some(i)),
            None => raise(
                ExcKind::TypeError,
                "slice indices must be integers or None or have an __index__ method",
            ),
        },
    }
}

/// Positions selected by `[start:stop:step]` over a sequence of `len`.
fn slice_positions(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, low: i64, high: i64| {
        let v = if v < 0 { v + len } else { v };
        v.clamp(low, high)
    };
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let end = stop.map_or(len, |s| clamp(s, 0, len));
        while i < end {
            out.push(i as usize);
            i += step;
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > end {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

/// `container[lower:upper:step]`.
pub(crate) fn get_slice(
    container: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> RunResult<Value> {
    let start = slice_bound(lower)?;
    let stop = slice_bound(upper)?;
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return raise(ExcKind::ValueError, "slice step cannot be zero");
    }
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_positions(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::list(picked))
        }
        Value::Tuple(items) => {
            let picked = slice_positions(items.len(), start, stop, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect();
            Ok(Value::Tuple(Rc::new(picked)))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked: String = slice_positions(chars.len(), start, stop, step)
                .into_iter()
                .map(|i| chars[i])
                .collect();
            Ok(Value::string(&picked))
        }
        Value::Range(r) => {
            let picked = slice_positions(r.len() as usize, start, stop, step)
                .into_iter()
                .map(|i| Value::Int(r.get(i as i64)))
                .collect();
            Ok(Value::list(picked))
        }
        other => raise(
            ExcKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        ),
    }
}

/// `container[lower:upper:step] = value`; only lists support it.
pub(crate) fn set_slice(
    container: &Value,
    bounds: [Option<&Value>; 3],
    value: &Value,
) -> RunResult<()> {
    let [lower, upper, step] = bounds;
    let Value::List(items) = container else {
        return raise(
            ExcKind::TypeError,
            format!(
                "'{}' object does not support item assignment",
                container.type_name()
            ),
        );
    };
    let start = slice_bound(lower)?;
    let stop = slice_bound(upper)?;
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return raise(ExcKind::ValueError, "slice step cannot be zero");
    }
    let replacement = match value.to_vec() {
        Ok(v) => v,
        Err(_) => return raise(ExcKind::TypeError, "can only assign an iterable"),
    };
    let mut items = items.borrow_mut();
    if step == 1 {
        let len = items.len() as i64;
        let norm = |v: Option<i64>, default: i64| {
            v.map_or(default, |v| (if v < 0 { v + len } else { v }).clamp(0, len))
        };
        let a = norm(start, 0);
        let b = norm(stop, len).max(a);
        items.splice(a as usize..b as usize, replacement);
        return Ok(());
    }
    let positions = slice_positions(items.len(), start, stop, step);
    if positions.len() != replacement.len() {
        return raise(
            ExcKind::ValueError,
            format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                replacement.len(),
                positions.len()
            ),
        );
    }
    for (pos, v) in positions.into_iter().zip(replacement) {
        items[pos] = v;
    }
    Ok(())
}

/// `del container[lower:upper:step]`.
pub(crate) fn del_slice(container: &Value, bounds: [Option<&Value>; 3]) -> RunResult<()> {
    let [lower, upper, step] = bounds;
    let Value::List(items) = container else {
        return raise(
            ExcKind::TypeError,
            format!(
                "'{}' object doesn't support item deletion",
                container.type_name()
            ),
        );
    };
    let start = slice_bound(lower)?;
    let stop = slice_bound(upper)?;
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return raise(ExcKind::ValueError, "slice step cannot be zero");
    }
    let mut items = items.borrow_mut();
    let mut positions = slice_positions(items.len(), start, stop, step);
    positions.sort_unstable_by(|a, b| b.cmp(a));
    for pos in positions {
        items.remove(pos);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_assignment_and_deletion() {
        let list = Value::list((0..5).map(Value::Int).collect());
        let one = Value::Int(1);
        let three = Value::Int(3);
        set_slice(
            &list,
            [Some(&one), Some(&three), None],
            &Value::list(vec![Value::string("x")]),
        )
        .unwrap();
        assert_eq!(list.repr(), "[0, 'x', 3, 4]");
        let two = Value::Int(2);
        del_slice(&list, [None, None, Some(&two)]).unwrap();
        assert_eq!(list.repr(), "['x', 4]");
        let err = set_slice(&Value::string("ab"), [None, None, None], &list).unwrap_err();
        assert_eq!(err.message(), "'str' object does not support item assignment");
    }

    #[test]
    fn test_int_division_semantics() {
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(int_mod(-7, 2), 1);
        assert_eq!(int_mod(7, -2), -1);
        let v = binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.5));
    }

    #[test]
    fn test_int_arithmetic_widens_past_i64() {
        let v = binary(BinOp::Pow, &Value::Int(2), &Value::Int(100)).unwrap();
        assert_eq!(v.repr(), "1267650600228229401496703205376");
        let v = binary(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1)).unwrap();
        assert_eq!(v.repr(), "9223372036854775808");
        let back = binary(BinOp::Sub, &v, &Value::Int(1)).unwrap();
        assert!(matches!(back, Value::Int(i64::MAX)));
        let v = binary(BinOp::FloorDiv, &Value::Int(i64::MIN), &Value::Int(-1)).unwrap();
        assert_eq!(v.repr(), "9223372036854775808");
        let neg = unary(UnaryOp::Neg, &Value::Int(i64::MIN)).unwrap();
        assert_eq!(neg.repr(), "9223372036854775808");
        let big = binary(BinOp::Pow, &Value::Int(10), &Value::Int(30)).unwrap();
        let v = binary(BinOp::Mod, &big, &Value::Int(-7)).unwrap();
        assert_eq!(v.repr(), "-6");
        let wide = binary(BinOp::Pow, &Value::Int(2), &Value::Int(70)).unwrap();
        let v = binary(BinOp::Div, &wide, &Value::Int(1024)).unwrap();
        assert!(matches!(v, Value::Float(f) if f == 2f64.powi(60)));
    }

    #[test]
    fn test_huge_ints_are_bounded() {
        let err = binary(BinOp::Pow, &Value::Int(10), &Value::Int(10_000_000)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::MemoryError);
        let v = binary(BinOp::Pow, &Value::Int(-1), &Value::Int(10_000_001)).unwrap();
        assert!(matches!(v, Value::Int(-1)));
        let big = binary(BinOp::Pow, &Value::Int(10), &Value::Int(400)).unwrap();
        let err = binary(BinOp::Add, &big, &Value::Float(0.5)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::OverflowError);
        assert_eq!(err.message(), "int too large to convert to float");
        let err = get_item(&Value::list(vec![]), &big).unwrap_err();
        assert_eq!(err.kind(), ExcKind::IndexError);
        assert_eq!(err.message(), "cannot fit 'int' into an index-sized integer");
    }

    #[test]
    fn test_zero_division_messages() {
        let err = binary(BinOp::Div, &Value::Int(10), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::ZeroDivisionError);
        assert_eq!(err.message(), "division by zero");
        let err = binary(BinOp::Mod, &Value::Float(1.0), &Value::Int(0)).unwrap_err();
        assert_eq!(err.message(), "float modulo by zero");
    }

    #[test]
    fn test_str_concat_error() {
        let err = binary(BinOp::Add, &Value::string("age: "), &Value::Int(3)).unwrap_err();
        assert_eq!(err.kind(), ExcKind::TypeError);
        assert_eq!(err.message(), "can only concatenate str (not \"int\") to str");
        let err = binary(BinOp::Add, &Value::Int(3), &Value::string("x")).unwrap_err();
        assert_eq!(
            err.message(),
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_repeat_and_membership() {
        let v = binary(BinOp::Mul, &Value::Int(3), &Value::string("ab")).unwrap();
        assert_eq!(v.str(), "ababab");
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(compare(CmpOp::In, &Value::Float(2.0), &list).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(5), &list).unwrap());
    }

    #[test]
    fn test_index_errors() {
        let list = Value::list(vec![Value::Int(1)]);
        let err = get_item(&list, &Value::Int(5)).unwrap_err();
        assert_eq!(err.message(), "list index out of range");
        let err = get_item(&list, &Value::string("0")).unwrap_err();
        assert_eq!(err.message(), "list indices must be integers or slices, not str");
        let err = get_item(&Value::Int(3), &Value::Int(0)).unwrap_err();
        assert_eq!(err.message(), "'int' object is not subscriptable");
    }

    #[test]
    fn test_slices() {
        let s = Value::string("hello");
        let v = get_slice(&s, Some(&Value::Int(1)), Some(&Value::Int(-1)), None).unwrap();
        assert_eq!(v.str(), "ell");
        let v = get_slice(&s, None, None, Some(&Value::Int(-1))).unwrap();
        assert_eq!(v.str(), "olleh");
    }

    #[test]
    fn test_comparison_type_error() {
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::string("2")).unwrap_err();
        assert_eq!(
            err.message(),
            "'<' not supported between instances of 'int' and 'str'"
        );
    }
}

//! Built-in functions, the `math` module and methods of `str`, `list` and
//! `dict`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed};

use crate::ast::BinOp;
use crate::exception::{ExcKind, Exception};
use crate::fmt::format_value;
use crate::ops;
use crate::value::{raise, BoundMethod, Dict, Module, Range, RunResult, Value, MAX_INT_BITS};

/// What a builtin needs from the running interpreter.
pub(crate) trait Host {
    /// Call any callable value with positional arguments.
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value>;
    /// Append to the captured standard output.
    fn write_output(&mut self, text: &str);
}

pub(crate) type Kwargs = Vec<(String, Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    // types
    Int,
    Float,
    Str,
    Bool,
    List,
    Tuple,
    Dict,
    Range,
    Type,
    // functions
    Print,
    Input,
    Open,
    Len,
    Abs,
    Min,
    Max,
    Sum,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Round,
    Isinstance,
    Repr,
    Format,
    Any,
    All,
    Ord,
    Chr,
    Divmod,
    Pow,
    // math
    MathSqrt,
    MathFloor,
    MathCeil,
    MathPow,
    MathFabs,
    MathLog,
    MathExp,
    MathFactorial,
}

/// Names visible without an import.
const GLOBALS: &[(&str, Builtin)] = &[
    ("int", Builtin::Int),
    ("float", Builtin::Float),
    ("str", Builtin::Str),
    ("bool", Builtin::Bool),
    ("list", Builtin::List),
    ("tuple", Builtin::Tuple),
    ("dict", Builtin::Dict),
    ("range", Builtin::Range),
    ("type", Builtin::Type),
    ("print", Builtin::Print),
    ("input", Builtin::Input),
    ("open", Builtin::Open),
    ("len", Builtin::Len),
    ("abs", Builtin::Abs),
    ("min", Builtin::Min),
    ("max", Builtin::Max),
    ("sum", Builtin::Sum),
    ("sorted", Builtin::Sorted),
    ("reversed", Builtin::Reversed),
    ("enumerate", Builtin::Enumerate),
    ("zip", Builtin::Zip),
    ("round", Builtin::Round),
    ("isinstance", Builtin::Isinstance),
    ("repr", Builtin::Repr),
    ("format", Builtin::Format),
    ("any", Builtin::Any),
    ("all", Builtin::All),
    ("ord", Builtin::Ord),
    ("chr", Builtin::Chr),
    ("divmod", Builtin::Divmod),
    ("pow", Builtin::Pow),
];

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        GLOBALS.iter().find(|(n, _)| *n == name).map(|(_, b)| *b)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::MathSqrt => "sqrt",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathPow => "pow",
            Builtin::MathFabs => "fabs",
            Builtin::MathLog => "log",
            Builtin::MathExp => "exp",
            Builtin::MathFactorial => "factorial",
            other => GLOBALS
                .iter()
                .find(|(_, b)| *b == other)
                .map(|(n, _)| *n)
                .unwrap_or("builtin"),
        }
    }

    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Int
                | Builtin::Float
                | Builtin::Str
                | Builtin::Bool
                | Builtin::List
                | Builtin::Tuple
                | Builtin::Dict
                | Builtin::Range
                | Builtin::Type
        )
    }
}

/// The only importable module.
pub(crate) fn import_module(name: &str) -> RunResult<Value> {
    let root = name.split('.').next().unwrap_or(name);
    if root != "math" {
        return raise(
            ExcKind::ModuleNotFoundError,
            format!("No module named '{root}'"),
        );
    }
    if name != "math" {
        return raise(
            ExcKind::ModuleNotFoundError,
            format!("No module named '{name}'; 'math' is not a package"),
        );
    }
    let mut attrs = BTreeMap::new();
    for builtin in [
        Builtin::MathSqrt,
        Builtin::MathFloor,
        Builtin::MathCeil,
        Builtin::MathPow,
        Builtin::MathFabs,
        Builtin::MathLog,
        Builtin::MathExp,
        Builtin::MathFactorial,
    ] {
        attrs.insert(builtin.name().to_string(), Value::Builtin(builtin));
    }
    attrs.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
    attrs.insert("e".to_string(), Value::Float(std::f64::consts::E));
    attrs.insert("tau".to_string(), Value::Float(std::f64::consts::TAU));
    attrs.insert("inf".to_string(), Value::Float(f64::INFINITY));
    attrs.insert("nan".to_string(), Value::Float(f64::NAN));
    Ok(Value::Module(Rc::new(Module {
        name: "math",
        attrs: RefCell::new(attrs),
    })))
}

// -------------------------------------------------------------------------
// Argument helpers
// -------------------------------------------------------------------------

fn no_kwargs(name: &str, kwargs: &Kwargs) -> RunResult<()> {
    if kwargs.is_empty() {
        Ok(())
    } else {
        raise(
            ExcKind::TypeError,
            format!("{name}() takes no keyword arguments"),
        )
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> RunResult<()> {
    let n = args.len();
    if (min..=max).contains(&n) {
        return Ok(());
    }
    let plural = |k: usize| if k == 1 { "" } else { "s" };
    let message = if min == 1 && max == 1 {
        format!("{name}() takes exactly one argument ({n} given)")
    } else if n < min {
        format!("{name} expected at least {min} argument{}, got {n}", plural(min))
    } else {
        format!("{name} expected at most {max} argument{}, got {n}", plural(max))
    };
    raise(ExcKind::TypeError, message)
}

fn take_kwarg(kwargs: &mut Kwargs, name: &str) -> Option<Value> {
    let idx = kwargs.iter().position(|(k, _)| k == name)?;
    Some(kwargs.remove(idx).1)
}

fn reject_leftover(func: &str, kwargs: &Kwargs) -> RunResult<()> {
    match kwargs.first() {
        Some((k, _)) => raise(
            ExcKind::TypeError,
            format!("'{k}' is an invalid keyword argument for {func}()"),
        ),
        None => Ok(()),
    }
}

fn expect_int(v: &Value) -> RunResult<i64> {
    match v.as_int() {
        Some(i) => Ok(i),
        None if matches!(v, Value::Long(_)) => raise(
            ExcKind::OverflowError,
            "Python int too large to convert to C ssize_t",
        ),
        None => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object cannot be interpreted as an integer",
                v.type_name()
            ),
        ),
    }
}

fn expect_real(v: &Value) -> RunResult<f64> {
    match v.as_f64() {
        Some(_) => ops::to_float(v),
        None => raise(
            ExcKind::TypeError,
            format!("must be real number, not {}", v.type_name()),
        ),
    }
}

fn expect_str<'a>(v: &'a Value, context: &str) -> RunResult<&'a str> {
    match v {
        Value::Str(s) => Ok(&**s),
        other => raise(
            ExcKind::TypeError,
            format!("{context} must be str, not {}", other.type_name()),
        ),
    }
}

fn float_to_int(x: f64) -> RunResult<Value> {
    if x.is_nan() {
        return raise(ExcKind::ValueError, "cannot convert float NaN to integer");
    }
    if x.is_infinite() {
        return raise(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        );
    }
    if x.abs() < 9.2e18 {
        return Ok(Value::Int(x as i64));
    }
    BigInt::from_f64(x).map_or_else(
        || raise(ExcKind::OverflowError, "cannot convert float infinity to integer"),
        |n| Ok(Value::from_bigint(n)),
    )
}

/// Sort values in place, surfacing the first comparison error.
fn sort_values(items: &mut [(Value, Value)], reverse: bool) -> RunResult<()> {
    let mut failure: Option<Exception> = None;
    items.sort_by(|(ka, _), (kb, _)| {
        let (a, b) = if reverse { (kb, ka) } else { (ka, kb) };
        match a.py_cmp(b, "<") {
            Ok(ord) => ord,
            Err(e) => {
                failure.get_or_insert(e);
                std::cmp::Ordering::Equal
            }
        }
    });
    failure.map_or(Ok(()), Err)
}

fn keyed(host: &mut dyn Host, items: Vec<Value>, key: Option<&Value>) -> RunResult<Vec<(Value, Value)>> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(Value::None) | None => item.clone(),
            Some(f) => host.call_value(f, vec![item.clone()])?,
        };
        out.push((k, item));
    }
    Ok(out)
}

fn round_half_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

// -------------------------------------------------------------------------
// Builtin calls
// -------------------------------------------------------------------------

pub(crate) fn call(
    builtin: Builtin,
    args: Vec<Value>,
    mut kwargs: Kwargs,
    host: &mut dyn Host,
) -> RunResult<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let sep = match take_kwarg(&mut kwargs, "sep") {
                None | Some(Value::None) => " ".to_string(),
                Some(v) => expect_str(&v, "sep")?.to_string(),
            };
            let end = match take_kwarg(&mut kwargs, "end") {
                None | Some(Value::None) => "\n".to_string(),
                Some(v) => expect_str(&v, "end")?.to_string(),
            };
            take_kwarg(&mut kwargs, "flush");
            take_kwarg(&mut kwargs, "file");
            reject_leftover(name, &kwargs)?;
            let parts: Vec<String> = args.iter().map(Value::str).collect();
            let mut text = parts.join(&sep);
            text.push_str(&end);
            host.write_output(&text);
            Ok(Value::None)
        }
        Builtin::Input => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            if let Some(prompt) = args.first() {
                host.write_output(&prompt.str());
            }
            raise(ExcKind::EOFError, "EOF when reading a line")
        }
        Builtin::Open => {
            let file = args
                .first()
                .cloned()
                .or_else(|| take_kwarg(&mut kwargs, "file"));
            match file {
                Some(f) => raise(
                    ExcKind::PermissionError,
                    format!("[Errno 13] Permission denied: {}", f.repr()),
                ),
                None => raise(
                    ExcKind::TypeError,
                    "open() missing required argument 'file' (pos 1)",
                ),
            }
        }
        Builtin::Len => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count() as i64,
                Value::List(items) => items.borrow().len() as i64,
                Value::Tuple(items) => items.len() as i64,
                Value::Dict(d) => d.borrow().len() as i64,
                Value::Range(r) => r.len(),
                other => {
                    return raise(
                        ExcKind::TypeError,
                        format!("object of type '{}' has no len()", other.type_name()),
                    )
                }
            };
            Ok(Value::Int(n))
        }
        Builtin::Abs => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v if v.is_integer() => match v.as_int().and_then(i64::checked_abs) {
                    Some(i) => Ok(Value::Int(i)),
                    None => Ok(Value::from_bigint(v.as_bigint().unwrap_or_default().abs())),
                },
                other => raise(
                    ExcKind::TypeError,
                    format!("bad operand type for abs(): '{}'", other.type_name()),
                ),
            }
        }
        Builtin::Min | Builtin::Max => {
            let key = take_kwarg(&mut kwargs, "key");
            let default = take_kwarg(&mut kwargs, "default");
            reject_leftover(name, &kwargs)?;
            if args.is_empty() {
                return raise(
                    ExcKind::TypeError,
                    format!("{name} expected at least 1 argument, got 0"),
                );
            }
            let items = if args.len() == 1 {
                args[0].to_vec()?
            } else {
                args
            };
            if items.is_empty() {
                return match default {
                    Some(d) => Ok(d),
                    None => raise(
                        ExcKind::ValueError,
                        format!("{name}() arg is an empty sequence"),
                    ),
                };
            }
            let pairs = keyed(host, items, key.as_ref())?;
            let mut best: Option<&(Value, Value)> = None;
            for pair in &pairs {
                best = match best {
                    None => Some(pair),
                    Some(current) => {
                        let better = if builtin == Builtin::Max {
                            pair.0.py_cmp(&current.0, ">")?.is_gt()
                        } else {
                            pair.0.py_cmp(&current.0, "<")?.is_lt()
                        };
                        if better {
                            Some(pair)
                        } else {
                            Some(current)
                        }
                    }
                };
            }
            Ok(best.map(|(_, v)| v.clone()).unwrap_or(Value::None))
        }
        Builtin::Sum => {
            let start = take_kwarg(&mut kwargs, "start");
            reject_leftover(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let mut total = args.get(1).cloned().or(start).unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return raise(
                    ExcKind::TypeError,
                    "sum() can't sum strings [use ''.join(seq) instead]",
                );
            }
            for item in args[0].iter()? {
                total = ops::binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Sorted => {
            let key = take_kwarg(&mut kwargs, "key");
            let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
            reject_leftover(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let mut pairs = keyed(host, args[0].to_vec()?, key.as_ref())?;
            sort_values(&mut pairs, reverse)?;
            Ok(Value::list(pairs.into_iter().map(|(_, v)| v).collect()))
        }
        Builtin::Reversed => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            if matches!(args[0], Value::Dict(_)) {
                return raise(ExcKind::TypeError, "'dict' object is not reversible");
            }
            let mut items = args[0].to_vec()?;
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Enumerate => {
            let start = take_kwarg(&mut kwargs, "start");
            reject_leftover(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let start = match args.get(1).or(start.as_ref()) {
                Some(v) => expect_int(v)?,
                None => 0,
            };
            let items = args[0]
                .iter()?
                .enumerate()
                .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                .collect();
            Ok(Value::list(items))
        }
        Builtin::Zip => {
            no_kwargs(name, &kwargs)?;
            let columns = args
                .iter()
                .map(Value::to_vec)
                .collect::<RunResult<Vec<_>>>()?;
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let rows = (0..len)
                .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                .collect();
            Ok(Value::list(rows))
        }
        Builtin::Round => {
            let ndigits = take_kwarg(&mut kwargs, "ndigits");
            reject_leftover(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let ndigits = args.get(1).cloned().or(ndigits).filter(|v| !matches!(v, Value::None));
            match (&args[0], ndigits) {
                (v, None) if v.is_integer() => Ok(v.to_int_value().unwrap_or(Value::Int(0))),
                (Value::Float(x), None) => float_to_int(round_half_even(*x)),
                (v, Some(n)) if v.is_number() => {
                    let n = expect_int(&n)?;
                    if v.is_integer() && n >= 0 {
                        return Ok(v.to_int_value().unwrap_or(Value::Int(0)));
                    }
                    let x = ops::to_float(v)?;
                    let factor = 10f64.powi(n.clamp(-308, 308) as i32);
                    let rounded = round_half_even(x * factor) / factor;
                    if v.is_integer() {
                        float_to_int(rounded)
                    } else {
                        Ok(Value::Float(rounded))
                    }
                }
                (other, _) => raise(
                    ExcKind::TypeError,
                    format!(
                        "type {} doesn't define __round__ method",
                        other.type_name()
                    ),
                ),
            }
        }
        Builtin::Isinstance => {
            no_kwargs(name, &kwargs)?;
            if args.len() != 2 {
                return raise(
                    ExcKind::TypeError,
                    format!("isinstance expected 2 arguments, got {}", args.len()),
                );
            }
            Ok(Value::Bool(is_instance(&args[0], &args[1])?))
        }
        Builtin::Repr => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            Ok(Value::string(&args[0].repr()))
        }
        Builtin::Format => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 2)?;
            let spec = match args.get(1) {
                Some(v) => expect_str(v, "format() argument 2")?.to_string(),
                None => String::new(),
            };
            Ok(Value::string(&format_value(&args[0], &spec)?))
        }
        Builtin::Any | Builtin::All => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let mut iter = args[0].iter()?;
            let result = if builtin == Builtin::Any {
                iter.any(|v| v.truthy())
            } else {
                iter.all(|v| v.truthy())
            };
            Ok(Value::Bool(result))
        }
        Builtin::Ord => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Int(c as i64)),
                        _ => raise(
                            ExcKind::TypeError,
                            format!(
                                "ord() expected a character, but string of length {} found",
                                s.chars().count()
                            ),
                        ),
                    }
                }
                other => raise(
                    ExcKind::TypeError,
                    format!(
                        "ord() expected string of length 1, but {} found",
                        other.type_name()
                    ),
                ),
            }
        }
        Builtin::Chr => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let code = expect_int(&args[0])?;
            match u32::try_from(code).ok().and_then(char::from_u32) {
                Some(c) => Ok(Value::string(c.encode_utf8(&mut [0; 4]))),
                None => raise(ExcKind::ValueError, "chr() arg not in range(0x110000)"),
            }
        }
        Builtin::Divmod => {
            no_kwargs(name, &kwargs)?;
            if args.len() != 2 {
                return raise(
                    ExcKind::TypeError,
                    format!("divmod expected 2 arguments, got {}", args.len()),
                );
            }
            let q = ops::binary(BinOp::FloorDiv, &args[0], &args[1])?;
            let r = ops::binary(BinOp::Mod, &args[0], &args[1])?;
            Ok(Value::tuple(vec![q, r]))
        }
        Builtin::Pow => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            ops::binary(BinOp::Pow, &args[0], &args[1])
        }
        Builtin::Int => construct_int(args, kwargs),
        Builtin::Float => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            let Some(arg) = args.first() else {
                return Ok(Value::Float(0.0));
            };
            match arg {
                Value::Str(s) => {
                    let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
                    match cleaned.parse::<f64>() {
                        Ok(x) if !cleaned.is_empty() => Ok(Value::Float(x)),
                        _ => raise(
                            ExcKind::ValueError,
                            format!("could not convert string to float: {}", arg.repr()),
                        ),
                    }
                }
                v if v.is_number() => Ok(Value::Float(v.as_f64().unwrap_or(0.0))),
                other => raise(
                    ExcKind::TypeError,
                    format!(
                        "float() argument must be a string or a real number, not '{}'",
                        other.type_name()
                    ),
                ),
            }
        }
        Builtin::Str => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::string(&args.first().map(Value::str).unwrap_or_default()))
        }
        Builtin::Bool => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
        }
        Builtin::List => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(v) => Ok(Value::list(v.to_vec()?)),
                None => Ok(Value::list(Vec::new())),
            }
        }
        Builtin::Tuple => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 0, 1)?;
            match args.first() {
                Some(Value::Tuple(t)) => Ok(Value::Tuple(t.clone())),
                Some(v) => Ok(Value::tuple(v.to_vec()?)),
                None => Ok(Value::tuple(Vec::new())),
            }
        }
        Builtin::Dict => {
            arity(name, &args, 0, 1)?;
            let mut dict = Dict::default();
            if let Some(source) = args.first() {
                fill_dict(&mut dict, source)?;
            }
            for (k, v) in kwargs {
                dict.insert(Value::string(&k), v);
            }
            Ok(Value::dict(dict))
        }
        Builtin::Range => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 3)?;
            let ints = args.iter().map(expect_int).collect::<RunResult<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return raise(ExcKind::ValueError, "range() arg 3 must not be zero");
            }
            Ok(Value::Range(Range { start, stop, step }))
        }
        Builtin::Type => {
            no_kwargs(name, &kwargs)?;
            if args.len() != 1 {
                return raise(ExcKind::TypeError, "type() takes 1 argument");
            }
            Ok(type_of(&args[0]))
        }
        Builtin::MathSqrt => {
            arity(name, &args, 1, 1)?;
            let x = expect_real(&args[0])?;
            if x < 0.0 {
                return raise(ExcKind::ValueError, "math domain error");
            }
            Ok(Value::Float(x.sqrt()))
        }
        Builtin::MathFloor | Builtin::MathCeil => {
            arity(name, &args, 1, 1)?;
            if let Some(i) = args[0].to_int_value() {
                return Ok(i);
            }
            let x = expect_real(&args[0])?;
            let r = if builtin == Builtin::MathFloor {
                x.floor()
            } else {
                x.ceil()
            };
            float_to_int(r)
        }
        Builtin::MathPow => {
            arity(name, &args, 2, 2)?;
            let (x, y) = (expect_real(&args[0])?, expect_real(&args[1])?);
            if x == 0.0 && y < 0.0 || x < 0.0 && y.fract() != 0.0 {
                return raise(ExcKind::ValueError, "math domain error");
            }
            let r = x.powf(y);
            if r.is_infinite() && x.is_finite() && y.is_finite() {
                return raise(ExcKind::OverflowError, "math range error");
            }
            Ok(Value::Float(r))
        }
        Builtin::MathFabs => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Float(expect_real(&args[0])?.abs()))
        }
        Builtin::MathLog => {
            arity(name, &args, 1, 2)?;
            let x = expect_real(&args[0])?;
            if x <= 0.0 {
                return raise(ExcKind::ValueError, "math domain error");
            }
            match args.get(1) {
                Some(base) => {
                    let b = expect_real(base)?;
                    if b <= 0.0 {
                        return raise(ExcKind::ValueError, "math domain error");
                    }
                    if b == 1.0 {
                        return raise(ExcKind::ZeroDivisionError, "float division by zero");
                    }
                    Ok(Value::Float(x.ln() / b.ln()))
                }
                None => Ok(Value::Float(x.ln())),
            }
        }
        Builtin::MathExp => {
            arity(name, &args, 1, 1)?;
            let r = expect_real(&args[0])?.exp();
            if r.is_infinite() {
                return raise(ExcKind::OverflowError, "math range error");
            }
            Ok(Value::Float(r))
        }
        Builtin::MathFactorial => {
            arity(name, &args, 1, 1)?;
            let n = match &args[0] {
                Value::Float(_) => {
                    return raise(
                        ExcKind::TypeError,
                        "'float' object cannot be interpreted as an integer",
                    )
                }
                v => expect_int(v)?,
            };
            if n < 0 {
                return raise(
                    ExcKind::ValueError,
                    "factorial() not defined for negative values",
                );
            }
            let mut acc = BigInt::from(1);
            for k in 2..=n {
                acc *= k;
                if acc.bits() > MAX_INT_BITS {
                    return Err(Exception::bare(ExcKind::MemoryError));
                }
            }
            Ok(Value::from_bigint(acc))
        }
    }
}

fn construct_int(args: Vec<Value>, mut kwargs: Kwargs) -> RunResult<Value> {
    let base_kw = take_kwarg(&mut kwargs, "base");
    reject_leftover("int", &kwargs)?;
    arity("int", &args, 0, 2)?;
    let base = match args.get(1).cloned().or(base_kw) {
        Some(b) => Some(expect_int(&b)?),
        None => None,
    };
    let Some(arg) = args.first() else {
        return Ok(Value::Int(0));
    };
    match (arg, base) {
        (Value::Str(s), base) => {
            let radix = base.unwrap_or(10);
            if !(2..=36).contains(&radix) {
                return raise(ExcKind::ValueError, "int() base must be >= 2 and <= 36, or 0");
            }
            let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
            let (negative, digits) = match cleaned.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, cleaned.strip_prefix('+').unwrap_or(cleaned.as_str())),
            };
            let parsed = (!digits.is_empty() && digits.chars().all(|c| c.is_digit(radix as u32)))
                .then(|| BigInt::parse_bytes(digits.as_bytes(), radix as u32))
                .flatten();
            match parsed {
                Some(n) => Ok(Value::from_bigint(if negative { -n } else { n })),
                None => raise(
                    ExcKind::ValueError,
                    format!(
                        "invalid literal for int() with base {}: {}",
                        radix,
                        arg.repr()
                    ),
                ),
            }
        }
        (_, Some(_)) => raise(
            ExcKind::TypeError,
            "int() can't convert non-string with explicit base",
        ),
        (Value::Float(x), None) => float_to_int(x.trunc()),
        (v, None) if v.is_integer() => Ok(v.to_int_value().unwrap_or(Value::Int(0))),
        (other, None) => raise(
            ExcKind::TypeError,
            format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

fn fill_dict(dict: &mut Dict, source: &Value) -> RunResult<()> {
    if let Value::Dict(other) = source {
        for (k, v) in other.borrow().items() {
            dict.insert(k, v);
        }
        return Ok(());
    }
    for (i, item) in source.iter()?.enumerate() {
        let pair = item.to_vec().map_err(|_| {
            Exception::new(
                ExcKind::TypeError,
                format!(
                    "cannot convert dictionary update sequence element #{i} to a sequence"
                ),
            )
        })?;
        if pair.len() != 2 {
            return raise(
                ExcKind::ValueError,
                format!(
                    "dictionary update sequence element #{i} has length {}; 2 is required",
                    pair.len()
                ),
            );
        }
        let mut pair = pair.into_iter();
        if let (Some(k), Some(v)) = (pair.next(), pair.next()) {
            k.check_hashable()?;
            dict.insert(k, v);
        }
    }
    Ok(())
}

/// `type(value)`.
pub(crate) fn type_of(value: &Value) -> Value {
    match value {
        Value::Bool(_) => Value::Builtin(Builtin::Bool),
        Value::Int(_) | Value::Long(_) => Value::Builtin(Builtin::Int),
        Value::Float(_) => Value::Builtin(Builtin::Float),
        Value::Str(_) => Value::Builtin(Builtin::Str),
        Value::List(_) => Value::Builtin(Builtin::List),
        Value::Tuple(_) => Value::Builtin(Builtin::Tuple),
        Value::Dict(_) => Value::Builtin(Builtin::Dict),
        Value::Range(_) => Value::Builtin(Builtin::Range),
        Value::ExcType(_) | Value::Type(_) => Value::Builtin(Builtin::Type),
        Value::Builtin(b) if b.is_type() => Value::Builtin(Builtin::Type),
        Value::Exception(e) => Value::ExcType(e.kind),
        other => Value::Type(other.type_name()),
    }
}

fn is_instance(value: &Value, class: &Value) -> RunResult<bool> {
    match class {
        Value::Tuple(classes) => {
            for c in classes.iter() {
                if is_instance(value, c)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(b) if b.is_type() => Ok(match (b, value) {
            (Builtin::Int, Value::Bool(_) | Value::Int(_) | Value::Long(_)) => true,
            (Builtin::Type, Value::ExcType(_) | Value::Type(_)) => true,
            (Builtin::Type, Value::Builtin(inner)) => inner.is_type(),
            (b, v) => b.name() == v.type_name(),
        }),
        Value::ExcType(kind) => Ok(match value {
            Value::Exception(e) => e.kind.is_subclass_of(*kind),
            _ => false,
        }),
        Value::Type(name) => Ok(value.type_name() == *name),
        _ => raise(
            ExcKind::TypeError,
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        ),
    }
}

// -------------------------------------------------------------------------
// Methods
// -------------------------------------------------------------------------

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "index", "count", "format", "title", "capitalize", "isdigit", "isalpha",
    "isalnum", "isspace", "isupper", "islower", "center", "ljust", "rjust", "zfill", "splitlines",
    "swapcase",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "update", "setdefault", "copy", "clear",
];

/// Resolve `receiver.attr` to a bound method or an attribute value.
pub(crate) fn get_attribute(receiver: &Value, attr: &str) -> RunResult<Value> {
    let table: &[&'static str] = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Module(m) => {
            return match m.attrs.borrow().get(attr) {
                Some(v) => Ok(v.clone()),
                None => raise(
                    ExcKind::AttributeError,
                    format!("module '{}' has no attribute '{}'", m.name, attr),
                ),
            }
        }
        Value::Exception(e) if attr == "args" => return Ok(Value::tuple(e.args.clone())),
        Value::Function(f) if attr == "__name__" => return Ok(Value::string(&f.def.name)),
        Value::ExcType(kind) if attr == "__name__" => return Ok(Value::string(kind.as_str())),
        Value::Builtin(b) if attr == "__name__" => return Ok(Value::string(b.name())),
        _ => &[],
    };
    match table.iter().find(|m| **m == attr) {
        Some(name) => Ok(Value::Method(Rc::new(BoundMethod {
            receiver: receiver.clone(),
            name: *name,
        }))),
        None => raise(
            ExcKind::AttributeError,
            format!(
                "'{}' object has no attribute '{}'",
                receiver.type_name(),
                attr
            ),
        ),
    }
}

/// `receiver.attr = value`; only module attributes are writable.
pub(crate) fn set_attribute(receiver: &Value, attr: &str, value: Value) -> RunResult<()> {
    match receiver {
        Value::Module(m) => {
            m.attrs.borrow_mut().insert(attr.to_string(), value);
            Ok(())
        }
        other => {
            let has_method = matches!(other, Value::Str(_) | Value::List(_) | Value::Dict(_))
                && get_attribute(other, attr).is_ok();
            let message = if has_method {
                format!(
                    "'{}' object attribute '{}' is read-only",
                    other.type_name(),
                    attr
                )
            } else {
                format!(
                    "'{}' object has no attribute '{}'",
                    other.type_name(),
                    attr
                )
            };
            raise(ExcKind::AttributeError, message)
        }
    }
}

/// Call a bound method.
pub(crate) fn call_method(
    method: &BoundMethod,
    args: Vec<Value>,
    kwargs: Kwargs,
    host: &mut dyn Host,
) -> RunResult<Value> {
    match &method.receiver {
        Value::Str(s) => str_method(s, method.name, args, kwargs),
        Value::List(items) => list_method(&method.receiver, items, method.name, args, kwargs, host),
        Value::Dict(d) => dict_method(d, method.name, args, kwargs),
        other => raise(
            ExcKind::AttributeError,
            format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                method.name
            ),
        ),
    }
}

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn str_arg<'a>(args: &'a [Value], idx: usize, method: &str) -> RunResult<&'a str> {
    match args.get(idx) {
        Some(Value::Str(s)) => Ok(&**s),
        Some(other) => raise(
            ExcKind::TypeError,
            format!("must be str, not {}", other.type_name()),
        ),
        None => raise(
            ExcKind::TypeError,
            format!("{method}() takes at least 1 argument (0 given)"),
        ),
    }
}

fn str_method(s: &str, name: &str, args: Vec<Value>, mut kwargs: Kwargs) -> RunResult<Value> {
    let text = |t: String| Ok(Value::string(&t));
    let strip_chars = |args: &[Value]| -> RunResult<Option<Vec<char>>> {
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(Value::Str(c)) => Ok(Some(c.chars().collect())),
            Some(other) => raise(
                ExcKind::TypeError,
                format!("{name} arg must be None or str, not {}", other.type_name()),
            ),
        }
    };
    if name != "format" && name != "split" {
        no_kwargs(&format!("str.{name}"), &kwargs)?;
    }
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" => text(s.to_lowercase()),
        "swapcase" => text(
            s.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect::<String>()
                    }
                })
                .collect(),
        ),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&args)?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            text(out.to_string())
        }
        "split" => {
            let sep = args.first().cloned().or_else(|| take_kwarg(&mut kwargs, "sep"));
            let maxsplit = args
                .get(1)
                .cloned()
                .or_else(|| take_kwarg(&mut kwargs, "maxsplit"));
            reject_leftover("split", &kwargs)?;
            let maxsplit = match maxsplit {
                Some(v) => expect_int(&v)?,
                None => -1,
            };
            let parts: Vec<String> = match sep {
                None | Some(Value::None) => {
                    if maxsplit < 0 {
                        s.split_whitespace().map(str::to_string).collect()
                    } else {
                        let mut parts = Vec::new();
                        let mut rest = s.trim_start();
                        while !rest.is_empty() && (parts.len() as i64) < maxsplit {
                            match rest.find(char::is_whitespace) {
                                Some(end) => {
                                    parts.push(rest[..end].to_string());
                                    rest = rest[end..].trim_start();
                                }
                                None => {
                                    parts.push(rest.to_string());
                                    rest = "";
                                }
                            }
                        }
                        if !rest.is_empty() {
                            parts.push(rest.to_string());
                        }
                        parts
                    }
                }
                Some(Value::Str(sep)) => {
                    if sep.is_empty() {
                        return raise(ExcKind::ValueError, "empty separator");
                    }
                    if maxsplit < 0 {
                        s.split(&*sep).map(str::to_string).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, &*sep)
                            .map(str::to_string)
                            .collect()
                    }
                }
                Some(other) => {
                    return raise(
                        ExcKind::TypeError,
                        format!("must be str or None, not {}", other.type_name()),
                    )
                }
            };
            Ok(Value::list(parts.iter().map(|p| Value::string(p)).collect()))
        }
        "splitlines" => Ok(Value::list(s.lines().map(Value::string).collect())),
        "join" => {
            arity("join", &args, 1, 1)?;
            let mut pieces = Vec::new();
            for (i, item) in args[0].iter()?.enumerate() {
                match item {
                    Value::Str(p) => pieces.push(p.to_string()),
                    other => {
                        return raise(
                            ExcKind::TypeError,
                            format!(
                                "sequence item {i}: expected str instance, {} found",
                                other.type_name()
                            ),
                        )
                    }
                }
            }
            text(pieces.join(s))
        }
        "replace" => {
            arity("replace", &args, 2, 3)?;
            let old = str_arg(&args, 0, name)?;
            let new = str_arg(&args, 1, name)?;
            match args.get(2) {
                Some(count) => {
                    let count = expect_int(count)?;
                    if count < 0 {
                        text(s.replace(old, new))
                    } else {
                        text(s.replacen(old, new, count as usize))
                    }
                }
                None => text(s.replace(old, new)),
            }
        }
        "startswith" | "endswith" => {
            arity(name, &args, 1, 1)?;
            let candidates: Vec<String> = match &args[0] {
                Value::Str(p) => vec![p.to_string()],
                Value::Tuple(items) => items.iter().map(Value::str).collect(),
                other => {
                    return raise(
                        ExcKind::TypeError,
                        format!(
                            "{name} first arg must be str or a tuple of str, not {}",
                            other.type_name()
                        ),
                    )
                }
            };
            let hit = candidates.iter().any(|p| {
                if name == "startswith" {
                    s.starts_with(p.as_str())
                } else {
                    s.ends_with(p.as_str())
                }
            });
            Ok(Value::Bool(hit))
        }
        "find" | "index" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(&args, 0, name)?;
            match s.find(needle) {
                Some(byte) => Ok(Value::Int(char_index(s, byte))),
                None if name == "find" => Ok(Value::Int(-1)),
                None => raise(ExcKind::ValueError, "substring not found"),
            }
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            let needle = str_arg(&args, 0, name)?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "format" => Ok(Value::string(&str_format(s, &args, &kwargs)?)),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut prev_alpha = false;
            for c in s.chars() {
                if prev_alpha {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_alpha = c.is_alphabetic();
            }
            text(out)
        }
        "capitalize" => {
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            };
            text(out)
        }
        "isdigit" => Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isspace" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        )),
        "center" | "ljust" | "rjust" => {
            arity(name, &args, 1, 2)?;
            let width = expect_int(&args[0])?.max(0) as usize;
            let fill = match args.get(1) {
                Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
                Some(_) => {
                    return raise(
                        ExcKind::TypeError,
                        "The fill character must be exactly one character long",
                    )
                }
                None => ' ',
            };
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let gap = width - len;
            let fill_n = |n: usize| fill.to_string().repeat(n);
            let out = match name {
                "ljust" => format!("{s}{}", fill_n(gap)),
                "rjust" => format!("{}{s}", fill_n(gap)),
                _ => {
                    let left = gap / 2 + (gap & width & 1);
                    format!("{}{s}{}", fill_n(left), fill_n(gap - left))
                }
            };
            text(out)
        }
        "zfill" => {
            arity(name, &args, 1, 1)?;
            let width = expect_int(&args[0])?.max(0) as usize;
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                _ => (String::new(), s),
            };
            text(format!("{sign}{}{digits}", "0".repeat(width - len)))
        }
        other => raise(
            ExcKind::AttributeError,
            format!("'str' object has no attribute '{other}'"),
        ),
    }
}

/// `template.format(*args, **kwargs)`.
fn str_format(template: &str, args: &[Value], kwargs: &Kwargs) -> RunResult<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            out.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            out.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return raise(ExcKind::ValueError, "Single '}' encountered in format string");
        }
        if c != '{' {
            out.push(c);
            i += 1;
            continue;
        }
        let Some(close) = chars[i..].iter().position(|ch| *ch == '}') else {
            return raise(ExcKind::ValueError, "Single '{' encountered in format string");
        };
        let field: String = chars[i + 1..i + close].iter().collect();
        i += close + 1;

        let (head, spec) = match field.split_once(':') {
            Some((h, s)) => (h.to_string(), s.to_string()),
            None => (field.clone(), String::new()),
        };
        let (key, conversion) = match head.split_once('!') {
            Some((k, conv)) => (k.to_string(), conv.chars().next()),
            None => (head, None),
        };
        let value = if key.is_empty() {
            let v = args.get(auto_index).cloned();
            auto_index += 1;
            v.ok_or_else(|| {
                Exception::new(
                    ExcKind::IndexError,
                    format!(
                        "Replacement index {} out of range for positional args tuple",
                        auto_index - 1
                    ),
                )
            })?
        } else if let Ok(idx) = key.parse::<usize>() {
            args.get(idx).cloned().ok_or_else(|| {
                Exception::new(
                    ExcKind::IndexError,
                    format!("Replacement index {idx} out of range for positional args tuple"),
                )
            })?
        } else {
            kwargs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Exception::new(ExcKind::KeyError, format!("'{key}'")))?
        };
        let value = match conversion {
            Some('r') | Some('a') => Value::string(&value.repr()),
            Some('s') => Value::string(&value.str()),
            _ => value,
        };
        out.push_str(&format_value(&value, &spec)?);
    }
    Ok(out)
}

fn list_method(
    receiver: &Value,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    args: Vec<Value>,
    mut kwargs: Kwargs,
    host: &mut dyn Host,
) -> RunResult<Value> {
    if name != "sort" {
        no_kwargs(&format!("list.{name}"), &kwargs)?;
    }
    match name {
        "append" => {
            arity("list.append", &args, 1, 1)?;
            items.borrow_mut().push(args[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            arity("list.extend", &args, 1, 1)?;
            let extra = args[0].to_vec()?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            if args.len() != 2 {
                return raise(
                    ExcKind::TypeError,
                    format!("insert expected 2 arguments, got {}", args.len()),
                );
            }
            let mut list = items.borrow_mut();
            let len = list.len() as i64;
            let idx = expect_int(&args[0])?;
            let idx = if idx < 0 { (idx + len).max(0) } else { idx.min(len) };
            list.insert(idx as usize, args[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            arity("pop", &args, 0, 1)?;
            let mut list = items.borrow_mut();
            if list.is_empty() {
                return raise(ExcKind::IndexError, "pop from empty list");
            }
            let len = list.len() as i64;
            let idx = match args.first() {
                Some(v) => expect_int(v)?,
                None => -1,
            };
            let idx = if idx < 0 { idx + len } else { idx };
            if !(0..len).contains(&idx) {
                return raise(ExcKind::IndexError, "pop index out of range");
            }
            Ok(list.remove(idx as usize))
        }
        "remove" => {
            arity("list.remove", &args, 1, 1)?;
            let mut list = items.borrow_mut();
            match list.iter().position(|v| v.py_eq(&args[0])) {
                Some(idx) => {
                    list.remove(idx);
                    Ok(Value::None)
                }
                None => raise(ExcKind::ValueError, "list.remove(x): x not in list"),
            }
        }
        "index" => {
            arity("index", &args, 1, 1)?;
            match items.borrow().iter().position(|v| v.py_eq(&args[0])) {
                Some(idx) => Ok(Value::Int(idx as i64)),
                None => raise(
                    ExcKind::ValueError,
                    format!("{} is not in list", args[0].repr()),
                ),
            }
        }
        "count" => {
            arity("list.count", &args, 1, 1)?;
            let n = items.borrow().iter().filter(|v| v.py_eq(&args[0])).count();
            Ok(Value::Int(n as i64))
        }
        "sort" => {
            if !args.is_empty() {
                return raise(ExcKind::TypeError, "sort() takes no positional arguments");
            }
            let key = take_kwarg(&mut kwargs, "key");
            let reverse = take_kwarg(&mut kwargs, "reverse").is_some_and(|v| v.truthy());
            reject_leftover("sort", &kwargs)?;
            let snapshot = items.borrow().clone();
            let mut pairs = keyed(host, snapshot, key.as_ref())?;
            sort_values(&mut pairs, reverse)?;
            *items.borrow_mut() = pairs.into_iter().map(|(_, v)| v).collect();
            Ok(Value::None)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(items.borrow().clone())),
        "clear" => {
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        other => raise(
            ExcKind::AttributeError,
            format!(
                "'{}' object has no attribute '{other}'",
                receiver.type_name()
            ),
        ),
    }
}

fn dict_method(
    dict: &Rc<RefCell<Dict>>,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> RunResult<Value> {
    if name != "update" {
        no_kwargs(&format!("dict.{name}"), &kwargs)?;
    }
    match name {
        "get" => {
            arity("get", &args, 1, 2)?;
            args[0].check_hashable()?;
            let found = dict.borrow().get(&args[0]).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => Ok(Value::list(dict.borrow().keys())),
        "values" => Ok(Value::list(dict.borrow().values())),
        "items" => Ok(Value::list(
            dict.borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect(),
        )),
        "pop" => {
            arity("pop", &args, 1, 2)?;
            args[0].check_hashable()?;
            let removed = dict.borrow_mut().remove(&args[0]);
            match (removed, args.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => raise(ExcKind::KeyError, args[0].repr()),
            }
        }
        "setdefault" => {
            arity("setdefault", &args, 1, 2)?;
            args[0].check_hashable()?;
            let existing = dict.borrow().get(&args[0]).cloned();
            match existing {
                Some(v) => Ok(v),
                None => {
                    let v = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(args[0].clone(), v.clone());
                    Ok(v)
                }
            }
        }
        "update" => {
            arity("update", &args, 0, 1)?;
            let mut incoming = Dict::default();
            if let Some(source) = args.first() {
                fill_dict(&mut incoming, source)?;
            }
            for (k, v) in kwargs {
                incoming.insert(Value::string(&k), v);
            }
            let mut target = dict.borrow_mut();
            for (k, v) in incoming.items() {
                target.insert(k, v);
            }
            Ok(Value::None)
        }
        "copy" => Ok(Value::dict(dict.borrow().clone())),
        "clear" => {
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        other => raise(
            ExcKind::AttributeError,
            format!("'dict' object has no attribute '{other}'"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture {
        out: String,
    }

    impl Host for Capture {
        fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
            match callee {
                Value::Builtin(b) => call(*b, args, Vec::new(), self),
                other => raise(
                    ExcKind::TypeError,
                    format!("'{}' object is not callable", other.type_name()),
                ),
            }
        }

        fn write_output(&mut self, text: &str) {
            self.out.push_str(text);
        }
    }

    fn run(b: Builtin, args: Vec<Value>) -> RunResult<Value> {
        call(b, args, Vec::new(), &mut Capture::default())
    }

    #[test]
    fn test_print_with_sep_and_end() {
        let mut host = Capture::default();
        call(
            Builtin::Print,
            vec![Value::Int(1), Value::string("a")],
            vec![
                ("sep".into(), Value::string("-")),
                ("end".into(), Value::string("!")),
            ],
            &mut host,
        )
        .unwrap();
        assert_eq!(host.out, "1-a!");
    }

    #[test]
    fn test_int_conversion_errors() {
        let err = run(Builtin::Int, vec![Value::string("abc")]).unwrap_err();
        assert_eq!(err.kind(), ExcKind::ValueError);
        assert_eq!(err.message(), "invalid literal for int() with base 10: 'abc'");
        assert!(matches!(run(Builtin::Int, vec![Value::string(" 42 ")]), Ok(Value::Int(42))));
        assert!(matches!(run(Builtin::Int, vec![Value::Float(-2.7)]), Ok(Value::Int(-2))));
        let big = run(Builtin::Int, vec![Value::string("-123456789012345678901234567890")]).unwrap();
        assert_eq!(big.repr(), "-123456789012345678901234567890");
        let v = run(Builtin::Int, vec![Value::Float(1e20)]).unwrap();
        assert_eq!(v.repr(), "100000000000000000000");
        let err = run(Builtin::Int, vec![Value::string("+-1")]).unwrap_err();
        assert_eq!(err.kind(), ExcKind::ValueError);
    }

    #[test]
    fn test_len_of_int() {
        let err = run(Builtin::Len, vec![Value::Int(5)]).unwrap_err();
        assert_eq!(err.message(), "object of type 'int' has no len()");
    }

    #[test]
    fn test_max_of_empty() {
        let err = run(Builtin::Max, vec![Value::list(vec![])]).unwrap_err();
        assert_eq!(err.message(), "max() arg is an empty sequence");
    }

    #[test]
    fn test_sorted_with_key_and_reverse() {
        let words = Value::list(vec![
            Value::string("ccc"),
            Value::string("a"),
            Value::string("bb"),
        ]);
        let sorted = call(
            Builtin::Sorted,
            vec![words],
            vec![
                ("key".into(), Value::Builtin(Builtin::Len)),
                ("reverse".into(), Value::Bool(true)),
            ],
            &mut Capture::default(),
        )
        .unwrap();
        assert_eq!(sorted.repr(), "['ccc', 'bb', 'a']");
    }

    #[test]
    fn test_round_half_even() {
        assert!(matches!(run(Builtin::Round, vec![Value::Float(2.5)]), Ok(Value::Int(2))));
        assert!(matches!(run(Builtin::Round, vec![Value::Float(3.5)]), Ok(Value::Int(4))));
        let v = run(Builtin::Round, vec![Value::Float(1.23456), Value::Int(2)]).unwrap();
        assert_eq!(v.repr(), "1.23");
    }

    #[test]
    fn test_math_module() {
        let math = import_module("math").unwrap();
        let sqrt = get_attribute(&math, "sqrt").unwrap();
        let Value::Builtin(sqrt) = sqrt else {
            panic!("sqrt should be a builtin");
        };
        let err = run(sqrt, vec![Value::Int(-1)]).unwrap_err();
        assert_eq!(err.message(), "math domain error");
        let err = import_module("numpy").unwrap_err();
        assert_eq!(err.kind(), ExcKind::ModuleNotFoundError);
        assert_eq!(err.message(), "No module named 'numpy'");
    }

    #[test]
    fn test_str_methods() {
        let s = Value::string("  Hello, World  ");
        let Value::Method(strip) = get_attribute(&s, "strip").unwrap() else {
            panic!("strip should bind");
        };
        let out = call_method(&strip, vec![], vec![], &mut Capture::default()).unwrap();
        assert_eq!(out.str(), "Hello, World");

        let csv = Value::string("a,b,,c");
        let Value::Method(split) = get_attribute(&csv, "split").unwrap() else {
            panic!("split should bind");
        };
        let parts = call_method(&split, vec![Value::string(",")], vec![], &mut Capture::default())
            .unwrap();
        assert_eq!(parts.repr(), "['a', 'b', '', 'c']");
    }

    #[test]
    fn test_str_format() {
        let out = str_format(
            "{} is {age:>3} ({0!r})",
            &[Value::string("Ada")],
            &vec![("age".into(), Value::Int(36))],
        )
        .unwrap();
        assert_eq!(out, "Ada is  36 ('Ada')");
    }

    #[test]
    fn test_missing_attribute() {
        let err = get_attribute(&Value::list(vec![]), "push").unwrap_err();
        assert_eq!(err.kind(), ExcKind::AttributeError);
        assert_eq!(err.message(), "'list' object has no attribute 'push'");
    }

    #[test]
    fn test_list_methods() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1)]);
        let bind = |name| match get_attribute(&list, name).unwrap() {
            Value::Method(m) => m,
            _ => panic!("expected method"),
        };
        let mut host = Capture::default();
        call_method(&bind("append"), vec![Value::Int(2)], vec![], &mut host).unwrap();
        call_method(&bind("sort"), vec![], vec![], &mut host).unwrap();
        assert_eq!(list.repr(), "[1, 2, 3]");
        let err = call_method(&bind("remove"), vec![Value::Int(9)], vec![], &mut host).unwrap_err();
        assert_eq!(err.message(), "list.remove(x): x not in list");
    }

    #[test]
    fn test_dict_get_and_pop() {
        let mut d = Dict::default();
        d.insert(Value::string("a"), Value::Int(1));
        let dict = Value::dict(d);
        let Value::Method(get) = get_attribute(&dict, "get").unwrap() else {
            panic!("get should bind");
        };
        let v = call_method(
            &get,
            vec![Value::string("z"), Value::Int(0)],
            vec![],
            &mut Capture::default(),
        )
        .unwrap();
        assert!(matches!(v, Value::Int(0)));
        let Value::Method(pop) = get_attribute(&dict, "pop").unwrap() else {
            panic!("pop should bind");
        };
        let err = call_method(&pop, vec![Value::string("z")], vec![], &mut Capture::default())
            .unwrap_err();
        assert_eq!(err.kind(), ExcKind::KeyError);
        assert_eq!(err.message(), "'z'");
    }
}

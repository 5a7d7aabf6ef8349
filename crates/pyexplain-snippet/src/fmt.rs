//! String formatting: the format-spec mini-language used by f-strings,
//! `format()` and `str.format`, plus printf-style `%` formatting.

use num_traits::Signed;

use crate::exception::ExcKind;
use crate::value::{format_float, raise, RunResult, Value};

#[derive(Debug, Clone, PartialEq)]
struct Spec {
    fill: char,
    align: Option<char>,
    sign: char,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    ty: Option<char>,
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            ty: None,
        }
    }
}

fn parse_spec(spec: &str, value: &Value) -> RunResult<Spec> {
    let invalid = || {
        raise(
            ExcKind::ValueError,
            format!(
                "Invalid format specifier '{}' for object of type '{}'",
                spec,
                value.type_name()
            ),
        )
    };
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = chars[0];
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = c;
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let mut width = String::new();
    while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
        width.push(*c);
        i += 1;
    }
    if !width.is_empty() {
        out.width = width.parse().unwrap_or(0);
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let mut precision = String::new();
        while let Some(c) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            precision.push(*c);
            i += 1;
        }
        if precision.is_empty() {
            return raise(ExcKind::ValueError, "Format specifier missing precision");
        }
        out.precision = precision.parse().ok();
    }
    if let Some(&c) = chars.get(i) {
        out.ty = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return invalid();
    }
    Ok(out)
}

/// `format(value, spec)`.
pub(crate) fn format_value(value: &Value, spec: &str) -> RunResult<String> {
    if spec.is_empty() {
        return Ok(value.str());
    }
    let spec = parse_spec(spec, value)?;
    apply(value, &spec)
}

fn unknown_code(ty: char, value: &Value) -> RunResult<String> {
    raise(
        ExcKind::ValueError,
        format!(
            "Unknown format code '{}' for object of type '{}'",
            ty,
            value.type_name()
        ),
    )
}

fn apply(value: &Value, spec: &Spec) -> RunResult<String> {
    match value {
        Value::Str(s) => {
            if let Some(ty) = spec.ty.filter(|t| *t != 's') {
                return unknown_code(ty, value);
            }
            let text: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            Ok(pad(String::new(), text, spec, '<'))
        }
        Value::Bool(_) | Value::Int(_) | Value::Long(_) if matches!(spec.ty, None | Some('d')) => {
            if matches!(value, Value::Bool(_)) && spec.ty.is_none() && spec.grouping.is_none() {
                return Ok(pad(String::new(), value.str(), spec, '<'));
            }
            let n = value.as_bigint().unwrap_or_default();
            let digits = group(&n.magnitude().to_string(), spec.grouping);
            Ok(pad(sign_prefix(n.is_negative(), spec.sign), digits, spec, '>'))
        }
        Value::Bool(_) | Value::Int(_) | Value::Long(_)
            if matches!(spec.ty, Some('x' | 'X' | 'o' | 'b')) =>
        {
            let n = value.as_bigint().unwrap_or_default();
            let magnitude = n.magnitude();
            let digits = match spec.ty {
                Some('x') => magnitude.to_str_radix(16),
                Some('X') => magnitude.to_str_radix(16).to_uppercase(),
                Some('o') => magnitude.to_str_radix(8),
                _ => magnitude.to_str_radix(2),
            };
            Ok(pad(sign_prefix(n.is_negative(), spec.sign), digits, spec, '>'))
        }
        Value::Bool(_) | Value::Int(_) | Value::Long(_) | Value::Float(_) => {
            let x = value.as_f64().unwrap_or(0.0);
            let body = match spec.ty {
                Some('f' | 'F') => fixed(x.abs(), spec.precision.unwrap_or(6)),
                Some('e' | 'E') => {
                    let s = scientific(x.abs(), spec.precision.unwrap_or(6));
                    if spec.ty == Some('E') {
                        s.to_uppercase()
                    } else {
                        s
                    }
                }
                Some('%') => format!("{}%", fixed(x.abs() * 100.0, spec.precision.unwrap_or(6))),
                Some('g' | 'G') => general(x.abs(), spec.precision.unwrap_or(6)),
                None => match spec.precision {
                    Some(p) => general(x.abs(), p.max(1)),
                    None => format_float(x.abs()),
                },
                Some(ty) => return unknown_code(ty, value),
            };
            let body = match body.split_once('.') {
                Some((int_part, frac)) if spec.grouping.is_some() => {
                    format!("{}.{}", group(int_part, spec.grouping), frac)
                }
                _ if spec.grouping.is_some() && body.chars().all(|c| c.is_ascii_digit()) => {
                    group(&body, spec.grouping)
                }
                _ => body,
            };
            let negative = x.is_sign_negative() && x != 0.0;
            Ok(pad(sign_prefix(negative, spec.sign), body, spec, '>'))
        }
        other => {
            if spec.ty.is_some() || spec.precision.is_some() || spec.grouping.is_some() {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "unsupported format string passed to {}.__format__",
                        other.type_name()
                    ),
                );
            }
            Ok(pad(String::new(), other.str(), spec, '<'))
        }
    }
}

fn sign_prefix(negative: bool, sign: char) -> String {
    match (negative, sign) {
        (true, _) => "-".to_string(),
        (false, '+') => "+".to_string(),
        (false, ' ') => " ".to_string(),
        _ => String::new(),
    }
}

fn group(digits: &str, separator: Option<char>) -> String {
    let Some(sep) = separator else {
        return digits.to_string();
    };
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

fn pad(sign: String, body: String, spec: &Spec, default_align: char) -> String {
    let (fill, align) = match (spec.align, spec.zero) {
        (Some(a), _) => (spec.fill, a),
        (None, true) => ('0', '='),
        (None, false) => (spec.fill, default_align),
    };
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let gap = spec.width - len;
    let fill_n = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{sign}{body}{}", fill_n(gap)),
        '^' => format!("{}{sign}{body}{}", fill_n(gap / 2), fill_n(gap - gap / 2)),
        '=' => format!("{sign}{}{body}", fill_n(gap)),
        _ => format!("{}{sign}{body}", fill_n(gap)),
    }
}

fn fixed(x: f64, precision: usize) -> String {
    format!("{x:.precision$}")
}

/// Python-style exponent: `1.5e+03`.
fn scientific(x: f64, precision: usize) -> String {
    let s = format!("{x:.precision$e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => s,
    }
}

fn general(x: f64, precision: usize) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let precision = precision.max(1);
    let exp = x.abs().log10().floor() as i32;
    let trim = |s: String| {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            s
        }
    };
    if exp < -4 || exp >= precision as i32 {
        let s = scientific(x, precision - 1);
        match s.split_once('e') {
            Some((m, e)) => format!("{}e{}", trim(m.to_string()), e),
            None => s,
        }
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim(fixed(x, decimals))
    }
}

/// printf-style `template % args`.
pub(crate) fn percent_format(template: &str, args: &Value) -> RunResult<String> {
    let values: Vec<Value> = match args {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut next = values.iter();
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = '+',
                ' ' => spec.sign = ' ',
                '0' => spec.zero = true,
                '#' => {}
                _ => break,
            }
            i += 1;
        }
        let mut width = String::new();
        while let Some(d) = chars.get(i).filter(|c| c.is_ascii_digit()) {
            width.push(*d);
            i += 1;
        }
        spec.width = width.parse().unwrap_or(0);
        if chars.get(i) == Some(&'.') {
            i += 1;
            let mut precision = String::new();
            while let Some(d) = chars.get(i).filter(|c| c.is_ascii_digit()) {
                precision.push(*d);
                i += 1;
            }
            spec.precision = Some(precision.parse().unwrap_or(0));
        }
        let Some(&conv) = chars.get(i) else {
            return raise(ExcKind::ValueError, "incomplete format");
        };
        i += 1;
        if conv == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = next.next() else {
            return raise(ExcKind::TypeError, "not enough arguments for format string");
        };
        if spec.align == Some('<') {
            spec.zero = false;
        }
        let piece = match conv {
            's' => apply(&Value::string(&arg.str()), &Spec { ty: None, ..spec })?,
            'r' | 'a' => apply(&Value::string(&arg.repr()), &Spec { ty: None, ..spec })?,
            'd' | 'i' | 'u' => {
                let whole = match arg {
                    Value::Float(x) => num_traits::FromPrimitive::from_f64(x.trunc())
                        .map(Value::from_bigint)
                        .unwrap_or(Value::Float(*x)),
                    other => other.to_int_value().map_or_else(
                        || {
                            raise(
                                ExcKind::TypeError,
                                format!(
                                    "%{conv} format: a real number is required, not {}",
                                    other.type_name()
                                ),
                            )
                        },
                        Ok,
                    )?,
                };
                apply(
                    &whole,
                    &Spec {
                        ty: Some('d'),
                        precision: None,
                        ..spec
                    },
                )?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let Some(x) = arg.as_f64() else {
                    return raise(
                        ExcKind::TypeError,
                        format!("must be real number, not {}", arg.type_name()),
                    );
                };
                apply(&Value::Float(x), &Spec { ty: Some(conv), ..spec })?
            }
            'x' | 'X' | 'o' => {
                let Some(n) = arg.to_int_value() else {
                    return raise(
                        ExcKind::TypeError,
                        format!("%{conv} format: an integer is required, not {}", arg.type_name()),
                    );
                };
                apply(&n, &Spec { ty: Some(conv), precision: None, ..spec })?
            }
            other => {
                return raise(
                    ExcKind::ValueError,
                    format!(
                        "unsupported format character '{}' (0x{:x}) at index {}",
                        other,
                        other as u32,
                        i - 1
                    ),
                )
            }
        };
        out.push_str(&piece);
    }

    if next.next().is_some() {
        return raise(
            ExcKind::TypeError,
            "not all arguments converted during string formatting",
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(v: Value, spec: &str) -> String {
        format_value(&v, spec).unwrap()
    }

    #[test]
    fn test_float_specs() {
        assert_eq!(fmt(Value::Float(3.14159), ".2f"), "3.14");
        assert_eq!(fmt(Value::Float(0.25), ".1%"), "25.0%");
        assert_eq!(fmt(Value::Float(1234.5), ",.1f"), "1,234.5");
        assert_eq!(fmt(Value::Float(12345.678), ".3e"), "1.235e+04");
        assert_eq!(fmt(Value::Int(7), ".1f"), "7.0");
    }

    #[test]
    fn test_alignment_and_width() {
        assert_eq!(fmt(Value::string("ab"), ">5"), "   ab");
        assert_eq!(fmt(Value::string("ab"), "*^6"), "**ab**");
        assert_eq!(fmt(Value::Int(42), "05d"), "00042");
        assert_eq!(fmt(Value::Int(-42), "6"), "   -42");
        assert_eq!(fmt(Value::Int(1234567), ","), "1,234,567");
        let big = Value::from_bigint(num_bigint::BigInt::from(u64::MAX));
        assert_eq!(fmt(big.clone(), ","), "18,446,744,073,709,551,615");
        assert_eq!(fmt(big, "x"), "ffffffffffffffff");
    }

    #[test]
    fn test_bad_spec_for_str() {
        let err = format_value(&Value::string("x"), "d").unwrap_err();
        assert_eq!(err.message(), "Unknown format code 'd' for object of type 'str'");
    }

    #[test]
    fn test_percent_formatting() {
        let args = Value::tuple(vec![Value::string("Ada"), Value::Int(36), Value::Float(1.5)]);
        assert_eq!(
            percent_format("%s is %d (%.2f)", &args).unwrap(),
            "Ada is 36 (1.50)"
        );
        assert_eq!(percent_format("100%%", &Value::tuple(vec![])).unwrap(), "100%");
    }

    #[test]
    fn test_percent_argument_count_errors() {
        let err = percent_format("%s %s", &Value::string("a")).unwrap_err();
        assert_eq!(err.message(), "not enough arguments for format string");
        let err = percent_format("%s", &Value::tuple(vec![Value::Int(1), Value::Int(2)]))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "not all arguments converted during string formatting"
        );
    }
}

use pyexplain_snippet::{run, ExcKind, Exception, ExecutionContext, Limits};

fn fail(code: &str) -> Exception {
    match run(code, "main.py", &Limits::default()) {
        Ok(out) => panic!("expected an exception, got output {out:?}"),
        Err((exc, _)) => exc,
    }
}

fn output(code: &str) -> String {
    match run(code, "main.py", &Limits::default()) {
        Ok(out) => out,
        Err((exc, _)) => panic!("unexpected exception:\n{}", exc.render_traceback()),
    }
}

// ── Successful programs ─────────────────────────────────────────────────

#[test]
fn runs_a_small_program() {
    let code = r#"
import math

def area(r):
    return math.pi * r ** 2

shapes = {"small": 1, "big": 3}
for name, r in shapes.items():
    print(f"{name}: {area(r):.2f}")

total = sum(range(1, 11))
print("total", total, sep="=")
words = sorted(["pear", "fig", "apple"], key=len)
print(", ".join(words))
"#;
    assert_eq!(
        output(code),
        "small: 3.14\nbig: 28.27\ntotal=55\nfig, pear, apple\n"
    );
}

#[test]
fn string_formatting_variants() {
    let code = r#"
name = "Ada"
print("Hello, %s! You are %d." % (name, 36))
print("{} has {} letters".format(name, len(name)))
print(f"{name!r:>7}|{3.5:06.2f}|{1234567:,}")
"#;
    assert_eq!(
        output(code),
        "Hello, Ada! You are 36.\nAda has 3 letters\n  'Ada'|003.50|1,234,567\n"
    );
}

#[test]
fn control_flow_and_lists() {
    let code = r#"
evens = []
n = 0
while True:
    n += 1
    if n > 10:
        break
    if n % 2:
        continue
    evens.append(n)
else:
    print("unreachable")
evens[1:3] = ["x"]
print(evens, evens[::-1], len(evens))
"#;
    assert_eq!(output(code), "[2, 'x', 8, 10] [10, 8, 'x', 2] 4\n");
}

#[test]
fn exceptions_can_be_caught_and_inspected() {
    let code = r#"
try:
    {}["k"]
except (IndexError, KeyError) as e:
    print(type(e).__name__, e)
try:
    raise ValueError("bad", 2)
except Exception as e:
    print(e)
finally:
    print("cleanup")
"#;
    assert_eq!(
        output(code),
        "KeyError 'k'\n('bad', 2)\ncleanup\n"
    );
}

// ── Beginner mistakes ───────────────────────────────────────────────────

#[test]
fn name_error_for_typo() {
    let exc = fail("message = 'hi'\nprint(mesage)\n");
    assert_eq!(exc.kind(), ExcKind::NameError);
    assert_eq!(exc.message(), "name 'mesage' is not defined");
    assert_eq!(exc.frames().last().map(|f| f.line), Some(2));
}

#[test]
fn type_error_for_str_plus_int() {
    let exc = fail("age = 30\nprint('Age: ' + age)\n");
    assert_eq!(exc.kind(), ExcKind::TypeError);
    assert_eq!(exc.message(), "can only concatenate str (not \"int\") to str");
}

#[test]
fn zero_division_inside_function() {
    let code = "def average(xs):\n    return sum(xs) / len(xs)\n\naverage([])\n";
    let exc = fail(code);
    assert_eq!(exc.kind(), ExcKind::ZeroDivisionError);
    assert_eq!(exc.message(), "division by zero");
    let last = exc.frames().last().unwrap();
    assert_eq!(last.function.as_deref(), Some("average"));
    assert_eq!(last.source_line.as_deref(), Some("return sum(xs) / len(xs)"));
}

#[test]
fn index_error_on_list() {
    let exc = fail("items = [1, 2, 3]\nitems[3]\n");
    assert_eq!(exc.kind(), ExcKind::IndexError);
    assert_eq!(exc.message(), "list index out of range");
}

#[test]
fn attribute_error_on_list() {
    let exc = fail("items = []\nitems.push(1)\n");
    assert_eq!(exc.kind(), ExcKind::AttributeError);
    assert_eq!(exc.message(), "'list' object has no attribute 'push'");
}

#[test]
fn value_error_from_int_conversion() {
    let exc = fail("int('twelve')\n");
    assert_eq!(exc.kind(), ExcKind::ValueError);
    assert_eq!(exc.message(), "invalid literal for int() with base 10: 'twelve'");
}

#[test]
fn missing_module() {
    let exc = fail("import requests\n");
    assert_eq!(exc.kind(), ExcKind::ModuleNotFoundError);
    assert_eq!(exc.message(), "No module named 'requests'");
}

#[test]
fn input_raises_eof_after_prompt() {
    let err = run("name = input('Name? ')\n", "main.py", &Limits::default()).unwrap_err();
    assert_eq!(err.0.kind(), ExcKind::EOFError);
    assert_eq!(err.1, "Name? ");
}

#[test]
fn open_is_denied() {
    let exc = fail("open('data.txt')\n");
    assert_eq!(exc.kind(), ExcKind::PermissionError);
    assert_eq!(exc.message(), "[Errno 13] Permission denied: 'data.txt'");
}

#[test]
fn assertion_with_message() {
    let exc = fail("x = -1\nassert x > 0, 'x must be positive'\n");
    assert_eq!(exc.kind(), ExcKind::AssertionError);
    assert_eq!(exc.message(), "x must be positive");
}

// ── Compile-time errors ─────────────────────────────────────────────────

#[test]
fn missing_colon_is_syntax_error() {
    let exc = fail("if True\n    print('x')\n");
    assert_eq!(exc.kind(), ExcKind::SyntaxError);
    assert_eq!(exc.message(), "expected ':'");
    let loc = exc.syntax_location().unwrap();
    assert_eq!(loc.line, 1);
    let rendered = exc.render_traceback();
    assert!(rendered.starts_with("  File \"main.py\", line 1\n"));
    assert!(rendered.ends_with("SyntaxError: expected ':'\n"));
}

#[test]
fn bad_indentation() {
    let exc = fail("def f():\nreturn 1\n");
    assert_eq!(exc.kind(), ExcKind::IndentationError);
    assert_eq!(
        exc.message(),
        "expected an indented block after function definition on line 1"
    );
}

#[test]
fn nothing_runs_when_compilation_fails() {
    let err = run("print('before')\nx = = 1\n", "main.py", &Limits::default()).unwrap_err();
    assert_eq!(err.0.kind(), ExcKind::SyntaxError);
    assert!(err.1.is_empty());
}

// ── Rendering and serialization ─────────────────────────────────────────

#[test]
fn traceback_matches_cpython_layout() {
    let code = "def greet(person):\n    return 'Hi ' + person['name']\n\ngreet({})\n";
    let exc = fail(code);
    let expected = "Traceback (most recent call last):\n  File \"main.py\", line 4, in <module>\n    greet({})\n  File \"main.py\", line 2, in greet\n    return 'Hi ' + person['name']\nKeyError: 'name'\n";
    assert_eq!(exc.render_traceback(), expected);
}

#[test]
fn exception_serializes_with_frames() {
    let exc = fail("1 + None\n");
    let json = serde_json::to_value(&exc).unwrap();
    assert_eq!(json["kind"], "TypeError");
    assert_eq!(json["frames"][0]["line"], 1);
    let back: Exception = serde_json::from_value(json).unwrap();
    assert_eq!(back, exc);
}

#[test]
fn contexts_do_not_share_globals() {
    let limits = Limits::default();
    let mut first = ExecutionContext::new("a.py");
    first.execute("secret = 1\n", &limits).unwrap();
    let mut second = ExecutionContext::new("b.py");
    let exc = second.execute("print(secret)\n", &limits).unwrap_err();
    assert_eq!(exc.kind(), ExcKind::NameError);
}

#[test]
fn limits_deserialize_with_defaults() {
    let limits: Limits = serde_json::from_str("{}").unwrap();
    assert_eq!(limits, Limits::default());
    assert_eq!(limits.max_call_depth, 200);
}

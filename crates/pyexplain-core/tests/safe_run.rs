//! End-to-end tests for the safe-execution wrapper.

use std::thread;

use pyexplain_core::sandbox::{
    safe_run, safe_run_with, Evaluator, PythonProcessEvaluator, SandboxConfig, SandboxError,
    SnippetEvaluator,
};
use pyexplain_core::{Category, Limits, BRANDING};

// -------------------------------------------------------------------------
// Success
// -------------------------------------------------------------------------

#[test]
fn test_safe_run_success() {
    let result = safe_run("x = 1 + 1", "<string>", true);
    assert!(result.success());
    assert!(result.record().is_none());
}

#[test]
fn test_safe_run_captures_output() {
    let code = "for i in range(3):\n    print('line', i)\n";
    let result = safe_run(code, "loop.py", false);
    assert!(result.success());
    assert_eq!(result.output(), "line 0\nline 1\nline 2\n");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["output"], "line 0\nline 1\nline 2\n");
    assert!(json["branding"].is_null());
}

#[test]
fn test_safe_run_branding() {
    let result = safe_run("pass", "<string>", true);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["branding"], BRANDING);
}

#[test]
fn test_safe_run_empty_code() {
    let result = safe_run("", "<string>", true);
    assert!(result.success());
    assert_eq!(result.output(), "");
}

// -------------------------------------------------------------------------
// Failure containment
// -------------------------------------------------------------------------

#[test]
fn test_safe_run_failure_containment() {
    let result = safe_run("result = 10 / 0", "<string>", true);
    assert!(!result.success());
    let record = result.record().expect("failure record");
    assert_eq!(record.error_kind, "ZeroDivisionError");
    assert_eq!(record.category, Category::Arithmetic);
    assert_eq!(record.file_name.as_deref(), Some("<string>"));
    assert_eq!(record.line_number, Some(1));
    assert_eq!(record.function_name.as_deref(), Some("<module>"));
    assert!(!record.success);
}

#[test]
fn test_safe_run_partial_output() {
    let code = "print('starting')\nvalues = [1, 2, 3]\nprint(values[5])\nprint('never')\n";
    let result = safe_run(code, "list.py", true);
    assert!(!result.success());
    assert_eq!(result.output(), "starting\n");
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "IndexError");
    assert_eq!(record.original_message, "list index out of range");
    assert_eq!(record.line_number, Some(3));
}

#[test]
fn test_safe_run_reports_innermost_function() {
    let code = "\
def load(config):
    return config['port']

def main():
    settings = {}
    return load(settings)

main()
";
    let record = safe_run(code, "app.py", false).record().cloned().unwrap();
    assert_eq!(record.error_kind, "KeyError");
    assert_eq!(record.original_message, "'port'");
    assert_eq!(record.function_name.as_deref(), Some("load"));
    assert_eq!(record.line_number, Some(2));
    assert!(record.raw_traceback.contains("in main"));
}

#[test]
fn test_safe_run_syntax_error() {
    let result = safe_run("if True\n    print('x')\n", "bad.py", false);
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "SyntaxError");
    assert_eq!(record.category, Category::Syntax);
    assert_eq!(record.line_number, Some(1));
    assert_eq!(record.file_name.as_deref(), Some("bad.py"));
    let details = record.syntax_details.as_ref().expect("syntax details");
    assert!(details.has_caret);
    assert_eq!(details.problematic_line.as_deref(), Some("if True"));
    assert_eq!(result.output(), "");
}

#[test]
fn test_safe_run_deep_recursion_is_contained() {
    let code = "def forever(n):\n    return forever(n + 1)\nforever(0)\n";
    let record = safe_run(code, "rec.py", false).record().cloned().unwrap();
    assert_eq!(record.error_kind, "RecursionError");
    assert_eq!(record.function_name.as_deref(), Some("forever"));
}

#[test]
fn test_safe_run_deep_unary_chain_is_contained() {
    let code = format!("x = {}True\n", "not ".repeat(50_000));
    let result = safe_run(&code, "deep.py", false);
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "RecursionError");
    assert_eq!(
        record.original_message,
        "maximum recursion depth exceeded during compilation"
    );
    assert_eq!(record.line_number, Some(1));
}

#[test]
fn test_safe_run_long_operator_chain_is_contained() {
    let code = format!("x = 1{}\n", " + 1".repeat(30_000));
    let result = safe_run(&code, "deep.py", false);
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "RecursionError");
    assert_eq!(
        record.original_message,
        "maximum recursion depth exceeded during compilation"
    );
}

#[test]
fn test_safe_run_moderate_nesting_still_runs() {
    let code = format!(
        "x = {}True\nprint(x)\nprint(0{})\n",
        "not ".repeat(100),
        " + 1".repeat(500)
    );
    let result = safe_run(&code, "nested.py", false);
    assert!(result.success(), "{:?}", result.record());
    assert_eq!(result.output(), "True\n500\n");
}

#[test]
fn test_safe_run_small_stack_lowers_the_nesting_bound() {
    let evaluator = SnippetEvaluator::new(SandboxConfig {
        stack_size_bytes: 4 * 1024 * 1024,
        ..SandboxConfig::default()
    });
    let code = format!("print(0{})\n", " + 1".repeat(500));
    let result = safe_run_with(&evaluator, &code, "nested.py", false).unwrap();
    assert_eq!(result.record().unwrap().error_kind, "RecursionError");
}

#[test]
fn test_safe_run_ints_are_arbitrary_precision() {
    let code = "print(2 ** 100)\nprint(9223372036854775808 + 1)\nprint(-2 ** 64 // 3)\n";
    let result = safe_run(code, "big.py", false);
    assert!(result.success(), "{:?}", result.record());
    assert_eq!(
        result.output(),
        "1267650600228229401496703205376\n9223372036854775809\n-6148914691236517206\n"
    );
}

#[test]
fn test_safe_run_beginner_mistakes() {
    let cases = [
        ("name = 'Ada'\nprint(nmae)\n", "NameError"),
        ("age = 3\nprint('Age: ' + age)\n", "TypeError"),
        ("int('twelve')\n", "ValueError"),
        ("import requests\n", "ModuleNotFoundError"),
        ("[].push(1)\n", "AttributeError"),
        ("open('data.csv')\n", "PermissionError"),
        ("def f():\nreturn 1\n", "IndentationError"),
    ];
    for (code, kind) in cases {
        let result = safe_run(code, "main.py", false);
        let record = result.record().unwrap_or_else(|| panic!("{code:?} succeeded"));
        assert_eq!(record.error_kind, kind, "for {code:?}");
        assert_ne!(record.category, Category::Other, "for {code:?}");
    }
}

// -------------------------------------------------------------------------
// Isolation and reentrancy
// -------------------------------------------------------------------------

#[test]
fn test_namespace_isolation() {
    let first = safe_run("x = 41", "<string>", false);
    assert!(first.success());
    let second = safe_run("print(x + 1)", "<string>", false);
    let record = second.record().expect("second run must fail");
    assert_eq!(record.error_kind, "NameError");
    assert_eq!(record.original_message, "name 'x' is not defined");
    assert_eq!(record.category, Category::Name);
}

#[test]
fn test_concurrent_runs_do_not_interfere() {
    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let code = format!(
                    "value = {i}\ntotal = 0\nfor n in range(200):\n    total += value\nprint(total)\n"
                );
                let result = safe_run(&code, &format!("worker{i}.py"), false);
                (i, result)
            })
        })
        .collect();
    for handle in handles {
        let (i, result) = handle.join().unwrap();
        assert!(result.success());
        assert_eq!(result.output(), format!("{}\n", i * 200));
    }
}

#[test]
fn test_concurrent_failures_keep_their_own_location() {
    let handles: Vec<_> = (1..6)
        .map(|i| {
            thread::spawn(move || {
                let padding = "pass\n".repeat(i);
                let code = format!("{padding}missing_{i}\n");
                safe_run(&code, "t.py", false)
            })
        })
        .collect();
    for (index, handle) in handles.into_iter().enumerate() {
        let i = index + 1;
        let result = handle.join().unwrap();
        let record = result.record().unwrap();
        assert_eq!(record.line_number, Some(i as u32 + 1));
        assert_eq!(
            record.original_message,
            format!("name 'missing_{i}' is not defined")
        );
    }
}

// -------------------------------------------------------------------------
// Evaluator seam
// -------------------------------------------------------------------------

#[test]
fn test_safe_run_with_custom_limits() {
    let evaluator = SnippetEvaluator::new(SandboxConfig {
        limits: Limits {
            max_call_depth: 5,
            ..Limits::default()
        },
        ..SandboxConfig::default()
    });
    let code = "def depth(n):\n    if n == 0:\n        return 0\n    return depth(n - 1)\nprint(depth(20))\n";
    let result = safe_run_with(&evaluator, code, "d.py", false).unwrap();
    assert_eq!(result.record().unwrap().error_kind, "RecursionError");

    let result = safe_run_with(&SnippetEvaluator::default(), code, "d.py", false).unwrap();
    assert_eq!(result.output(), "0\n");
}

#[test]
fn test_process_evaluator_spawn_failure() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-python");
    let evaluator = PythonProcessEvaluator::new(missing.to_string_lossy());
    assert_eq!(evaluator.name(), "python-process");
    let err = safe_run_with(&evaluator, "print(1)", "main.py", true).unwrap_err();
    assert!(matches!(err, SandboxError::Spawn { .. }));
}

#[cfg(unix)]
fn fake_interpreter(dir: &std::path::Path, body: &str) -> PythonProcessEvaluator {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-python");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    PythonProcessEvaluator::new(path.to_string_lossy())
}

#[cfg(unix)]
#[test]
fn test_process_silent_exit_is_system_exit() {
    let dir = tempfile::tempdir().unwrap();
    let evaluator = fake_interpreter(dir.path(), "cat > /dev/null\necho partial\nexit 3");
    let result = safe_run_with(&evaluator, "import sys\nsys.exit(3)\n", "quit.py", false).unwrap();
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "SystemExit");
    assert_eq!(record.original_message, "3");
    assert_eq!(result.output(), "partial\n");
}

#[cfg(unix)]
#[test]
fn test_process_that_ignores_stdin_is_still_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let evaluator = fake_interpreter(dir.path(), "exit 4");
    let code = "x = 1\n".repeat(200_000);
    let result = safe_run_with(&evaluator, &code, "big.py", false).unwrap();
    let record = result.record().unwrap();
    assert_eq!(record.error_kind, "SystemExit");
    assert_eq!(record.original_message, "4");
}

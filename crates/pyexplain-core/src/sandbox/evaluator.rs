//! Evaluators: the seam between `safe_run` and whatever actually runs code.

use std::any::Any;
use std::fmt;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pyexplain_snippet::{Limits, DEFAULT_STACK_BYTES};

use super::error::{SandboxError, SandboxResult};
use crate::domain::{ErrorObject, ErrorReport};

/// Reads the program from stdin and compiles it under the display filename,
/// so tracebacks name the user's file. A fresh dict is the module namespace.
const PYTHON_BOOTSTRAP: &str = "import sys
source = sys.stdin.read()
name = sys.argv[1]
namespace = {'__name__': '__main__', '__file__': name, '__builtins__': __builtins__}
exec(compile(source, name, 'exec'), namespace)
";

/// Configuration for the in-process evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Stack reserved for the evaluation worker thread. Also caps the
    /// evaluator's recursion limits, see [`SandboxConfig::effective_limits`].
    pub stack_size_bytes: usize,
    pub limits: Limits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            stack_size_bytes: DEFAULT_STACK_BYTES,
            limits: Limits::default(),
        }
    }
}

impl SandboxConfig {
    /// The configured limits, tightened to what `stack_size_bytes` can hold.
    pub fn effective_limits(&self) -> Limits {
        self.limits.clamp_to(Limits::for_stack(self.stack_size_bytes))
    }
}

/// What the evaluated code raised.
pub enum Fault {
    /// A live error object with frames attached.
    Object(Box<dyn ErrorObject + Send>),
    /// Traceback text, e.g. captured from another process's stderr.
    Traceback(String),
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Object(err) => f
                .debug_struct("Object")
                .field("kind", &err.kind_name())
                .field("message", &err.message())
                .finish(),
            Fault::Traceback(text) => f.debug_tuple("Traceback").field(text).finish(),
        }
    }
}

/// Outcome of evaluating one program.
#[derive(Debug)]
pub enum Evaluation {
    Completed { output: String },
    Raised { fault: Fault, output: String },
}

/// Runs a program in a namespace of its own.
///
/// Implementations must not share mutable state between calls. An `Err` is
/// reserved for host faults: the code itself failing is `Ok(Evaluation::Raised)`.
pub trait Evaluator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn evaluate(&self, code: &str, filename: &str) -> SandboxResult<Evaluation>;
}

/// Runs code with the built-in Python-subset interpreter.
///
/// Every call gets a fresh `ExecutionContext` on its own worker thread, so a
/// panic in the interpreter stops at the thread boundary and is reported as a
/// `SystemError`.
#[derive(Debug, Clone, Default)]
pub struct SnippetEvaluator {
    config: SandboxConfig,
}

impl SnippetEvaluator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

impl Evaluator for SnippetEvaluator {
    fn name(&self) -> &str {
        "snippet"
    }

    fn evaluate(&self, code: &str, filename: &str) -> SandboxResult<Evaluation> {
        let code = code.to_string();
        let file_name = filename.to_string();
        let limits = self.config.effective_limits();
        let worker = thread::Builder::new()
            .name("pyexplain-eval".to_string())
            .stack_size(self.config.stack_size_bytes)
            .spawn(move || pyexplain_snippet::run(&code, &file_name, &limits))
            .map_err(|source| SandboxError::WorkerSpawn { source })?;

        let evaluation = match worker.join() {
            Ok(Ok(output)) => Evaluation::Completed { output },
            Ok(Err((exception, output))) => Evaluation::Raised {
                fault: Fault::Object(Box::new(exception)),
                output,
            },
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                tracing::error!(reason = %reason, "snippet evaluator panicked");
                let report = ErrorReport::new(
                    "SystemError",
                    format!("the evaluator stopped unexpectedly: {reason}"),
                );
                Evaluation::Raised {
                    fault: Fault::Object(Box::new(report)),
                    output: String::new(),
                }
            }
        };
        Ok(evaluation)
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs code in a fresh external Python interpreter process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PythonProcessEvaluator {
    interpreter: String,
}

impl PythonProcessEvaluator {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

impl Default for PythonProcessEvaluator {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Evaluator for PythonProcessEvaluator {
    fn name(&self) -> &str {
        "python-process"
    }

    fn evaluate(&self, code: &str, filename: &str) -> SandboxResult<Evaluation> {
        let mut child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(PYTHON_BOOTSTRAP)
            .arg(filename)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(code.as_bytes()) {
                // the process exited without reading; its status says why
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(interpreter = %self.interpreter, "interpreter closed stdin early");
                }
                Err(err) => {
                    drop(stdin);
                    if let Err(kill_err) = child.kill() {
                        debug!(error = %kill_err, "failed to kill interpreter");
                    }
                    child.wait()?;
                    return Err(err.into());
                }
                Ok(()) => {}
            }
        }
        let finished = child.wait_with_output()?;
        debug!(
            interpreter = %self.interpreter,
            status = ?finished.status.code(),
            "python process exited"
        );
        Ok(process_outcome(
            finished.status.success(),
            finished.status.code(),
            &finished.stdout,
            &finished.stderr,
        ))
    }
}

/// Turn a finished interpreter process into an [`Evaluation`]. A failing
/// exit that printed nothing to stderr is `sys.exit(code)` or a signal.
fn process_outcome(success: bool, code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> Evaluation {
    let output = String::from_utf8_lossy(stdout).into_owned();
    if success {
        return Evaluation::Completed { output };
    }
    let stderr = String::from_utf8_lossy(stderr).into_owned();
    if !stderr.trim().is_empty() {
        return Evaluation::Raised {
            fault: Fault::Traceback(stderr),
            output,
        };
    }
    let message = match code {
        Some(code) => code.to_string(),
        None => "terminated by a signal".to_string(),
    };
    Evaluation::Raised {
        fault: Fault::Object(Box::new(ErrorReport::new("SystemExit", message))),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: SandboxConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SandboxConfig::default());
        assert_eq!(config.limits.max_call_depth, 200);
        assert!(config.stack_size_bytes >= 16 * 1024 * 1024);
    }

    #[test]
    fn test_small_stack_tightens_limits() {
        let config = SandboxConfig {
            stack_size_bytes: 2 * 1024 * 1024,
            ..SandboxConfig::default()
        };
        let limits = config.effective_limits();
        assert_eq!(limits, Limits::for_stack(2 * 1024 * 1024));
        assert!(limits.max_eval_depth < config.limits.max_eval_depth);
        assert_eq!(SandboxConfig::default().effective_limits(), Limits::default());
    }

    #[test]
    fn test_snippet_completed() {
        let eval = SnippetEvaluator::default()
            .evaluate("print('hi')\n", "main.py")
            .unwrap();
        match eval {
            Evaluation::Completed { output } => assert_eq!(output, "hi\n"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_snippet_raised_keeps_partial_output() {
        let eval = SnippetEvaluator::default()
            .evaluate("print('before')\n1 / 0\n", "main.py")
            .unwrap();
        match eval {
            Evaluation::Raised {
                fault: Fault::Object(err),
                output,
            } => {
                assert_eq!(err.kind_name(), "ZeroDivisionError");
                assert_eq!(output, "before\n");
                assert_eq!(err.frames().last().map(|f| f.line_number), Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_custom_limits_apply() {
        let config = SandboxConfig {
            limits: Limits {
                max_call_depth: 10,
                ..Limits::default()
            },
            ..SandboxConfig::default()
        };
        let code = "def down(n):\n    return down(n + 1)\ndown(0)\n";
        let eval = SnippetEvaluator::new(config).evaluate(code, "r.py").unwrap();
        match eval {
            Evaluation::Raised {
                fault: Fault::Object(err),
                ..
            } => assert_eq!(err.kind_name(), "RecursionError"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_interpreter_is_spawn_error() {
        let eval = PythonProcessEvaluator::new("/nonexistent/pyexplain-python");
        let err = eval.evaluate("x = 1", "main.py").unwrap_err();
        assert!(matches!(err, SandboxError::Spawn { ref interpreter, .. } if interpreter == "/nonexistent/pyexplain-python"));
    }

    #[test]
    fn test_silent_failing_exit_is_system_exit() {
        match process_outcome(false, Some(3), b"partial\n", b"") {
            Evaluation::Raised {
                fault: Fault::Object(err),
                output,
            } => {
                assert_eq!(err.kind_name(), "SystemExit");
                assert_eq!(err.message(), "3");
                assert_eq!(output, "partial\n");
            }
            other => panic!("unexpected {other:?}"),
        }
        match process_outcome(false, None, b"", b"\n") {
            Evaluation::Raised {
                fault: Fault::Object(err),
                ..
            } => assert_eq!(err.message(), "terminated by a signal"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_failing_exit_with_stderr_is_traceback() {
        let stderr = b"Traceback (most recent call last):\nValueError: x\n";
        match process_outcome(false, Some(1), b"", stderr) {
            Evaluation::Raised {
                fault: Fault::Traceback(text),
                ..
            } => assert!(text.ends_with("ValueError: x\n")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            process_outcome(true, Some(0), b"ok\n", b""),
            Evaluation::Completed { output } if output == "ok\n"
        ));
    }

    #[test]
    fn test_panic_reason() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_reason(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_reason(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_reason(payload.as_ref()), "unknown panic");
    }
}

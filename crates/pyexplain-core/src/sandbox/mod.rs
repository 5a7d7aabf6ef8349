//! Sandbox: run code and turn whatever it raises into a diagnostic record.
//!
//! This is an exception-capture boundary, not a security sandbox. There are
//! no timeouts and no resource limits, and an infinite loop in the evaluated
//! code blocks the caller. The only isolation is a fresh namespace per call.
//!
//! # Modules
//!
//! - [`evaluator`]: `Evaluator` seam, `SnippetEvaluator`, `PythonProcessEvaluator`
//! - [`run`]: `safe_run()`, `safe_run_with()`, `ExecutionResult`
//! - [`error`]: `SandboxError` / `SandboxResult`

pub mod error;
pub mod evaluator;
pub mod run;

pub use error::{SandboxError, SandboxResult};
pub use evaluator::{
    Evaluation, Evaluator, Fault, PythonProcessEvaluator, SandboxConfig, SnippetEvaluator,
};
pub use run::{
    safe_run, safe_run_with, ExecutionFailure, ExecutionResult, ExecutionSuccess, SUCCESS_MESSAGE,
};

//! `safe_run`: the capture boundary between evaluated code and the caller.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::error::SandboxResult;
use super::evaluator::{Evaluation, Evaluator, Fault, SnippetEvaluator};
use crate::decode::Decoder;
use crate::domain::{DiagnosticRecord, ErrorReport, BRANDING};
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};

/// Message attached to every successful run.
pub const SUCCESS_MESSAGE: &str = "Code executed successfully! ✅";

/// The code ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSuccess {
    pub success: bool,
    /// Captured standard output; `None` when nothing was printed.
    pub output: Option<String>,
    pub branding: Option<String>,
    pub message: String,
}

/// The code raised; `record.success` is `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    #[serde(flatten)]
    pub record: DiagnosticRecord,
    /// Whatever was printed before the fault.
    pub output: String,
}

/// Result of [`safe_run`]. Both shapes serialize with a top-level `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Success(ExecutionSuccess),
    Failure(ExecutionFailure),
}

impl ExecutionResult {
    fn completed(output: String, add_branding: bool) -> Self {
        ExecutionResult::Success(ExecutionSuccess {
            success: true,
            output: (!output.is_empty()).then_some(output),
            branding: add_branding.then(|| BRANDING.to_string()),
            message: SUCCESS_MESSAGE.to_string(),
        })
    }

    pub fn success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn record(&self) -> Option<&DiagnosticRecord> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(failure) => Some(&failure.record),
        }
    }

    /// Captured output, empty when nothing was printed.
    pub fn output(&self) -> &str {
        match self {
            ExecutionResult::Success(ok) => ok.output.as_deref().unwrap_or(""),
            ExecutionResult::Failure(failure) => &failure.output,
        }
    }
}

/// Run `code` with the built-in interpreter and decode anything it raises.
///
/// Never fails: a host fault (the worker thread could not start) becomes a
/// `SystemError` record. Not a security sandbox; see [`crate::sandbox`].
pub fn safe_run(code: &str, filename: &str, add_branding: bool) -> ExecutionResult {
    let evaluator = SnippetEvaluator::default();
    match safe_run_with(&evaluator, code, filename, add_branding) {
        Ok(result) => result,
        Err(err) => {
            let report = ErrorReport::new("SystemError", err.to_string());
            let record = Decoder::builtin().decode_exception(&report, add_branding);
            ExecutionResult::Failure(ExecutionFailure {
                record,
                output: String::new(),
            })
        }
    }
}

/// Run `code` through `evaluator` and decode anything it raises.
///
/// Only host faults come back as `Err`.
pub fn safe_run_with(
    evaluator: &dyn Evaluator,
    code: &str,
    filename: &str,
    add_branding: bool,
) -> SandboxResult<ExecutionResult> {
    METRICS.inc_safe_runs();
    let _span = RunSpan::enter(filename);

    if code.trim().is_empty() {
        return Ok(ExecutionResult::completed(String::new(), add_branding));
    }

    obs::emit_run_started(filename, evaluator.name(), code.len());
    let started = Instant::now();
    let evaluation = evaluator.evaluate(code, filename).map_err(|err| {
        obs::emit_evaluator_fault(filename, &err);
        err
    })?;

    let result = match evaluation {
        Evaluation::Completed { output } => ExecutionResult::completed(output, add_branding),
        Evaluation::Raised { fault, output } => {
            METRICS.inc_safe_run_failures();
            let decoder = Decoder::builtin();
            let record = match fault {
                Fault::Object(error) => decoder.decode_exception(error.as_ref(), add_branding),
                Fault::Traceback(text) => decoder.decode_traceback(&text, add_branding),
            };
            obs::emit_error_decoded(
                &record.error_kind,
                record.category.label(),
                decoder.knows(&record.error_kind),
                record.location().as_deref(),
            );
            ExecutionResult::Failure(ExecutionFailure { record, output })
        }
    };

    obs::emit_run_finished(
        filename,
        started.elapsed().as_millis() as u64,
        result.success(),
    );
    Ok(result)
}

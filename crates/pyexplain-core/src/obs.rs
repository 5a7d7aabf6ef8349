//! Structured lifecycle events for decode and safe-run calls.
//!
//! Events are emitted at `info!` level with an `event` field so they can be
//! filtered (`PYEXPLAIN_LOG=info`) or shipped as JSON (`--log-json`).

use tracing::info;

/// RAII guard that enters a run-scoped span for one `safe_run` call.
///
/// ```ignore
/// let _span = RunSpan::enter("main.py");
/// // tracing calls below carry file_name = "main.py"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(file_name: &str) -> Self {
        let span = tracing::info_span!("pyexplain.run", file_name = %file_name);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: code handed to an evaluator.
pub fn emit_run_started(file_name: &str, evaluator: &str, code_bytes: usize) {
    info!(
        event = "run.started",
        file_name = %file_name,
        evaluator = %evaluator,
        code_bytes = code_bytes,
    );
}

/// Emit event: evaluation finished.
pub fn emit_run_finished(file_name: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        file_name = %file_name,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: an error was decoded into a record. `location` is
/// `"<file>:<line>"` when the record has one.
pub fn emit_error_decoded(error_kind: &str, category: &str, known: bool, location: Option<&str>) {
    info!(
        event = "error.decoded",
        error_kind = %error_kind,
        category = %category,
        known = known,
        location = location.unwrap_or("-"),
    );
}

/// Emit event: the evaluator itself failed (warning level).
pub fn emit_evaluator_fault(file_name: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "run.evaluator_fault", file_name = %file_name, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("main.py");
        emit_run_started("main.py", "snippet", 12);
        emit_error_decoded("NameError", "Name Errors", true, Some("main.py:2"));
        emit_run_finished("main.py", 3, true);
    }
}

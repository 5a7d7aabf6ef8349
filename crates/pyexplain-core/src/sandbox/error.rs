//! Error types for the sandbox module.
//!
//! These are host faults only. Anything the evaluated code raises is data
//! and comes back inside an `ExecutionResult`.

use std::io;

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to spawn interpreter {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: io::Error,
    },

    #[error("evaluator i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to start evaluation worker: {source}")]
    WorkerSpawn {
        #[source]
        source: io::Error,
    },
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let err = SandboxError::Spawn {
            interpreter: "python9".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn interpreter python9: not found"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_converts() {
        let err: SandboxError = io::Error::new(io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, SandboxError::Io(_)));
    }
}

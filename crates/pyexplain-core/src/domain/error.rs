//! Error taxonomy for the decode engine.
//!
//! Malformed tracebacks and unknown kinds are not errors: they degrade to a
//! fallback record. Only the shapes below are reported outward.

/// Errors produced by [`crate::decode::decode`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid input kind: expected traceback text or an error report, found {found}")]
    InvalidInputKind { found: String },
}

/// Errors produced while loading a knowledge-base table.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("knowledge base parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("knowledge base entry {kind} has an empty {field}")]
    InvalidEntry { kind: String, field: &'static str },
}

/// Errors produced while loading a category table.
#[derive(Debug, thiserror::Error)]
pub enum CategoryTableError {
    #[error("category table parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown category label: {0}")]
    UnknownCategory(String),
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::InvalidInputKind {
            found: "number".to_string(),
        };
        assert!(err.to_string().contains("invalid input kind"));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_knowledge_error_display() {
        let err = KnowledgeError::InvalidEntry {
            kind: "ValueError".to_string(),
            field: "fix",
        };
        assert_eq!(
            err.to_string(),
            "knowledge base entry ValueError has an empty fix"
        );
    }

    #[test]
    fn test_parse_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CategoryTableError = json_err.into();
        assert!(err.to_string().starts_with("category table parse error"));
    }
}

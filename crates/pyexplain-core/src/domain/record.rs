//! The diagnostic record produced by every decode path.

use serde::{Deserialize, Serialize};

use crate::categorize::Category;

/// Footer text attached when branding is requested.
pub const BRANDING: &str = "Powered by PyExplain";

/// Kind reported when no error kind could be extracted.
pub const UNKNOWN_KIND: &str = "UnknownError";

/// Caret information recovered from a compile-time error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxDetails {
    pub has_caret: bool,
    /// 0-based column of the first `^`, relative to the stripped source line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caret_position: Option<usize>,
    /// The source line shown above the caret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problematic_line: Option<String>,
}

/// Beginner-readable description of one error.
///
/// Created once per decode call and never mutated by the engine afterwards.
/// `error_kind` is never empty and `line_number`, when present, is at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub error_kind: String,
    pub original_message: String,
    pub simple_explanation: String,
    pub fix_suggestion: String,
    pub line_number: Option<u32>,
    pub file_name: Option<String>,
    pub function_name: Option<String>,
    pub tags: Vec<String>,
    pub category: Category,
    pub emoji: String,
    pub branding: Option<String>,
    pub success: bool,
    /// Sanitized traceback text the record was decoded from.
    #[serde(default)]
    pub raw_traceback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syntax_details: Option<SyntaxDetails>,
}

impl DiagnosticRecord {
    /// `"<file>:<line>"` when both parts are known.
    pub fn location(&self) -> Option<String> {
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.error_kind == UNKNOWN_KIND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiagnosticRecord {
        DiagnosticRecord {
            error_kind: "ValueError".to_string(),
            original_message: "bad".to_string(),
            simple_explanation: "explanation".to_string(),
            fix_suggestion: "fix".to_string(),
            line_number: Some(3),
            file_name: Some("app.py".to_string()),
            function_name: Some("<module>".to_string()),
            tags: vec!["value".to_string()],
            category: Category::Type,
            emoji: "⚠️".to_string(),
            branding: None,
            success: false,
            raw_traceback: String::new(),
            syntax_details: None,
        }
    }

    #[test]
    fn test_record_serializes_with_category_label() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["category"], "Type Errors");
        assert_eq!(json["success"], false);
        assert!(json.get("syntax_details").is_none());
        assert!(json["branding"].is_null());
    }

    #[test]
    fn test_record_location() {
        let mut record = sample();
        assert_eq!(record.location().as_deref(), Some("app.py:3"));
        record.line_number = None;
        assert_eq!(record.location(), None);
    }

    #[test]
    fn test_record_is_unknown() {
        let mut record = sample();
        assert!(!record.is_unknown());
        record.error_kind = UNKNOWN_KIND.to_string();
        assert!(record.is_unknown());
    }

    #[test]
    fn test_syntax_details_skip_absent_fields() {
        let details = SyntaxDetails {
            has_caret: false,
            caret_position: None,
            problematic_line: None,
        };
        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(json, r#"{"has_caret":false}"#);
    }
}

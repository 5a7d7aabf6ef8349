//! The decode engine.
//!
//! Sanitize -> extract -> categorize -> look up -> assemble. Every text and
//! object input yields a [`DiagnosticRecord`]; only [`Decoder::decode`] can
//! reject its input, and only for the wrong kind of value.

use std::fmt;
use std::sync::{Arc, LazyLock};

use serde::Deserialize;
use tracing::debug;

use crate::categorize::{last_segment, Category, CategoryTable};
use crate::domain::{
    DecodeError, DiagnosticRecord, ErrorObject, ErrorReport, Result, BRANDING, UNKNOWN_KIND,
};
use crate::extract::{extract, extract_from_error, syntax_details, PartialFields};
use crate::format;
use crate::i18n::{translate, Language};
use crate::knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeLookup};
use crate::metrics::METRICS;
use crate::sanitize::sanitize;

static BUILTIN: LazyLock<Decoder> = LazyLock::new(|| {
    Decoder::new(KnowledgeBase::builtin(), CategoryTable::builtin())
});

const SYNTAX_FAMILY: [&str; 3] = ["SyntaxError", "IndentationError", "TabError"];

/// Decodes error reports against one knowledge-base and category-table snapshot.
///
/// Cheap to clone; the tables are shared.
#[derive(Clone)]
pub struct Decoder {
    knowledge: Arc<dyn KnowledgeLookup>,
    categories: Arc<CategoryTable>,
    language: Option<Language>,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("knowledge_version", &self.knowledge.version())
            .field("categories_version", &self.categories.version())
            .field("language", &self.language)
            .finish()
    }
}

impl Decoder {
    pub fn new(knowledge: Arc<dyn KnowledgeLookup>, categories: Arc<CategoryTable>) -> Self {
        Self {
            knowledge,
            categories,
            language: None,
        }
    }

    /// The process-wide decoder over the embedded tables.
    pub fn builtin() -> &'static Decoder {
        &BUILTIN
    }

    /// Replace explanation and fix with `language`'s catalog where it has one.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn knowledge_version(&self) -> &str {
        self.knowledge.version()
    }

    /// Apply this decoder's language to a record decoded elsewhere.
    pub fn localize(&self, record: &mut DiagnosticRecord) {
        if let Some(t) = self.language.and_then(|l| translate(&record.error_kind, l)) {
            record.simple_explanation = t.explanation;
            record.fix_suggestion = t.fix;
        }
    }

    /// Whether the knowledge base has an entry for `error_kind`.
    pub fn knows(&self, error_kind: &str) -> bool {
        self.knowledge.lookup(error_kind).is_some()
    }

    /// Decode raw traceback text. Never fails.
    pub fn decode_traceback(&self, text: &str, add_branding: bool) -> DiagnosticRecord {
        let cleaned = sanitize(text);
        let fields = extract(&cleaned);
        debug!(
            stage = "extract",
            kind = ?fields.error_kind,
            line = ?fields.line_number,
            "fields extracted from text"
        );
        self.assemble(fields, cleaned, add_branding)
    }

    /// Decode a caught error object. Never fails.
    pub fn decode_exception(&self, error: &dyn ErrorObject, add_branding: bool) -> DiagnosticRecord {
        let fields = extract_from_error(error);
        debug!(
            stage = "extract",
            kind = ?fields.error_kind,
            frames = error.frames().len(),
            "fields extracted from error object"
        );
        let cleaned = sanitize(&error.render_traceback());
        self.assemble(fields, cleaned, add_branding)
    }

    /// Dispatch on the shape of `value`: a string is traceback text, an
    /// object shaped like [`ErrorReport`] is an error object.
    pub fn decode(&self, value: &serde_json::Value, add_branding: bool) -> Result<DiagnosticRecord> {
        match value {
            serde_json::Value::String(text) => Ok(self.decode_traceback(text, add_branding)),
            serde_json::Value::Object(_) => {
                let report = ErrorReport::deserialize(value).map_err(|err| {
                    debug!(error = %err, "object is not an error report");
                    DecodeError::InvalidInputKind {
                        found: "object without error-report fields".to_string(),
                    }
                })?;
                Ok(self.decode_exception(&report, add_branding))
            }
            other => Err(DecodeError::InvalidInputKind {
                found: json_kind(other).to_string(),
            }),
        }
    }

    /// Render `record` for a terminal.
    pub fn format_decoded_output(
        &self,
        record: &DiagnosticRecord,
        include_technical: bool,
        color: bool,
    ) -> String {
        format::format_decoded_output(record, include_technical, color)
    }

    fn assemble(&self, fields: PartialFields, cleaned: String, add_branding: bool) -> DiagnosticRecord {
        METRICS.inc_decodes();
        let error_kind = fields
            .error_kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_KIND.to_string());
        let category = if error_kind == UNKNOWN_KIND {
            Category::Other
        } else {
            self.categories.categorize(&error_kind)
        };

        let entry = match self.knowledge.lookup(&error_kind) {
            Some(entry) => entry.clone(),
            None => {
                METRICS.inc_knowledge_misses();
                debug!(kind = %error_kind, "knowledge base miss, using fallback");
                KnowledgeEntry::fallback(&error_kind)
            }
        };
        let syntax = is_syntax_family(&error_kind).then(|| syntax_details(&cleaned));

        let mut record = DiagnosticRecord {
            original_message: fields.message,
            simple_explanation: entry.explanation,
            fix_suggestion: entry.fix,
            line_number: fields.line_number,
            file_name: fields.file_name,
            function_name: fields.function_name,
            tags: entry.tags,
            category,
            emoji: entry.emoji,
            branding: add_branding.then(|| BRANDING.to_string()),
            success: false,
            raw_traceback: cleaned,
            syntax_details: syntax,
            error_kind,
        };
        self.localize(&mut record);
        record
    }
}

fn is_syntax_family(kind: &str) -> bool {
    SYNTAX_FAMILY.contains(&last_segment(kind))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Decode traceback text with the built-in decoder.
pub fn decode_traceback(text: &str, add_branding: bool) -> DiagnosticRecord {
    Decoder::builtin().decode_traceback(text, add_branding)
}

/// Decode an error object with the built-in decoder.
pub fn decode_exception(error: &dyn ErrorObject, add_branding: bool) -> DiagnosticRecord {
    Decoder::builtin().decode_exception(error, add_branding)
}

/// Decode text or a serialized error report with the built-in decoder.
pub fn decode(value: &serde_json::Value, add_branding: bool) -> Result<DiagnosticRecord> {
    Decoder::builtin().decode(value, add_branding)
}

/// Render a record; see [`format::format_decoded_output`].
pub fn format_decoded_output(record: &DiagnosticRecord, include_technical: bool, color: bool) -> String {
    format::format_decoded_output(record, include_technical, color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Frame;
    use serde_json::json;

    const TB: &str = "Traceback (most recent call last):\n  File \"test.py\", line 5, in <module>\n    number = int(\"abc\")\nValueError: invalid literal for int() with base 10: 'abc'\n";

    #[test]
    fn test_decode_traceback_fields() {
        let record = decode_traceback(TB, true);
        assert_eq!(record.error_kind, "ValueError");
        assert_eq!(
            record.original_message,
            "invalid literal for int() with base 10: 'abc'"
        );
        assert_eq!(record.line_number, Some(5));
        assert_eq!(record.file_name.as_deref(), Some("test.py"));
        assert_eq!(record.function_name.as_deref(), Some("<module>"));
        assert_eq!(record.category, Category::Type);
        assert_eq!(record.branding.as_deref(), Some(BRANDING));
        assert!(!record.success);
        assert!(record.raw_traceback.starts_with("Traceback"));
        assert!(record.syntax_details.is_none());
    }

    #[test]
    fn test_branding_flag() {
        assert!(decode_traceback(TB, false).branding.is_none());
    }

    #[test]
    fn test_empty_input_is_unknown() {
        let record = decode_traceback("", true);
        assert_eq!(record.error_kind, UNKNOWN_KIND);
        assert_eq!(record.category, Category::Other);
        assert!(!record.simple_explanation.is_empty());
        assert!(!record.fix_suggestion.is_empty());
    }

    #[test]
    fn test_unknown_kind_falls_back() {
        let record = decode_traceback("TotallyMadeUpError: x", true);
        assert_eq!(record.error_kind, "TotallyMadeUpError");
        assert!(record.simple_explanation.contains("TotallyMadeUpError"));
        assert_eq!(record.category, Category::Other);
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_decode_exception_matches_text_path() {
        let report = ErrorReport::new("ValueError", "invalid literal for int() with base 10: 'abc'")
            .with_frame(Frame {
                file_name: "test.py".to_string(),
                line_number: 5,
                function_name: Some("<module>".to_string()),
                source_line: Some("number = int(\"abc\")".to_string()),
            });
        let from_object = decode_exception(&report, true);
        let from_text = decode_traceback(TB, true);
        assert_eq!(from_object, from_text);
    }

    #[test]
    fn test_decode_dispatch() {
        let text = decode(&json!(TB), true).unwrap();
        assert_eq!(text.error_kind, "ValueError");

        let object = decode(
            &json!({"error_kind": "KeyError", "message": "'id'", "frames": [
                {"file_name": "app.py", "line_number": 3, "function_name": "load"}
            ]}),
            false,
        )
        .unwrap();
        assert_eq!(object.error_kind, "KeyError");
        assert_eq!(object.function_name.as_deref(), Some("load"));
        assert_eq!(object.category, Category::Lookup);

        for bad in [json!(42), json!(null), json!(true), json!([1]), json!({"colour": 1})] {
            assert!(matches!(
                decode(&bad, true),
                Err(DecodeError::InvalidInputKind { .. })
            ));
        }
    }

    #[test]
    fn test_invalid_input_names_found_kind() {
        let err = decode(&json!(3.5), true).unwrap_err();
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_syntax_details_attached() {
        let text = "  File \"bad.py\", line 1\n    x = = 1\n        ^\nSyntaxError: invalid syntax";
        let record = decode_traceback(text, false);
        assert_eq!(record.category, Category::Syntax);
        let details = record.syntax_details.unwrap();
        assert!(details.has_caret);
        assert_eq!(details.caret_position, Some(4));
        assert_eq!(details.problematic_line.as_deref(), Some("x = = 1"));
    }

    #[test]
    fn test_language_override() {
        let decoder = Decoder::builtin().clone().with_language(Language::Spanish);
        let record = decoder.decode_traceback("ZeroDivisionError: division by zero", false);
        assert!(record.simple_explanation.contains("cero"));
        assert_eq!(record.original_message, "division by zero");

        let record = decoder.decode_traceback("TotallyMadeUpError: x", false);
        assert!(record.simple_explanation.contains("TotallyMadeUpError"));

        let mut record = decode_traceback("KeyError: 'k'", false);
        decoder.localize(&mut record);
        assert!(record.simple_explanation.contains("clave"));
    }

    #[test]
    fn test_custom_tables() {
        let kb = KnowledgeBase::from_json(
            r#"{"version":"custom","entries":{"BoomError":{"explanation":"It went boom.","fix":"Stop it going boom.","tags":["boom"],"emoji":"💥"}}}"#,
        )
        .unwrap();
        let decoder = Decoder::new(Arc::new(kb), Arc::new(CategoryTable::empty()));
        assert_eq!(decoder.knowledge_version(), "custom");
        let record = decoder.decode_traceback("BoomError: now", true);
        assert_eq!(record.simple_explanation, "It went boom.");
        assert_eq!(record.tags, vec!["boom".to_string()]);
        assert_eq!(record.category, Category::Other);
    }
}

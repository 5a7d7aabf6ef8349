//! Field extraction from sanitized traceback text or error objects.
//!
//! The summary line (`Kind: message`) is authoritative for kind and message;
//! any lines printed after it continue the message. The last frame line
//! before it (the innermost call) is authoritative for the location.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{ErrorObject, Frame, SyntaxDetails};
use crate::sanitize::FRAME_LINE;

static KIND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.]*$").expect("static kind pattern"));

/// Fields pulled out of one error report. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFields {
    pub error_kind: Option<String>,
    pub message: String,
    pub line_number: Option<u32>,
    pub file_name: Option<String>,
    pub function_name: Option<String>,
}

/// Extract fields from sanitized traceback text. Never fails.
pub fn extract(cleaned: &str) -> PartialFields {
    let lines: Vec<&str> = cleaned.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut fields = PartialFields::default();

    let summary = summary_index(&lines);
    if let Some(index) = summary {
        let (kind, message) = split_final_line(lines[index].trim());
        fields.error_kind = Some(kind.to_string());
        let mut message = message.to_string();
        for line in &lines[index + 1..] {
            message.push('\n');
            message.push_str(line);
        }
        fields.message = message;
    }

    // A truncated traceback has no summary line, so its last line may be a frame.
    let frame_lines = match summary {
        Some(index) => &lines[..index],
        None => &lines[..],
    };
    if let Some(caps) = frame_lines
        .iter()
        .rev()
        .find_map(|line| FRAME_LINE.captures(line))
    {
        fields.file_name = caps.name("path").map(|m| m.as_str().to_string());
        fields.line_number = caps
            .name("line")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| *n > 0);
        fields.function_name = caps.name("func").map(|m| m.as_str().trim().to_string());
    }
    fields
}

/// Extract fields from an error object, using its innermost frame.
pub fn extract_from_error(error: &dyn ErrorObject) -> PartialFields {
    let kind = error.kind_name().trim();
    let frames = error.frames();
    let innermost: Option<&Frame> = frames.last();
    PartialFields {
        error_kind: (!kind.is_empty()).then(|| kind.to_string()),
        message: error.message(),
        line_number: innermost.map(|f| f.line_number).filter(|n| *n > 0),
        file_name: innermost.map(|f| f.file_name.clone()),
        function_name: innermost.and_then(|f| f.function_name.clone()),
    }
}

/// Caret details from a compile-time report.
pub fn syntax_details(cleaned: &str) -> SyntaxDetails {
    let lines: Vec<&str> = cleaned.lines().collect();
    let body = lines.len().saturating_sub(1);
    for index in 1..body {
        let line = lines[index];
        let trimmed = line.trim();
        if trimmed.starts_with('^') && trimmed.chars().all(|c| c == '^' || c == '~') {
            let source = lines[index - 1];
            let indent = source.len() - source.trim_start().len();
            let column = line.find('^').unwrap_or(0);
            return SyntaxDetails {
                has_caret: true,
                caret_position: Some(column.saturating_sub(indent)),
                problematic_line: Some(source.trim().to_string()),
            };
        }
    }
    SyntaxDetails {
        has_caret: false,
        caret_position: None,
        problematic_line: None,
    }
}

/// `Kind: message`, `Kind:` or bare `Kind`.
fn split_final_line(line: &str) -> (&str, &str) {
    if let Some((kind, message)) = line.split_once(": ") {
        return (kind, message);
    }
    match line.strip_suffix(':') {
        Some(kind) => (kind, ""),
        None => (line, ""),
    }
}

/// Index of the `Kind: message` line. After a frame block it is the first
/// unindented line, since indented ones echo source or carets; without
/// frames it is the last line shaped like one.
fn summary_index(lines: &[&str]) -> Option<usize> {
    match lines.iter().rposition(|line| FRAME_LINE.is_match(line)) {
        Some(last_frame) => (last_frame + 1..lines.len())
            .find(|&i| !lines[i].starts_with(char::is_whitespace))
            .filter(|&i| is_summary_line(lines[i])),
        None => lines.iter().rposition(|line| is_summary_line(line)),
    }
}

/// Exception names are class names: the last dotted segment starts
/// uppercase unless the name is module-qualified (`re.error`).
fn is_summary_line(line: &str) -> bool {
    let (kind, _) = split_final_line(line.trim());
    if !KIND_NAME.is_match(kind) {
        return false;
    }
    let (module, name) = kind.rsplit_once('.').unwrap_or(("", kind));
    !module.is_empty() || name.starts_with(|c: char| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorReport;

    const NESTED: &str = "Traceback (most recent call last):\n  File \"a.py\", line 1, in f\n    g()\n  File \"b.py\", line 2, in g\n    raise ValueError('bad')\nValueError: bad";

    #[test]
    fn test_last_frame_wins() {
        let fields = extract(NESTED);
        assert_eq!(fields.error_kind.as_deref(), Some("ValueError"));
        assert_eq!(fields.message, "bad");
        assert_eq!(fields.file_name.as_deref(), Some("b.py"));
        assert_eq!(fields.line_number, Some(2));
        assert_eq!(fields.function_name.as_deref(), Some("g"));
    }

    #[test]
    fn test_colonless_and_trailing_colon() {
        let fields = extract("Traceback (most recent call last):\n  File \"r.py\", line 9, in loop\nRecursionError");
        assert_eq!(fields.error_kind.as_deref(), Some("RecursionError"));
        assert_eq!(fields.message, "");
        let fields = extract("KeyError:");
        assert_eq!(fields.error_kind.as_deref(), Some("KeyError"));
        assert_eq!(fields.message, "");
    }

    #[test]
    fn test_message_keeps_later_colons() {
        let fields = extract("json.decoder.JSONDecodeError: Expecting value: line 1 column 1 (char 0)");
        assert_eq!(fields.error_kind.as_deref(), Some("json.decoder.JSONDecodeError"));
        assert_eq!(fields.message, "Expecting value: line 1 column 1 (char 0)");
    }

    #[test]
    fn test_rejects_non_identifier_kind() {
        assert_eq!(extract("something went wrong").error_kind, None);
        assert_eq!(extract("print(x)").error_kind, None);
        let truncated = "Traceback (most recent call last):\n  File \"a.py\", line 3, in <module>";
        let fields = extract(truncated);
        assert_eq!(fields.error_kind, None);
        assert_eq!(fields.line_number, Some(3));
        let cut = "Traceback (most recent call last):\n  File \"a.py\", line 3, in <module>\n    run()";
        assert_eq!(extract(cut).error_kind, None);
    }

    #[test]
    fn test_multi_line_message_keeps_kind() {
        let text = "Traceback (most recent call last):\n  File \"a.py\", line 4, in <module>\n    check(rows)\nValueError: first\nsecond";
        let fields = extract(text);
        assert_eq!(fields.error_kind.as_deref(), Some("ValueError"));
        assert_eq!(fields.message, "first\nsecond");
        assert_eq!(fields.line_number, Some(4));

        let fields = extract("Loading rows\nKeyError: 'id'\nwhile reading config.json");
        assert_eq!(fields.error_kind.as_deref(), Some("KeyError"));
        assert_eq!(fields.message, "'id'\nwhile reading config.json");
    }

    #[test]
    fn test_lowercase_words_are_not_kinds() {
        assert_eq!(extract("hello").error_kind, None);
        assert_eq!(extract("done:").error_kind, None);
        let fields = extract("re.error: missing ), unterminated subpattern");
        assert_eq!(fields.error_kind.as_deref(), Some("re.error"));
    }

    #[test]
    fn test_degraded_mode_has_no_location() {
        let fields = extract("ZeroDivisionError: division by zero");
        assert_eq!(fields.error_kind.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(fields.line_number, None);
        assert_eq!(fields.file_name, None);
    }

    #[test]
    fn test_line_zero_is_absent() {
        let fields = extract("Traceback (most recent call last):\n  File \"<stdin>\", line 0, in <module>\nValueError: x");
        assert_eq!(fields.line_number, None);
        assert_eq!(fields.file_name.as_deref(), Some("<stdin>"));
    }

    #[test]
    fn test_compile_frame_without_function() {
        let text = "  File \"bad.py\", line 3\n    if x\n        ^\nSyntaxError: expected ':'";
        let fields = extract(text);
        assert_eq!(fields.error_kind.as_deref(), Some("SyntaxError"));
        assert_eq!(fields.line_number, Some(3));
        assert_eq!(fields.function_name, None);
        let details = syntax_details(text);
        assert!(details.has_caret);
        assert_eq!(details.caret_position, Some(4));
        assert_eq!(details.problematic_line.as_deref(), Some("if x"));
    }

    #[test]
    fn test_syntax_details_without_caret() {
        let details = syntax_details("  File \"bad.py\", line 1\nIndentationError: unexpected indent");
        assert!(!details.has_caret);
        assert_eq!(details.caret_position, None);
    }

    #[test]
    fn test_extract_from_error_uses_innermost_frame() {
        let report = ErrorReport::new("KeyError", "'id'")
            .with_frame(Frame {
                file_name: "main.py".to_string(),
                line_number: 10,
                function_name: Some("<module>".to_string()),
                source_line: None,
            })
            .with_frame(Frame {
                file_name: "users.py".to_string(),
                line_number: 4,
                function_name: Some("lookup".to_string()),
                source_line: None,
            });
        let fields = extract_from_error(&report);
        assert_eq!(fields.error_kind.as_deref(), Some("KeyError"));
        assert_eq!(fields.message, "'id'");
        assert_eq!(fields.file_name.as_deref(), Some("users.py"));
        assert_eq!(fields.line_number, Some(4));
        assert_eq!(fields.function_name.as_deref(), Some("lookup"));
    }

    #[test]
    fn test_extract_from_error_without_frames() {
        let fields = extract_from_error(&ErrorReport::new("", "boom"));
        assert_eq!(fields.error_kind, None);
        assert_eq!(fields.message, "boom");
        assert_eq!(fields.line_number, None);
    }
}

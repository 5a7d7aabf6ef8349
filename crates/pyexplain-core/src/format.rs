//! Human-readable rendering of a [`DiagnosticRecord`].
//!
//! The formatter only reads the record; nothing it needs is stored back.

use crate::domain::DiagnosticRecord;

/// Longest original message shown in technical details.
pub const MAX_MESSAGE_CHARS: usize = 200;

const BOX_WIDTH: usize = 70;
const RULE_WIDTH: usize = 72;

/// ANSI escape sequences used when colour is enabled.
pub mod colors {
    pub const RED: &str = "\x1b[91m";
    pub const GREEN: &str = "\x1b[92m";
    pub const YELLOW: &str = "\x1b[93m";
    pub const BLUE: &str = "\x1b[94m";
    pub const MAGENTA: &str = "\x1b[95m";
    pub const CYAN: &str = "\x1b[96m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RESET: &str = "\x1b[0m";
}

struct Palette {
    red: &'static str,
    green: &'static str,
    yellow: &'static str,
    blue: &'static str,
    magenta: &'static str,
    cyan: &'static str,
    bold: &'static str,
    reset: &'static str,
}

impl Palette {
    fn new(color: bool) -> Self {
        let pick = |code: &'static str| if color { code } else { "" };
        Self {
            red: pick(colors::RED),
            green: pick(colors::GREEN),
            yellow: pick(colors::YELLOW),
            blue: pick(colors::BLUE),
            magenta: pick(colors::MAGENTA),
            cyan: pick(colors::CYAN),
            bold: pick(colors::BOLD),
            reset: pick(colors::RESET),
        }
    }
}

/// Render `record` as a boxed report.
///
/// `include_technical` adds category, original message and tags. ANSI codes
/// are emitted only when `color` is set.
pub fn format_decoded_output(
    record: &DiagnosticRecord,
    include_technical: bool,
    color: bool,
) -> String {
    let p = Palette::new(color);
    let mut lines: Vec<String> = Vec::new();

    let kind = &record.error_kind;
    let padding = (BOX_WIDTH - 2).saturating_sub(kind.chars().count() + 2);
    lines.push(String::new());
    lines.push(format!("╔{}╗", "═".repeat(BOX_WIDTH)));
    lines.push(format!(
        "║  {}{}{} {}{}{}║",
        p.bold,
        p.red,
        record.emoji,
        kind,
        p.reset,
        " ".repeat(padding)
    ));
    lines.push(format!("╚{}╝", "═".repeat(BOX_WIDTH)));
    lines.push(String::new());

    lines.push(format!("{}{}💡 Simple Explanation:{}", p.bold, p.cyan, p.reset));
    lines.push(record.simple_explanation.clone());
    lines.push(String::new());

    lines.push(format!("{}{}🔧 How to Fix:{}", p.bold, p.green, p.reset));
    lines.push(record.fix_suggestion.clone());
    lines.push(String::new());

    if record.file_name.is_some() || record.line_number.is_some() {
        lines.push(format!("{}{}📍 Error Location:{}", p.bold, p.yellow, p.reset));
        if let Some(file) = &record.file_name {
            lines.push(format!("   File: {file}"));
        }
        if let Some(line) = record.line_number {
            lines.push(format!("   Line: {line}"));
        }
        if let Some(function) = &record.function_name {
            lines.push(format!("   Function: {}", display_function(function)));
        }
        lines.push(String::new());
    }

    if include_technical {
        let message = if record.original_message.is_empty() {
            "N/A".to_string()
        } else {
            truncate_message(&record.original_message, MAX_MESSAGE_CHARS)
        };
        lines.push(format!("{}{}🔍 Technical Details:{}", p.bold, p.magenta, p.reset));
        lines.push(format!("   Category: {}", record.category));
        lines.push(format!("   Original Message: {message}"));
        lines.push(format!("   Tags: {}", record.tags.join(", ")));
        if let Some(details) = &record.syntax_details {
            if let Some(source) = &details.problematic_line {
                lines.push(format!("   Problem Line: {source}"));
            }
            if let Some(column) = details.caret_position {
                lines.push(format!("                 {}^", " ".repeat(column)));
            }
        }
        lines.push(String::new());
    }

    if let Some(branding) = &record.branding {
        lines.push("─".repeat(RULE_WIDTH));
        lines.push(format!("{}{}{}{}", p.bold, p.blue, branding, p.reset));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Show `context` lines either side of `line_number`, marking the failing one.
pub fn format_code_snippet(code: &str, line_number: u32, context: usize) -> String {
    if code.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = code.split('\n').collect();
    let target = line_number as usize;
    let start = target.saturating_sub(context + 1);
    let end = lines.len().min(target + context);

    (start..end)
        .map(|index| {
            let number = index + 1;
            if number == target {
                format!("{number:3} | {}  <-- Error here", lines[index])
            } else {
                format!("{number:3} | {}", lines[index])
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `message` to at most `max_chars` characters, ending in `...`.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let kept: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn display_function(name: &str) -> &str {
    if name == "<module>" {
        "main script"
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorize::Category;
    use crate::domain::{SyntaxDetails, BRANDING};

    fn record() -> DiagnosticRecord {
        DiagnosticRecord {
            error_kind: "ZeroDivisionError".to_string(),
            original_message: "division by zero".to_string(),
            simple_explanation: "You tried to divide by zero.".to_string(),
            fix_suggestion: "Check the denominator.".to_string(),
            line_number: Some(5),
            file_name: Some("test.py".to_string()),
            function_name: Some("<module>".to_string()),
            tags: vec!["math".to_string(), "division".to_string()],
            category: Category::Arithmetic,
            emoji: "➗".to_string(),
            branding: Some(BRANDING.to_string()),
            success: false,
            raw_traceback: String::new(),
            syntax_details: None,
        }
    }

    #[test]
    fn test_plain_output_layout() {
        let out = format_decoded_output(&record(), false, false);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], format!("╔{}╗", "═".repeat(70)));
        assert!(lines[2].starts_with("║  ➗ ZeroDivisionError "));
        assert!(lines[2].ends_with('║'));
        assert!(out.contains("💡 Simple Explanation:\nYou tried to divide by zero.\n"));
        assert!(out.contains("🔧 How to Fix:\nCheck the denominator.\n"));
        assert!(out.contains("   File: test.py\n   Line: 5\n   Function: main script\n"));
        assert!(!out.contains("Technical Details"));
        assert!(out.contains(BRANDING));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_color_and_technical_sections() {
        let out = format_decoded_output(&record(), true, true);
        assert!(out.contains(colors::RED));
        assert!(out.contains(colors::RESET));
        assert!(out.contains("   Category: Arithmetic Errors"));
        assert!(out.contains("   Original Message: division by zero"));
        assert!(out.contains("   Tags: math, division"));
    }

    #[test]
    fn test_location_and_branding_optional() {
        let mut rec = record();
        rec.file_name = None;
        rec.line_number = None;
        rec.branding = None;
        let out = format_decoded_output(&rec, false, false);
        assert!(!out.contains("Error Location"));
        assert!(!out.contains('─'));
    }

    #[test]
    fn test_technical_message_truncated() {
        let mut rec = record();
        rec.original_message = "x".repeat(500);
        let out = format_decoded_output(&rec, true, false);
        let expected = format!("   Original Message: {}...", "x".repeat(197));
        assert!(out.lines().any(|l| l == expected));
    }

    #[test]
    fn test_syntax_details_rendered() {
        let mut rec = record();
        rec.syntax_details = Some(SyntaxDetails {
            has_caret: true,
            caret_position: Some(4),
            problematic_line: Some("if x".to_string()),
        });
        let out = format_decoded_output(&rec, true, false);
        assert!(out.contains("   Problem Line: if x\n                     ^"));
    }

    #[test]
    fn test_long_kind_does_not_underflow() {
        let mut rec = record();
        rec.error_kind = "A".repeat(90);
        let out = format_decoded_output(&rec, false, false);
        assert!(out.contains(&"A".repeat(90)));
    }

    #[test]
    fn test_code_snippet() {
        let code = "a = 1\nb = 0\nc = a / b\nprint(c)\nprint('done')";
        assert_eq!(
            format_code_snippet(code, 3, 1),
            "  2 | b = 0\n  3 | c = a / b  <-- Error here\n  4 | print(c)"
        );
        assert_eq!(
            format_code_snippet(code, 1, 2),
            "  1 | a = 1  <-- Error here\n  2 | b = 0\n  3 | c = a / b"
        );
        assert_eq!(format_code_snippet("", 1, 2), "");
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 200), "short");
        assert_eq!(truncate_message("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_message("ééééé", 5), "ééééé");
    }
}

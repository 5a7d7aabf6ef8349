//! Compile-time errors for the snippet evaluator.

use crate::exception::{ExcKind, Exception, SyntaxLocation, TraceFrame};

/// A lexing or parsing failure, reported to user code as `SyntaxError`
/// (or one of its subclasses).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message} (line {line}, column {column})")]
pub struct ParseError {
    pub kind: ExcKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind: ExcKind::SyntaxError,
            message: message.into(),
            line,
            column,
        }
    }

    pub fn indentation(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind: ExcKind::IndentationError,
            message: message.into(),
            line,
            column,
        }
    }

    /// The compiler ran out of room for a deeply nested expression.
    pub fn recursion(line: u32, column: u32) -> Self {
        Self {
            kind: ExcKind::RecursionError,
            message: "maximum recursion depth exceeded during compilation".to_string(),
            line,
            column,
        }
    }

    /// Attach the offending source line and turn this into a raisable exception.
    pub fn into_exception(self, file_name: &str, source: &str) -> Exception {
        let source_line = source
            .lines()
            .nth(self.line.saturating_sub(1) as usize)
            .unwrap_or("")
            .to_string();
        if !self.kind.is_syntax_family() {
            let frame = TraceFrame {
                file_name: file_name.to_string(),
                line: self.line.max(1),
                function: None,
                source_line: Some(source_line.trim().to_string()),
            };
            return Exception::new(self.kind, self.message).with_frames(vec![frame]);
        }
        Exception::syntax(
            self.kind,
            self.message,
            file_name,
            SyntaxLocation {
                line: self.line.max(1),
                column: self.column.max(1),
                source_line,
            },
        )
    }
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_exception_picks_source_line() {
        let err = ParseError::syntax("invalid syntax", 2, 5);
        let exc = err.into_exception("demo.py", "x = 1\ny = = 2\n");
        assert_eq!(exc.kind(), ExcKind::SyntaxError);
        let loc = exc.syntax_location().unwrap();
        assert_eq!(loc.source_line, "y = = 2");
        assert_eq!(exc.frames()[0].file_name, "demo.py");
        assert_eq!(exc.frames()[0].line, 2);
        assert!(exc.frames()[0].function.is_none());
    }

    #[test]
    fn test_recursion_error_is_not_located_like_syntax() {
        let exc = ParseError::recursion(1, 5).into_exception("deep.py", "x = not not y\n");
        assert_eq!(exc.kind(), ExcKind::RecursionError);
        assert!(exc.syntax_location().is_none());
        assert_eq!(exc.frames()[0].source_line.as_deref(), Some("x = not not y"));
        assert!(exc
            .render_traceback()
            .ends_with("RecursionError: maximum recursion depth exceeded during compilation\n"));
    }

    #[test]
    fn test_display_mentions_position() {
        let err = ParseError::indentation("unexpected indent", 3, 1);
        assert_eq!(
            err.to_string(),
            "IndentationError: unexpected indent (line 3, column 1)"
        );
    }
}

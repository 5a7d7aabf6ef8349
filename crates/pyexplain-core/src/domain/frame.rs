//! Call frames and the error-object capability.
//!
//! Text tracebacks and live error objects both reduce to an ordered list of
//! [`Frame`]s, outermost first, so the extractor can apply one
//! "last frame wins" rule to either input.

use std::io;

use serde::{Deserialize, Serialize};

use pyexplain_snippet::Exception;

/// One call-stack level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub file_name: String,
    pub line_number: u32,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub source_line: Option<String>,
}

/// Something that failed and can describe itself like a Python exception.
pub trait ErrorObject {
    /// Python class name, e.g. `ZeroDivisionError`.
    fn kind_name(&self) -> &str;

    /// The message as `str(exc)` would print it.
    fn message(&self) -> String;

    /// Attached frames, outermost first. Empty when no traceback is attached.
    fn frames(&self) -> Vec<Frame>;

    /// CPython-style traceback text.
    fn render_traceback(&self) -> String {
        let mut out = String::new();
        let frames = self.frames();
        if !frames.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for frame in &frames {
                out.push_str(&format!(
                    "  File \"{}\", line {}, in {}\n",
                    frame.file_name,
                    frame.line_number,
                    frame.function_name.as_deref().unwrap_or("<module>")
                ));
                if let Some(src) = frame.source_line.as_deref().filter(|s| !s.is_empty()) {
                    out.push_str(&format!("    {}\n", src.trim()));
                }
            }
        }
        let message = self.message();
        if message.is_empty() {
            out.push_str(self.kind_name());
        } else {
            out.push_str(&format!("{}: {}", self.kind_name(), message));
        }
        out.push('\n');
        out
    }
}

/// Serialized form of an error object, accepted by [`crate::decode::decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorReport {
    pub error_kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub frames: Vec<Frame>,
}

impl ErrorReport {
    pub fn new(error_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_kind: error_kind.into(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Snapshot any error object into its serialized form.
    pub fn capture(error: &dyn ErrorObject) -> Self {
        Self {
            error_kind: error.kind_name().to_string(),
            message: error.message(),
            frames: error.frames(),
        }
    }
}

impl ErrorObject for ErrorReport {
    fn kind_name(&self) -> &str {
        &self.error_kind
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn frames(&self) -> Vec<Frame> {
        self.frames.clone()
    }
}

impl ErrorObject for Exception {
    fn kind_name(&self) -> &str {
        self.kind().as_str()
    }

    fn message(&self) -> String {
        Exception::message(self).to_string()
    }

    fn frames(&self) -> Vec<Frame> {
        Exception::frames(self)
            .iter()
            .map(|f| Frame {
                file_name: f.file_name.clone(),
                line_number: f.line,
                function_name: f.function.clone(),
                source_line: f.source_line.clone(),
            })
            .collect()
    }

    fn render_traceback(&self) -> String {
        Exception::render_traceback(self)
    }
}

impl ErrorObject for io::Error {
    fn kind_name(&self) -> &str {
        #[cfg(unix)]
        {
            match self.raw_os_error() {
                Some(21) => return "IsADirectoryError",
                Some(20) => return "NotADirectoryError",
                _ => {}
            }
        }
        match self.kind() {
            io::ErrorKind::NotFound => "FileNotFoundError",
            io::ErrorKind::PermissionDenied => "PermissionError",
            io::ErrorKind::AlreadyExists => "FileExistsError",
            io::ErrorKind::TimedOut => "TimeoutError",
            io::ErrorKind::Interrupted => "InterruptedError",
            io::ErrorKind::BrokenPipe => "BrokenPipeError",
            io::ErrorKind::ConnectionRefused => "ConnectionRefusedError",
            io::ErrorKind::ConnectionReset => "ConnectionResetError",
            io::ErrorKind::ConnectionAborted => "ConnectionAbortedError",
            io::ErrorKind::WouldBlock => "BlockingIOError",
            _ => "OSError",
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn frames(&self) -> Vec<Frame> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyexplain_snippet::{run, Limits};

    #[test]
    fn test_report_renders_traceback() {
        let report = ErrorReport::new("ValueError", "bad").with_frame(Frame {
            file_name: "a.py".to_string(),
            line_number: 4,
            function_name: Some("parse".to_string()),
            source_line: Some("    int(x)".to_string()),
        });
        assert_eq!(
            report.render_traceback(),
            "Traceback (most recent call last):\n  File \"a.py\", line 4, in parse\n    int(x)\nValueError: bad\n"
        );
    }

    #[test]
    fn test_report_without_frames_renders_summary_only() {
        let report = ErrorReport::new("StopIteration", "");
        assert_eq!(report.render_traceback(), "StopIteration\n");
    }

    #[test]
    fn test_report_rejects_unknown_fields() {
        let parsed: Result<ErrorReport, _> =
            serde_json::from_str(r#"{"error_kind":"X","colour":"red"}"#);
        assert!(parsed.is_err());
        let parsed: ErrorReport = serde_json::from_str(r#"{"error_kind":"KeyError"}"#).unwrap();
        assert_eq!(parsed.message, "");
        assert!(parsed.frames.is_empty());
    }

    #[test]
    fn test_snippet_exception_frames() {
        let (exc, _) = run("def f():\n    return 1 / 0\nf()\n", "calc.py", &Limits::default())
            .unwrap_err();
        assert_eq!(ErrorObject::kind_name(&exc), "ZeroDivisionError");
        let frames = ErrorObject::frames(&exc);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].function_name.as_deref(), Some("f"));
        assert_eq!(frames[1].line_number, 2);
        let captured = ErrorReport::capture(&exc);
        assert_eq!(captured.message, "division by zero");
    }

    #[test]
    fn test_io_error_kinds() {
        let err = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert_eq!(err.kind_name(), "FileNotFoundError");
        assert_eq!(ErrorObject::message(&err), "missing");
        assert!(ErrorObject::frames(&err).is_empty());
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(err.kind_name(), "PermissionError");
        let err = io::Error::new(io::ErrorKind::Other, "boom");
        assert_eq!(err.kind_name(), "OSError");
    }
}

//! Python-level exceptions raised by the snippet evaluator.
//!
//! An [`Exception`] is a value, not a Rust error: it records the Python kind,
//! the message, and the call frames active at the raise point (outermost
//! first, the same order a traceback prints them). It can render itself in
//! the layout CPython uses for uncaught exceptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Built-in Python exception kinds the evaluator can raise or catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExcKind {
    BaseException,
    SystemExit,
    KeyboardInterrupt,
    GeneratorExit,
    Exception,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    FloatingPointError,
    OverflowError,
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- RuntimeError hierarchy ---
    RuntimeError,
    NotImplementedError,
    RecursionError,

    AttributeError,

    // --- NameError hierarchy ---
    NameError,
    UnboundLocalError,

    ValueError,

    // --- ImportError hierarchy ---
    ImportError,
    ModuleNotFoundError,

    // --- OSError hierarchy ---
    OSError,
    FileNotFoundError,
    FileExistsError,
    IsADirectoryError,
    NotADirectoryError,
    PermissionError,
    TimeoutError,

    // --- SyntaxError hierarchy ---
    SyntaxError,
    IndentationError,
    TabError,

    AssertionError,
    EOFError,
    MemoryError,
    StopIteration,
    SystemError,
    TypeError,
}

impl ExcKind {
    /// Every kind, in declaration order.
    pub const ALL: [ExcKind; 37] = [
        ExcKind::BaseException,
        ExcKind::SystemExit,
        ExcKind::KeyboardInterrupt,
        ExcKind::GeneratorExit,
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::FloatingPointError,
        ExcKind::OverflowError,
        ExcKind::ZeroDivisionError,
        ExcKind::LookupError,
        ExcKind::IndexError,
        ExcKind::KeyError,
        ExcKind::RuntimeError,
        ExcKind::NotImplementedError,
        ExcKind::RecursionError,
        ExcKind::AttributeError,
        ExcKind::NameError,
        ExcKind::UnboundLocalError,
        ExcKind::ValueError,
        ExcKind::ImportError,
        ExcKind::ModuleNotFoundError,
        ExcKind::OSError,
        ExcKind::FileNotFoundError,
        ExcKind::FileExistsError,
        ExcKind::IsADirectoryError,
        ExcKind::NotADirectoryError,
        ExcKind::PermissionError,
        ExcKind::TimeoutError,
        ExcKind::SyntaxError,
        ExcKind::IndentationError,
        ExcKind::TabError,
        ExcKind::AssertionError,
        ExcKind::EOFError,
        ExcKind::MemoryError,
        ExcKind::StopIteration,
        ExcKind::SystemError,
        ExcKind::TypeError,
    ];

    /// The Python class name.
    pub fn as_str(self) -> &'static str {
        match self {
            ExcKind::BaseException => "BaseException",
            ExcKind::SystemExit => "SystemExit",
            ExcKind::KeyboardInterrupt => "KeyboardInterrupt",
            ExcKind::GeneratorExit => "GeneratorExit",
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::FloatingPointError => "FloatingPointError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::LookupError => "LookupError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::NameError => "NameError",
            ExcKind::UnboundLocalError => "UnboundLocalError",
            ExcKind::ValueError => "ValueError",
            ExcKind::ImportError => "ImportError",
            ExcKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExcKind::OSError => "OSError",
            ExcKind::FileNotFoundError => "FileNotFoundError",
            ExcKind::FileExistsError => "FileExistsError",
            ExcKind::IsADirectoryError => "IsADirectoryError",
            ExcKind::NotADirectoryError => "NotADirectoryError",
            ExcKind::PermissionError => "PermissionError",
            ExcKind::TimeoutError => "TimeoutError",
            ExcKind::SyntaxError => "SyntaxError",
            ExcKind::IndentationError => "IndentationError",
            ExcKind::TabError => "TabError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::EOFError => "EOFError",
            ExcKind::MemoryError => "MemoryError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::SystemError => "SystemError",
            ExcKind::TypeError => "TypeError",
        }
    }

    /// Resolve a Python class name (including the `IOError` alias).
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "IOError" || name == "EnvironmentError" {
            return Some(ExcKind::OSError);
        }
        ExcKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Direct base class, `None` for `BaseException`.
    pub fn parent(self) -> Option<Self> {
        let parent = match self {
            ExcKind::BaseException => return None,
            ExcKind::SystemExit
            | ExcKind::KeyboardInterrupt
            | ExcKind::GeneratorExit
            | ExcKind::Exception => ExcKind::BaseException,
            ExcKind::FloatingPointError | ExcKind::OverflowError | ExcKind::ZeroDivisionError => {
                ExcKind::ArithmeticError
            }
            ExcKind::IndexError | ExcKind::KeyError => ExcKind::LookupError,
            ExcKind::NotImplementedError | ExcKind::RecursionError => ExcKind::RuntimeError,
            ExcKind::UnboundLocalError => ExcKind::NameError,
            ExcKind::ModuleNotFoundError => ExcKind::ImportError,
            ExcKind::FileNotFoundError
            | ExcKind::FileExistsError
            | ExcKind::IsADirectoryError
            | ExcKind::NotADirectoryError
            | ExcKind::PermissionError
            | ExcKind::TimeoutError => ExcKind::OSError,
            ExcKind::IndentationError => ExcKind::SyntaxError,
            ExcKind::TabError => ExcKind::IndentationError,
            _ => ExcKind::Exception,
        };
        Some(parent)
    }

    /// Whether `except handler:` would catch this kind.
    pub fn is_subclass_of(self, handler: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == handler {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Kinds produced while compiling rather than running.
    pub fn is_syntax_family(self) -> bool {
        self.is_subclass_of(ExcKind::SyntaxError)
    }
}

impl fmt::Display for ExcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call-stack level captured at the raise point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Display filename passed to the evaluator.
    pub file_name: String,
    /// 1-based line of the statement executing in this frame.
    pub line: u32,
    /// `<module>` for top-level code, the function name otherwise.
    /// `None` for compile-time (syntax) reports.
    pub function: Option<String>,
    /// The stripped source text of `line`, when available.
    pub source_line: Option<String>,
}

/// Where a syntax error was detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxLocation {
    pub line: u32,
    /// 1-based column of the offending token.
    pub column: u32,
    /// Unstripped text of the offending line.
    pub source_line: String,
}

/// A raised Python exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    kind: ExcKind,
    message: Option<String>,
    frames: Vec<TraceFrame>,
    syntax: Option<SyntaxLocation>,
}

impl Exception {
    /// An exception with no frames attached yet.
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            frames: Vec::new(),
            syntax: None,
        }
    }

    /// An exception raised with no arguments (`raise ValueError`).
    pub fn bare(kind: ExcKind) -> Self {
        Self {
            kind,
            message: None,
            frames: Vec::new(),
            syntax: None,
        }
    }

    /// A compile-time error located at `location` in `file_name`.
    pub fn syntax(
        kind: ExcKind,
        message: impl Into<String>,
        file_name: &str,
        location: SyntaxLocation,
    ) -> Self {
        let frame = TraceFrame {
            file_name: file_name.to_string(),
            line: location.line,
            function: None,
            source_line: Some(location.source_line.trim().to_string()),
        };
        Self {
            kind,
            message: Some(message.into()),
            frames: vec![frame],
            syntax: Some(location),
        }
    }

    pub(crate) fn with_frames(mut self, frames: Vec<TraceFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub(crate) fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn kind(&self) -> ExcKind {
        self.kind
    }

    /// The message, empty when raised without arguments.
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    /// Frames, outermost first.
    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }

    pub fn syntax_location(&self) -> Option<&SyntaxLocation> {
        self.syntax.as_ref()
    }

    /// The final `Kind: message` line of a traceback.
    pub fn summary_line(&self) -> String {
        match self.message.as_deref() {
            Some(msg) if !msg.is_empty() => format!("{}: {}", self.kind, msg),
            _ => self.kind.to_string(),
        }
    }

    /// Render the exception the way CPython prints an uncaught one.
    pub fn render_traceback(&self) -> String {
        let mut out = String::new();
        if let Some(loc) = &self.syntax {
            let file = self
                .frames
                .first()
                .map(|f| f.file_name.as_str())
                .unwrap_or("<string>");
            out.push_str(&format!("  File \"{}\", line {}\n", file, loc.line));
            let stripped = loc.source_line.trim_start();
            let removed = loc.source_line.chars().count() - stripped.chars().count();
            out.push_str(&format!("    {}\n", stripped.trim_end()));
            let offset = (loc.column as usize).saturating_sub(1).saturating_sub(removed);
            out.push_str(&format!("    {}^\n", " ".repeat(offset)));
        } else {
            out.push_str("Traceback (most recent call last):\n");
            for frame in &self.frames {
                out.push_str(&format!(
                    "  File \"{}\", line {}, in {}\n",
                    frame.file_name,
                    frame.line,
                    frame.function.as_deref().unwrap_or("<module>")
                ));
                if let Some(src) = frame.source_line.as_deref().filter(|s| !s.is_empty()) {
                    out.push_str(&format!("    {src}\n"));
                }
            }
        }
        out.push_str(&self.summary_line());
        out.push('\n');
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_line())
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_roundtrip() {
        for kind in ExcKind::ALL {
            assert_eq!(ExcKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ExcKind::from_name("IOError"), Some(ExcKind::OSError));
        assert_eq!(ExcKind::from_name("MadeUpError"), None);
    }

    #[test]
    fn test_hierarchy() {
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::Exception));
        assert!(ExcKind::TabError.is_subclass_of(ExcKind::SyntaxError));
        assert!(!ExcKind::KeyboardInterrupt.is_subclass_of(ExcKind::Exception));
        assert!(ExcKind::KeyboardInterrupt.is_subclass_of(ExcKind::BaseException));
        assert!(!ExcKind::ValueError.is_subclass_of(ExcKind::TypeError));
    }

    #[test]
    fn test_render_runtime_traceback() {
        let exc = Exception::new(ExcKind::ZeroDivisionError, "division by zero").with_frames(vec![
            TraceFrame {
                file_name: "calc.py".into(),
                line: 7,
                function: Some("<module>".into()),
                source_line: Some("result = divide(1, 0)".into()),
            },
            TraceFrame {
                file_name: "calc.py".into(),
                line: 3,
                function: Some("divide".into()),
                source_line: Some("return a / b".into()),
            },
        ]);
        let text = exc.render_traceback();
        assert!(text.starts_with("Traceback (most recent call last):\n"));
        assert!(text.contains("  File \"calc.py\", line 3, in divide\n    return a / b\n"));
        assert!(text.ends_with("ZeroDivisionError: division by zero\n"));
    }

    #[test]
    fn test_render_syntax_error_caret() {
        let exc = Exception::syntax(
            ExcKind::SyntaxError,
            "invalid syntax",
            "bad.py",
            SyntaxLocation {
                line: 2,
                column: 9,
                source_line: "    if x = = 1:".into(),
            },
        );
        let text = exc.render_traceback();
        assert_eq!(
            text,
            "  File \"bad.py\", line 2\n    if x = = 1:\n        ^\nSyntaxError: invalid syntax\n"
        );
    }

    #[test]
    fn test_bare_exception_summary_has_no_colon() {
        assert_eq!(Exception::bare(ExcKind::RecursionError).summary_line(), "RecursionError");
    }
}

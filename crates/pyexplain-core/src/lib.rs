//! pyexplain core library
//!
//! Turns Python tracebacks and error objects into beginner-readable
//! [`DiagnosticRecord`]s, and runs code through [`safe_run`] so anything it
//! raises comes back as a record instead of a failure.
//!
//! ```no_run
//! let record = pyexplain_core::decode_traceback("ZeroDivisionError: division by zero", true);
//! println!("{}", pyexplain_core::format_decoded_output(&record, false, false));
//! ```

pub mod categorize;
pub mod decode;
pub mod domain;
pub mod extract;
pub mod format;
pub mod i18n;
pub mod knowledge;
pub mod metrics;
pub mod obs;
pub mod sanitize;
pub mod sandbox;
pub mod telemetry;

pub use categorize::{categorize, Category, CategoryTable};
pub use decode::{decode, decode_exception, decode_traceback, format_decoded_output, Decoder};
pub use domain::{
    CategoryTableError, DecodeError, DiagnosticRecord, ErrorObject, ErrorReport, Frame,
    KnowledgeError, SyntaxDetails, BRANDING, UNKNOWN_KIND,
};
pub use extract::{extract, extract_from_error, PartialFields};
pub use format::format_code_snippet;
pub use i18n::{supported_languages, translate, Language, Translation};
pub use knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeLookup};
pub use sanitize::sanitize;
pub use sandbox::{
    safe_run, safe_run_with, Evaluation, Evaluator, ExecutionResult, Fault,
    PythonProcessEvaluator, SandboxConfig, SandboxError, SandboxResult, SnippetEvaluator,
};

pub use pyexplain_snippet::Limits;

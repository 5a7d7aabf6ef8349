//! Domain models for pyexplain.
//!
//! - `DiagnosticRecord`: the decoded, beginner-readable view of one error
//! - `Frame` / `ErrorObject`: call-stack levels and the capability to list them
//! - `ErrorReport`: the serialized form of an error object

pub mod error;
pub mod frame;
pub mod record;

pub use error::{CategoryTableError, DecodeError, KnowledgeError, Result};
pub use frame::{ErrorObject, ErrorReport, Frame};
pub use record::{DiagnosticRecord, SyntaxDetails, BRANDING, UNKNOWN_KIND};

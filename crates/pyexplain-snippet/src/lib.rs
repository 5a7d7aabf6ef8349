//! pyexplain snippet evaluator
//!
//! A small Python-subset interpreter. Running a snippet either completes
//! with its captured standard output or stops at an [`Exception`] carrying
//! the Python kind, CPython's message and the call frames active at the raise
//! point.
//!
//! Ints are arbitrary precision. Nesting and recursion are bounded by
//! [`Limits`], which [`Limits::for_stack`] sizes for the thread running the
//! snippet.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

mod builtins;
mod error;
mod exception;
mod fmt;
mod interpreter;
mod ops;
mod value;

pub use error::{ParseError, ParseResult};
pub use exception::{ExcKind, Exception, SyntaxLocation, TraceFrame};
pub use interpreter::{ExecutionContext, Limits, DEFAULT_STACK_BYTES};
pub use parser::{parse, parse_with_depth};

/// Run `code` in a fresh context and return its output, or the exception it
/// raised together with whatever it printed first.
pub fn run(code: &str, file_name: &str, limits: &Limits) -> Result<String, (Exception, String)> {
    let mut ctx = ExecutionContext::new(file_name);
    match ctx.execute(code, limits) {
        Ok(()) => Ok(ctx.take_output()),
        Err(exc) => Err((exc, ctx.take_output())),
    }
}

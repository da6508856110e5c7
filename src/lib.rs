//! schemelet - a small Scheme interpreter core
//!
//! This crate provides the engine of a minimal Scheme: a reader that turns program text
//! into [`ast::Value`] trees, mutable lexical environments, and a recursive `eval`/`apply`
//! pair over a core set of special forms and primitives.
//!
//! ```scheme
//! (define (add a b) (+ a b))   ; closures
//! (if (> 3 2) "yes" "no")      ; anything but #f is true
//! (cons 1 '(2 3))              ; list operations
//! (equal? 2 "2")               ; weak typing: #t
//! ```
//!
//! ## Weak Typing
//!
//! Primitives coerce their arguments before giving up: a numeric primitive accepts
//! `"42"` and `(42)`, a string comparison accepts `42` and `#t`. The coercions are
//! defined once in [`builtinops`] and shared by every primitive that needs them.
//!
//! ## Environments
//!
//! Environments are maps from names to shared mutable cells. Extending one (for a closure
//! call) copies the associations and shares the cells, so `set!` is seen by everyone
//! holding the cell while new definitions stay local. See [`evaluator::Environment`].
//!
//! ## Errors
//!
//! Every step returns `Result<_, Error>`. Nothing defaults silently and the first error
//! is returned unchanged to the caller.
//!
//! ## Modules
//!
//! - `ast`: the value model, printer and equality
//! - `scheme`: S-expression reader
//! - `evaluator`: environments, `eval` and `apply`
//! - `builtinops`: the primitive library and its weak-typing unpackers
//! - `io`: `load`, ports and the I/O primitives

use ast::Value;

/// Default maximum nesting accepted by the reader.
/// Deeper input is rejected with a parse error instead of exhausting the stack.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Wrong number of arguments; carries the arguments actually received
    #[error("Expected {expected} args: found values {}", unwords(.found))]
    NumArgs { expected: usize, found: Vec<Value> },
    /// A value of the wrong kind that could not be coerced
    #[error("Invalid type: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: Value },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("{message}: {form}")]
    BadSpecialForm { message: String, form: Value },
    #[error("{message}: {name}")]
    NotFunction { message: String, name: String },
    #[error("{message}: {name}")]
    UnboundVar { message: String, name: String },
    #[error("Unspecified return: {0}")]
    UnspecifiedReturn(String),
    /// Host-level failures (I/O, division by zero, overflow)
    #[error("Error: {0}")]
    DefaultError(String),
}

impl Error {
    pub fn num_args(expected: usize, found: &[Value]) -> Self {
        Error::NumArgs {
            expected,
            found: found.to_vec(),
        }
    }

    pub fn type_mismatch(expected: &str, found: &Value) -> Self {
        Error::TypeMismatch {
            expected: expected.to_owned(),
            found: found.clone(),
        }
    }

    pub fn bad_form(message: &str, form: &Value) -> Self {
        Error::BadSpecialForm {
            message: message.to_owned(),
            form: form.clone(),
        }
    }

    pub fn not_function(message: &str, name: impl Into<String>) -> Self {
        Error::NotFunction {
            message: message.to_owned(),
            name: name.into(),
        }
    }

    pub fn unbound_var(message: &str, name: &str) -> Self {
        Error::UnboundVar {
            message: message.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Space-separated printed form of a value sequence
pub(crate) fn unwords(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod io;
pub mod scheme;

pub use evaluator::{Environment, apply, create_global_env, eval};
pub use scheme::{read, read_all};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    #[test]
    fn test_error_display() {
        let test_cases = vec![
            (
                Error::num_args(2, &[val(1)]),
                "Expected 2 args: found values 1",
            ),
            (Error::num_args(2, &[]), "Expected 2 args: found values "),
            (
                Error::type_mismatch("number", &val("abc")),
                "Invalid type: expected number, found \"abc\"",
            ),
            (
                Error::ParseError("unexpected ')' at line 1, column 3".into()),
                "Parse error: unexpected ')' at line 1, column 3",
            ),
            (
                Error::bad_form("Unrecognized special form", &val(vec![sym("if"), val(1)])),
                "Unrecognized special form: (if 1)",
            ),
            (
                Error::not_function("Unrecognized primitive function args", "what?"),
                "Unrecognized primitive function args: what?",
            ),
            (
                Error::unbound_var("Getting an unbound variable", "y"),
                "Getting an unbound variable: y",
            ),
            (
                Error::UnspecifiedReturn("empty body".into()),
                "Unspecified return: empty body",
            ),
            (
                Error::DefaultError("Division by zero".into()),
                "Error: Division by zero",
            ),
            (
                Error::type_mismatch("pair", &nil()),
                "Invalid type: expected pair, found ()",
            ),
        ];

        for (i, (error, expected)) in test_cases.iter().enumerate() {
            assert_eq!(error.to_string(), *expected, "Error display #{}", i + 1);
        }
    }
}

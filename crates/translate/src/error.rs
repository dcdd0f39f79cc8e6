//! Translation and solve-loop error type.
//!
//! One hand-rolled enum with manual `Display`/`Error`/`From` impls. This
//! codebase has no `thiserror` dependency anywhere, so this crate doesn't
//! reach for one either.

use std::fmt;

#[derive(Debug)]
pub enum TranslateError {
    /// A node whose `decl_kind` has no entry in the §4.4 translation table.
    Unsupported(String),
    /// JIT engine construction or finalization failed.
    Jit(String),
    /// The SMT toolkit rejected the input file.
    Parse(String),
    Io(std::io::Error),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::Unsupported(s) => write!(f, "unsupported expression: {s}"),
            TranslateError::Jit(s) => write!(f, "JIT engine error: {s}"),
            TranslateError::Parse(s) => write!(f, "error while parsing SMTLIB file: {s}"),
            TranslateError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TranslateError {}

impl From<std::io::Error> for TranslateError {
    fn from(e: std::io::Error) -> Self {
        TranslateError::Io(e)
    }
}

impl From<String> for TranslateError {
    fn from(s: String) -> Self {
        TranslateError::Unsupported(s)
    }
}

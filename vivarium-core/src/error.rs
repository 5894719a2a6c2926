//! Error types for the Vivarium scripting engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal tokenizer error. Aborts the current load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexError {
    pub message: String,
    /// 1-based source line; `None` means end of input.
    pub line: Option<usize>,
    /// Name of the source being tokenized (filename, "eval command", ...).
    pub source: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "Error (line {} in '{}'): {}", line, self.source, self.message),
            None => write!(f, "Error (end of input in '{}'): {}", self.source, self.message),
        }
    }
}

impl std::error::Error for LexError {}

/// Fatal parse error with source position. Aborts the current load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    /// 1-based source line; `None` means end of input.
    pub line: Option<usize>,
    pub source: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "Error (line {} in '{}'): {}", line, self.source, self.message),
            None => write!(f, "Error (end of input in '{}'): {}", self.source, self.message),
        }
    }
}

impl std::error::Error for ParseError {}

/// Configuration errors: bad registrations and declarations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{name}' is already declared in scope '{scope}'")]
    Redeclaration { scope: String, name: String },

    #[error("unknown type: '{name}'")]
    UnknownType { name: String },

    #[error("unknown event type: '{name}'")]
    UnknownEvent { name: String },

    #[error("type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("event type '{name}' is already registered")]
    DuplicateEvent { name: String },
}

/// Errors raised from inside a function call. These surface to scripts as
/// error values, not as hard failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("Function '{name}' called with {got} args, but {expected} expected.")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Cannot convert argument {index} of '{name}': {reason}")]
    Argument {
        name: String,
        index: usize,
        reason: String,
    },

    #[error("Cannot call a function on non-function '{name}'.")]
    NotCallable { name: String },
}

/// Errors raised when reading or writing a symbol-table entry the wrong way.
/// Like [`CallError`], these become script-level error values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("cannot use {kind} '{name}' as a value")]
    NotAValue { kind: String, name: String },

    #[error("cannot assign to {kind} '{name}'")]
    NotAssignable { kind: String, name: String },
}

/// Master error type for all Vivarium operations.
#[derive(Debug, Error)]
pub enum VivariumError {
    #[error("{0}")]
    Lex(#[from] LexError),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Call error: {0}")]
    Call(#[from] CallError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Vivarium operations.
pub type VivariumResult<T> = Result<T, VivariumError>;

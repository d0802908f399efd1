//! Error kinds surfaced to callers of the engine (see spec section 7).
//!
//! The teacher (`rustdb`) recovers from bad SQL by `panic!`ing inside the
//! parser/compiler and catching the unwind at the top of `run`. We do not
//! keep that: every fallible path here returns a `Result`, and a single
//! error buffer is never shared across calls.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Position of a lexical/parse error within the source SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// All error kinds the engine can surface, per spec section 7.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error at {pos}: {msg}")]
    Parse { pos: SourcePos, msg: String },

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("table already exists: {0}")]
    DuplicateTable(String),

    #[error("kernel compile failed:\n{0}")]
    CompileFailed(String),

    #[error("failed to load {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    #[error("ABI mismatch: expected {expected:#x}, found {found:#x}")]
    AbiMismatch { expected: u32, found: u32 },

    #[error("I/O error on {path}: {cause}")]
    Io { path: PathBuf, cause: String },

    #[error("out of space")]
    OutOfSpace,

    #[error("invalid UTF-8")]
    InvalidUtf8,

    #[error("internal error: {0}")]
    Internal(String),

    /// A mutation that partially succeeded before failing. Carries the
    /// number of rows that were durably applied before the error kind in
    /// `source` was hit, per spec section 7's `Partial(rows_affected)`.
    #[error("partial mutation ({rows_affected} rows applied): {source}")]
    Partial {
        rows_affected: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, cause: impl fmt::Display) -> Self {
        Error::Io {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn load_failed(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::LoadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn partial(self, rows_affected: usize) -> Self {
        Error::Partial {
            rows_affected,
            source: Box::new(self),
        }
    }

    /// Exit code per the CLI surface in spec section 6: 1 on parse/semantic
    /// error, 2 on runtime error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse { .. } | Error::Semantic(_) | Error::ColumnNotFound(_)
            | Error::TypeMismatch(_) | Error::DuplicateTable(_) => 1,
            _ => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

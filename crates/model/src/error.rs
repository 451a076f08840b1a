//! Model Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A model error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for parsing and schema operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The string is not a library identifier in the requested form.
    #[display("invalid library name: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The document is not syntactically valid JSON.
    #[display("invalid JSON: {_0}")]
    InvalidJson(#[error(not(source))] String),
    /// The document is JSON, but does not conform to its schema.
    #[display("{path}: {reason}")]
    Schema {
        /// JSON path of the offending field (`$` for the document root).
        path: String,
        /// Why the field was rejected.
        reason: String,
    },
    /// A content manifest names a main library it does not depend on.
    #[display("main library {_0} is not listed in the preloaded dependencies")]
    MainLibraryMissing(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Parsing is deterministic; the same input fails the same way.
        false
    }

    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema { path: path.into(), reason: reason.into() }
    }
}

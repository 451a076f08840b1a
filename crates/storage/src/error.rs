//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use parcel_model::LibraryName;
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// A stored document no longer parses; storage was modified behind our back.
    #[display("corrupt record: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// No library with this identity is installed.
    #[display("library not installed: {_0}")]
    LibraryNotFound(#[error(not(source))] LibraryName),
    /// A library with this identity is already installed.
    #[display("library already installed: {_0}")]
    LibraryExists(#[error(not(source))] LibraryName),
    /// No content with this id exists.
    #[display("content not found: {_0}")]
    ContentNotFound(#[error(not(source))] String),
    /// The record being saved is inconsistent (e.g. its main library isn't a dependency).
    #[display("invalid record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// Returns `true` for any of the "doesn't exist" kinds.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::LibraryNotFound(_) | Self::ContentNotFound(_))
    }
}

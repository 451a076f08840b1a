//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file is not a readable zip container. Don't retry with the same input.
    #[display("unable to unzip")]
    Unreadable,
    /// An entry exists but its data is corrupt (bad checksum, truncated stream, ...).
    #[display("corrupt entry: {_0}")]
    Corrupt(#[error(not(source))] String),
    /// An entry name would escape the extraction directory.
    #[display("unsafe entry name: {_0}")]
    UnsafePath(#[error(not(source))] String),
    /// An entry grew beyond the size it was allowed to have.
    #[display("entry too large: {_0}")]
    TooLarge(#[error(not(source))] String),
    /// An I/O operation failed. Used for writing and extraction.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

//! Validation Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::report::ValidationErrors;
use derive_more::{Display, Error};

/// A validation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for validation.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The package is not acceptable; every problem found is listed.
    #[display("{_0}")]
    Invalid(#[error(not(source))] ValidationErrors),
    /// The package file couldn't be read at all.
    #[display("unable to read package")]
    Io,
    /// A validation task panicked or was cancelled.
    #[display("validation task failed")]
    Task,
    /// A rule ran without the state an earlier rule should have produced.
    #[display("validation rule ran out of order: {_0}")]
    OutOfOrder(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }

    /// The aggregated problems, when the package itself was at fault.
    pub fn problems(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

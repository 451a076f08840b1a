//! Package Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use parcel_validate::ValidationErrors;

/// A package error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for import and export.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The package was rejected; every problem found is listed.
    #[display("invalid package:\n{_0}")]
    Invalid(#[error(not(source))] ValidationErrors),
    /// Validation itself couldn't run to completion.
    #[display("unable to validate package")]
    Validation,
    #[display("content not found: {_0}")]
    ContentNotFound(#[error(not(source))] String),
    /// The user may not download this content.
    #[display("not permitted to export content {_0}")]
    Forbidden(#[error(not(source))] String),
    /// A library needed by the content couldn't be resolved.
    #[display("unable to resolve content dependencies")]
    Dependencies,
    #[display("storage operation failed")]
    Storage,
    #[display("archive operation failed")]
    Archive,
    #[display("I/O error")]
    Io,
    #[display("background task failed")]
    Task,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Io | Self::Task)
    }

    /// The aggregate of problems, when the package itself was at fault.
    pub fn problems(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

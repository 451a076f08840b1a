//! Hub Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A hub error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for hub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The hub could not be reached.
    #[display("unable to reach the hub: {_0}")]
    Transport(#[error(not(source))] String),
    /// The hub didn't answer within the configured timeout.
    #[display("hub request timed out")]
    Timeout,
    /// The hub answered with an error status.
    #[display("hub responded with status {_0}")]
    Status(#[error(not(source))] u16),
    /// The hub answered with something that isn't the expected document.
    #[display("unexpected hub response")]
    InvalidResponse,
    /// Reading or writing the cached catalog failed.
    #[display("hub cache storage failed")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status(status) => *status >= 500,
            Self::InvalidResponse | Self::Storage => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Timeout, true)]
    #[case(ErrorKind::Status(503), true)]
    #[case(ErrorKind::Status(404), false)]
    #[case(ErrorKind::InvalidResponse, false)]
    fn error_kind_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}

//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use parcel_model::LibraryName;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage operation failed; see the child error.
    #[display("library storage failed")]
    Storage,
    /// The directory being installed has no usable `library.json`.
    #[display("invalid library directory: {_0}")]
    InvalidLibrary(#[error(not(source))] String),
    /// A library needed by the operation isn't installed.
    #[display("library not installed: {_0}")]
    NotInstalled(#[error(not(source))] LibraryName),
    /// Content or other libraries still depend on the library.
    #[display("library in use: {library} (content: {content}, dependent libraries: {dependents})")]
    InUse { library: LibraryName, content: usize, dependents: usize },
    /// Files promised by the descriptor aren't there after installing.
    #[display("{library}: missing files: {}", files.join(", "))]
    MissingFiles { library: LibraryName, files: Vec<String> },
    /// Undoing a failed install failed as well; storage needs attention.
    #[display("unable to roll back failed install of {_0}")]
    RollbackFailed(#[error(not(source))] LibraryName),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        let library = LibraryName::new("H5P.Foo", 1, 0);
        let err = ErrorKind::MissingFiles { library: library.clone(), files: vec!["a.js".into(), "b.css".into()] };
        assert_eq!(err.to_string(), "H5P.Foo-1.0: missing files: a.js, b.css");
        let err = ErrorKind::InUse { library, content: 1, dependents: 0 };
        assert_eq!(err.to_string(), "library in use: H5P.Foo-1.0 (content: 1, dependent libraries: 0)");
    }
}

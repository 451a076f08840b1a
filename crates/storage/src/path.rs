//! Path validation.
//!
//! Every path handed to a backend is relative to the storage root, and every
//! path that reaches a backend passed through [`validate`] first.

use crate::error::{ErrorKind, Result};
use std::path::{Component, Path, PathBuf};

/// Normalizes a storage path, refusing anything that would leave the root.
///
/// > **Note:** Null bytes are rejected explicitly; backslashes and non-UTF8
/// >           bytes are left to the platform.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use parcel_storage::validate_path;
///
/// assert!(validate_path("libraries/H5P.Foo-1.0/library.json").is_ok());
/// assert!(validate_path("content/7/files/../content.json").is_ok());
/// assert!(validate_path("../libraries").is_err());
/// assert!(validate_path("content/../../etc/passwd").is_err());
/// assert_eq!(
///     validate_path("./libraries//H5P.Foo-1.0/").unwrap(),
///     Path::new("libraries/H5P.Foo-1.0")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || exn::Exn::from(ErrorKind::InvalidPath(path.to_path_buf()));
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) if part.as_encoded_bytes().contains(&0) => return Err(invalid()),
            Component::Normal(part) => components.push(part),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => return Err(invalid()),
            Component::ParentDir => {
                components.pop().ok_or_else(invalid)?;
            },
        }
    }
    if components.is_empty() {
        return Err(invalid());
    }
    Ok(components.into_iter().collect())
}

/// Strip `prefix` from a listed `path`, returning the remainder as a
/// forward-slash string.
pub(crate) fn relative_to(path: &Path, prefix: &Path) -> Option<String> {
    let rest = path.strip_prefix(prefix).ok()?;
    let parts: Vec<_> = rest.components().filter_map(|c| c.as_os_str().to_str()).collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

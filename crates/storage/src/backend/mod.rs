//! File-level storage backends.
//!
//! The domain storages ([`LibraryStorage`](crate::LibraryStorage),
//! [`ContentStorage`](crate::ContentStorage) and
//! [`KeyValueStorage`](crate::KeyValueStorage)) are layered on top of a
//! [`StorageBackend`], so swapping the filesystem for something else only
//! means implementing this trait.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::error::Result;
use crate::file::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::Read;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use parcel_storage::{backend::StorageBackend, error::Result};
///
/// async fn descriptor_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("libraries/H5P.Foo-1.0/library.json");
///     if backend.exists(path).await? {
///         Ok(backend.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files below an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata below an optional prefix.
    ///
    /// Prefixes are matched per path component: `content/1` matches
    /// `content/1/h5p.json` but not `content/10/h5p.json`. Listing a prefix
    /// that doesn't exist yields nothing rather than an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a file for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// (opening the file) happens before returning.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use parcel_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut reader = backend.reader(Path::new("content/1/files/image.png")).await?;
    /// let size = tokio::task::spawn_blocking(move || {
    ///     std::io::copy(&mut reader, &mut std::io::sink())
    /// }).await.unwrap().unwrap();
    /// # Ok(())
    /// # }
    /// ```
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Create or overwrite a file, creating parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Delete every file below `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &Path) -> Result<usize> {
        let files = self.list(Some(prefix)).await?;
        for file in &files {
            self.delete(&file.path).await?;
        }
        Ok(files.len())
    }
}

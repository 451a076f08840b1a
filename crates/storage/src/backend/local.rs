//! Local filesystem storage backend.
//!
//! Files are stored below a configured root directory and accessed through
//! `tokio::fs`.

use crate::backend::{BoxSyncRead, FileInfoStream};
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// ```no_run
/// use parcel_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/var/lib/parcel")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// Create a backend rooted at the absolute directory `root`, creating it
    /// if it doesn't exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once, when storage is first set up.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{}` is not within root `{}`", absolute.display(), self.root.display()))
        })?;
        validate_path(relative)
    }

    fn file_info(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Classify one directory entry; kept out of the stream so `?` works.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::file_info(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        // Start from the prefix's parent so a prefix naming a single file
        // (or nothing at all yet) still works.
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        let abs_path = self.absolute_path(path)?;
        let file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        Ok(Box::new(std::io::BufReader::new(file.into_std().await)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn delete_prefix(&self, prefix: &Path) -> Result<usize> {
        let abs_path = self.absolute_path(prefix)?;
        let removed = self.list(Some(prefix)).await?.len();
        match fs::remove_dir_all(&abs_path).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Self::map_io_error(e, prefix).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Read;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("libraries/H5P.Foo-1.0/library.json");
        assert_eq!(backend.absolute_path("libraries/H5P.Foo-1.0/library.json").unwrap(), expected);
        assert!(backend.absolute_path("../etc/passwd").is_err());
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("libraries/H5P.Foo-1.0/library.json"));
        assert!(backend.relative_path("/other/file.json").is_err());
    }

    #[tokio::test]
    async fn test_write_read_and_reader() {
        let (_dir, backend) = backend();
        backend.write(Path::new("a/b/c/file.txt"), b"Hello, world!").await.unwrap();
        assert_eq!(backend.read(Path::new("a/b/c/file.txt")).await.unwrap(), b"Hello, world!");
        let mut buffer = String::new();
        backend.reader(Path::new("a/b/c/file.txt")).await.unwrap().read_to_string(&mut buffer).unwrap();
        assert_eq!(buffer, "Hello, world!");
    }

    #[tokio::test]
    async fn test_prefix_is_component_based() {
        let (_dir, backend) = backend();
        backend.write(Path::new("content/1/h5p.json"), b"{}").await.unwrap();
        backend.write(Path::new("content/1/files/a.png"), b"png").await.unwrap();
        backend.write(Path::new("content/10/h5p.json"), b"{}").await.unwrap();
        let mut files: Vec<_> =
            backend.list(Some(Path::new("content/1"))).await.unwrap().into_iter().map(|f| f.path).collect();
        files.sort();
        assert_eq!(files, [PathBuf::from("content/1/files/a.png"), PathBuf::from("content/1/h5p.json")]);
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        assert!(backend.list(Some(Path::new("nonexistent/"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, backend) = backend();
        backend.write(Path::new("file.txt"), b"data").await.unwrap();
        backend.delete(Path::new("file.txt")).await.unwrap();
        assert!(!backend.exists(Path::new("file.txt")).await.unwrap());
        let err = backend.delete(Path::new("file.txt")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let (dir, backend) = backend();
        backend.write(Path::new("libraries/H5P.Foo-1.0/library.json"), b"{}").await.unwrap();
        backend.write(Path::new("libraries/H5P.Foo-1.0/js/foo.js"), b"").await.unwrap();
        backend.write(Path::new("libraries/H5P.Bar-1.0/library.json"), b"{}").await.unwrap();
        assert_eq!(backend.delete_prefix(Path::new("libraries/H5P.Foo-1.0")).await.unwrap(), 2);
        assert!(!dir.path().join("libraries/H5P.Foo-1.0").exists());
        assert!(backend.exists(Path::new("libraries/H5P.Bar-1.0/library.json")).await.unwrap());
        assert_eq!(backend.delete_prefix(Path::new("libraries/H5P.Foo-1.0")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.read(Path::new("etc/../../passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}

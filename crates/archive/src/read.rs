//! Reading packages.

use crate::entry::Entry;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipError;

/// An opened zip container.
///
/// All operations are blocking; async callers run them on a blocking thread.
pub struct Archive<R> {
    inner: ZipArchive<R>,
}

impl Archive<BufReader<File>> {
    /// Open the archive at `path`.
    ///
    /// Fails with [`ErrorKind::Io`] when the file can't be opened and
    /// [`ErrorKind::Unreadable`] when it isn't a zip container.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).or_raise(|| ErrorKind::Io)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read + Seek> Archive<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let inner = ZipArchive::new(reader).or_raise(|| ErrorKind::Unreadable)?;
        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Central directory listing, in archive order.
    pub fn entries(&mut self) -> Result<Vec<Entry>> {
        (0..self.inner.len())
            .map(|i| {
                let file = self.inner.by_index_raw(i).or_raise(|| ErrorKind::Unreadable)?;
                Ok(Entry {
                    name: file.name().to_string(),
                    size: file.size(),
                    compressed_size: file.compressed_size(),
                    is_dir: file.is_dir(),
                })
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.index_for_name(name).is_some()
    }

    /// Read an entry into memory, refusing to read more than `limit` bytes.
    ///
    /// Returns `None` when the archive has no entry called `name`.
    pub fn read(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>> {
        let mut file = match self.inner.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Corrupt(name.to_string())),
        };
        let mut buffer = Vec::with_capacity(file.size().min(limit) as usize);
        (&mut file)
            .take(limit + 1)
            .read_to_end(&mut buffer)
            .or_raise(|| ErrorKind::Corrupt(name.to_string()))?;
        if buffer.len() as u64 > limit {
            exn::bail!(ErrorKind::TooLarge(name.to_string()));
        }
        Ok(Some(buffer))
    }

    /// Decompress an entry without keeping its data, checking its checksum.
    pub fn verify(&mut self, name: &str) -> Result<u64> {
        let mut file = self.inner.by_name(name).or_raise(|| ErrorKind::Corrupt(name.to_string()))?;
        io::copy(&mut file, &mut io::sink()).or_raise(|| ErrorKind::Corrupt(name.to_string()))
    }

    /// Extract every entry accepted by `filter` below `destination`.
    ///
    /// Entries whose names would land outside `destination` are refused
    /// rather than skipped. Returns the paths of the files written.
    #[instrument(skip(self, destination, filter), fields(destination = %destination.display(), extracted))]
    pub fn extract_to(&mut self, destination: &Path, filter: impl Fn(&Entry) -> bool) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for i in 0..self.inner.len() {
            let mut file = self.inner.by_index(i).or_raise(|| ErrorKind::Unreadable)?;
            let entry = Entry {
                name: file.name().to_string(),
                size: file.size(),
                compressed_size: file.compressed_size(),
                is_dir: file.is_dir(),
            };
            if entry.is_directory() || !filter(&entry) {
                continue;
            }
            let Some(relative) = file.enclosed_name() else {
                exn::bail!(ErrorKind::UnsafePath(entry.name));
            };
            let target = destination.join(relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
            }
            let mut output = File::create(&target).or_raise(|| ErrorKind::Io)?;
            io::copy(&mut file, &mut output).or_raise(|| ErrorKind::Corrupt(entry.name.clone()))?;
            written.push(target);
        }
        tracing::Span::current().record("extracted", written.len());
        Ok(written)
    }
}

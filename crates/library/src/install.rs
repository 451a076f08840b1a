//! Installing library directories.
//!
//! A library moves through `NotInstalled -> Installing -> Installed`. The
//! record is created first; if copying its files or the consistency check
//! afterwards fails, the record and everything stored so far are removed
//! again. A higher patch of an installed `major.minor` replaces the files and
//! descriptor in place, and the previous version is put back if that fails.
//! Anything else already installed is left untouched.

use crate::LibraryManager;
use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parcel_model::library::LIBRARY_DESCRIPTOR;
use parcel_model::{InstalledLibrary, LibraryMetadata, LibraryName, LibraryVersion};
use parcel_storage::StorageBackend;
use parcel_storage::backend::LocalBackend;
use parcel_storage::error::ErrorKind as StorageErrorKind;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Maximum number of library directories installed at the same time.
pub const MAX_INSTALL_CONCURRENCY: usize = 8;

/// Outcome of installing one library directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Install {
    /// The library wasn't installed before.
    Installed(InstalledLibrary),
    /// A higher patch replaced the installed files and descriptor.
    Patched { from: LibraryVersion, library: InstalledLibrary },
    /// The same or a higher patch is already installed; nothing changed.
    AlreadyInstalled(InstalledLibrary),
}
impl Install {
    pub fn library(&self) -> &InstalledLibrary {
        match self {
            Self::Installed(library) | Self::Patched { library, .. } | Self::AlreadyInstalled(library) => library,
        }
    }

    /// `true` when storage was changed.
    pub fn changed(&self) -> bool {
        !matches!(self, Self::AlreadyInstalled(_))
    }
}

/// Per-directory results of [`LibraryManager::install_all`].
#[derive(Debug, Default)]
pub struct InstallReport {
    pub installs: Vec<(PathBuf, Install)>,
    pub failures: Vec<(PathBuf, Error)>,
}
impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn is_hidden(relative: &str) -> bool {
    relative.split('/').any(|part| part.starts_with('.'))
}

/// Read and check the descriptor of a library directory.
pub async fn read_descriptor(directory: &Path) -> Result<LibraryMetadata> {
    let invalid = || ErrorKind::InvalidLibrary(directory.display().to_string());
    let data = tokio::fs::read(directory.join(LIBRARY_DESCRIPTOR)).await.or_raise(invalid)?;
    LibraryMetadata::from_json(&data).or_raise(invalid)
}

impl LibraryManager {
    /// Install the library directory at `directory` (absolute).
    ///
    /// Installing a directory whose version is already present is a no-op
    /// reported as [`Install::AlreadyInstalled`].
    #[instrument(skip(self, directory), fields(directory = %directory.display(), library))]
    pub async fn install_from_directory(&self, directory: &Path, restricted: bool) -> Result<Install> {
        let source = LocalBackend::new("install", directory)
            .or_raise(|| ErrorKind::InvalidLibrary(directory.display().to_string()))?;
        let metadata = read_descriptor(directory).await?;
        let name = metadata.name();
        tracing::Span::current().record("library", tracing::field::display(&name));

        let _guard = self.lock(&name).await;
        match self.libraries.get_library(&name).await {
            Ok(installed) if metadata.is_patch_of(&installed.metadata) => self.patch(&source, &metadata, installed).await,
            Ok(installed) => {
                tracing::debug!(installed = %installed.version(), offered = %metadata.version(), "already installed");
                Ok(Install::AlreadyInstalled(installed))
            },
            Err(err) if matches!(&*err, StorageErrorKind::LibraryNotFound(_)) => {
                self.install_new(&source, &metadata, restricted).await
            },
            Err(err) => Err(err).or_raise(|| ErrorKind::Storage),
        }
    }

    /// Install several directories concurrently. A failing directory never
    /// stops the others; every outcome ends up in the report.
    pub async fn install_all(&self, directories: &[PathBuf]) -> InstallReport {
        let mut pending: Vec<_> = directories
            .iter()
            .map(|directory| async move { (directory.clone(), self.install_from_directory(directory, false).await) })
            .collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.drain(..MAX_INSTALL_CONCURRENCY.min(pending.len())));
        let mut report = InstallReport::default();
        while let Some((directory, result)) = processing.next().await {
            match result {
                Ok(install) => report.installs.push((directory, install)),
                Err(err) => {
                    tracing::warn!(directory = %directory.display(), error = ?err, "library install failed");
                    report.failures.push((directory, err));
                },
            }
            if !pending.is_empty() {
                processing.push(pending.remove(0));
            }
        }
        report
    }

    async fn install_new(&self, source: &LocalBackend, metadata: &LibraryMetadata, restricted: bool) -> Result<Install> {
        let name = metadata.name();
        let library = self.libraries.add_library(metadata, restricted).await.or_raise(|| ErrorKind::Storage)?;
        let stored = async {
            self.copy_files(source, &name).await?;
            self.check_consistency(&name).await
        };
        match stored.await {
            Ok(()) => {
                tracing::info!(version = %metadata.version(), "library installed");
                Ok(Install::Installed(library))
            },
            Err(err) => {
                tracing::warn!(error = ?err, "install failed, rolling back");
                self.rollback(&name).await?;
                Err(err)
            },
        }
    }

    async fn patch(&self, source: &LocalBackend, metadata: &LibraryMetadata, installed: InstalledLibrary) -> Result<Install> {
        let name = metadata.name();
        let from = installed.version();
        let previous = self.snapshot(&name).await?;
        let patched = async {
            self.libraries.update_library(metadata).await.or_raise(|| ErrorKind::Storage)?;
            self.libraries.clear_files(&name).await.or_raise(|| ErrorKind::Storage)?;
            self.copy_files(source, &name).await?;
            self.check_consistency(&name).await
        };
        match patched.await {
            Ok(()) => {
                let library = self.get(&name).await?;
                tracing::info!(%from, to = %metadata.version(), "library patched");
                Ok(Install::Patched { from, library })
            },
            Err(err) => {
                tracing::warn!(error = ?err, %from, "patch failed, restoring previous version");
                self.restore(&installed, previous).await?;
                Err(err)
            },
        }
    }

    /// Every stored file of `name` except the descriptor, read into memory.
    async fn snapshot(&self, name: &LibraryName) -> Result<Vec<(String, Vec<u8>)>> {
        let mut files = Vec::new();
        for file in self.libraries.list_files(name).await.or_raise(|| ErrorKind::Storage)? {
            if file == LIBRARY_DESCRIPTOR {
                continue;
            }
            let mut reader = self.libraries.file_reader(name, &file).await.or_raise(|| ErrorKind::Storage)?;
            let data = tokio::task::spawn_blocking(move || {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).map(|_| data)
            })
            .await
            .or_raise(|| ErrorKind::Storage)?
            .or_raise(|| ErrorKind::Storage)?;
            files.push((file, data));
        }
        Ok(files)
    }

    /// Put back the descriptor and files a failed patch replaced.
    async fn restore(&self, installed: &InstalledLibrary, files: Vec<(String, Vec<u8>)>) -> Result<()> {
        let name = installed.metadata.name();
        let restored = async {
            self.libraries.update_library(&installed.metadata).await?;
            self.libraries.clear_files(&name).await?;
            for (file, data) in &files {
                self.libraries.add_file(&name, file, data).await?;
            }
            Ok::<_, parcel_storage::error::Error>(())
        };
        if let Err(err) = restored.await {
            tracing::error!(library = %name, error = ?err, "restoring library after failed patch failed");
            return Err(err).or_raise(|| ErrorKind::RollbackFailed(name));
        }
        Ok(())
    }

    /// Copy every file of `source` except the descriptor, which the record
    /// already holds.
    async fn copy_files(&self, source: &LocalBackend, name: &LibraryName) -> Result<usize> {
        let files = source.list(None).await.or_raise(|| ErrorKind::Storage)?;
        let mut copied = 0;
        for file in files {
            let relative: Vec<_> = file.path.components().map(|c| c.as_os_str().to_string_lossy()).collect();
            let relative = relative.join("/");
            if relative == LIBRARY_DESCRIPTOR || is_hidden(&relative) {
                continue;
            }
            let data = source.read(&file.path).await.or_raise(|| ErrorKind::Storage)?;
            self.libraries.add_file(name, &relative, &data).await.or_raise(|| ErrorKind::Storage)?;
            copied += 1;
        }
        tracing::debug!(copied, "library files stored");
        Ok(copied)
    }

    /// Remove a half-installed library. Failing here leaves storage in an
    /// unknown state, so it is reported loudly and never swallowed.
    async fn rollback(&self, name: &LibraryName) -> Result<()> {
        if let Err(err) = self.libraries.delete_library(name).await {
            tracing::error!(library = %name, error = ?err, "rollback of failed install failed");
            return Err(err).or_raise(|| ErrorKind::RollbackFailed(name.clone()));
        }
        Ok(())
    }
}

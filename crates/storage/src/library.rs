//! Library storage.
//!
//! Installed libraries live below `libraries/{ubername}/`. The descriptor is
//! stored as `library.json`; metadata that isn't part of the descriptor (the
//! restricted flag) is kept next to it in a hidden file that never shows up
//! in file listings.

use crate::backend::BoxSyncRead;
use crate::error::{ErrorKind, Result};
use crate::path::{relative_to, validate as validate_path};
use crate::BackendHandle;
use async_trait::async_trait;
use exn::ResultExt;
use parcel_model::library::LIBRARY_DESCRIPTOR;
use parcel_model::{AdditionalMetadata, InstalledLibrary, LibraryMetadata, LibraryName, UbernameForm};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::instrument;

const LIBRARIES: &str = "libraries";
const ADDITIONAL_METADATA: &str = ".parcel.json";

/// Where installed libraries, their files and their metadata are kept.
#[async_trait]
pub trait LibraryStorage: Send + Sync {
    /// Every installed library, optionally restricted to some machine names.
    async fn installed_library_names(&self, machine_names: Option<&[String]>) -> Result<Vec<LibraryName>>;

    /// Returns [`LibraryNotFound`](ErrorKind::LibraryNotFound) when nothing is
    /// installed under `name`.
    async fn get_library(&self, name: &LibraryName) -> Result<InstalledLibrary>;

    async fn is_installed(&self, name: &LibraryName) -> Result<bool>;

    /// Record a new library. Fails with [`LibraryExists`](ErrorKind::LibraryExists)
    /// when the identity is already taken.
    async fn add_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary>;

    /// Overwrite the descriptor of an installed library (a patch upgrade).
    async fn update_library(&self, metadata: &LibraryMetadata) -> Result<InstalledLibrary>;

    /// Remove the library record along with all of its files.
    async fn delete_library(&self, name: &LibraryName) -> Result<()>;

    async fn add_file(&self, name: &LibraryName, file: &str, data: &[u8]) -> Result<()>;

    /// Remove every file except the descriptor.
    async fn clear_files(&self, name: &LibraryName) -> Result<()>;

    /// Files of a library relative to its directory, sorted, descriptor included.
    async fn list_files(&self, name: &LibraryName) -> Result<Vec<String>>;

    async fn file_exists(&self, name: &LibraryName, file: &str) -> Result<bool>;

    async fn file_reader(&self, name: &LibraryName, file: &str) -> Result<BoxSyncRead>;

    async fn file_as_json(&self, name: &LibraryName, file: &str) -> Result<Value>;

    async fn file_as_string(&self, name: &LibraryName, file: &str) -> Result<String>;

    /// How many installed libraries list `name` in any of their dependency lists.
    async fn dependents_count(&self, name: &LibraryName) -> Result<usize>;

    /// Apply a partial metadata update; `true` when something changed.
    async fn update_additional_metadata(&self, name: &LibraryName, additional: &AdditionalMetadata) -> Result<bool>;

    /// Installed libraries that attach themselves to other content.
    async fn list_addons(&self) -> Result<Vec<InstalledLibrary>>;

    /// Every installed library, fully loaded.
    async fn installed_libraries(&self, machine_names: Option<&[String]>) -> Result<Vec<InstalledLibrary>> {
        let mut libraries = Vec::new();
        for name in self.installed_library_names(machine_names).await? {
            libraries.push(self.get_library(&name).await?);
        }
        Ok(libraries)
    }
}

/// [`LibraryStorage`] on top of any [`StorageBackend`](crate::StorageBackend).
#[derive(Clone)]
pub struct BackendLibraryStorage {
    backend: BackendHandle,
}
impl BackendLibraryStorage {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    fn directory(name: &LibraryName) -> PathBuf {
        Path::new(LIBRARIES).join(name.ubername())
    }

    /// Resolve `file` inside the library directory, refusing anything that
    /// would land outside it.
    fn file_path(name: &LibraryName, file: &str) -> Result<PathBuf> {
        let directory = Self::directory(name);
        let path = validate_path(directory.join(file))?;
        if !path.starts_with(&directory) || path == directory {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(file)));
        }
        Ok(path)
    }

    async fn read_file(&self, name: &LibraryName, file: &str) -> Result<Vec<u8>> {
        let path = Self::file_path(name, file)?;
        self.backend.read(&path).await
    }

    async fn read_additional(&self, name: &LibraryName) -> Result<AdditionalMetadata> {
        let path = Self::directory(name).join(ADDITIONAL_METADATA);
        match self.backend.read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data).or_raise(|| ErrorKind::Corrupt(path.clone()))?),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(AdditionalMetadata::default()),
            Err(err) => Err(err),
        }
    }

    async fn write_records(&self, library: &InstalledLibrary) -> Result<()> {
        let directory = Self::directory(&library.name());
        let descriptor = serde_json::to_vec_pretty(&library.metadata)
            .or_raise(|| ErrorKind::BackendError("unable to serialize descriptor".to_string()))?;
        let additional = serde_json::to_vec(&AdditionalMetadata { restricted: Some(library.restricted) })
            .or_raise(|| ErrorKind::BackendError("unable to serialize metadata".to_string()))?;
        self.backend.write(&directory.join(LIBRARY_DESCRIPTOR), &descriptor).await?;
        self.backend.write(&directory.join(ADDITIONAL_METADATA), &additional).await
    }
}

#[async_trait]
impl LibraryStorage for BackendLibraryStorage {
    async fn installed_library_names(&self, machine_names: Option<&[String]>) -> Result<Vec<LibraryName>> {
        let root = Path::new(LIBRARIES);
        let mut names: Vec<_> = self
            .backend
            .list(Some(root))
            .await?
            .into_iter()
            .filter_map(|file| {
                let relative = relative_to(&file.path, root)?;
                let (directory, rest) = relative.split_once('/')?;
                if rest != LIBRARY_DESCRIPTOR {
                    return None;
                }
                match LibraryName::parse(directory, UbernameForm::Hyphen) {
                    Ok(name) => Some(name),
                    Err(_) => {
                        tracing::warn!(directory, backend = self.backend.name(), "ignoring unrecognised library directory");
                        None
                    },
                }
            })
            .filter(|name| machine_names.is_none_or(|wanted| wanted.contains(&name.machine_name)))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_library(&self, name: &LibraryName) -> Result<InstalledLibrary> {
        let path = Self::directory(name).join(LIBRARY_DESCRIPTOR);
        let data = match self.backend.read(&path).await {
            Ok(data) => data,
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => exn::bail!(ErrorKind::LibraryNotFound(name.clone())),
            Err(err) => return Err(err),
        };
        let metadata = LibraryMetadata::from_json(&data).or_raise(|| ErrorKind::Corrupt(path.clone()))?;
        let additional = self.read_additional(name).await?;
        Ok(InstalledLibrary::new(metadata, additional.restricted.unwrap_or(false)))
    }

    async fn is_installed(&self, name: &LibraryName) -> Result<bool> {
        self.backend.exists(&Self::directory(name).join(LIBRARY_DESCRIPTOR)).await
    }

    #[instrument(skip(self, metadata), fields(library = %metadata.name()))]
    async fn add_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary> {
        let name = metadata.name();
        if self.is_installed(&name).await? {
            exn::bail!(ErrorKind::LibraryExists(name));
        }
        let library = InstalledLibrary::new(metadata.clone(), restricted);
        self.write_records(&library).await?;
        tracing::debug!(version = %metadata.version(), "library record created");
        Ok(library)
    }

    #[instrument(skip(self, metadata), fields(library = %metadata.name()))]
    async fn update_library(&self, metadata: &LibraryMetadata) -> Result<InstalledLibrary> {
        let mut library = self.get_library(&metadata.name()).await?;
        library.metadata = metadata.clone();
        self.write_records(&library).await?;
        Ok(library)
    }

    #[instrument(skip(self), fields(library = %name))]
    async fn delete_library(&self, name: &LibraryName) -> Result<()> {
        if !self.is_installed(name).await? {
            exn::bail!(ErrorKind::LibraryNotFound(name.clone()));
        }
        let removed = self.backend.delete_prefix(&Self::directory(name)).await?;
        tracing::debug!(removed, "library files deleted");
        Ok(())
    }

    async fn add_file(&self, name: &LibraryName, file: &str, data: &[u8]) -> Result<()> {
        if file == ADDITIONAL_METADATA {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(file)));
        }
        self.backend.write(&Self::file_path(name, file)?, data).await
    }

    async fn clear_files(&self, name: &LibraryName) -> Result<()> {
        for file in self.list_files(name).await? {
            if file != LIBRARY_DESCRIPTOR {
                self.backend.delete(&Self::file_path(name, &file)?).await?;
            }
        }
        Ok(())
    }

    async fn list_files(&self, name: &LibraryName) -> Result<Vec<String>> {
        let directory = Self::directory(name);
        let mut files: Vec<_> = self
            .backend
            .list(Some(&directory))
            .await?
            .into_iter()
            .filter_map(|file| relative_to(&file.path, &directory))
            .filter(|file| file != ADDITIONAL_METADATA)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn file_exists(&self, name: &LibraryName, file: &str) -> Result<bool> {
        self.backend.exists(&Self::file_path(name, file)?).await
    }

    async fn file_reader(&self, name: &LibraryName, file: &str) -> Result<BoxSyncRead> {
        self.backend.reader(&Self::file_path(name, file)?).await
    }

    async fn file_as_json(&self, name: &LibraryName, file: &str) -> Result<Value> {
        let data = self.read_file(name, file).await?;
        parcel_model::schema::parse_value(&data).or_raise(|| ErrorKind::Corrupt(Self::directory(name).join(file)))
    }

    async fn file_as_string(&self, name: &LibraryName, file: &str) -> Result<String> {
        let data = self.read_file(name, file).await?;
        String::from_utf8(data).or_raise(|| ErrorKind::Corrupt(Self::directory(name).join(file)))
    }

    async fn dependents_count(&self, name: &LibraryName) -> Result<usize> {
        let libraries = self.installed_libraries(None).await?;
        Ok(libraries.iter().filter(|library| library.depends_on(name)).count())
    }

    async fn update_additional_metadata(&self, name: &LibraryName, additional: &AdditionalMetadata) -> Result<bool> {
        let mut library = self.get_library(name).await?;
        if !library.apply(additional) {
            return Ok(false);
        }
        self.write_records(&library).await?;
        Ok(true)
    }

    async fn list_addons(&self) -> Result<Vec<InstalledLibrary>> {
        let libraries = self.installed_libraries(None).await?;
        Ok(libraries.into_iter().filter(|library| library.is_addon()).collect())
    }
}

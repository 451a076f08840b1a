//! Importing packages.
//!
//! An import validates the package, checks what the user may install,
//! extracts the sections it needs into a scratch directory, installs the
//! libraries and finally creates the content record. The scratch directory
//! is removed however the import ends.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use parcel_archive::{Archive, Section};
use parcel_library::error::ErrorKind as LibraryErrorKind;
use parcel_library::{InstallReport, LibraryManager};
use parcel_model::manifest::{CONTENT_DIRECTORY, PARAMETERS_FILE};
use parcel_model::{ContentManifest, User};
use parcel_storage::backend::LocalBackend;
use parcel_storage::{ContentId, ContentStorageHandle, StorageBackend};
use parcel_validate::error::ErrorKind as ValidateErrorKind;
use parcel_validate::{Config, Problem, ValidatedLibrary, ValidatedPackage, ValidationErrors};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Which parts of a package to import.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    pub install_libraries: bool,
    pub copy_content: bool,
}
impl Default for ImportOptions {
    fn default() -> Self {
        Self { install_libraries: true, copy_content: true }
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub manifest: ContentManifest,
    /// The created content, when content was copied.
    pub content: Option<ContentId>,
    /// One entry per library directory that was offered for install.
    pub installs: InstallReport,
}

pub struct PackageImporter {
    libraries: Arc<LibraryManager>,
    content: ContentStorageHandle,
    config: Config,
}
impl PackageImporter {
    pub fn new(libraries: Arc<LibraryManager>, content: ContentStorageHandle, config: Config) -> Self {
        Self { libraries, content, config }
    }

    /// Import the package at `path` on behalf of `user`.
    ///
    /// `id` picks the id of the content; a fresh one is generated otherwise.
    /// Importing into an existing id replaces that content's manifest,
    /// parameters and files. Individual library installs may fail without failing the
    /// import; they are listed in the report.
    #[instrument(skip(self, path, user, id), fields(path = %path.display(), user = %user.id))]
    pub async fn import(
        &self,
        path: &Path,
        user: &User,
        options: ImportOptions,
        id: Option<ContentId>,
    ) -> Result<ImportReport> {
        let package = match parcel_validate::validate(path, &self.config).await {
            Ok(package) => package,
            Err(err) => {
                let kind = match &*err {
                    ValidateErrorKind::Invalid(errors) => ErrorKind::Invalid(errors.clone()),
                    _ => ErrorKind::Validation,
                };
                return Err(err).or_raise(|| kind);
            },
        };
        let wanted = match options.install_libraries {
            true => self.libraries_to_install(&package, user).await?,
            false => Vec::new(),
        };

        let scratch = tempfile::Builder::new().prefix("parcel-import-").tempdir().or_raise(|| ErrorKind::Io)?;
        let directories: HashSet<String> = wanted.iter().map(|library| library.directory.clone()).collect();
        extract(path, scratch.path(), directories, options.copy_content).await?;

        let directories: Vec<PathBuf> = wanted.iter().map(|library| scratch.path().join(&library.directory)).collect();
        let installs = self.libraries.install_all(&directories).await;
        if !installs.is_complete() {
            tracing::warn!(failed = installs.failures.len(), installed = installs.installs.len(), "some libraries failed to install");
        }

        let content = match options.copy_content {
            true => Some(self.create_content(scratch.path(), &package.manifest, user, id).await?),
            false => None,
        };
        if let Err(err) = scratch.close() {
            tracing::warn!(error = %err, "unable to remove scratch directory");
        }
        tracing::info!(content = ?content.as_ref().map(ContentId::as_str), "package imported");
        Ok(ImportReport { manifest: package.manifest, content, installs })
    }

    /// Libraries in the package that would change storage, after checking
    /// the user may install them.
    async fn libraries_to_install<'a>(
        &self,
        package: &'a ValidatedPackage,
        user: &User,
    ) -> Result<Vec<&'a ValidatedLibrary>> {
        let mut wanted = Vec::new();
        let mut errors = ValidationErrors::new();
        for library in &package.libraries {
            let name = library.metadata.name();
            match self.libraries.get(&name).await {
                Ok(installed) if library.metadata.is_patch_of(&installed.metadata) => {
                    if installed.restricted && !user.can_create_restricted {
                        errors.push(Problem::Restricted { library: name.ubername() });
                    }
                    wanted.push(library);
                },
                Ok(_) => {},
                Err(err) if matches!(&*err, LibraryErrorKind::NotInstalled(_)) => wanted.push(library),
                Err(err) => return Err(err).or_raise(|| ErrorKind::Storage),
            }
        }
        if !user.can_update_and_install_libraries {
            for library in &wanted {
                errors.push(Problem::InstallNotPermitted { library: library.metadata.name().ubername() });
            }
        }
        if errors.has_errors() {
            exn::bail!(ErrorKind::Invalid(errors));
        }
        Ok(wanted)
    }

    async fn create_content(
        &self,
        root: &Path,
        manifest: &ContentManifest,
        user: &User,
        id: Option<ContentId>,
    ) -> Result<ContentId> {
        let directory = root.join(CONTENT_DIRECTORY);
        let data = tokio::fs::read(directory.join(PARAMETERS_FILE)).await.or_raise(|| ErrorKind::Io)?;
        let parameters = parcel_model::schema::parse_value(&data).or_raise(|| ErrorKind::Io)?;
        let existing = match &id {
            Some(id) => self.content.content_exists(id).await.or_raise(|| ErrorKind::Storage)?,
            None => false,
        };
        let id = self.content.create_content(manifest, &parameters, user, id).await.or_raise(|| ErrorKind::Storage)?;
        let copied = async {
            if existing {
                self.clear_content_files(&id).await?;
            }
            self.copy_content_files(&directory, &id).await
        };
        if let Err(err) = copied.await {
            match existing {
                true => tracing::error!(content = %id, error = ?err, "content copy failed, files are incomplete"),
                false => {
                    tracing::warn!(content = %id, error = ?err, "content copy failed, removing partial content");
                    if let Err(cleanup) = self.content.delete_content(&id).await {
                        tracing::error!(content = %id, error = ?cleanup, "unable to remove partial content");
                    }
                },
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Drop the files of content being re-imported.
    async fn clear_content_files(&self, id: &ContentId) -> Result<()> {
        for file in self.content.list_files(id).await.or_raise(|| ErrorKind::Storage)? {
            self.content.delete_file(id, &file).await.or_raise(|| ErrorKind::Storage)?;
        }
        Ok(())
    }

    async fn copy_content_files(&self, directory: &Path, id: &ContentId) -> Result<usize> {
        let source = LocalBackend::new("import", directory).or_raise(|| ErrorKind::Io)?;
        let mut copied = 0;
        for file in source.list(None).await.or_raise(|| ErrorKind::Io)? {
            let relative: Vec<_> = file.path.components().map(|c| c.as_os_str().to_string_lossy()).collect();
            let relative = relative.join("/");
            if relative == PARAMETERS_FILE {
                continue;
            }
            let data = source.read(&file.path).await.or_raise(|| ErrorKind::Io)?;
            self.content.add_file(id, &relative, &data).await.or_raise(|| ErrorKind::Storage)?;
            copied += 1;
        }
        tracing::debug!(content = %id, copied, "content files stored");
        Ok(copied)
    }
}

/// Extract the content section (when wanted) and the given library
/// directories of the package at `path` below `destination`.
async fn extract(path: &Path, destination: &Path, libraries: HashSet<String>, content: bool) -> Result<Vec<PathBuf>> {
    let (path, destination) = (path.to_path_buf(), destination.to_path_buf());
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            let mut archive = Archive::open(&path)?;
            archive.extract_to(&destination, |entry| {
                !entry.is_hidden()
                    && match entry.section() {
                        Section::Content(_) => content,
                        Section::Library { directory, .. } => libraries.contains(directory),
                        Section::Manifest | Section::Root(_) => false,
                    }
            })
        })
    })
    .await
    .or_raise(|| ErrorKind::Task)?
    .or_raise(|| ErrorKind::Archive)
}

//! Content storage.
//!
//! A content item lives below `content/{id}/`: the manifest (`h5p.json`),
//! the parameters (`content.json`), and its files under `files/`.

use crate::backend::BoxSyncRead;
use crate::error::{Error, ErrorKind, Result};
use crate::path::{relative_to, validate as validate_path};
use crate::BackendHandle;
use async_trait::async_trait;
use exn::ResultExt;
use parcel_model::manifest::{MANIFEST_FILE, PARAMETERS_FILE};
use parcel_model::{ContentManifest, LibraryName, User};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::instrument;

const CONTENT: &str = "content";
const FILES: &str = "files";
const OWNER: &str = ".parcel.json";

static CONTENT_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Identifier of a stored content item; safe to use as a path component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);
impl ContentId {
    /// A fresh, random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl FromStr for ContentId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if !CONTENT_ID_REGEX.is_match(s) {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(s)));
        }
        Ok(Self(s.to_string()))
    }
}
impl TryFrom<String> for ContentId {
    type Error = String;
    fn try_from(value: String) -> std::result::Result<Self, String> {
        match CONTENT_ID_REGEX.is_match(&value) {
            true => Ok(Self(value)),
            false => Err(format!("`{value}` is not a valid content id")),
        }
    }
}
impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

/// How content refers to a library.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Content items rendered by the library.
    pub as_main_library: usize,
    /// Content items that need the library, but aren't rendered by it.
    pub as_dependency: usize,
}
impl Usage {
    pub fn is_unused(&self) -> bool {
        self.as_main_library == 0 && self.as_dependency == 0
    }
}

#[derive(Serialize, Deserialize)]
struct Owner {
    owner: String,
}

#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Store a content item and return its id.
    ///
    /// The manifest's main library must be one of its preloaded dependencies.
    /// When `id` names existing content, its manifest and parameters are
    /// replaced and its owner and files are kept.
    async fn create_content(
        &self,
        manifest: &ContentManifest,
        parameters: &Value,
        user: &User,
        id: Option<ContentId>,
    ) -> Result<ContentId>;

    async fn content_exists(&self, id: &ContentId) -> Result<bool>;

    async fn get_metadata(&self, id: &ContentId) -> Result<ContentManifest>;

    async fn get_parameters(&self, id: &ContentId) -> Result<Value>;

    /// Stored parameters exactly as saved.
    async fn get_parameters_raw(&self, id: &ContentId) -> Result<Vec<u8>>;

    async fn add_file(&self, id: &ContentId, file: &str, data: &[u8]) -> Result<()>;

    async fn file_reader(&self, id: &ContentId, file: &str) -> Result<BoxSyncRead>;

    async fn delete_file(&self, id: &ContentId, file: &str) -> Result<()>;

    /// Files of a content item relative to its `files/` directory, sorted.
    async fn list_files(&self, id: &ContentId) -> Result<Vec<String>>;

    async fn delete_content(&self, id: &ContentId) -> Result<()>;

    async fn list_content(&self) -> Result<Vec<ContentId>>;

    /// How many content items use `library`, split by how they use it.
    async fn usage(&self, library: &LibraryName) -> Result<Usage>;
}

/// [`ContentStorage`] on top of any [`StorageBackend`](crate::StorageBackend).
#[derive(Clone)]
pub struct BackendContentStorage {
    backend: BackendHandle,
}
impl BackendContentStorage {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    fn directory(id: &ContentId) -> PathBuf {
        Path::new(CONTENT).join(id.as_str())
    }

    fn file_path(id: &ContentId, file: &str) -> Result<PathBuf> {
        let directory = Self::directory(id).join(FILES);
        let path = validate_path(directory.join(file))?;
        if !path.starts_with(&directory) || path == directory {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(file)));
        }
        Ok(path)
    }

    async fn read_record(&self, id: &ContentId, file: &str) -> Result<Vec<u8>> {
        match self.backend.read(&Self::directory(id).join(file)).await {
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => exn::bail!(ErrorKind::ContentNotFound(id.to_string())),
            result => result,
        }
    }

    async fn ensure_exists(&self, id: &ContentId) -> Result<()> {
        if !self.content_exists(id).await? {
            exn::bail!(ErrorKind::ContentNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStorage for BackendContentStorage {
    #[instrument(skip(self, manifest, parameters, user), fields(main_library = %manifest.main_library, user = %user.id))]
    async fn create_content(
        &self,
        manifest: &ContentManifest,
        parameters: &Value,
        user: &User,
        id: Option<ContentId>,
    ) -> Result<ContentId> {
        manifest.main_dependency().or_raise(|| ErrorKind::InvalidRecord("main library is not a dependency".into()))?;
        let id = id.unwrap_or_else(ContentId::generate);
        let existing = self.content_exists(&id).await?;
        let serialize = || ErrorKind::BackendError("unable to serialize content record".to_string());
        let directory = Self::directory(&id);
        let parameters = serde_json::to_vec(parameters).or_raise(serialize)?;
        let manifest = serde_json::to_vec_pretty(manifest).or_raise(serialize)?;
        if !existing {
            let owner = serde_json::to_vec(&Owner { owner: user.id.clone() }).or_raise(serialize)?;
            self.backend.write(&directory.join(OWNER), &owner).await?;
        }
        self.backend.write(&directory.join(PARAMETERS_FILE), &parameters).await?;
        // The manifest marks the record as existing, so it goes last.
        self.backend.write(&directory.join(MANIFEST_FILE), &manifest).await?;
        match existing {
            true => tracing::info!(content = %id, "content updated"),
            false => tracing::info!(content = %id, "content created"),
        }
        Ok(id)
    }

    async fn content_exists(&self, id: &ContentId) -> Result<bool> {
        self.backend.exists(&Self::directory(id).join(MANIFEST_FILE)).await
    }

    async fn get_metadata(&self, id: &ContentId) -> Result<ContentManifest> {
        let data = self.read_record(id, MANIFEST_FILE).await?;
        ContentManifest::from_json(&data).or_raise(|| ErrorKind::Corrupt(Self::directory(id).join(MANIFEST_FILE)))
    }

    async fn get_parameters(&self, id: &ContentId) -> Result<Value> {
        let data = self.get_parameters_raw(id).await?;
        parcel_model::schema::parse_value(&data)
            .or_raise(|| ErrorKind::Corrupt(Self::directory(id).join(PARAMETERS_FILE)))
    }

    async fn get_parameters_raw(&self, id: &ContentId) -> Result<Vec<u8>> {
        self.read_record(id, PARAMETERS_FILE).await
    }

    async fn add_file(&self, id: &ContentId, file: &str, data: &[u8]) -> Result<()> {
        let path = Self::file_path(id, file)?;
        self.ensure_exists(id).await?;
        self.backend.write(&path, data).await
    }

    async fn file_reader(&self, id: &ContentId, file: &str) -> Result<BoxSyncRead> {
        self.backend.reader(&Self::file_path(id, file)?).await
    }

    async fn delete_file(&self, id: &ContentId, file: &str) -> Result<()> {
        self.backend.delete(&Self::file_path(id, file)?).await
    }

    async fn list_files(&self, id: &ContentId) -> Result<Vec<String>> {
        let directory = Self::directory(id).join(FILES);
        let mut files: Vec<_> = self
            .backend
            .list(Some(&directory))
            .await?
            .into_iter()
            .filter_map(|file| relative_to(&file.path, &directory))
            .collect();
        files.sort();
        Ok(files)
    }

    #[instrument(skip(self), fields(content = %id))]
    async fn delete_content(&self, id: &ContentId) -> Result<()> {
        let removed = self.backend.delete_prefix(&Self::directory(id)).await?;
        if removed == 0 {
            exn::bail!(ErrorKind::ContentNotFound(id.to_string()));
        }
        tracing::debug!(removed, "content deleted");
        Ok(())
    }

    async fn list_content(&self) -> Result<Vec<ContentId>> {
        let root = Path::new(CONTENT);
        let mut ids: Vec<_> = self
            .backend
            .list(Some(root))
            .await?
            .into_iter()
            .filter_map(|file| {
                let relative = relative_to(&file.path, root)?;
                let (id, rest) = relative.split_once('/')?;
                (rest == MANIFEST_FILE).then(|| id.parse::<ContentId>().ok()).flatten()
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn usage(&self, library: &LibraryName) -> Result<Usage> {
        let mut usage = Usage::default();
        for id in self.list_content().await? {
            let manifest = self.get_metadata(&id).await?;
            match manifest.main_dependency() {
                Ok(main) if main == library => usage.as_main_library += 1,
                _ if manifest.depends_on(library) => usage.as_dependency += 1,
                _ => {},
            }
        }
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::io::Read;
    use std::sync::Arc;

    pub(crate) fn manifest(main: &LibraryName, others: &[&LibraryName]) -> ContentManifest {
        let mut dependencies = vec![main];
        dependencies.extend_from_slice(others);
        let json = serde_json::json!({
            "title": "Example",
            "mainLibrary": main.machine_name,
            "preloadedDependencies": dependencies,
        });
        ContentManifest::from_json(json.to_string().as_bytes()).unwrap()
    }

    fn storage() -> BackendContentStorage {
        BackendContentStorage::new(Arc::new(MockBackend::default()))
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let storage = storage();
        let main = LibraryName::new("H5P.Quiz", 1, 0);
        let parameters = serde_json::json!({ "question": "Why?" });
        let id = storage.create_content(&manifest(&main, &[]), &parameters, &User::default(), None).await.unwrap();
        assert!(storage.content_exists(&id).await.unwrap());
        assert_eq!(storage.get_parameters(&id).await.unwrap(), parameters);
        assert_eq!(storage.get_metadata(&id).await.unwrap().main_library, "H5P.Quiz");
        assert_eq!(storage.list_content().await.unwrap(), [id]);
    }

    #[tokio::test]
    async fn test_create_requires_main_dependency() {
        let storage = storage();
        let mut manifest = manifest(&LibraryName::new("H5P.Quiz", 1, 0), &[]);
        manifest.main_library = "H5P.Other".to_string();
        let err = storage.create_content(&manifest, &Value::Null, &User::default(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRecord(_)));
        assert!(storage.list_content().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_caller_supplied_id() {
        let storage = storage();
        let manifest = manifest(&LibraryName::new("H5P.Quiz", 1, 0), &[]);
        let id: ContentId = "lesson-1".parse().unwrap();
        let created = storage.create_content(&manifest, &Value::Null, &User::default(), Some(id.clone())).await.unwrap();
        assert_eq!(created, id);
        storage.add_file(&id, "cat.png", b"meow").await.unwrap();

        let parameters = serde_json::json!({ "revision": 2 });
        let updated = storage.create_content(&manifest, &parameters, &User::default(), Some(id.clone())).await.unwrap();
        assert_eq!(updated, id);
        assert_eq!(storage.get_parameters(&id).await.unwrap(), parameters);
        assert_eq!(storage.list_files(&id).await.unwrap(), ["cat.png"]);
        assert_eq!(storage.list_content().await.unwrap(), [id]);
        assert!("../escape".parse::<ContentId>().is_err());
    }

    #[tokio::test]
    async fn test_files_and_delete() {
        let storage = storage();
        let manifest = manifest(&LibraryName::new("H5P.Quiz", 1, 0), &[]);
        let id = storage.create_content(&manifest, &Value::Null, &User::default(), None).await.unwrap();
        storage.add_file(&id, "images/cat.png", b"meow").await.unwrap();
        assert_eq!(storage.list_files(&id).await.unwrap(), ["images/cat.png"]);
        let mut data = Vec::new();
        storage.file_reader(&id, "images/cat.png").await.unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"meow");
        assert!(storage.add_file(&id, "../h5p.json", b"{}").await.is_err());
        storage.delete_content(&id).await.unwrap();
        assert!(!storage.content_exists(&id).await.unwrap());
        let err = storage.get_parameters(&id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn test_usage() {
        let storage = storage();
        let quiz = LibraryName::new("H5P.Quiz", 1, 0);
        let question = LibraryName::new("H5P.Question", 1, 4);
        storage.create_content(&manifest(&quiz, &[&question]), &Value::Null, &User::default(), None).await.unwrap();
        storage.create_content(&manifest(&question, &[]), &Value::Null, &User::default(), None).await.unwrap();
        assert_eq!(storage.usage(&quiz).await.unwrap(), Usage { as_main_library: 1, as_dependency: 0 });
        assert_eq!(storage.usage(&question).await.unwrap(), Usage { as_main_library: 1, as_dependency: 1 });
        assert!(storage.usage(&LibraryName::new("H5P.Unused", 1, 0)).await.unwrap().is_unused());
    }
}

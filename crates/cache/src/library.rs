//! Read-through caching in front of a [`LibraryStorage`].
//!
//! Cache keys follow two shapes: `{ubername}-{purpose}` for per-library
//! records and `{ubername}/{file}-{purpose}` for per-file results, plus a
//! couple of aggregate keys for listings. Only descriptors, semantics and
//! language files are cached; scripts, styles and other assets always come
//! from the inner storage.
//!
//! Readers that populate the cache hold a shared lock across the inner read
//! and the cache write. Mutations take the lock exclusively across the inner
//! mutation and the invalidation, so a read that started before a mutation
//! can never write its stale result back after the invalidation.

use crate::store::CacheStore;
use async_trait::async_trait;
use exn::ResultExt;
use parcel_model::lang::is_language_file;
use parcel_model::library::{LANGUAGE_DIRECTORY, LIBRARY_DESCRIPTOR, SEMANTICS_FILE};
use parcel_model::{AdditionalMetadata, InstalledLibrary, LibraryMetadata, LibraryName};
use parcel_storage::error::{ErrorKind, Result};
use parcel_storage::{BoxSyncRead, LibraryStorage, LibraryStorageHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

const INSTALLED_NAMES_KEY: &str = "installed-library-names";
const ADDONS_KEY: &str = "addons";

fn metadata_key(name: &LibraryName) -> String {
    format!("{}-metadata", name.ubername())
}

fn file_key(name: &LibraryName, file: &str, purpose: &str) -> String {
    format!("{}/{file}-{purpose}", name.ubername())
}

/// Small JSON documents worth caching; everything else passes through.
fn is_cacheable(file: &str) -> bool {
    if file == LIBRARY_DESCRIPTOR || file == SEMANTICS_FILE {
        return true;
    }
    file.strip_prefix(LANGUAGE_DIRECTORY)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(is_language_file)
}

/// A [`LibraryStorage`] that serves repeated reads from a [`CacheStore`].
pub struct CachedLibraryStorage {
    inner: LibraryStorageHandle,
    cache: Arc<dyn CacheStore>,
    lock: RwLock<()>,
}
impl CachedLibraryStorage {
    pub fn new(inner: LibraryStorageHandle, cache: Arc<dyn CacheStore>) -> Self {
        Self { inner, cache, lock: RwLock::new(()) }
    }

    async fn read_through<T, F, Fut>(&self, key: String, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let _guard = self.lock.read().await;
        match self.cache.get(&key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(cached) => return Ok(cached),
                Err(err) => tracing::warn!(key, error = %err, "discarding undecodable cache entry"),
            },
            Ok(None) => {},
            Err(err) => tracing::warn!(key, error = ?err, "cache unavailable; reading from storage"),
        }
        let value = load().await?;
        match serde_json::to_value(&value) {
            Ok(json) => {
                if let Err(err) = self.cache.set(&key, &json).await {
                    tracing::warn!(key, error = ?err, "unable to populate cache");
                }
            },
            Err(err) => tracing::warn!(key, error = %err, "unable to encode cache entry"),
        }
        Ok(value)
    }

    /// Run `mutation` exclusively, then drop every entry that could describe
    /// `name`, whether or not the mutation succeeded.
    async fn mutate<T, Fut>(&self, name: &LibraryName, mutation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>> + Send,
    {
        let _guard = self.lock.write().await;
        let result = mutation.await;
        let invalidated = self.invalidate(name).await;
        let value = result?;
        invalidated?;
        Ok(value)
    }

    async fn invalidate(&self, name: &LibraryName) -> Result<()> {
        let prefix = format!("{}/", name.ubername());
        tracing::trace!(library = %name, "invalidating cache entries");
        self.cache
            .delete(&metadata_key(name))
            .await
            .or_raise(|| ErrorKind::BackendError("unable to invalidate cached metadata".to_string()))?;
        self.cache
            .delete_prefix(&prefix)
            .await
            .or_raise(|| ErrorKind::BackendError("unable to invalidate cached files".to_string()))?;
        for key in [INSTALLED_NAMES_KEY, ADDONS_KEY] {
            self.cache
                .delete(key)
                .await
                .or_raise(|| ErrorKind::BackendError(format!("unable to invalidate {key}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryStorage for CachedLibraryStorage {
    async fn installed_library_names(&self, machine_names: Option<&[String]>) -> Result<Vec<LibraryName>> {
        let inner = &self.inner;
        let names: Vec<LibraryName> = self
            .read_through(INSTALLED_NAMES_KEY.to_string(), || inner.installed_library_names(None))
            .await?;
        Ok(names
            .into_iter()
            .filter(|name| machine_names.is_none_or(|wanted| wanted.contains(&name.machine_name)))
            .collect())
    }

    async fn get_library(&self, name: &LibraryName) -> Result<InstalledLibrary> {
        self.read_through(metadata_key(name), || self.inner.get_library(name)).await
    }

    async fn is_installed(&self, name: &LibraryName) -> Result<bool> {
        self.inner.is_installed(name).await
    }

    #[instrument(skip(self, metadata), fields(library = %metadata.name()))]
    async fn add_library(&self, metadata: &LibraryMetadata, restricted: bool) -> Result<InstalledLibrary> {
        self.mutate(&metadata.name(), self.inner.add_library(metadata, restricted)).await
    }

    #[instrument(skip(self, metadata), fields(library = %metadata.name()))]
    async fn update_library(&self, metadata: &LibraryMetadata) -> Result<InstalledLibrary> {
        self.mutate(&metadata.name(), self.inner.update_library(metadata)).await
    }

    #[instrument(skip(self), fields(library = %name))]
    async fn delete_library(&self, name: &LibraryName) -> Result<()> {
        self.mutate(name, self.inner.delete_library(name)).await
    }

    async fn add_file(&self, name: &LibraryName, file: &str, data: &[u8]) -> Result<()> {
        self.mutate(name, self.inner.add_file(name, file, data)).await
    }

    async fn clear_files(&self, name: &LibraryName) -> Result<()> {
        self.mutate(name, self.inner.clear_files(name)).await
    }

    async fn list_files(&self, name: &LibraryName) -> Result<Vec<String>> {
        self.inner.list_files(name).await
    }

    async fn file_exists(&self, name: &LibraryName, file: &str) -> Result<bool> {
        if !is_cacheable(file) {
            return self.inner.file_exists(name, file).await;
        }
        self.read_through(file_key(name, file, "exists"), || self.inner.file_exists(name, file)).await
    }

    async fn file_reader(&self, name: &LibraryName, file: &str) -> Result<BoxSyncRead> {
        self.inner.file_reader(name, file).await
    }

    async fn file_as_json(&self, name: &LibraryName, file: &str) -> Result<Value> {
        if !is_cacheable(file) {
            return self.inner.file_as_json(name, file).await;
        }
        self.read_through(file_key(name, file, "json"), || self.inner.file_as_json(name, file)).await
    }

    async fn file_as_string(&self, name: &LibraryName, file: &str) -> Result<String> {
        if !is_cacheable(file) {
            return self.inner.file_as_string(name, file).await;
        }
        self.read_through(file_key(name, file, "string"), || self.inner.file_as_string(name, file)).await
    }

    async fn dependents_count(&self, name: &LibraryName) -> Result<usize> {
        self.inner.dependents_count(name).await
    }

    async fn update_additional_metadata(&self, name: &LibraryName, additional: &AdditionalMetadata) -> Result<bool> {
        self.mutate(name, self.inner.update_additional_metadata(name, additional)).await
    }

    async fn list_addons(&self) -> Result<Vec<InstalledLibrary>> {
        self.read_through(ADDONS_KEY.to_string(), || self.inner.list_addons()).await
    }
}

//! Storage wiring for the command line.

use parcel_cache::{CacheStore, CachedLibraryStorage, Database, MemoryCache, SqliteCache, SqliteKeyValueStorage};
use parcel_config::Config;
use parcel_library::LibraryManager;
use parcel_storage::backend::LocalBackend;
use parcel_storage::{
    BackendContentStorage, BackendHandle, BackendKeyValueStorage, BackendLibraryStorage, ContentStorageHandle,
    KeyValueStorageHandle, LibraryStorageHandle,
};
use std::sync::Arc;

pub struct Platform {
    pub libraries: Arc<LibraryManager>,
    pub content: ContentStorageHandle,
    pub settings: KeyValueStorageHandle,
    database: Option<Database>,
}
impl Platform {
    /// Local storage under the configured root, with library reads going
    /// through the cache when it is enabled.
    pub async fn open(config: &Config) -> miette::Result<Self> {
        let backend: BackendHandle =
            Arc::new(LocalBackend::new("storage", &config.storage.root).map_err(crate::report)?);
        let content: ContentStorageHandle = Arc::new(BackendContentStorage::new(backend.clone()));
        let mut libraries: LibraryStorageHandle = Arc::new(BackendLibraryStorage::new(backend.clone()));
        let mut settings: KeyValueStorageHandle = Arc::new(BackendKeyValueStorage::new(backend));
        let mut database = None;
        if config.cache.enabled {
            let store: Arc<dyn CacheStore> = match &config.cache.database {
                Some(path) => {
                    let db = Database::connect(path).await.map_err(crate::report)?;
                    settings = Arc::new(SqliteKeyValueStorage::from(&db));
                    let store = Arc::new(SqliteCache::from(&db));
                    database = Some(db);
                    store
                },
                None => Arc::new(MemoryCache::new()),
            };
            libraries = Arc::new(CachedLibraryStorage::new(libraries, store));
        }
        tracing::debug!(root = %config.storage.root.display(), cached = config.cache.enabled, "storage opened");
        let libraries = Arc::new(LibraryManager::new(libraries, content.clone()));
        Ok(Self { libraries, content, settings, database })
    }

    pub async fn close(self) {
        if let Some(database) = self.database {
            database.close().await;
        }
    }
}

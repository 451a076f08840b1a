//! Locally cached copy of the hub's content-type catalog.
//!
//! The catalog, the time it was fetched and the uuid the hub assigned to this
//! installation all live in key-value storage. A refresh only touches storage
//! once the hub has answered successfully, so a failed refresh keeps serving
//! whatever was cached before.

use crate::client::{HubClient, Registration, UsageStatistics};
use crate::config::Config;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use parcel_model::HubContentType;
use parcel_storage::KeyValueStorageHandle;
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

const CATALOG_KEY: &str = "content-type-cache";
const UPDATED_KEY: &str = "content-type-cache-updated";
const UUID_KEY: &str = "hub-uuid";

pub struct ContentTypeCache {
    config: Config,
    client: Arc<dyn HubClient>,
    storage: KeyValueStorageHandle,
    usage: Option<UsageStatistics>,
}
impl ContentTypeCache {
    pub fn new(config: Config, client: Arc<dyn HubClient>, storage: KeyValueStorageHandle) -> Self {
        Self { config, client, storage, usage: None }
    }

    /// Statistics sent with catalog requests when the config allows it.
    pub fn with_usage_statistics(mut self, usage: UsageStatistics) -> Self {
        self.usage = Some(usage);
        self
    }

    /// `true` when the catalog was never fetched or is older than the
    /// refresh interval.
    pub async fn is_outdated(&self) -> Result<bool> {
        let Some(updated) = self.load(UPDATED_KEY).await?.and_then(|v| v.as_i64()) else {
            return Ok(true);
        };
        let age = OffsetDateTime::now_utc().unix_timestamp().saturating_sub(updated);
        Ok(age < 0 || age as u64 >= self.config.refresh_interval)
    }

    /// Refresh the catalog if it is outdated; returns `true` if a refresh happened.
    pub async fn update_if_necessary(&self) -> Result<bool> {
        if !self.is_outdated().await? {
            return Ok(false);
        }
        self.force_update().await?;
        Ok(true)
    }

    /// Fetch the catalog regardless of its age, registering first if the hub
    /// never assigned this installation a uuid.
    #[instrument(skip(self))]
    pub async fn force_update(&self) -> Result<usize> {
        let uuid = match self.load(UUID_KEY).await?.and_then(|v| v.as_str().map(str::to_string)) {
            Some(uuid) => uuid,
            None => {
                let uuid = self.client.register(&Registration::new(&self.config, None)).await?;
                self.save(UUID_KEY, &Value::from(uuid.as_str())).await?;
                uuid
            },
        };
        let registration = Registration::new(&self.config, Some(uuid));
        let usage = self.usage.as_ref().filter(|_| self.config.send_usage_statistics);
        let catalog = match self.client.content_types(&registration, usage).await {
            Ok(catalog) => catalog,
            Err(err) => {
                tracing::warn!(error = ?err, "hub catalog refresh failed, keeping cached catalog");
                return Err(err);
            },
        };
        let count = catalog.content_types.len();
        let value = serde_json::to_value(&catalog.content_types).or_raise(|| ErrorKind::Storage)?;
        self.save(CATALOG_KEY, &value).await?;
        self.save(UPDATED_KEY, &Value::from(OffsetDateTime::now_utc().unix_timestamp())).await?;
        tracing::info!(count, "hub catalog updated");
        Ok(count)
    }

    /// Cached content types, optionally restricted to the given machine names.
    ///
    /// `None` when the catalog was never fetched.
    pub async fn get(&self, machine_names: Option<&[String]>) -> Result<Option<Vec<HubContentType>>> {
        let Some(value) = self.load(CATALOG_KEY).await? else {
            return Ok(None);
        };
        let mut content_types: Vec<HubContentType> =
            serde_json::from_value(value).or_raise(|| ErrorKind::Storage)?;
        if let Some(names) = machine_names {
            content_types.retain(|content_type| names.contains(&content_type.id));
        }
        Ok(Some(content_types))
    }

    /// The uuid the hub assigned, if registration ever happened.
    pub async fn uuid(&self) -> Result<Option<String>> {
        Ok(self.load(UUID_KEY).await?.and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.storage.load(key).await.or_raise(|| ErrorKind::Storage)
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.storage.save(key, value).await.or_raise(|| ErrorKind::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parcel_model::HubCatalog;
    use parcel_storage::BackendKeyValueStorage;
    use parcel_storage::backend::MockBackend;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockHubClient {
        registrations: AtomicUsize,
        requests: Mutex<Vec<Registration>>,
        usage_sent: AtomicBool,
        fail: AtomicBool,
        catalog: Mutex<Vec<&'static str>>,
    }
    impl MockHubClient {
        fn serving(ids: &[&'static str]) -> Arc<Self> {
            let client = Self::default();
            *client.catalog.lock().unwrap() = ids.to_vec();
            Arc::new(client)
        }
    }

    fn content_type(id: &str) -> HubContentType {
        serde_json::from_value(json!({
            "id": id,
            "version": { "major": 1, "minor": 0, "patch": 0 },
            "coreApiVersionNeeded": { "major": 1, "minor": 24 },
            "title": id,
        }))
        .unwrap()
    }

    #[async_trait]
    impl HubClient for MockHubClient {
        async fn register(&self, _registration: &Registration) -> Result<String> {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            Ok("site-uuid".to_string())
        }

        async fn content_types(
            &self,
            registration: &Registration,
            usage: Option<&UsageStatistics>,
        ) -> Result<HubCatalog> {
            self.requests.lock().unwrap().push(registration.clone());
            self.usage_sent.store(usage.is_some(), Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                exn::bail!(ErrorKind::Timeout);
            }
            let ids = self.catalog.lock().unwrap().clone();
            Ok(HubCatalog { content_types: ids.into_iter().map(content_type).collect() })
        }
    }

    fn cache(client: Arc<MockHubClient>, config: Config) -> ContentTypeCache {
        let storage = Arc::new(BackendKeyValueStorage::new(Arc::new(MockBackend::default())));
        ContentTypeCache::new(config, client, storage)
    }

    #[tokio::test]
    async fn test_never_fetched() {
        let cache = cache(MockHubClient::serving(&[]), Config::default());
        assert!(cache.is_outdated().await.unwrap());
        assert_eq!(cache.get(None).await.unwrap(), None);
        assert_eq!(cache.uuid().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_registers_once() {
        let client = MockHubClient::serving(&["H5P.Accordion", "H5P.Blanks"]);
        let cache = cache(client.clone(), Config::default());

        assert!(cache.update_if_necessary().await.unwrap());
        assert!(!cache.is_outdated().await.unwrap());
        assert!(!cache.update_if_necessary().await.unwrap());
        assert_eq!(cache.force_update().await.unwrap(), 2);

        assert_eq!(client.registrations.load(Ordering::SeqCst), 1);
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.uuid.as_deref() == Some("site-uuid")));
        assert_eq!(cache.uuid().await.unwrap().as_deref(), Some("site-uuid"));
    }

    #[tokio::test]
    async fn test_zero_interval_is_always_outdated() {
        let config = Config { refresh_interval: 0, ..Config::default() };
        let cache = cache(MockHubClient::serving(&["H5P.Accordion"]), config);
        cache.force_update().await.unwrap();
        assert!(cache.is_outdated().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_filters_by_machine_name() {
        let cache = cache(MockHubClient::serving(&["H5P.Accordion", "H5P.Blanks"]), Config::default());
        cache.force_update().await.unwrap();
        let all = cache.get(None).await.unwrap().unwrap();
        assert_eq!(all.len(), 2);
        let some = cache.get(Some(&["H5P.Blanks".to_string()])).await.unwrap().unwrap();
        assert_eq!(some.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), ["H5P.Blanks"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_catalog() {
        let client = MockHubClient::serving(&["H5P.Accordion"]);
        let cache = cache(client.clone(), Config::default());
        cache.force_update().await.unwrap();
        let before = cache.get(None).await.unwrap();

        client.fail.store(true, Ordering::SeqCst);
        *client.catalog.lock().unwrap() = vec!["H5P.Other"];
        let err = cache.force_update().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Timeout);
        assert_eq!(cache.get(None).await.unwrap(), before);
        assert!(!cache.is_outdated().await.unwrap());
    }

    #[tokio::test]
    async fn test_usage_statistics_follow_config() {
        let usage = UsageStatistics { num_authors: 3, libraries: json!({}) };
        let client = MockHubClient::serving(&[]);
        let quiet = cache(client.clone(), Config::default()).with_usage_statistics(usage.clone());
        quiet.force_update().await.unwrap();
        assert!(!client.usage_sent.load(Ordering::SeqCst));

        let config = Config { send_usage_statistics: true, ..Config::default() };
        let chatty = cache(client.clone(), config).with_usage_statistics(usage);
        chatty.force_update().await.unwrap();
        assert!(client.usage_sent.load(Ordering::SeqCst));
    }
}

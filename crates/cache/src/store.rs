//! Cache stores: where cached JSON values physically live.

use crate::Database;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// A flat map from string keys to JSON values.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Process-local cache; gone when the process exits.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Value>>,
}
impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.entries.write().await.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Cache entries kept in the `cache_entries` table, surviving restarts.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
}
impl From<&Database> for SqliteCache {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as(include_str!("../queries/cache_get.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(|(value,)| serde_json::from_str(&value).or_raise(|| ErrorKind::InvalidData("cache entry")))
            .transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let value = serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("cache entry"))?;
        sqlx::query(include_str!("../queries/cache_set.sql"))
            .bind(key)
            .bind(value)
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/cache_delete.sql"))
            .bind(key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        sqlx::query(include_str!("../queries/cache_delete_prefix.sql"))
            .bind(prefix)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query(include_str!("../queries/cache_clear.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

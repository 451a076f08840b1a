//! Key-value settings stored in SQLite.

use crate::Database;
use async_trait::async_trait;
use exn::ResultExt;
use parcel_storage::KeyValueStorage;
use parcel_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
use serde_json::Value;
use sqlx::SqlitePool;
use time::OffsetDateTime;

/// [`KeyValueStorage`] backed by the `settings` table.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStorage {
    pool: SqlitePool,
}
impl From<&Database> for SqliteKeyValueStorage {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

#[async_trait]
impl KeyValueStorage for SqliteKeyValueStorage {
    async fn load(&self, key: &str) -> StorageResult<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as(include_str!("../queries/settings_load.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| StorageErrorKind::BackendError(format!("unable to load setting {key}")))?;
        row.map(|(value,)| {
            serde_json::from_str(&value).or_raise(|| StorageErrorKind::Corrupt(format!("settings/{key}").into()))
        })
        .transpose()
    }

    async fn save(&self, key: &str, value: &Value) -> StorageResult<()> {
        let value = serde_json::to_string(value)
            .or_raise(|| StorageErrorKind::BackendError(format!("unable to serialize setting {key}")))?;
        sqlx::query(include_str!("../queries/settings_save.sql"))
            .bind(key)
            .bind(value)
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| StorageErrorKind::BackendError(format!("unable to save setting {key}")))?;
        Ok(())
    }
}

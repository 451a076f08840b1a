//! The SQLite file behind [`SqliteCache`](crate::SqliteCache) and
//! [`SqliteKeyValueStorage`](crate::SqliteKeyValueStorage).
//!
//! Everything in the `cache_entries` table can be rebuilt from library
//! storage, so the connection favours throughput over durability. The
//! `settings` table only holds values that are refetched from the hub.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

static MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Readers of cached descriptors vastly outnumber writers.
const POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);
/// Pages in the WAL before it is folded back into the main file.
const CHECKPOINT_PAGES: &str = "1000";

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the cache database at `path` and bring its tables up
    /// to date.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, POOL_SIZE).await
    }

    /// A private database living as long as the pool. A second connection
    /// would see a different, empty database, so the pool holds just one.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::open(options().filename(":memory:"), 1).await
    }

    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATIONS.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!(connections, "cache database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Hand back pages freed by invalidations, then close every connection.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await {
            tracing::debug!(error = %err, "incremental vacuum skipped");
        }
        self.pool.close().await;
    }
}

fn options() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .auto_vacuum(SqliteAutoVacuum::Incremental)
        .pragma("wal_autocheckpoint", CHECKPOINT_PAGES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
        assert!(db.pool().is_closed());
    }

    #[tokio::test]
    async fn test_tables_exist_after_connect() {
        let db = Database::connect_in_memory().await.unwrap();
        MIGRATIONS.run(db.pool()).await.unwrap();
        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('cache_entries', 'settings') ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert_eq!(tables, [("cache_entries".to_string(),), ("settings".to_string(),)]);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connection_settings() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("cache.sqlite")).await.unwrap();
        let (checkpoint,): (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(checkpoint, 1000);
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode, "wal");
        assert!(dir.path().join("cache.sqlite").exists());
        db.close().await;
    }
}

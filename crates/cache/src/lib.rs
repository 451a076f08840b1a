//! Caching for parcel.
//!
//! This crate owns the SQLite database used for two things: read-through
//! cache entries for library metadata, and key-value settings such as the
//! hub content-type cache. Nothing in the cache is a source of truth; if the
//! database is deleted, every entry is repopulated from library storage on
//! the next read.
//!
//! # Architecture
//! - [`CacheStore`]: a flat JSON key-value map, either in memory
//!   ([`MemoryCache`]) or in the `cache_entries` table ([`SqliteCache`]).
//! - [`CachedLibraryStorage`]: wraps any `LibraryStorage` and a cache store,
//!   populating entries on read and invalidating them on every mutation.
//! - [`SqliteKeyValueStorage`]: `KeyValueStorage` over the `settings` table.

mod db;
pub mod error;
mod kv;
mod library;
mod store;

pub use crate::db::Database;
pub use crate::kv::SqliteKeyValueStorage;
pub use crate::library::CachedLibraryStorage;
pub use crate::store::{CacheStore, MemoryCache, SqliteCache};

//! Storage for parcel: file-level backends, and the library, content and
//! key-value storages built on top of them.

pub mod backend;
mod content;
pub mod error;
mod file;
mod kv;
mod library;
mod path;

pub use crate::backend::{BoxSyncRead, StorageBackend};
pub use crate::content::{BackendContentStorage, ContentId, ContentStorage, Usage};
pub use crate::file::FileInfo;
pub use crate::kv::{BackendKeyValueStorage, KeyValueStorage};
pub use crate::library::{BackendLibraryStorage, LibraryStorage};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
pub type LibraryStorageHandle = Arc<dyn LibraryStorage>;
pub type ContentStorageHandle = Arc<dyn ContentStorage>;
pub type KeyValueStorageHandle = Arc<dyn KeyValueStorage>;

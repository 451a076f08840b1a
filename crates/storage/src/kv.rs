//! Key-value storage for small settings documents.

use crate::error::{ErrorKind, Result};
use crate::BackendHandle;
use async_trait::async_trait;
use exn::ResultExt;
use serde_json::Value;
use std::path::PathBuf;

const SETTINGS: &str = "settings";

#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// `None` when nothing was ever saved under `key`.
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    async fn save(&self, key: &str, value: &Value) -> Result<()>;
}

/// [`KeyValueStorage`] keeping one JSON file per key.
#[derive(Clone)]
pub struct BackendKeyValueStorage {
    backend: BackendHandle,
}
impl BackendKeyValueStorage {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend }
    }

    fn path(key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            exn::bail!(ErrorKind::InvalidPath(PathBuf::from(key)));
        }
        Ok(PathBuf::from(SETTINGS).join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStorage for BackendKeyValueStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = Self::path(key)?;
        match self.backend.read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data).or_raise(|| ErrorKind::Corrupt(path.clone()))?)),
            Err(err) if matches!(&*err, ErrorKind::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = Self::path(key)?;
        let data = serde_json::to_vec(value).or_raise(|| ErrorKind::BackendError(format!("unable to serialize {key}")))?;
        self.backend.write(&path, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_and_save() {
        let storage = BackendKeyValueStorage::new(Arc::new(MockBackend::default()));
        assert_eq!(storage.load("uuid").await.unwrap(), None);
        storage.save("uuid", &json!("abc")).await.unwrap();
        assert_eq!(storage.load("uuid").await.unwrap(), Some(json!("abc")));
        assert!(storage.save("../escape", &json!(1)).await.is_err());
    }
}

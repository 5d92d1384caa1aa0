//! JSON-file [`KeyValueStore`] backend.
//!
//! The whole state is one JSON object at `<data_dir>/state.json`. Every
//! mutation rewrites the file through a temp file and a rename, so a crash
//! never leaves a half-written state behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use lexibridge_core::kv::KeyValueStore;

pub struct FileKvStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileKvStore {
    /// Load `path` if it exists; a missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read state file: {}", path.display()))
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(values)?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.persist(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn values_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/state.json");

        let kv = FileKvStore::open(&path).await.unwrap();
        kv.set("dictionary.version", "2024.06.01").await.unwrap();
        kv.set("dictionary.installed", "true").await.unwrap();
        kv.remove("dictionary.installed").await.unwrap();
        drop(kv);

        let kv = FileKvStore::open(&path).await.unwrap();
        assert_eq!(
            kv.get("dictionary.version").await.unwrap().as_deref(),
            Some("2024.06.01")
        );
        assert_eq!(kv.get("dictionary.installed").await.unwrap(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileKvStore::open(&path).await.err().unwrap();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}

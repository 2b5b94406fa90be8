//! String key/value substrates the TTL store runs on. Callers treat every
//! failure here as "entry absent" (reads) or a dropped write; nothing in this
//! module is allowed to take the portal down.

use async_trait::async_trait;
use dashmap::DashMap;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{PortalError, Result};

/// Process-wide string key/value store with a practical size quota.
/// Implementations may be backed by memory, disk, or anything else reachable
/// from async context.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<bool>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory substrate. The optional quota mirrors the hard size limits of
/// real device storage so quota-exceeded paths stay reachable in tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, String>,
    max_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(max_bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_bytes: Some(max_bytes),
        }
    }

    fn used_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.key().len() + e.value().len())
            .sum()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(max) = self.max_bytes {
            let existing = self.entries.get(key).map(|e| e.value().len());
            let projected = self.used_bytes() - existing.unwrap_or(0) + value.len()
                + if existing.is_none() { key.len() } else { 0 };
            if projected > max {
                return Err(PortalError::StorageError(format!(
                    "quota exceeded: {} bytes needed, {} allowed",
                    projected, max
                )));
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}

/// On-disk envelope: the logical key rides along so `keys()` can be answered
/// from the files alone.
#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    key: String,
    value: String,
}

/// Disk substrate: one JSON file per key under `dir`, named by the hex
/// SHA-256 of the key (keys are URLs and free-form strings, not safe as file
/// names).
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hasher.finalize();
        self.dir.join(format!("{}.json", hex::encode(hash)))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PortalError::StorageError(format!(
                    "read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let record: FileRecord = serde_json::from_str(&raw).map_err(|e| {
            PortalError::StorageError(format!("corrupt record {}: {}", path.display(), e))
        })?;
        Ok(Some(record.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let record = FileRecord {
            key: key.to_string(),
            value: value.to_string(),
        };
        let raw = serde_json::to_string(&record)?;
        tokio::fs::write(self.path_for(key), raw).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PortalError::StorageError(format!("remove {}: {}", key, e))),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PortalError::StorageError(format!(
                    "list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };
        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| PortalError::StorageError(format!("list {}: {}", self.dir.display(), e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_json::from_str::<FileRecord>(&raw) {
                    Ok(record) => keys.push(record.key),
                    Err(e) => warn!("Skipping corrupt cache file {}: {}", path.display(), e),
                },
                Err(e) => warn!("Skipping unreadable cache file {}: {}", path.display(), e),
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").await.unwrap(), None);

        storage.set("alpha", "one").await.unwrap();
        storage.set("beta", "two").await.unwrap();
        assert_eq!(storage.get("alpha").await.unwrap(), Some("one".to_string()));

        let mut keys = storage.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()]);

        assert!(storage.remove("alpha").await.unwrap());
        assert!(!storage.remove("alpha").await.unwrap());
        assert_eq!(storage.get("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_storage_overwrite_replaces_value() {
        let storage = MemoryStorage::new();
        storage.set("k", "first").await.unwrap();
        storage.set("k", "second").await.unwrap();
        assert_eq!(storage.get("k").await.unwrap(), Some("second".to_string()));
        assert_eq!(storage.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_storage_quota_rejects_oversized_write() {
        let storage = MemoryStorage::with_quota(16);
        storage.set("k", "small").await.unwrap();

        let err = storage
            .set("k2", "way too large for the quota")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::StorageError(_)));
        // the failed write left nothing behind
        assert_eq!(storage.get("k2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        assert_eq!(storage.get("rss_cache_https://x/feed").await.unwrap(), None);
        storage
            .set("rss_cache_https://x/feed", "{\"items\":[]}")
            .await
            .unwrap();
        assert_eq!(
            storage.get("rss_cache_https://x/feed").await.unwrap(),
            Some("{\"items\":[]}".to_string())
        );
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["rss_cache_https://x/feed".to_string()]
        );

        assert!(storage.remove("rss_cache_https://x/feed").await.unwrap());
        assert_eq!(storage.keys().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_file_storage_missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("never_created"));
        assert_eq!(storage.keys().await.unwrap().len(), 0);
    }
}

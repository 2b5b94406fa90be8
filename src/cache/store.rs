//! The keyed TTL store. Every read and write consults the policy gate first;
//! a disabled category never touches the substrate, so a deliberately
//! switched-off cache cannot be confused with a broken one.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{CacheCategory, CachePolicy, StorageBackend};

#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize> {
    payload: &'a T,
    stored_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    payload: T,
    stored_at: DateTime<Utc>,
}

/// One live entry, for the diagnostics surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub age_secs: i64,
    pub size_bytes: usize,
}

#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn StorageBackend>,
    policy: CachePolicy,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn StorageBackend>, policy: CachePolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Fresh read. Absent when the category is disabled, the key is missing,
    /// the stored envelope does not deserialize, or the entry has expired.
    /// An entry aged exactly the TTL is still fresh; expiry begins strictly
    /// beyond it. Expired entries stay in the substrate for `read_stale`.
    pub async fn read<T: DeserializeOwned>(&self, key: &str, category: CacheCategory) -> Option<T> {
        if !self.policy.is_enabled(category) {
            debug!("Cache disabled for '{}', skipping read for key: {}", category, key);
            return None;
        }

        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Cache MISS for key: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Storage read error for key {}: {}", key, e);
                return None;
            }
        };

        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to deserialize cached JSON for key {}: {}", key, e);
                return None;
            }
        };

        let age_secs = (Utc::now() - envelope.stored_at).num_seconds();
        let ttl_secs = self.policy.ttl_seconds(category) as i64;
        if age_secs > ttl_secs {
            debug!(
                "Cache EXPIRED for key: {} (age {}s > ttl {}s)",
                key, age_secs, ttl_secs
            );
            return None;
        }

        debug!("Cache HIT for key: {} (age {}s)", key, age_secs);
        Some(envelope.payload)
    }

    /// Last-resort read: ignores policy and TTL entirely.
    pub async fn read_stale<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Storage read error for key {} (stale read): {}", key, e);
                return None;
            }
        };
        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) => {
                debug!("Cache STALE HIT for key: {}", key);
                Some(envelope.payload)
            }
            Err(e) => {
                warn!("Failed to deserialize stale cache for key {}: {}", key, e);
                None
            }
        }
    }

    /// Store `payload` under `key`. No-op when the category is disabled.
    /// Serialization and substrate failures are logged and swallowed: a
    /// failed cache write must never fail the caller's primary operation.
    pub async fn write<T: Serialize>(&self, key: &str, payload: &T, category: CacheCategory) {
        if !self.policy.is_enabled(category) {
            debug!("Cache disabled for '{}', skipping write for key: {}", category, key);
            return;
        }

        let envelope = EnvelopeRef {
            payload,
            stored_at: Utc::now(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache payload for key {}: {}", key, e);
                return;
            }
        };

        match self.backend.set(key, &raw).await {
            Ok(()) => debug!(
                "Cache STORED for key: {} ({} bytes, ttl {}s)",
                key,
                raw.len(),
                self.policy.ttl_seconds(category)
            ),
            Err(e) => warn!("Cache write dropped for key {}: {}", key, e),
        }
    }

    /// Remove every key equal to or starting with `prefix`; returns how many
    /// entries went away. Eviction is an explicit caller action and is not
    /// policy-gated.
    pub async fn evict(&self, prefix: &str) -> usize {
        let keys = match self.backend.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Storage listing failed during eviction: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(prefix)) {
            match self.backend.remove(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to evict cache key {}: {}", key, e),
            }
        }
        debug!("Evicted {} cache entries with prefix '{}'", removed, prefix);
        removed
    }

    /// Clear this store's entire namespace (all categories), leaving any
    /// unrelated keys in the substrate untouched.
    pub async fn evict_all(&self) -> usize {
        let mut total = 0;
        for category in CacheCategory::ALL {
            total += self.evict(category.key_prefix()).await;
        }
        total
    }

    /// Live entries in this store's namespace, for diagnostics. Entries that
    /// fail to load or parse are skipped.
    pub async fn entries(&self) -> Vec<CacheEntryInfo> {
        let keys = match self.backend.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Storage listing failed for diagnostics: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for key in keys {
            if !CacheCategory::ALL
                .iter()
                .any(|c| key.starts_with(c.key_prefix()))
            {
                continue;
            }
            let raw = match self.backend.get(&key).await {
                Ok(Some(raw)) => raw,
                _ => continue,
            };
            let envelope: Envelope<serde_json::Value> = match serde_json::from_str(&raw) {
                Ok(envelope) => envelope,
                Err(_) => continue,
            };
            out.push(CacheEntryInfo {
                key,
                age_secs: (Utc::now() - envelope.stored_at).num_seconds(),
                size_bytes: raw.len(),
            });
        }
        out
    }
}

//! Cache layer: a policy-gated TTL store over a pluggable key/value substrate.
//!
//! - `storage`: the string key/value substrate (memory or disk)
//! - `policy`: per-category enable switches and TTLs, resolved from the live config
//! - `store`: the TTL store itself (fresh read, stale read, write, eviction)

use std::fmt;

pub mod policy;
pub mod storage;
pub mod store;

pub use policy::CachePolicy;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::{CacheEntryInfo, CacheStore};

/// Closed set of cache partitions. Each category carries its own policy
/// switch, TTL fallback, and storage key prefix, so the policy gate and the
/// store can never disagree on naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCategory {
    Rss,
    Config,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 2] = [CacheCategory::Rss, CacheCategory::Config];

    /// Storage key prefix for this category. The config category uses a
    /// single fixed key, which prefix matching also covers.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            CacheCategory::Rss => "rss_cache_",
            CacheCategory::Config => "portal_config",
        }
    }

    /// TTL applied when the configuration does not name one.
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            CacheCategory::Rss => 300,
            CacheCategory::Config => 60,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CacheCategory::Rss => "rss",
            CacheCategory::Config => "config",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

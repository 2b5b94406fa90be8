use log::debug;

use crate::cache::CacheCategory;
use crate::config::settings::{with_config, ConfigHandle, PortalConfig};

/// Resolves cache policy from the live configuration on every call. Nothing
/// here is memoized: a hot reload swaps the handle's contents and the very
/// next read sees the new switches.
#[derive(Clone)]
pub struct CachePolicy {
    config: ConfigHandle,
}

fn category_enabled(config: &PortalConfig, category: CacheCategory) -> bool {
    let cache = &config.cache;
    if !cache.enabled.unwrap_or(true) {
        return false;
    }
    match category {
        CacheCategory::Rss => cache.rss_enabled.unwrap_or(true),
        CacheCategory::Config => cache.config_enabled.unwrap_or(true),
    }
}

fn category_ttl(config: &PortalConfig, category: CacheCategory) -> u64 {
    // the legacy shared duration sits at the document top level
    let configured = match category {
        CacheCategory::Rss => config.cache.rss_duration.or(config.cache_duration),
        CacheCategory::Config => config.cache.config_duration,
    };
    configured.unwrap_or_else(|| category.default_ttl_secs())
}

impl CachePolicy {
    pub fn new(config: ConfigHandle) -> Self {
        Self { config }
    }

    /// Whether `category` may be cached right now. No configuration loaded
    /// means no caching; the global switch wins over category switches; an
    /// absent category switch counts as enabled.
    pub fn is_enabled(&self, category: CacheCategory) -> bool {
        with_config(&self.config, |config| match config {
            Some(config) => category_enabled(config, category),
            None => {
                debug!(
                    "Cache policy: no configuration loaded, '{}' disabled",
                    category
                );
                false
            }
        })
    }

    /// TTL for `category`, falling back to the category default when the
    /// configuration does not name one.
    pub fn ttl_seconds(&self, category: CacheCategory) -> u64 {
        with_config(&self.config, |config| match config {
            Some(config) => category_ttl(config, category),
            None => category.default_ttl_secs(),
        })
    }

    /// One-line status for the diagnostics surface, e.g. `rss:300s | config:off`.
    pub fn summary(&self) -> String {
        with_config(&self.config, |config| {
            let config = match config {
                Some(config) => config,
                None => return "no configuration loaded".to_string(),
            };
            if !config.cache.enabled.unwrap_or(true) {
                return "ALL CACHING DISABLED".to_string();
            }
            CacheCategory::ALL
                .iter()
                .map(|&category| {
                    if category_enabled(config, category) {
                        format!("{}:{}s", category, category_ttl(config, category))
                    } else {
                        format!("{}:off", category)
                    }
                })
                .collect::<Vec<_>>()
                .join(" | ")
        })
    }
}

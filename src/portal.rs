//! The portal facade: wires storage, cache, fetch and the two retrieval
//! services together, and exposes the operations the CLI drives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use itertools::Itertools;
use log::{debug, info};

use crate::cache::{
    CacheCategory, CacheEntryInfo, CachePolicy, CacheStore, FileStorage, MemoryStorage,
    StorageBackend,
};
use crate::config::service::{ConfigService, LoadedConfig};
use crate::config::settings::{
    new_config_handle, with_config, CategoryConfig, ConfigHandle, PortalConfig, RuntimeOptions,
};
use crate::config::validation::ValidationReport;
use crate::error::Result;
use crate::net::{FetchClient, RateLimiter};
use crate::rss::{FeedHealth, FeedHealthRegistry, FeedItem, FeedService};
use crate::search::{self, SearchHit};

pub struct Portal {
    config: ConfigHandle,
    store: CacheStore,
    feeds: FeedService,
    config_service: ConfigService,
    health: Arc<FeedHealthRegistry>,
}

impl Portal {
    /// Build a portal from runtime options. With a storage directory the
    /// cache persists across runs; without one it lives in memory.
    pub fn new(options: &RuntimeOptions) -> Result<Self> {
        let config = new_config_handle(None);
        let backend: Arc<dyn StorageBackend> = match &options.storage_dir {
            Some(dir) => {
                debug!("Using disk cache at {}", dir);
                Arc::new(FileStorage::new(dir.clone()))
            }
            None => Arc::new(MemoryStorage::new()),
        };
        let store = CacheStore::new(backend, CachePolicy::new(config.clone()));
        let fetcher = FetchClient::new(&options.proxy_url)?;
        let health = Arc::new(FeedHealthRegistry::new());

        let feeds = FeedService::new(
            store.clone(),
            fetcher.clone(),
            Arc::new(RateLimiter::new()),
            health.clone(),
            config.clone(),
        );
        let config_service = ConfigService::new(
            store.clone(),
            fetcher,
            options.config_location.clone(),
            config.clone(),
        );

        Ok(Portal {
            config,
            store,
            feeds,
            config_service,
            health,
        })
    }

    /// Override the retry backoff schedule for both retrieval services.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.feeds = self.feeds.with_backoff(base, cap);
        self.config_service = self.config_service.with_backoff(base, cap);
        self
    }

    /// Load (or re-resolve) the configuration. See `ConfigService::load`.
    pub async fn load(&self) -> Result<LoadedConfig> {
        self.config_service.load().await
    }

    /// Hot reload: drop cached config and feeds, then refetch and swap the
    /// shared handle.
    pub async fn reload(&self) -> Result<LoadedConfig> {
        self.config_service.reload().await
    }

    pub fn current_config(&self) -> Option<PortalConfig> {
        with_config(&self.config, |config| config.cloned())
    }

    /// Items for one category; empty when it has no feed configured.
    pub async fn category_items(&self, category: &CategoryConfig) -> Vec<FeedItem> {
        match &category.rss_feed {
            Some(url) => self.feeds.get_items(url, category.rss_item_limit()).await,
            None => Vec::new(),
        }
    }

    /// Items for the portal-wide feed; empty when none is configured.
    pub async fn main_feed_items(&self) -> Vec<FeedItem> {
        let feed = with_config(&self.config, |config| {
            config.and_then(|c| c.rss_feed.clone().map(|url| (url, c.main_item_limit())))
        });
        match feed {
            Some((url, limit)) => self.feeds.get_items(&url, limit).await,
            None => Vec::new(),
        }
    }

    /// Force-refresh every configured feed, the portal-wide one included:
    /// evict the cached entries, then pull each distinct feed URL once.
    /// Returns the number of feeds pulled.
    pub async fn refresh_all(&self) -> usize {
        let pairs: Vec<(String, usize)> = with_config(&self.config, |config| {
            config
                .map(|c| {
                    c.rss_feed
                        .clone()
                        .map(|url| (url, c.main_item_limit()))
                        .into_iter()
                        .chain(c.categories().iter().filter_map(|cat| {
                            cat.rss_feed.clone().map(|url| (url, cat.rss_item_limit()))
                        }))
                        .unique_by(|(url, _)| url.clone())
                        .collect()
                })
                .unwrap_or_default()
        });
        if pairs.is_empty() {
            return 0;
        }

        let evicted = self.store.evict(CacheCategory::Rss.key_prefix()).await;
        debug!("Refresh evicted {} cached feed list(s)", evicted);

        let fetches = pairs
            .iter()
            .map(|(url, limit)| self.feeds.get_items(url, *limit));
        join_all(fetches).await;
        pairs.len()
    }

    /// Periodically refresh all feeds, driven by `rss_refresh_interval`.
    /// Returns immediately when the interval is zero. Runs until cancelled
    /// otherwise.
    pub async fn watch(&self) -> Result<()> {
        let interval_secs = with_config(&self.config, |config| {
            config.and_then(|c| c.rss_refresh_interval).unwrap_or(0)
        });
        if interval_secs == 0 {
            info!("Feed auto-refresh is disabled (rss_refresh_interval = 0)");
            return Ok(());
        }

        info!("Refreshing feeds every {}s", interval_secs);
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            let refreshed = self.refresh_all().await;
            info!("Refreshed {} feed(s)", refreshed);
        }
    }

    /// Check the configuration document at its origin without loading it.
    pub async fn validate_config(&self) -> Result<ValidationReport> {
        self.config_service.validate_origin().await
    }

    /// Search configured links. Empty when search is disabled or no config
    /// is loaded.
    pub fn search(&self, term: &str) -> Vec<SearchHit> {
        with_config(&self.config, |config| {
            config
                .map(|c| search::search_links(c, term))
                .unwrap_or_default()
        })
    }

    pub fn cache_summary(&self) -> String {
        self.store.policy().summary()
    }

    pub async fn cache_entries(&self) -> Vec<CacheEntryInfo> {
        self.store.entries().await
    }

    /// Evict everything the portal owns in the storage substrate.
    pub async fn clear_cache(&self) -> usize {
        self.store.evict_all().await
    }

    /// Evict one category's entries only.
    pub async fn clear_cache_category(&self, category: CacheCategory) -> usize {
        self.store.evict(category.key_prefix()).await
    }

    pub fn feed_health(&self) -> HashMap<String, FeedHealth> {
        self.health.snapshot()
    }
}

//! Cache-backed feed retrieval with rate limiting and stale fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::cache::{CacheCategory, CacheStore};
use crate::config::settings::{with_config, ConfigHandle};
use crate::error::RetryPolicy;
use crate::net::{FetchClient, RateLimiter};
use crate::rss::health::FeedHealthRegistry;
use crate::rss::{parser, FeedItem};

/// Fetch attempts allowed per feed URL inside one rate window.
pub const FEED_RATE_LIMIT: usize = 5;
pub const FEED_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Retrieves feed items for the portal. Every degradation (network failure,
/// rate limiting, unparsable payloads) resolves to a plain item list;
/// callers never see an error.
pub struct FeedService {
    store: CacheStore,
    fetcher: FetchClient,
    limiter: Arc<RateLimiter>,
    health: Arc<FeedHealthRegistry>,
    config: ConfigHandle,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl FeedService {
    pub fn new(
        store: CacheStore,
        fetcher: FetchClient,
        limiter: Arc<RateLimiter>,
        health: Arc<FeedHealthRegistry>,
        config: ConfigHandle,
    ) -> Self {
        let schedule = RetryPolicy::default();
        FeedService {
            store,
            fetcher,
            limiter,
            health,
            config,
            backoff_base: schedule.base_delay,
            backoff_cap: schedule.max_delay,
        }
    }

    /// Override the retry backoff schedule. Attempt counts still come from
    /// the loaded configuration.
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Resolve up to `max_items` items for a feed.
    ///
    /// Order of resort: fresh cache, then a rate-limited network fetch, then
    /// stale cache, then an empty list. A fetched document that fails to
    /// parse yields an empty list without touching the cache or the health
    /// record; a document that parses to zero items is a normal success.
    pub async fn get_items(&self, feed_url: &str, max_items: usize) -> Vec<FeedItem> {
        let cache_key = Self::cache_key(feed_url);

        if let Some(items) = self
            .store
            .read::<Vec<FeedItem>>(&cache_key, CacheCategory::Rss)
            .await
        {
            debug!("Serving {} from cache", feed_url);
            return clipped(items, max_items);
        }

        if !self
            .limiter
            .is_allowed(feed_url, FEED_RATE_LIMIT, FEED_RATE_WINDOW)
        {
            warn!("Rate limit reached for {}, serving stale cache", feed_url);
            let stale = self
                .store
                .read_stale::<Vec<FeedItem>>(&cache_key)
                .await
                .unwrap_or_default();
            return clipped(stale, max_items);
        }

        let (policy, timeout) = self.fetch_parameters();
        let started = Instant::now();
        match self
            .fetcher
            .fetch_feed_document(feed_url, &policy, timeout)
            .await
        {
            Ok(document) => match parser::parse_feed(&document) {
                Ok(items) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.store.write(&cache_key, &items, CacheCategory::Rss).await;
                    self.health.record(feed_url, true, elapsed_ms);
                    clipped(items, max_items)
                }
                Err(err) => {
                    warn!("Feed {} returned an unparsable document: {}", feed_url, err);
                    Vec::new()
                }
            },
            Err(err) => {
                warn!("Feed fetch failed for {}: {}", feed_url, err);
                self.health.record(feed_url, false, 0);
                let stale = self
                    .store
                    .read_stale::<Vec<FeedItem>>(&cache_key)
                    .await
                    .unwrap_or_default();
                clipped(stale, max_items)
            }
        }
    }

    fn cache_key(feed_url: &str) -> String {
        format!("{}{}", CacheCategory::Rss.key_prefix(), feed_url)
    }

    /// Attempt count and per-attempt timeout come from the live config;
    /// before any config loads, the built-in defaults apply.
    fn fetch_parameters(&self) -> (RetryPolicy, Duration) {
        with_config(&self.config, |config| {
            let timeout_secs = config.map(|c| c.request_timeout_secs()).unwrap_or(10);
            let attempts = config.map(|c| c.max_retry_attempts()).unwrap_or(3);
            (
                RetryPolicy::new(attempts, self.backoff_base, self.backoff_cap),
                Duration::from_secs(timeout_secs),
            )
        })
    }
}

fn clipped(mut items: Vec<FeedItem>, max_items: usize) -> Vec<FeedItem> {
    items.truncate(max_items);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, MemoryStorage, StorageBackend};
    use crate::config::settings::{new_config_handle, PortalConfig};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const FEED: &str = "https://example.com/feed.xml";

    fn sample_items(count: usize) -> Vec<FeedItem> {
        (0..count)
            .map(|i| FeedItem {
                title: format!("Item {}", i),
                url: format!("https://example.com/{}", i),
                published_at: None,
            })
            .collect()
    }

    fn handle_from(yaml: &str) -> ConfigHandle {
        let mut cfg: PortalConfig = serde_yaml::from_str(yaml).unwrap();
        cfg.apply_defaults();
        new_config_handle(Some(cfg))
    }

    fn service_with(backend: Arc<MemoryStorage>, config: ConfigHandle) -> FeedService {
        let store = CacheStore::new(backend, CachePolicy::new(config.clone()));
        // Proxy target is never reached in these tests.
        let fetcher = FetchClient::new("http://127.0.0.1:1").unwrap();
        FeedService::new(
            store,
            fetcher,
            Arc::new(RateLimiter::new()),
            Arc::new(FeedHealthRegistry::new()),
            config,
        )
    }

    /// Write an already-expired cache envelope straight to the backend.
    async fn seed_stale(backend: &MemoryStorage, key: &str, items: &[FeedItem]) {
        let envelope = json!({
            "payload": items,
            "stored_at": Utc::now() - chrono::Duration::seconds(86_400),
        });
        backend.set(key, &envelope.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_is_clipped_to_limit() {
        let backend = Arc::new(MemoryStorage::new());
        let service = service_with(backend.clone(), handle_from("{}"));
        let key = FeedService::cache_key(FEED);
        service
            .store
            .write(&key, &sample_items(4), CacheCategory::Rss)
            .await;

        let items = service.get_items(FEED, 2).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Item 0");
    }

    #[tokio::test]
    async fn test_rate_limited_feed_serves_stale_without_health_noise() {
        let backend = Arc::new(MemoryStorage::new());
        let service = service_with(backend.clone(), handle_from("{}"));
        let key = FeedService::cache_key(FEED);
        seed_stale(&backend, &key, &sample_items(3)).await;

        for _ in 0..FEED_RATE_LIMIT {
            assert!(service.limiter.is_allowed(FEED, FEED_RATE_LIMIT, FEED_RATE_WINDOW));
        }

        let items = service.get_items(FEED, 10).await;
        assert_eq!(items.len(), 3);
        assert!(service.health.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_feed_without_stale_is_empty() {
        let backend = Arc::new(MemoryStorage::new());
        let service = service_with(backend, handle_from("{}"));

        for _ in 0..FEED_RATE_LIMIT {
            assert!(service.limiter.is_allowed(FEED, FEED_RATE_LIMIT, FEED_RATE_WINDOW));
        }

        assert_eq!(service.get_items(FEED, 10).await, Vec::new());
        assert!(service.health.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_skips_fresh_read_but_stale_still_works() {
        let backend = Arc::new(MemoryStorage::new());
        let service = service_with(backend.clone(), handle_from("cache:\n  enabled: false\n"));
        let key = FeedService::cache_key(FEED);
        seed_stale(&backend, &key, &sample_items(2)).await;

        for _ in 0..FEED_RATE_LIMIT {
            service.limiter.is_allowed(FEED, FEED_RATE_LIMIT, FEED_RATE_WINDOW);
        }

        let items = service.get_items(FEED, 10).await;
        assert_eq!(items.len(), 2);
    }
}

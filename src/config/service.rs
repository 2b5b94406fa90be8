//! Cache-backed configuration loader with stale fallback.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::cache::{CacheCategory, CacheStore};
use crate::config::settings::{swap_config, with_config, ConfigHandle, PortalConfig};
use crate::config::validation;
use crate::error::{PortalError, Result, RetryPolicy};
use crate::net::FetchClient;

/// Where a loaded configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Unexpired cache entry.
    FreshCache,
    /// The canonical location (file or URL).
    Origin,
    /// Expired cache entry served because the origin was unreachable.
    StaleFallback,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PortalConfig,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// True when the portal is running on an expired document and should
    /// surface a degraded-mode warning.
    pub fn degraded(&self) -> bool {
        self.source == ConfigSource::StaleFallback
    }
}

/// Loads the portal document and keeps the shared handle current. The raw
/// text is cached so hot reloads and outages have something to fall back on.
pub struct ConfigService {
    store: CacheStore,
    fetcher: FetchClient,
    location: String,
    config: ConfigHandle,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl ConfigService {
    pub fn new(
        store: CacheStore,
        fetcher: FetchClient,
        location: String,
        config: ConfigHandle,
    ) -> Self {
        let schedule = RetryPolicy::default();
        ConfigService {
            store,
            fetcher,
            location,
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

    /// Resolve the configuration: fresh cache, then the canonical location,
    /// then stale cache. Whichever succeeds is default-filled and installed
    /// into the shared handle before this returns.
    ///
    /// The cached value is the raw pre-default document text, so fields this
    /// build does not recognize survive the round trip. The only error is
    /// `ConfigUnavailable`: nothing fetched and nothing cached, which first
    /// load treats as fatal.
    pub async fn load(&self) -> Result<LoadedConfig> {
        let key = CacheCategory::Config.key_prefix();

        if let Some(raw) = self.store.read::<String>(key, CacheCategory::Config).await {
            match parse_document(&raw) {
                Ok(config) => {
                    debug!("Configuration served from cache");
                    return Ok(self.install(config, ConfigSource::FreshCache));
                }
                Err(err) => {
                    warn!("Cached configuration no longer parses ({}), refetching", err)
                }
            }
        }

        match self.fetch_and_validate().await {
            Ok((raw, config)) => {
                let loaded = self.install(config, ConfigSource::Origin);
                // The write is gated by the document just installed, so a
                // config that disables its own caching stays uncached.
                self.store.write(key, &raw, CacheCategory::Config).await;
                Ok(loaded)
            }
            Err(err) => {
                warn!("Configuration fetch failed: {}", err);
                match self.store.read_stale::<String>(key).await {
                    Some(raw) => match parse_document(&raw) {
                        Ok(config) => {
                            warn!("Serving stale configuration in degraded mode");
                            Ok(self.install(config, ConfigSource::StaleFallback))
                        }
                        Err(parse_err) => {
                            error!("Stale configuration is unusable: {}", parse_err);
                            Err(PortalError::ConfigUnavailable)
                        }
                    },
                    None => Err(PortalError::ConfigUnavailable),
                }
            }
        }
    }

    /// Fetch and parse the document without installing or caching it, and
    /// report its structural problems.
    pub async fn validate_origin(&self) -> Result<validation::ValidationReport> {
        let raw = self.fetch_document().await?;
        let config = parse_document(&raw)?;
        Ok(validation::validate(&config))
    }

    /// Drop the cached configuration and every cached feed, then load fresh.
    /// Categories and feed lists may both have changed, so feed entries
    /// cached under the old document are not worth keeping.
    pub async fn reload(&self) -> Result<LoadedConfig> {
        let evicted = self.store.evict(CacheCategory::Config.key_prefix()).await
            + self.store.evict(CacheCategory::Rss.key_prefix()).await;
        info!("Hot reload requested, evicted {} cache entries", evicted);
        self.load().await
    }

    async fn fetch_and_validate(&self) -> Result<(String, PortalConfig)> {
        let raw = self.fetch_document().await?;
        let config = parse_document(&raw)?;
        validation::validate(&config).log();
        Ok((raw, config))
    }

    async fn fetch_document(&self) -> Result<String> {
        if self.location.starts_with("http://") || self.location.starts_with("https://") {
            let (policy, timeout) = self.fetch_parameters();
            self.fetcher
                .fetch_with_retry(&self.location, &policy, timeout)
                .await
        } else {
            debug!("Reading configuration from {}", self.location);
            Ok(tokio::fs::read_to_string(&self.location).await?)
        }
    }

    fn install(&self, mut config: PortalConfig, source: ConfigSource) -> LoadedConfig {
        config.apply_defaults();
        swap_config(&self.config, Some(config.clone()));
        LoadedConfig { config, source }
    }

    /// Retry parameters for refetching the document itself. Until a config
    /// is installed these fall back to the built-in defaults.
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

fn parse_document(raw: &str) -> Result<PortalConfig> {
    if raw.trim().is_empty() {
        return Err(PortalError::ConfigError(
            "configuration document is empty".to_string(),
        ));
    }
    Ok(serde_yaml::from_str(raw)?)
}

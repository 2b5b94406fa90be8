use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::sync::{Arc, RwLock};

pub const DEFAULT_CONFIG_LOCATION: &str = "links.yaml";
pub const DEFAULT_PROXY_URL: &str = "https://api.allorigins.win/get";

/// Process-level options (where the portal document lives, which proxy to
/// use, where the disk cache goes). CLI flags overlay these; the env vars
/// follow the PORTAL_* convention and are read once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_location: String,
    pub proxy_url: String,
    pub storage_dir: Option<String>,
}

impl RuntimeOptions {
    pub fn from_env() -> Self {
        RuntimeOptions {
            config_location: env::var("PORTAL_CONFIG_URL")
                .unwrap_or_else(|_| DEFAULT_CONFIG_LOCATION.to_string()),
            proxy_url: env::var("PORTAL_PROXY_URL")
                .unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string()),
            storage_dir: env::var("PORTAL_STORAGE_DIR").ok(),
        }
    }
}

/// The portal document. Every field is optional at parse time; call
/// `apply_defaults` before handing the config to consumers. Optional numeric
/// and boolean fields parse leniently: a malformed value reads as absent and
/// picks up the default instead of failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    #[serde(deserialize_with = "lenient_u64")]
    pub request_timeout: Option<u64>,
    #[serde(deserialize_with = "lenient_u32")]
    pub max_retries: Option<u32>,
    /// The portal-wide feed shown alongside the categories.
    pub rss_feed: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub rss_items: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub rss_refresh_interval: Option<u64>,
    /// Older documents named a single top-level duration; still honored as
    /// the rss_duration fallback.
    #[serde(deserialize_with = "lenient_u64")]
    pub cache_duration: Option<u64>,
    pub cache: CacheSettings,
    pub features: FeatureFlags,
    pub categories: Option<Vec<CategoryConfig>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(deserialize_with = "lenient_bool")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub rss_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_u64")]
    pub rss_duration: Option<u64>,
    #[serde(deserialize_with = "lenient_bool")]
    pub config_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_u64")]
    pub config_duration: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    #[serde(deserialize_with = "lenient_bool")]
    pub search_enabled: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub keyboard_shortcuts: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub analytics_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub links: Option<Vec<LinkEntry>>,
    pub rss_feed: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub rss_items: Option<u64>,
    pub rss_icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkEntry {
    pub title: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
}

impl PortalConfig {
    /// Fill every recognized optional field that is still absent. Explicit
    /// values survive, including explicit `false` and `0`. Idempotent.
    pub fn apply_defaults(&mut self) {
        self.request_timeout.get_or_insert(10);
        self.max_retries.get_or_insert(3);
        self.rss_refresh_interval.get_or_insert(0);

        self.features.search_enabled.get_or_insert(true);
        self.features.keyboard_shortcuts.get_or_insert(true);
        self.features.analytics_enabled.get_or_insert(false);

        let legacy_duration = self.cache_duration;
        let cache = &mut self.cache;
        cache.enabled.get_or_insert(true);
        cache.rss_enabled.get_or_insert(true);
        if cache.rss_duration.is_none() {
            cache.rss_duration = Some(legacy_duration.unwrap_or(300));
        }
        cache.config_enabled.get_or_insert(true);
        cache.config_duration.get_or_insert(60);

        if self.categories.is_none() {
            self.categories = Some(Vec::new());
        }
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout.unwrap_or(10)
    }

    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retries.unwrap_or(3)
    }

    /// Item cap for the portal-wide feed.
    pub fn main_item_limit(&self) -> usize {
        self.rss_items.unwrap_or(5) as usize
    }

    pub fn categories(&self) -> &[CategoryConfig] {
        self.categories.as_deref().unwrap_or(&[])
    }
}

impl CategoryConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }

    pub fn rss_item_limit(&self) -> usize {
        self.rss_items.unwrap_or(5) as usize
    }
}

/// Shared, atomically swappable configuration handle. A hot reload replaces
/// the inner value wholesale; policy decisions re-read it on every call.
pub type ConfigHandle = Arc<RwLock<Option<PortalConfig>>>;

pub fn new_config_handle(initial: Option<PortalConfig>) -> ConfigHandle {
    Arc::new(RwLock::new(initial))
}

/// Run `f` against the current configuration. A poisoned lock reads as "no
/// configuration loaded" rather than panicking.
pub fn with_config<T>(handle: &ConfigHandle, f: impl FnOnce(Option<&PortalConfig>) -> T) -> T {
    match handle.read() {
        Ok(guard) => f(guard.as_ref()),
        Err(_) => f(None),
    }
}

/// Replace the shared configuration wholesale.
pub fn swap_config(handle: &ConfigHandle, next: Option<PortalConfig>) {
    match handle.write() {
        Ok(mut guard) => *guard = next,
        Err(poisoned) => *poisoned.into_inner() = next,
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64)))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .or_else(|| value.as_f64().map(|f| f.clamp(0.0, u32::MAX as f64) as u32)))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(value.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
request_timeout: 15
rss_feed: https://news.example.com/rss.xml
rss_items: 4
rss_refresh_interval: 600
cache:
  enabled: true
  rss_duration: 120
  config_enabled: false
categories:
  - name: News
    rss_feed: https://example.com/feed.xml
    rss_items: 8
  - name: Tools
    links:
      - title: Dashboard
        url: https://dash.example.com
        icon: "📊"
"#;

    #[test]
    fn test_sample_document_parses() {
        let cfg: PortalConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.request_timeout, Some(15));
        assert_eq!(cfg.max_retries, None);
        assert_eq!(cfg.rss_feed.as_deref(), Some("https://news.example.com/rss.xml"));
        assert_eq!(cfg.main_item_limit(), 4);
        assert_eq!(cfg.cache.rss_duration, Some(120));
        assert_eq!(cfg.cache.config_enabled, Some(false));

        let categories = cfg.categories.as_ref().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].rss_item_limit(), 8);
        assert_eq!(categories[1].links.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_defaults_fill_missing_fields_only() {
        let mut cfg: PortalConfig = serde_yaml::from_str(SAMPLE).unwrap();
        cfg.apply_defaults();

        assert_eq!(cfg.request_timeout, Some(15)); // explicit value kept
        assert_eq!(cfg.max_retries, Some(3));
        assert_eq!(cfg.rss_refresh_interval, Some(600));
        assert_eq!(cfg.cache.rss_duration, Some(120));
        assert_eq!(cfg.cache.config_enabled, Some(false)); // explicit false kept
        assert_eq!(cfg.cache.config_duration, Some(60));
        assert_eq!(cfg.features.search_enabled, Some(true));
        assert_eq!(cfg.features.analytics_enabled, Some(false));
    }

    #[test]
    fn test_defaults_preserve_explicit_zero() {
        let mut cfg: PortalConfig =
            serde_yaml::from_str("rss_refresh_interval: 0\ncache:\n  rss_duration: 0\n").unwrap();
        cfg.apply_defaults();
        assert_eq!(cfg.rss_refresh_interval, Some(0));
        assert_eq!(cfg.cache.rss_duration, Some(0));
    }

    #[test]
    fn test_defaults_are_idempotent() {
        let mut cfg: PortalConfig = serde_yaml::from_str(SAMPLE).unwrap();
        cfg.apply_defaults();
        let once = cfg.clone();
        cfg.apply_defaults();
        assert_eq!(cfg, once);
    }

    #[test]
    fn test_legacy_cache_duration_feeds_rss_duration() {
        // the old single-duration documents put the field at the top level,
        // with no cache block at all
        let mut cfg: PortalConfig = serde_yaml::from_str("cache_duration: 900\n").unwrap();
        cfg.apply_defaults();
        assert_eq!(cfg.cache.rss_duration, Some(900));
    }

    #[test]
    fn test_explicit_rss_duration_beats_legacy_duration() {
        let mut cfg: PortalConfig =
            serde_yaml::from_str("cache_duration: 900\ncache:\n  rss_duration: 120\n").unwrap();
        cfg.apply_defaults();
        assert_eq!(cfg.cache.rss_duration, Some(120));
    }

    #[test]
    fn test_main_feed_item_limit_defaults_to_five() {
        let cfg = PortalConfig::default();
        assert_eq!(cfg.main_item_limit(), 5);
    }

    #[test]
    fn test_malformed_numeric_reads_as_absent() {
        let cfg: PortalConfig =
            serde_yaml::from_str("request_timeout: fast\ncache:\n  rss_duration: soon\n").unwrap();
        assert_eq!(cfg.request_timeout, None);
        assert_eq!(cfg.cache.rss_duration, None);
    }

    #[test]
    fn test_malformed_bool_reads_as_absent() {
        let cfg: PortalConfig = serde_yaml::from_str("cache:\n  enabled: nope\n").unwrap();
        assert_eq!(cfg.cache.enabled, None);
    }

    #[test]
    fn test_fractional_durations_truncate() {
        let cfg: PortalConfig = serde_yaml::from_str("request_timeout: 10.9\n").unwrap();
        assert_eq!(cfg.request_timeout, Some(10));
    }

    #[test]
    fn test_handle_swap_replaces_wholesale() {
        let handle = new_config_handle(None);
        assert!(with_config(&handle, |c| c.is_none()));

        let mut cfg = PortalConfig::default();
        cfg.apply_defaults();
        swap_config(&handle, Some(cfg));
        assert!(with_config(&handle, |c| c.is_some()));

        swap_config(&handle, None);
        assert!(with_config(&handle, |c| c.is_none()));
    }
}

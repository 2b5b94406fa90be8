//! Resilient HTTP fetching: bounded attempts with a timeout scoped to each
//! attempt and capped exponential backoff in between. The last error always
//! surfaces to the caller, which owns the fallback decision.

use log::{debug, error, warn};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

use crate::error::{PortalError, Result, RetryPolicy};

/// JSON envelope returned by the feed proxy. Only `contents` matters; the
/// rest of the envelope is ignored.
#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    contents: Option<String>,
}

#[derive(Clone)]
pub struct FetchClient {
    http: Client,
    proxy_url: String,
}

impl FetchClient {
    pub fn new(proxy_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            proxy_url: proxy_url.into(),
        })
    }

    /// GET `url` with up to `policy.max_attempts` attempts. Each attempt
    /// carries its own timeout; between failed attempts (never after the
    /// last) the backoff schedule from `policy` applies. Success returns the
    /// response body immediately.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        policy: &RetryPolicy,
        per_attempt_timeout: Duration,
    ) -> Result<String> {
        let mut last_error = PortalError::NetworkError("no attempts were made".to_string());

        for attempt in 1..=policy.max_attempts {
            debug!("Fetch attempt {}/{} for {}", attempt, policy.max_attempts, url);
            match self.try_once(url, per_attempt_timeout).await {
                Ok(body) => {
                    if attempt > 1 {
                        debug!("Fetch for {} succeeded on attempt {}", url, attempt);
                    }
                    return Ok(body);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed for {}: {}",
                        attempt, policy.max_attempts, url, e
                    );
                    if !e.retryable() {
                        return Err(e);
                    }
                    last_error = e;
                    if attempt < policy.max_attempts {
                        sleep(policy.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        error!(
            "All {} fetch attempts failed for {}: {}",
            policy.max_attempts, url, last_error
        );
        Err(last_error)
    }

    async fn try_once(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self.http.get(url).timeout(timeout).send().await?;
        if !response.status().is_success() {
            return Err(PortalError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    /// The proxy request URL for a feed: `<proxy>?url=<encoded feed url>`.
    pub fn proxy_url_for(&self, feed_url: &str) -> Result<String> {
        let mut url = Url::parse(&self.proxy_url).map_err(|e| {
            PortalError::InvalidInput(format!("invalid proxy URL '{}': {}", self.proxy_url, e))
        })?;
        url.query_pairs_mut().append_pair("url", feed_url);
        Ok(url.to_string())
    }

    /// Fetch a feed document through the proxy and unwrap its envelope. A
    /// missing or empty `contents` field is a fetch failure, not an empty
    /// feed; the envelope is checked once, after the retry loop.
    pub async fn fetch_feed_document(
        &self,
        feed_url: &str,
        policy: &RetryPolicy,
        per_attempt_timeout: Duration,
    ) -> Result<String> {
        let proxy_url = self.proxy_url_for(feed_url)?;
        let body = self
            .fetch_with_retry(&proxy_url, policy, per_attempt_timeout)
            .await?;
        let envelope: ProxyEnvelope = serde_json::from_str(&body)?;
        match envelope.contents {
            Some(contents) if !contents.is_empty() => Ok(contents),
            _ => Err(PortalError::ProxyError(format!(
                "proxy response for {} carried no contents",
                feed_url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_proxy_url_encodes_the_feed_url() {
        let client = FetchClient::new("https://api.allorigins.win/get").unwrap();
        let built = client
            .proxy_url_for("https://example.com/feed.xml?page=1")
            .unwrap();
        assert_eq!(
            built,
            "https://api.allorigins.win/get?url=https%3A%2F%2Fexample.com%2Ffeed.xml%3Fpage%3D1"
        );
    }

    #[test]
    fn test_invalid_proxy_url_is_reported() {
        let client = FetchClient::new("not a proxy").unwrap();
        let err = client.proxy_url_for("https://example.com/feed").unwrap_err();
        assert!(matches!(err, PortalError::InvalidInput(_)));
    }

    #[test]
    fn test_envelope_rejects_missing_contents() {
        let envelope: ProxyEnvelope = serde_json::from_str("{\"status\":{}}").unwrap();
        assert!(envelope.contents.is_none());

        let envelope: ProxyEnvelope =
            serde_json::from_str("{\"contents\":\"<rss/>\"}").unwrap();
        assert_eq!(envelope.contents.as_deref(), Some("<rss/>"));
    }
}

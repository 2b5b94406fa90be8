use log::debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PortalError {
    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status from an upstream
    #[error("HTTP Status Error: {0}")]
    HttpStatus(u16),

    /// Per-attempt timeout elapsed before a response arrived
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// Proxy envelope was present but unusable (missing `contents`)
    #[error("Proxy Error: {0}")]
    ProxyError(String),

    /// Feed document could not be parsed
    #[error("Feed Parse Error: {0}")]
    FeedParseError(String),

    /// JSON serialization/deserialization failures
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Configuration document errors (fetch, YAML, shape)
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Key/value substrate failures (quota, corruption, IO)
    #[error("Storage Error: {0}")]
    StorageError(String),

    /// No configuration could be loaded from any source
    #[error("No configuration available")]
    ConfigUnavailable,

    /// Invalid input parameters
    #[error("Invalid Input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        PortalError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<serde_yaml::Error> for PortalError {
    fn from(err: serde_yaml::Error) -> Self {
        PortalError::ConfigError(format!("YAML error: {}", err))
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PortalError::TimeoutError(err.to_string())
        } else if let Some(status) = err.status() {
            PortalError::HttpStatus(status.as_u16())
        } else {
            PortalError::NetworkError(err.to_string())
        }
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::StorageError(format!("IO error: {}", err))
    }
}

impl PortalError {
    /// Whether the fetch loop may retry after this failure
    pub fn retryable(&self) -> bool {
        match self {
            PortalError::NetworkError(_) => true,
            PortalError::HttpStatus(_) => true,
            PortalError::TimeoutError(_) => true,
            PortalError::ProxyError(_) => false, // envelope is checked once, after the loop
            PortalError::FeedParseError(_) => false, // data-quality failure, a retry gets the same bytes
            PortalError::ParseError(_) => false,
            PortalError::ConfigError(_) => false,
            PortalError::StorageError(_) => false, // cache layers degrade instead of retrying
            PortalError::ConfigUnavailable => false,
            PortalError::InvalidInput(_) => false,
        }
    }
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Calculate delay for a given attempt (exponential backoff, capped)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // The cap takes over long before the exponent clamp can matter.
        let exponent = (attempt - 1).min(32);
        let delay_ms = self.base_delay.as_millis() * (2_u128.pow(exponent));
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backoff_sequence_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        // capped from here on
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(8000));
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(0));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PortalError::NetworkError("reset".into()).retryable());
        assert!(PortalError::HttpStatus(503).retryable());
        assert!(PortalError::TimeoutError("10s".into()).retryable());
        assert!(!PortalError::ProxyError("no contents".into()).retryable());
        assert!(!PortalError::FeedParseError("bad xml".into()).retryable());
        assert!(!PortalError::ConfigUnavailable.retryable());
    }

    #[test]
    fn test_reqwest_status_maps_to_http_status() {
        // reqwest errors without a status map to NetworkError; the status
        // branch is exercised end-to-end in the integration tests.
        let err = PortalError::HttpStatus(404);
        assert_eq!(err.to_string(), "HTTP Status Error: 404");
    }
}

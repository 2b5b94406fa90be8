//! Sliding-window rate limiting, one independent window per resource key.
//! Guards against re-fetch storms when a feed is polled faster than its
//! cache TTL can absorb.

use dashmap::DashMap;
use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune timestamps older than `window`, then admit iff fewer than `max`
    /// remain. Admission records the current timestamp; a rejected attempt
    /// consumes no slot.
    pub fn is_allowed(&self, key: &str, max: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut record = self.windows.entry(key.to_string()).or_default();

        while let Some(front) = record.front() {
            if now.duration_since(*front) >= window {
                record.pop_front();
            } else {
                break;
            }
        }

        if record.len() >= max {
            debug!(
                "Rate limit hit for '{}': {}/{} requests in window",
                key,
                record.len(),
                max
            );
            return false;
        }

        record.push_back(now);
        true
    }

    /// Requests still counted inside `window` for `key`.
    pub fn active(&self, key: &str, window: Duration) -> usize {
        let now = Instant::now();
        match self.windows.get(key) {
            Some(record) => record
                .iter()
                .filter(|t| now.duration_since(**t) < window)
                .count(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admits_up_to_max_then_rejects() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            assert!(limiter.is_allowed("feed", 5, window));
        }
        // 6th in the same window: rejected, and not recorded
        assert!(!limiter.is_allowed("feed", 5, window));
        assert_eq!(limiter.active("feed", window), 5);
    }

    #[tokio::test]
    async fn test_window_expiry_frees_slots() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(80);

        for _ in 0..3 {
            assert!(limiter.is_allowed("feed", 3, window));
        }
        assert!(!limiter.is_allowed("feed", 3, window));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.is_allowed("feed", 3, window));
    }

    #[tokio::test]
    async fn test_keys_have_independent_windows() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        assert!(limiter.is_allowed("a", 1, window));
        assert!(!limiter.is_allowed("a", 1, window));
        // a saturated 'a' window leaves 'b' untouched
        assert!(limiter.is_allowed("b", 1, window));
        assert_eq!(limiter.active("b", window), 1);
    }
}

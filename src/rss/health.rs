//! Per-feed delivery health, kept in memory for diagnostics.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// Outcome ledger for a single feed URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedHealth {
    /// Whether the most recent attempt succeeded.
    pub ok: bool,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// When the feed was last attempted, success or not.
    pub last_attempt_at: DateTime<Utc>,
    /// Mean fetch-and-parse latency over successful attempts only.
    pub avg_latency_ms: f64,
    /// Number of successful attempts folded into the mean.
    pub success_count: u64,
}

/// Records fetch outcomes per feed URL. Failures never disturb the latency
/// mean; a success resets the consecutive-failure streak.
#[derive(Debug, Default)]
pub struct FeedHealthRegistry {
    records: DashMap<String, FeedHealth>,
}

impl FeedHealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one attempt into the feed's record. `latency_ms` is only
    /// meaningful when `ok` is true and is ignored otherwise.
    pub fn record(&self, feed_url: &str, ok: bool, latency_ms: u64) {
        let mut entry = self
            .records
            .entry(feed_url.to_string())
            .or_insert_with(|| FeedHealth {
                ok: true,
                consecutive_failures: 0,
                last_attempt_at: Utc::now(),
                avg_latency_ms: 0.0,
                success_count: 0,
            });
        let record = entry.value_mut();
        record.ok = ok;
        record.last_attempt_at = Utc::now();
        if ok {
            record.success_count += 1;
            record.avg_latency_ms +=
                (latency_ms as f64 - record.avg_latency_ms) / record.success_count as f64;
            record.consecutive_failures = 0;
            debug!(
                "Feed {} ok in {}ms (avg {:.1}ms over {})",
                feed_url, latency_ms, record.avg_latency_ms, record.success_count
            );
        } else {
            record.consecutive_failures += 1;
            debug!(
                "Feed {} failed ({} consecutive)",
                feed_url, record.consecutive_failures
            );
        }
    }

    /// A point-in-time copy of every record, detached from the registry.
    pub fn snapshot(&self) -> HashMap<String, FeedHealth> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

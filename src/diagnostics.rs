//! Display-shaped views of cache contents and feed health for the CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::cache::{CacheCategory, CacheEntryInfo};
use crate::rss::FeedHealth;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub summary: String,
    pub entries: Vec<CacheEntryRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryRow {
    pub name: String,
    pub age_secs: i64,
    pub size_kb: f64,
}

/// Shape raw cache entries for display, sorted by key: readable names plus
/// ages and sizes in KB.
pub fn cache_report(summary: String, mut entries: Vec<CacheEntryInfo>) -> CacheReport {
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    let rows = entries
        .into_iter()
        .map(|entry| CacheEntryRow {
            name: display_name(&entry.key),
            age_secs: entry.age_secs,
            size_kb: entry.size_bytes as f64 / 1024.0,
        })
        .collect();
    CacheReport {
        summary,
        entries: rows,
    }
}

/// Strip the category prefix off a storage key and label it.
fn display_name(key: &str) -> String {
    for category in CacheCategory::ALL {
        if let Some(rest) = key.strip_prefix(category.key_prefix()) {
            if rest.is_empty() {
                return category.label().to_string();
            }
            return format!("{}: {}", category.label(), rest);
        }
    }
    key.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRow {
    pub url: String,
    pub ok: bool,
    pub consecutive_failures: u32,
    pub avg_latency_ms: f64,
    pub success_count: u64,
    pub last_attempt_at: DateTime<Utc>,
}

/// Flatten a health snapshot into rows sorted by feed URL.
pub fn health_rows(snapshot: HashMap<String, FeedHealth>) -> Vec<HealthRow> {
    let mut rows: Vec<HealthRow> = snapshot
        .into_iter()
        .map(|(url, health)| HealthRow {
            url,
            ok: health.ok,
            consecutive_failures: health.consecutive_failures,
            avg_latency_ms: health.avg_latency_ms,
            success_count: health.success_count,
            last_attempt_at: health.last_attempt_at,
        })
        .collect();
    rows.sort_by(|a, b| a.url.cmp(&b.url));
    rows
}

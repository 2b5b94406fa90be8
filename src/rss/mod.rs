//! Feed parsing and the cache-backed retrieval service, with per-feed health
//! tracking on the side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod health;
pub mod parser;
pub mod service;

pub use health::{FeedHealth, FeedHealthRegistry};
pub use service::FeedService;

/// One normalized feed item. The parser is the only producer and guarantees
/// a non-empty title and a url, so rendering consumers never branch on
/// missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

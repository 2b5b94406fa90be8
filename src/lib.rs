pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod net;
pub mod portal;
pub mod rss;
pub mod search;

// Re-export what most callers touch
pub use error::{PortalError, Result};
pub use portal::Portal;

// Re-export the retrieval-layer building blocks
pub use cache::{CacheCategory, CachePolicy, CacheStore, FileStorage, MemoryStorage, StorageBackend};
pub use config::{
    ConfigHandle, ConfigService, ConfigSource, LoadedConfig, PortalConfig, RuntimeOptions,
};
pub use rss::{FeedHealthRegistry, FeedItem, FeedService};

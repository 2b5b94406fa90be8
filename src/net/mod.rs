//! Network layer: the resilient fetch client and the per-key rate limiter.

pub mod fetcher;
pub mod rate_limiter;

pub use fetcher::FetchClient;
pub use rate_limiter::RateLimiter;

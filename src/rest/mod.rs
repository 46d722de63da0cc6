//! REST backfill layer
//!
//! Rate-limited, retried batch fetches that complement the push streams.

mod fetcher;
mod limiter;
mod models;

pub use fetcher::{BatchFetcher, RetryPolicy};
pub use limiter::RateLimiter;
pub use models::{DepthEndpoint, Kline, KlineEndpoint, RestEndpoint, Ticker24h, TickerEndpoint};

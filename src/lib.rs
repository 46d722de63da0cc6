//! Market Sync - real-time market data synchronization library
//!
//! Keeps a local order book and ticker consistent with an exchange's streaming
//! feed, and backs the streams with rate-limited batch REST fetches.

pub mod config;
pub mod error;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod rest;
pub mod service;
pub mod ticker;
pub mod websocket;

pub use config::{Config, FetchSettings, StreamSettings};
pub use error::{MarketDataError, Result};
pub use orderbook::{Level, OrderBook, OrderBookSnapshot, OrderBookSync, Side};
pub use parser::{DepthDelta, DepthMessage, DepthSnapshot, PriceLevel, TickerEvent};
pub use rest::{BatchFetcher, RateLimiter, RetryPolicy};
pub use service::{MarketService, OrderBookService, Reduction, StreamReducer, TickerService};
pub use ticker::{TickerSnapshot, TickerSync};
pub use websocket::{ConnectionPhase, ConnectionState, StreamConnection, StreamEvent};

//! Configuration module for the market data sync core

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::MarketDataError;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Symbols to track (e.g., ["BTCUSDT", "ETHUSDT"]); the first one is streamed
    pub symbols: Vec<String>,

    /// WebSocket endpoint; topics are appended as `<endpoint>/<topic>`
    pub ws_endpoint: String,

    /// REST API endpoint for batch fetches
    pub rest_endpoint: String,

    /// Depth levels for the partial book stream (`<symbol>@depth<levels>`)
    pub depth_levels: u32,

    /// Stream connection settings
    pub reconnect_delay_ms: u64,
    pub resync_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub recv_timeout_secs: u64,

    /// REST rate limiting
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_ms: u64,
    pub rate_limit_poll_ms: u64,

    /// Batch fetch settings
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub http_timeout_secs: u64,

    /// How often the binary refreshes batch tickers
    pub ticker_poll_interval_secs: u64,

    /// Port for the health/metrics server
    pub health_port: u16,
}

/// Settings consumed by a single stream connection
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub ws_endpoint: String,
    pub reconnect_delay: Duration,
    pub resync_delay: Duration,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
}

/// Settings consumed by the rate limiter and batch fetcher
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub rest_endpoint: String,
    pub max_requests: usize,
    pub window: Duration,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| defaults.symbols.join(","))
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let config = Self {
            symbols,
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            rest_endpoint: env::var("REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            depth_levels: env_or("DEPTH_LEVELS", defaults.depth_levels),
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            resync_delay_ms: env_or("RESYNC_DELAY_MS", defaults.resync_delay_ms),
            connect_timeout_secs: env_or("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            recv_timeout_secs: env_or("RECV_TIMEOUT_SECS", defaults.recv_timeout_secs),
            rate_limit_max_requests: env_or(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            rate_limit_window_ms: env_or("RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window_ms),
            rate_limit_poll_ms: env_or("RATE_LIMIT_POLL_MS", defaults.rate_limit_poll_ms),
            batch_size: env_or("BATCH_SIZE", defaults.batch_size),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", defaults.retry_base_delay_ms),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            ticker_poll_interval_secs: env_or(
                "TICKER_POLL_INTERVAL_SECS",
                defaults.ticker_poll_interval_secs,
            ),
            health_port: env_or("HEALTH_PORT", defaults.health_port),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the sync core cannot run with
    pub fn validate(&self) -> Result<(), MarketDataError> {
        if self.symbols.is_empty() {
            return Err(MarketDataError::ConfigError(
                "at least one symbol is required".to_string(),
            ));
        }
        if self.depth_levels == 0 {
            return Err(MarketDataError::ConfigError(
                "depth_levels must be positive".to_string(),
            ));
        }
        if self.rate_limit_max_requests == 0 || self.rate_limit_window_ms == 0 {
            return Err(MarketDataError::ConfigError(
                "rate limit window and max requests must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 || self.max_retries == 0 {
            return Err(MarketDataError::ConfigError(
                "batch_size and max_retries must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            ws_endpoint: self.ws_endpoint.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            resync_delay: Duration::from_millis(self.resync_delay_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            recv_timeout: Duration::from_secs(self.recv_timeout_secs),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            rest_endpoint: self.rest_endpoint.clone(),
            max_requests: self.rate_limit_max_requests,
            window: Duration::from_millis(self.rate_limit_window_ms),
            poll_interval: Duration::from_millis(self.rate_limit_poll_ms),
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            ws_endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            rest_endpoint: "https://api.binance.com/api/v3".to_string(),
            depth_levels: 20,
            reconnect_delay_ms: 5000,
            resync_delay_ms: 500,
            connect_timeout_secs: 10,
            recv_timeout_secs: 45,
            rate_limit_max_requests: 10,
            rate_limit_window_ms: 1000,
            rate_limit_poll_ms: 20,
            batch_size: 5,
            max_retries: 3,
            retry_base_delay_ms: 500,
            http_timeout_secs: 10,
            ticker_poll_interval_secs: 60,
            health_port: 9090,
        }
    }
}

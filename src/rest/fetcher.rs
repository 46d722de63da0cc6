//! Rate-limited batch REST fetcher
//!
//! Symbols are fetched in chunks of `batch_size`; requests within a chunk run
//! concurrently, each gated by the shared [`RateLimiter`] and retried on its own.
//! A symbol that yields no data is left out of the result map.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::models::{DepthEndpoint, Kline, KlineEndpoint, RestEndpoint, TickerEndpoint};
use super::RateLimiter;
use crate::config::FetchSettings;
use crate::error::Result;
use crate::metrics;
use crate::parser::DepthSnapshot;
use crate::ticker::TickerSnapshot;

/// Linear backoff retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Batched REST client sharing one rate limiter
pub struct BatchFetcher {
    client: reqwest::Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl BatchFetcher {
    pub fn new(settings: &FetchSettings, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.rest_endpoint.trim_end_matches('/').to_string(),
            limiter,
            retry: RetryPolicy {
                max_retries: settings.max_retries.max(1),
                base_delay: settings.retry_base_delay,
            },
            batch_size: settings.batch_size.max(1),
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch `endpoint` for every symbol; returns once the whole batch is done
    pub async fn fetch_batch<E: RestEndpoint>(
        &self,
        endpoint: &E,
        symbols: &[String],
    ) -> HashMap<String, E::Output> {
        let mut results = HashMap::with_capacity(symbols.len());

        for (index, chunk) in symbols.chunks(self.batch_size).enumerate() {
            debug!(endpoint = endpoint.name(), chunk = index, size = chunk.len(), "Fetching chunk");

            let fetches = chunk.iter().map(|symbol| async move {
                let outcome = self.fetch_one(endpoint, symbol).await;
                (symbol.clone(), outcome)
            });

            for (symbol, outcome) in join_all(fetches).await {
                if let Some(value) = outcome {
                    results.insert(symbol, value);
                }
            }
        }

        info!(
            endpoint = endpoint.name(),
            requested = symbols.len(),
            fetched = results.len(),
            "Batch fetch complete"
        );
        results
    }

    /// 24h tickers for each symbol
    pub async fn fetch_tickers(&self, symbols: &[String]) -> HashMap<String, TickerSnapshot> {
        self.fetch_batch(&TickerEndpoint, symbols)
            .await
            .into_iter()
            .map(|(symbol, ticker)| (symbol, ticker.into()))
            .collect()
    }

    /// Historical candles for each symbol
    pub async fn fetch_klines(
        &self,
        symbols: &[String],
        interval: &str,
        limit: u32,
    ) -> HashMap<String, Vec<Kline>> {
        let endpoint = KlineEndpoint {
            interval: interval.to_string(),
            limit,
        };
        self.fetch_batch(&endpoint, symbols).await
    }

    /// REST depth snapshots for each symbol
    pub async fn fetch_depth_snapshots(
        &self,
        symbols: &[String],
        limit: u32,
    ) -> HashMap<String, DepthSnapshot> {
        self.fetch_batch(&DepthEndpoint { limit }, symbols).await
    }

    /// Fetch one symbol with retries. `None` means no data for this symbol.
    async fn fetch_one<E: RestEndpoint>(&self, endpoint: &E, symbol: &str) -> Option<E::Output> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let query = endpoint.query(symbol);
        let max_retries = self.retry.max_retries;

        for attempt in 1..=max_retries {
            self.limiter.acquire().await;

            let response = match self.client.get(&url).query(&query).send().await {
                Ok(response) => response,
                Err(e) => {
                    record(endpoint, "transport_error");
                    if attempt == max_retries {
                        error!(symbol = %symbol, endpoint = endpoint.name(), error = %e, "Request failed on final attempt");
                        return None;
                    }
                    warn!(symbol = %symbol, attempt, error = %e, "Request failed, retrying");
                    sleep(self.retry.delay_for(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return match response.json::<E::Output>().await {
                    Ok(value) => {
                        record(endpoint, "ok");
                        Some(value)
                    }
                    Err(e) => {
                        record(endpoint, "decode_error");
                        warn!(symbol = %symbol, endpoint = endpoint.name(), error = %e, "Unreadable payload, treating as no data");
                        None
                    }
                };
            }

            if status.is_server_error() {
                record(endpoint, "server_error");
                warn!(symbol = %symbol, attempt, status = %status, "Server error");
                if attempt < max_retries {
                    sleep(self.retry.delay_for(attempt)).await;
                }
                continue;
            }

            record(endpoint, "client_error");
            debug!(symbol = %symbol, status = %status, "Non-retryable status, treating as no data");
            return None;
        }

        warn!(symbol = %symbol, endpoint = endpoint.name(), max_retries, "Retries exhausted");
        None
    }
}

fn record<E: RestEndpoint>(endpoint: &E, outcome: &str) {
    metrics::get()
        .rest_requests
        .with_label_values(&[endpoint.name(), outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_new_clamps_settings() {
        let settings = FetchSettings {
            rest_endpoint: "http://localhost:1/api/".to_string(),
            max_requests: 10,
            window: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
            batch_size: 0,
            max_retries: 0,
            retry_base_delay: Duration::from_millis(10),
            http_timeout: Duration::from_secs(1),
        };
        let limiter = Arc::new(RateLimiter::from_settings(&settings));
        let fetcher = BatchFetcher::new(&settings, limiter).unwrap();
        assert_eq!(fetcher.batch_size, 1);
        assert_eq!(fetcher.retry_policy().max_retries, 1);
        assert_eq!(fetcher.base_url, "http://localhost:1/api");
    }
}

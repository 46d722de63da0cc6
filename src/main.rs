//! Market Sync - stream runner
//!
//! Streams the order book and ticker for the first configured symbol, refreshes
//! 24h tickers for all symbols over REST, and serves health and metrics.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_sync::{BatchFetcher, Config, OrderBookService, RateLimiter, TickerService};

/// Application state shared across tasks
struct AppState {
    orderbook: OrderBookService,
    ticker: TickerService,
    fetcher: BatchFetcher,
    config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting market sync");

    let config = Config::load()?;
    info!(symbols = ?config.symbols, "Configuration loaded");

    let symbol = config
        .symbols
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("no symbols configured"))?;

    let fetch_settings = config.fetch_settings();
    let limiter = Arc::new(RateLimiter::from_settings(&fetch_settings));
    let fetcher = BatchFetcher::new(&fetch_settings, limiter)?;

    let state = Arc::new(AppState {
        orderbook: OrderBookService::new(config.stream_settings()),
        ticker: TickerService::new(config.stream_settings()),
        fetcher,
        config,
    });

    state
        .orderbook
        .connect(&symbol, state.config.depth_levels)
        .await?;
    state.ticker.connect(&symbol, 0).await?;

    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_state).await {
            warn!(error = %e, "Health server error");
        }
    });

    let status_state = state.clone();
    tokio::spawn(async move { log_status(status_state).await });

    let poll_state = state.clone();
    tokio::spawn(async move { poll_tickers(poll_state).await });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    state.orderbook.close().await;
    state.ticker.close().await;

    info!("Market sync stopped");
    Ok(())
}

/// Periodic order book status logging
async fn log_status(state: Arc<AppState>) {
    let mut ticks = interval(Duration::from_secs(30));
    loop {
        ticks.tick().await;

        match state.orderbook.latest() {
            Some(book) => info!(
                symbol = %book.symbol,
                last_update_id = book.last_update_id,
                mid_price = ?book.mid_price(),
                spread_bps = ?book.spread_bps(),
                bid_levels = book.bids.len(),
                ask_levels = book.asks.len(),
                "Order book status"
            ),
            None => warn!(
                connection = ?state.orderbook.connection_state(),
                error = ?state.orderbook.error_message(),
                "Order book not yet available"
            ),
        }
    }
}

/// Refresh 24h tickers for every configured symbol through the batch fetcher
async fn poll_tickers(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.ticker_poll_interval_secs.max(1));
    let mut ticks = interval(period);
    loop {
        ticks.tick().await;

        let tickers = state.fetcher.fetch_tickers(&state.config.symbols).await;
        for symbol in &state.config.symbols {
            match tickers.get(symbol) {
                Some(ticker) => info!(
                    symbol = %symbol,
                    last_price = %ticker.last_price,
                    change_pct = %ticker.price_change_percent,
                    "24h ticker"
                ),
                None => warn!(symbol = %symbol, "No ticker data"),
            }
        }
    }
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.health_port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let book = state.orderbook.latest();
    let healthy = state.orderbook.is_connected() && state.ticker.is_connected();

    Json(serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "component": "market-sync",
        "symbol": state.orderbook.current_symbol(),
        "orderbook_connected": state.orderbook.is_connected(),
        "ticker_connected": state.ticker.is_connected(),
        "last_update_id": book.as_ref().map(|b| b.last_update_id),
        "error": state.orderbook.error_message().or_else(|| state.ticker.error_message()),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> Result<String, StatusCode> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

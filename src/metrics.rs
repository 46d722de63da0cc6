//! Prometheus counters for the sync core
//!
//! Registered once in the default registry; the binary serves them on `/metrics`.

use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use std::sync::OnceLock;

pub struct Metrics {
    /// Successful stream handshakes, by topic
    pub stream_sessions: IntCounterVec,
    /// Failed connects and dropped sessions, by topic
    pub stream_failures: IntCounterVec,
    /// Data frames received, by topic
    pub stream_messages: IntCounterVec,
    /// Depth sequence gaps that forced a resync, by symbol
    pub depth_resyncs: IntCounterVec,
    /// Messages that matched no known shape, by symbol
    pub malformed_messages: IntCounterVec,
    /// REST calls, by endpoint and outcome
    pub rest_requests: IntCounterVec,
    /// Times a caller had to wait for the rate limiter
    pub rate_limit_waits: IntCounter,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Global metrics handle
pub fn get() -> &'static Metrics {
    METRICS.get_or_init(|| Metrics {
        stream_sessions: register_int_counter_vec!(
            "market_stream_sessions_total",
            "Successful stream handshakes",
            &["topic"]
        )
        .expect("valid metric definition"),
        stream_failures: register_int_counter_vec!(
            "market_stream_failures_total",
            "Stream connection failures",
            &["topic"]
        )
        .expect("valid metric definition"),
        stream_messages: register_int_counter_vec!(
            "market_stream_messages_total",
            "Stream data frames received",
            &["topic"]
        )
        .expect("valid metric definition"),
        depth_resyncs: register_int_counter_vec!(
            "market_depth_resyncs_total",
            "Depth sequence gaps that forced a resync",
            &["symbol"]
        )
        .expect("valid metric definition"),
        malformed_messages: register_int_counter_vec!(
            "market_malformed_messages_total",
            "Discarded messages that failed to parse",
            &["symbol"]
        )
        .expect("valid metric definition"),
        rest_requests: register_int_counter_vec!(
            "market_rest_requests_total",
            "REST requests by outcome",
            &["endpoint", "outcome"]
        )
        .expect("valid metric definition"),
        rate_limit_waits: register_int_counter!(
            "market_rate_limit_waits_total",
            "Rate limiter polls that found the window full"
        )
        .expect("valid metric definition"),
    })
}

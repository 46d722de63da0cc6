//! Ticker stream normalization
//!
//! Republishes 24h ticker events as [`TickerSnapshot`]s. No sequencing is
//! involved; every well-formed event for the subscribed symbol replaces the last.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::Result;
use crate::metrics;
use crate::parser::{ticker_topic, TickerEvent};
use crate::service::{Reduction, StreamReducer};

/// Normalized 24h ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub event_time: DateTime<Utc>,
}

/// Convert exchange milliseconds to a UTC timestamp, falling back to now
pub(crate) fn millis_to_utc(millis: u64) -> DateTime<Utc> {
    i64::try_from(millis)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

impl From<TickerEvent> for TickerSnapshot {
    fn from(event: TickerEvent) -> Self {
        Self {
            symbol: event.symbol,
            last_price: event.last_price,
            price_change: event.price_change,
            price_change_percent: event.price_change_percent,
            high_price: event.high_price,
            low_price: event.low_price,
            volume: event.volume,
            quote_volume: event.quote_volume,
            event_time: millis_to_utc(event.event_time),
        }
    }
}

/// Reducer over one symbol's ticker stream
#[derive(Debug)]
pub struct TickerSync {
    symbol: String,
}

impl StreamReducer for TickerSync {
    type Output = TickerSnapshot;

    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
        }
    }

    fn topic(symbol: &str, _levels: u32) -> Result<String> {
        Ok(ticker_topic(symbol))
    }

    fn on_message(&mut self, raw: &str) -> Reduction<TickerSnapshot> {
        match TickerEvent::parse(raw) {
            Ok(event) if event.symbol.eq_ignore_ascii_case(&self.symbol) => {
                Reduction::Publish(event.into())
            }
            Ok(event) => {
                trace!(expected = %self.symbol, got = %event.symbol, "Ignoring ticker for other symbol");
                Reduction::Ignore
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Discarding malformed ticker message");
                metrics::get()
                    .malformed_messages
                    .with_label_values(&[self.symbol.as_str()])
                    .inc();
                Reduction::Ignore
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker_json(symbol: &str, last: &str) -> String {
        format!(
            r#"{{"e":"24hrTicker","E":1700000000000,"s":"{}","p":"1.5","P":"2.0","c":"{}","h":"80","l":"70","v":"1000","q":"75000"}}"#,
            symbol, last
        )
    }

    #[test]
    fn test_publishes_matching_symbol() {
        let mut sync = TickerSync::new("btcusdt");
        match sync.on_message(&ticker_json("BTCUSDT", "75.25")) {
            Reduction::Publish(ticker) => {
                assert_eq!(ticker.symbol, "BTCUSDT");
                assert_eq!(ticker.last_price, dec!(75.25));
                assert_eq!(ticker.event_time.timestamp_millis(), 1_700_000_000_000);
            }
            other => panic!("Expected Publish, got {:?}", other),
        }
    }

    #[test]
    fn test_ignores_other_symbols_and_garbage() {
        let mut sync = TickerSync::new("BTCUSDT");
        assert!(matches!(
            sync.on_message(&ticker_json("ETHUSDT", "1")),
            Reduction::Ignore
        ));
        assert!(matches!(sync.on_message("{}"), Reduction::Ignore));
        assert!(matches!(
            sync.on_message(&ticker_json("BTCUSDT", "NaN-ish")),
            Reduction::Ignore
        ));
    }

    #[test]
    fn test_topic() {
        assert_eq!(<TickerSync as StreamReducer>::topic("BTCUSDT", 0).unwrap(), "btcusdt@ticker");
    }
}

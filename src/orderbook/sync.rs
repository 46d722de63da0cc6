//! Depth stream reconciliation
//!
//! Turns raw depth messages into published order book snapshots, and asks for a
//! resync whenever the delta sequence breaks.

use tracing::{debug, trace, warn};

use super::{OrderBook, OrderBookSnapshot};
use crate::error::{MarketDataError, Result};
use crate::metrics;
use crate::parser::{depth_topic, DepthMessage};
use crate::service::{Reduction, StreamReducer};

/// Stateful reducer over one symbol's depth stream
#[derive(Debug)]
pub struct OrderBookSync {
    book: OrderBook,
    /// Set on a sequence gap; cleared when a new session starts
    needs_reconnect: bool,
}

impl OrderBookSync {
    pub fn new(symbol: &str) -> Self {
        Self {
            book: OrderBook::new(symbol),
            needs_reconnect: false,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn needs_reconnect(&self) -> bool {
        self.needs_reconnect
    }

    /// Apply one raw message.
    ///
    /// While a resync is pending, snapshots still replace the book but deltas
    /// are dropped.
    pub fn handle_message(&mut self, raw: &str) -> Reduction<OrderBookSnapshot> {
        match DepthMessage::parse(raw) {
            Ok(DepthMessage::Snapshot(snapshot)) => {
                self.book.apply_snapshot(&snapshot);
                debug!(
                    symbol = %self.book.symbol(),
                    last_update_id = snapshot.last_update_id,
                    "Applied depth snapshot"
                );
                Reduction::Publish(self.book.snapshot())
            }
            Ok(DepthMessage::Delta(_)) if self.needs_reconnect => {
                trace!(symbol = %self.book.symbol(), "Awaiting resync, dropping delta");
                Reduction::Ignore
            }
            Ok(DepthMessage::Delta(delta)) => match self.book.apply_delta(&delta) {
                Ok(()) => Reduction::Publish(self.book.snapshot()),
                Err(MarketDataError::SequenceGap { expected, got }) => {
                    warn!(
                        symbol = %self.book.symbol(),
                        expected,
                        got,
                        "Depth sequence gap, requesting resync"
                    );
                    metrics::get()
                        .depth_resyncs
                        .with_label_values(&[self.book.symbol()])
                        .inc();
                    self.needs_reconnect = true;
                    Reduction::Resync
                }
                Err(e) => {
                    warn!(symbol = %self.book.symbol(), error = %e, "Failed to apply delta");
                    Reduction::Ignore
                }
            },
            Err(e) => {
                warn!(
                    symbol = %self.book.symbol(),
                    error = %e,
                    len = raw.len(),
                    "Discarding malformed depth message"
                );
                metrics::get()
                    .malformed_messages
                    .with_label_values(&[self.book.symbol()])
                    .inc();
                Reduction::Ignore
            }
        }
    }
}

impl StreamReducer for OrderBookSync {
    type Output = OrderBookSnapshot;

    fn new(symbol: &str) -> Self {
        OrderBookSync::new(symbol)
    }

    fn topic(symbol: &str, levels: u32) -> Result<String> {
        if levels == 0 {
            return Err(MarketDataError::ConfigError(
                "depth levels must be positive".to_string(),
            ));
        }
        Ok(depth_topic(symbol, levels))
    }

    fn on_session_start(&mut self) {
        // The feed re-sends a snapshot after reconnect; continuity restarts from it.
        self.needs_reconnect = false;
        self.book.reset();
    }

    fn on_message(&mut self, raw: &str) -> Reduction<OrderBookSnapshot> {
        self.handle_message(raw)
    }
}

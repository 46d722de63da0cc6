//! Core order book implementation
//!
//! Uses BTreeMap keyed by price so publication is already price-sorted.

use chrono::Utc;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{Level, OrderBookSnapshot, Side};
use crate::error::{MarketDataError, Result};
use crate::parser::{DepthDelta, DepthSnapshot, PriceLevel};

/// Order book for a single symbol
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Last applied update ID, 0 until the first snapshot or delta
    last_update_id: u64,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: 0,
        }
    }

    /// Replace the whole book with a snapshot, dropping zero-quantity levels
    pub fn apply_snapshot(&mut self, snapshot: &DepthSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            self.update_side(Side::Bid, level);
        }

        for level in &snapshot.asks {
            self.update_side(Side::Ask, level);
        }

        self.last_update_id = snapshot.last_update_id;
    }

    /// Merge a delta into the book.
    ///
    /// Once initialized, a delta is only applied if its first update id directly
    /// follows the last applied id. On a gap the book is left untouched and
    /// `SequenceGap` is returned.
    pub fn apply_delta(&mut self, delta: &DepthDelta) -> Result<()> {
        let expected = self.last_update_id.checked_add(1);
        if self.last_update_id > 0 && expected != Some(delta.first_update_id) {
            // Nothing can follow u64::MAX
            return Err(MarketDataError::SequenceGap {
                expected: expected.unwrap_or(u64::MAX),
                got: delta.first_update_id,
            });
        }

        for level in &delta.bids {
            self.update_side(Side::Bid, level);
        }

        for level in &delta.asks {
            self.update_side(Side::Ask, level);
        }

        self.last_update_id = delta.final_update_id;
        Ok(())
    }

    /// Update a single price level; zero quantity removes it
    fn update_side(&mut self, side: Side, level: &PriceLevel) {
        match side {
            Side::Bid => {
                if level.quantity.is_zero() {
                    self.bids.remove(&Reverse(level.price));
                } else {
                    self.bids.insert(Reverse(level.price), level.quantity);
                }
            }
            Side::Ask => {
                if level.quantity.is_zero() {
                    self.asks.remove(&level.price);
                } else {
                    self.asks.insert(level.price, level.quantity);
                }
            }
        }
    }

    /// Drop all levels and the continuity watermark
    pub fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_id = 0;
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get last update ID
    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn is_initialized(&self) -> bool {
        self.last_update_id > 0
    }

    pub fn quantity_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        match side {
            Side::Bid => self.bids.get(&Reverse(price)).copied(),
            Side::Ask => self.asks.get(&price).copied(),
        }
    }

    /// Build the sorted view for publishing
    pub fn snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot {
            symbol: self.symbol.clone(),
            bids: self
                .bids
                .iter()
                .map(|(Reverse(p), q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(p, q)| Level {
                    price: *p,
                    quantity: *q,
                })
                .collect(),
            last_update_id: self.last_update_id,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    fn delta(first: u64, last: u64, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> DepthDelta {
        DepthDelta {
            first_update_id: first,
            final_update_id: last,
            bids,
            asks,
        }
    }

    fn create_test_book() -> OrderBook {
        let mut book = OrderBook::new("BTCUSDT");
        let snapshot = DepthSnapshot {
            last_update_id: 100,
            bids: vec![level(dec!(50000), dec!(1.0)), level(dec!(49999), dec!(2.0))],
            asks: vec![level(dec!(50001), dec!(1.5)), level(dec!(50002), dec!(2.5))],
        };
        book.apply_snapshot(&snapshot);
        book
    }

    #[test]
    fn test_snapshot_then_delta_scenario() {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: 100,
            bids: vec![level(dec!(10.0), dec!(1))],
            asks: vec![level(dec!(10.5), dec!(1))],
        });

        book.apply_delta(&delta(101, 101, vec![level(dec!(10.0), dec!(0))], vec![]))
            .unwrap();

        let state = book.snapshot();
        assert!(state.bids.is_empty());
        assert_eq!(
            state.asks,
            vec![Level {
                price: dec!(10.5),
                quantity: dec!(1)
            }]
        );
        assert_eq!(state.asks[0].price.to_string(), "10.5");
        assert_eq!(state.last_update_id, 101);
    }

    #[test]
    fn test_snapshot_skips_zero_levels() {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: 7,
            bids: vec![level(dec!(1), dec!(0)), level(dec!(2), dec!(3))],
            asks: vec![level(dec!(4), dec!(0.000))],
        });

        let state = book.snapshot();
        assert_eq!(state.bids.len(), 1);
        assert!(state.asks.is_empty());
        assert!(state.bids.iter().all(|l| !l.quantity.is_zero()));
    }

    #[test]
    fn test_snapshot_replaces_wholesale() {
        let mut book = create_test_book();
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: 500,
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![level(dec!(101), dec!(1)), level(dec!(102), dec!(0))],
        });

        let state = book.snapshot();
        assert_eq!(state.bids.iter().map(|l| l.price).collect::<Vec<_>>(), vec![dec!(100)]);
        assert_eq!(state.asks.iter().map(|l| l.price).collect::<Vec<_>>(), vec![dec!(101)]);
        assert_eq!(book.last_update_id(), 500);
        assert_eq!(book.quantity_at(Side::Bid, dec!(50000)), None);
    }

    #[test]
    fn test_zero_quantity_removes_level() {
        let mut book = create_test_book();
        book.apply_delta(&delta(
            101,
            102,
            vec![level(dec!(49999), dec!(0.00))],
            vec![level(dec!(50002), dec!(0))],
        ))
        .unwrap();

        assert_eq!(book.quantity_at(Side::Bid, dec!(49999)), None);
        assert_eq!(book.quantity_at(Side::Ask, dec!(50002)), None);
        assert_eq!(book.quantity_at(Side::Bid, dec!(50000)), Some(dec!(1.0)));
    }

    #[test]
    fn test_apply_update() {
        let mut book = create_test_book();
        book.apply_delta(&delta(101, 102, vec![level(dec!(50000), dec!(2.0))], vec![]))
            .unwrap();

        assert_eq!(book.last_update_id(), 102);
        assert_eq!(book.quantity_at(Side::Bid, dec!(50000)), Some(dec!(2.0)));
    }

    #[test]
    fn test_gap_leaves_book_unchanged() {
        let mut book = create_test_book();
        let before = book.snapshot();

        for first in [100, 102, 150, 1] {
            let result = book.apply_delta(&delta(
                first,
                first + 5,
                vec![level(dec!(1), dec!(1))],
                vec![level(dec!(50001), dec!(0))],
            ));
            match result {
                Err(MarketDataError::SequenceGap { expected, got }) => {
                    assert_eq!(expected, 101);
                    assert_eq!(got, first);
                }
                other => panic!("Expected SequenceGap, got {:?}", other),
            }
        }

        let after = book.snapshot();
        assert_eq!(before.bids, after.bids);
        assert_eq!(before.asks, after.asks);
        assert_eq!(after.last_update_id, 100);
    }

    #[test]
    fn test_max_update_id_has_no_successor() {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: u64::MAX,
            bids: vec![level(dec!(10), dec!(1))],
            asks: vec![],
        });

        for first in [0, 5, u64::MAX] {
            let result = book.apply_delta(&delta(first, first, vec![level(dec!(10), dec!(0))], vec![]));
            assert!(matches!(
                result,
                Err(MarketDataError::SequenceGap { got, .. }) if got == first
            ));
        }

        assert_eq!(book.last_update_id(), u64::MAX);
        assert_eq!(book.quantity_at(Side::Bid, dec!(10)), Some(dec!(1)));
    }

    #[test]
    fn test_delta_on_uninitialized_book_is_applied() {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_delta(&delta(42, 45, vec![level(dec!(9), dec!(1))], vec![]))
            .unwrap();
        assert_eq!(book.last_update_id(), 45);
        assert!(book.is_initialized());
    }

    #[test]
    fn test_published_sort_order() {
        let mut book = OrderBook::new("BTCUSDT");
        book.apply_snapshot(&DepthSnapshot {
            last_update_id: 1,
            bids: vec![
                level(dec!(9.5), dec!(1)),
                level(dec!(10), dec!(1)),
                level(dec!(9.75), dec!(1)),
                level(dec!(10.0), dec!(4)),
            ],
            asks: vec![
                level(dec!(12), dec!(1)),
                level(dec!(10.25), dec!(1)),
                level(dec!(11), dec!(1)),
            ],
        });

        let state = book.snapshot();
        assert!(state.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(state.asks.windows(2).all(|w| w[0].price < w[1].price));
        assert_eq!(state.bids.len(), 3);
        assert_eq!(state.bids[0].quantity, dec!(4));
        assert_eq!(state.mid_price(), Some(dec!(10.125)));
        assert_eq!(state.spread(), Some(dec!(0.25)));
    }

    #[test]
    fn test_reset() {
        let mut book = create_test_book();
        book.reset();
        assert!(!book.is_initialized());
        assert!(book.snapshot().is_empty());
    }
}

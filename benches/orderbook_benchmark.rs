//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_sync::orderbook::{OrderBook, OrderBookSync};
use market_sync::parser::{DepthDelta, DepthSnapshot, PriceLevel};
use rust_decimal::Decimal;
use std::str::FromStr;

fn create_snapshot(levels: usize) -> DepthSnapshot {
    let bids: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel {
            price: Decimal::from(50000 - i as i64),
            quantity: Decimal::from_str("1.5").unwrap(),
        })
        .collect();

    let asks: Vec<PriceLevel> = (0..levels)
        .map(|i| PriceLevel {
            price: Decimal::from(50001 + i as i64),
            quantity: Decimal::from_str("1.5").unwrap(),
        })
        .collect();

    DepthSnapshot {
        last_update_id: 1000,
        bids,
        asks,
    }
}

fn create_delta(first_update_id: u64) -> DepthDelta {
    DepthDelta {
        first_update_id,
        final_update_id: first_update_id,
        bids: vec![PriceLevel {
            price: Decimal::from(49999),
            quantity: Decimal::from_str("2.0").unwrap(),
        }],
        asks: vec![PriceLevel {
            price: Decimal::from(50001),
            quantity: Decimal::from_str("2.5").unwrap(),
        }],
    }
}

fn benchmark_apply_snapshot(c: &mut Criterion) {
    let snapshot = create_snapshot(100);

    c.bench_function("apply_snapshot_100_levels", |b| {
        b.iter(|| {
            let mut book = OrderBook::new("BTCUSDT");
            book.apply_snapshot(black_box(&snapshot));
        })
    });
}

fn benchmark_apply_delta(c: &mut Criterion) {
    let mut book = OrderBook::new("BTCUSDT");
    book.apply_snapshot(&create_snapshot(100));

    c.bench_function("apply_delta", |b| {
        b.iter(|| {
            let next = book.last_update_id() + 1;
            let _ = book.apply_delta(black_box(&create_delta(next)));
        })
    });
}

fn benchmark_publish(c: &mut Criterion) {
    let mut book = OrderBook::new("BTCUSDT");
    book.apply_snapshot(&create_snapshot(100));

    c.bench_function("snapshot_100_levels", |b| {
        b.iter(|| {
            black_box(book.snapshot());
        })
    });
}

fn benchmark_handle_raw_message(c: &mut Criterion) {
    let raw = r#"{"lastUpdateId": 1027024, "bids": [["4.00000000", "431.00000000"], ["3.99000000", "9.00000000"]], "asks": [["4.00000200", "12.00000000"], ["4.01000000", "18.00000000"]]}"#;
    let mut sync = OrderBookSync::new("BNBBTC");

    c.bench_function("handle_raw_snapshot", |b| {
        b.iter(|| {
            black_box(sync.handle_message(black_box(raw)));
        })
    });
}

criterion_group!(
    benches,
    benchmark_apply_snapshot,
    benchmark_apply_delta,
    benchmark_publish,
    benchmark_handle_raw_message
);
criterion_main!(benches);

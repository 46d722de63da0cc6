//! Parser module for exchange stream messages
//!
//! Handles deserialization of depth snapshots, depth deltas, and 24h ticker events.
//! Depth messages are untagged on the wire, so dispatch falls back to the
//! message shape when no `e` discriminator is present.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Depth topic for a symbol: `<symbol-lowercase>@depth<levels>`
pub fn depth_topic(symbol: &str, levels: u32) -> String {
    format!("{}@depth{}", symbol.to_lowercase(), levels)
}

/// Ticker topic for a symbol: `<symbol-lowercase>@ticker`
pub fn ticker_topic(symbol: &str) -> String {
    format!("{}@ticker", symbol.to_lowercase())
}

/// Price level (price, quantity pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Full order book snapshot, replaces local state wholesale
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Incremental depth change between two update ids.
///
/// Accepts both the long field names and the short exchange form (`U`, `u`, `b`, `a`).
#[derive(Debug, Clone, Deserialize)]
pub struct DepthDelta {
    #[serde(rename = "firstUpdateId", alias = "U")]
    pub first_update_id: u64,

    #[serde(rename = "finalUpdateId", alias = "u")]
    pub final_update_id: u64,

    #[serde(alias = "b", deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(alias = "a", deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Parsed depth stream message
#[derive(Debug, Clone)]
pub enum DepthMessage {
    Snapshot(DepthSnapshot),
    Delta(DepthDelta),
}

impl DepthMessage {
    /// Parse a raw depth stream message.
    ///
    /// An explicit `"e": "depthUpdate"` tag is honoured; untagged payloads are
    /// tried as a snapshot first and as a delta second.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value = unwrap_envelope(serde_json::from_str(raw)?);

        if event_type(&value) == Some("depthUpdate") {
            return DepthDelta::deserialize(&value).map(DepthMessage::Delta);
        }

        match DepthSnapshot::deserialize(&value) {
            Ok(snapshot) => Ok(DepthMessage::Snapshot(snapshot)),
            Err(_) => DepthDelta::deserialize(&value).map(DepthMessage::Delta),
        }
    }
}

/// 24h rolling ticker event from the `@ticker` stream
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEvent {
    /// Event type
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (milliseconds)
    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "p", deserialize_with = "deserialize_decimal")]
    pub price_change: Decimal,

    #[serde(rename = "P", deserialize_with = "deserialize_decimal")]
    pub price_change_percent: Decimal,

    /// Last price
    #[serde(rename = "c", deserialize_with = "deserialize_decimal")]
    pub last_price: Decimal,

    #[serde(rename = "h", deserialize_with = "deserialize_decimal")]
    pub high_price: Decimal,

    #[serde(rename = "l", deserialize_with = "deserialize_decimal")]
    pub low_price: Decimal,

    /// Base asset volume
    #[serde(rename = "v", deserialize_with = "deserialize_decimal")]
    pub volume: Decimal,

    /// Quote asset volume
    #[serde(rename = "q", deserialize_with = "deserialize_decimal")]
    pub quote_volume: Decimal,
}

impl TickerEvent {
    /// Parse a raw ticker stream message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value = unwrap_envelope(serde_json::from_str(raw)?);
        TickerEvent::deserialize(&value)
    }
}

/// Strip a combined stream wrapper (`{"stream": ..., "data": ...}`) if present
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("stream") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn event_type(value: &Value) -> Option<&str> {
    value.get("e").and_then(Value::as_str)
}

/// Custom deserializer for Decimal from string
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(&s).map_err(serde::de::Error::custom)
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                quantity: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

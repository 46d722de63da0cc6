//! REST payloads and typed endpoints

use rust_decimal::Decimal;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use crate::parser::{deserialize_decimal, DepthSnapshot};
use crate::ticker::{millis_to_utc, TickerSnapshot};

/// A GET endpoint queried once per symbol
pub trait RestEndpoint: Send + Sync {
    type Output: DeserializeOwned + Send;

    /// Short label for logs and metrics
    fn name(&self) -> &'static str;

    /// Path appended to the REST base URL
    fn path(&self) -> &str;

    fn query(&self, symbol: &str) -> Vec<(&'static str, String)>;
}

/// `GET /ticker/24hr?symbol=`
#[derive(Debug, Clone, Copy, Default)]
pub struct TickerEndpoint;

impl RestEndpoint for TickerEndpoint {
    type Output = Ticker24h;

    fn name(&self) -> &'static str {
        "ticker"
    }

    fn path(&self) -> &str {
        "/ticker/24hr"
    }

    fn query(&self, symbol: &str) -> Vec<(&'static str, String)> {
        vec![("symbol", symbol.to_uppercase())]
    }
}

/// `GET /klines?symbol=&interval=&limit=`
#[derive(Debug, Clone)]
pub struct KlineEndpoint {
    pub interval: String,
    pub limit: u32,
}

impl RestEndpoint for KlineEndpoint {
    type Output = Vec<Kline>;

    fn name(&self) -> &'static str {
        "klines"
    }

    fn path(&self) -> &str {
        "/klines"
    }

    fn query(&self, symbol: &str) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", symbol.to_uppercase()),
            ("interval", self.interval.clone()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// `GET /depth?symbol=&limit=`
#[derive(Debug, Clone, Copy)]
pub struct DepthEndpoint {
    pub limit: u32,
}

impl RestEndpoint for DepthEndpoint {
    type Output = DepthSnapshot;

    fn name(&self) -> &'static str {
        "depth"
    }

    fn path(&self) -> &str {
        "/depth"
    }

    fn query(&self, symbol: &str) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", symbol.to_uppercase()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// 24h ticker statistics from REST
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub price_change: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub price_change_percent: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub last_price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub high_price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub low_price: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub volume: Decimal,

    #[serde(deserialize_with = "deserialize_decimal")]
    pub quote_volume: Decimal,

    pub close_time: u64,
}

impl From<Ticker24h> for TickerSnapshot {
    fn from(ticker: Ticker24h) -> Self {
        Self {
            symbol: ticker.symbol,
            last_price: ticker.last_price,
            price_change: ticker.price_change,
            price_change_percent: ticker.price_change_percent,
            high_price: ticker.high_price,
            low_price: ticker.low_price,
            volume: ticker.volume,
            quote_volume: ticker.quote_volume,
            event_time: millis_to_utc(ticker.close_time),
        }
    }
}

/// One candle; the exchange sends these as positional arrays
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: u64,
}

impl<'de> Deserialize<'de> for Kline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields: Vec<Value> = Deserialize::deserialize(deserializer)?;
        if fields.len() < 7 {
            return Err(D::Error::custom(format!(
                "kline needs at least 7 fields, got {}",
                fields.len()
            )));
        }

        let int = |i: usize| {
            fields[i]
                .as_u64()
                .ok_or_else(|| D::Error::custom(format!("kline field {} is not an integer", i)))
        };
        let dec = |i: usize| {
            fields[i]
                .as_str()
                .ok_or_else(|| D::Error::custom(format!("kline field {} is not a string", i)))
                .and_then(|s| Decimal::from_str(s).map_err(D::Error::custom))
        };

        Ok(Kline {
            open_time: int(0)?,
            open: dec(1)?,
            high: dec(2)?,
            low: dec(3)?,
            close: dec(4)?,
            volume: dec(5)?,
            close_time: int(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_klines() {
        let raw = r#"[
            [1499040000000, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
             "148976.11427815", 1499644799999, "2434.19055334", 308,
             "1756.87402397", "28.46694368", "0"]
        ]"#;
        let klines: Vec<Kline> = serde_json::from_str(raw).unwrap();
        assert_eq!(klines.len(), 1);
        assert_eq!(klines[0].open_time, 1499040000000);
        assert_eq!(klines[0].high, dec!(0.8));
        assert_eq!(klines[0].close_time, 1499644799999);
    }

    #[test]
    fn test_parse_short_kline_fails() {
        assert!(serde_json::from_str::<Kline>(r#"[1, "2", "3"]"#).is_err());
    }

    #[test]
    fn test_ticker_into_snapshot() {
        let raw = r#"{
            "symbol": "BNBBTC",
            "priceChange": "-94.99999800",
            "priceChangePercent": "-95.960",
            "weightedAvgPrice": "0.29628482",
            "lastPrice": "4.00000200",
            "highPrice": "100.00000000",
            "lowPrice": "0.10000000",
            "volume": "8913.30000000",
            "quoteVolume": "15.30000000",
            "openTime": 1499783499040,
            "closeTime": 1499869899040,
            "count": 76
        }"#;
        let ticker: Ticker24h = serde_json::from_str(raw).unwrap();
        let snapshot = TickerSnapshot::from(ticker);
        assert_eq!(snapshot.symbol, "BNBBTC");
        assert_eq!(snapshot.last_price, dec!(4.000002));
        assert_eq!(snapshot.event_time.timestamp_millis(), 1499869899040);
    }

    #[test]
    fn test_endpoint_queries() {
        let klines = KlineEndpoint {
            interval: "1h".to_string(),
            limit: 24,
        };
        assert_eq!(
            klines.query("btcusdt"),
            vec![
                ("symbol", "BTCUSDT".to_string()),
                ("interval", "1h".to_string()),
                ("limit", "24".to_string())
            ]
        );
        assert_eq!(TickerEndpoint.path(), "/ticker/24hr");
        assert_eq!(DepthEndpoint { limit: 5 }.query("ethusdt")[1], ("limit", "5".to_string()));
    }
}

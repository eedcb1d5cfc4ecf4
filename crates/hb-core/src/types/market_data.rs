//! Decoded market-data payloads: the values delivered to subscribers.
//!
//! Field names follow the exchange's JSON exactly (`volumeQuote`, `ask`,
//! `bid`, ...). Every price and quantity arrives as a decimal string and is
//! held as [`Decimal`] so that comparisons are exact. Timestamps are
//! millisecond ISO-8601 strings (see [`time_util`](crate::time_util)).
//!
//! Each payload self-identifies its market through `symbol`, which is what
//! the dispatcher routes on.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::enums::{CandlePeriod, Side};
use super::symbol::Symbol;
use crate::time_util::{wire_timestamp, wire_timestamp_opt};

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// 24h rolling ticker (`ticker` notification).
///
/// Price fields are `None` when the exchange sends `null` or `""`, which it
/// does for markets without recent trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    #[serde(default, with = "decimal_opt")]
    pub ask: Option<Decimal>,
    #[serde(default, with = "decimal_opt")]
    pub bid: Option<Decimal>,
    #[serde(default, with = "decimal_opt")]
    pub last: Option<Decimal>,
    #[serde(default, with = "decimal_opt")]
    pub open: Option<Decimal>,
    #[serde(default, with = "decimal_opt")]
    pub low: Option<Decimal>,
    #[serde(default, with = "decimal_opt")]
    pub high: Option<Decimal>,
    /// Base-currency volume over 24h.
    pub volume: Decimal,
    /// Quote-currency volume over 24h.
    pub volume_quote: Decimal,
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// One price level. A `size` of zero in an update removes the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book snapshot or incremental update (`snapshotOrderbook` /
/// `updateOrderbook`). Both share one shape; the channel tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub ask: Vec<PriceLevel>,
    #[serde(default)]
    pub bid: Vec<PriceLevel>,
    pub symbol: Symbol,
    /// Exchange sequence number, passed through for gap detection.
    pub sequence: i64,
    #[serde(default, with = "wire_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// A single public trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub id: u64,
    pub price: Decimal,
    /// Not always sent.
    #[serde(default, with = "decimal_opt", skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    pub side: Side,
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Trade batch (`snapshotTrades` / `updateTrades`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trades {
    #[serde(deserialize_with = "one_or_many")]
    pub data: Vec<PublicTrade>,
    pub symbol: Symbol,
}

// ---------------------------------------------------------------------------
// Candles
// ---------------------------------------------------------------------------

/// One OHLCV candle. `min`/`max` are the exchange's names for low/high.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    #[serde(with = "wire_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub close: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub volume: Decimal,
    pub volume_quote: Decimal,
}

/// Candle batch (`snapshotCandles` / `updateCandles`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candles {
    #[serde(deserialize_with = "one_or_many")]
    pub data: Vec<Candle>,
    pub symbol: Symbol,
    pub period: CandlePeriod,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Accept either a JSON array or a single object for `data`.
fn one_or_many<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::Many(v) => v,
        OneOrMany::One(x) => vec![x],
    })
}

/// Optional decimal carried as a string; `null` and `""` are `None`.
pub mod decimal_opt {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(v: &Option<Decimal>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_str(&d.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Decimal>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => Decimal::from_str(raw.trim())
                .or_else(|_| Decimal::from_scientific(raw.trim()))
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

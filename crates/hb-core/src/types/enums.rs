//! Enumerations used throughout the feed system.
//!
//! [`FeedKind`] is the closed set of inbound notification methods; it is
//! resolved from the wire method name through a static table rather than a
//! string switch at the call site. [`Feed`] is the unit of subscription: one
//! `subscribe*` call opens every [`FeedKind`] it lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HbError;

// ---------------------------------------------------------------------------
// Feed kinds (inbound notification methods)
// ---------------------------------------------------------------------------

/// One inbound notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeedKind {
    Ticker,
    OrderBookSnapshot,
    OrderBookUpdate,
    TradeSnapshot,
    TradeUpdate,
    CandleSnapshot,
    CandleUpdate,
}

/// Wire method name → feed kind.
const FEED_METHODS: [(&str, FeedKind); 7] = [
    ("ticker", FeedKind::Ticker),
    ("snapshotOrderbook", FeedKind::OrderBookSnapshot),
    ("updateOrderbook", FeedKind::OrderBookUpdate),
    ("snapshotTrades", FeedKind::TradeSnapshot),
    ("updateTrades", FeedKind::TradeUpdate),
    ("snapshotCandles", FeedKind::CandleSnapshot),
    ("updateCandles", FeedKind::CandleUpdate),
];

impl FeedKind {
    pub const ALL: [FeedKind; 7] = [
        FeedKind::Ticker,
        FeedKind::OrderBookSnapshot,
        FeedKind::OrderBookUpdate,
        FeedKind::TradeSnapshot,
        FeedKind::TradeUpdate,
        FeedKind::CandleSnapshot,
        FeedKind::CandleUpdate,
    ];

    /// Resolve an inbound notification method. `None` for anything outside
    /// the table.
    pub fn from_method(method: &str) -> Option<Self> {
        FEED_METHODS
            .iter()
            .find(|(name, _)| *name == method)
            .map(|(_, kind)| *kind)
    }

    /// The wire method name carried by notifications of this kind.
    pub fn method(self) -> &'static str {
        FEED_METHODS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    /// The subscription this kind belongs to.
    pub fn feed(self) -> Feed {
        match self {
            Self::Ticker => Feed::Ticker,
            Self::OrderBookSnapshot | Self::OrderBookUpdate => Feed::OrderBook,
            Self::TradeSnapshot | Self::TradeUpdate => Feed::Trades,
            Self::CandleSnapshot | Self::CandleUpdate => Feed::Candles,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

// ---------------------------------------------------------------------------
// Feeds (subscription units)
// ---------------------------------------------------------------------------

/// A subscribable market-data feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    Ticker,
    #[serde(alias = "order_book")]
    OrderBook,
    Trades,
    Candles,
}

impl Feed {
    /// RPC method that opens this feed.
    pub fn subscribe_method(self) -> &'static str {
        match self {
            Self::Ticker => "subscribeTicker",
            Self::OrderBook => "subscribeOrderbook",
            Self::Trades => "subscribeTrades",
            Self::Candles => "subscribeCandles",
        }
    }

    /// RPC method that closes this feed.
    pub fn unsubscribe_method(self) -> &'static str {
        match self {
            Self::Ticker => "unsubscribeTicker",
            Self::OrderBook => "unsubscribeOrderbook",
            Self::Trades => "unsubscribeTrades",
            Self::Candles => "unsubscribeCandles",
        }
    }

    /// Notification kinds opened by one subscription, updates first.
    pub fn kinds(self) -> &'static [FeedKind] {
        match self {
            Self::Ticker => &[FeedKind::Ticker],
            Self::OrderBook => &[FeedKind::OrderBookUpdate, FeedKind::OrderBookSnapshot],
            Self::Trades => &[FeedKind::TradeUpdate, FeedKind::TradeSnapshot],
            Self::Candles => &[FeedKind::CandleUpdate, FeedKind::CandleSnapshot],
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticker => write!(f, "ticker"),
            Self::OrderBook => write!(f, "orderbook"),
            Self::Trades => write!(f, "trades"),
            Self::Candles => write!(f, "candles"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candle periods
// ---------------------------------------------------------------------------

/// Candle aggregation period, as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum CandlePeriod {
    M1,
    M3,
    M5,
    M15,
    #[default]
    M30,
    H1,
    H4,
    D1,
    D7,
    #[serde(rename = "1M")]
    Month1,
}

impl CandlePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "M1",
            Self::M3 => "M3",
            Self::M5 => "M5",
            Self::M15 => "M15",
            Self::M30 => "M30",
            Self::H1 => "H1",
            Self::H4 => "H4",
            Self::D1 => "D1",
            Self::D7 => "D7",
            Self::Month1 => "1M",
        }
    }
}

impl fmt::Display for CandlePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandlePeriod {
    type Err = HbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let period = match s {
            "M1" => Self::M1,
            "M3" => Self::M3,
            "M5" => Self::M5,
            "M15" => Self::M15,
            "M30" => Self::M30,
            "H1" => Self::H1,
            "H4" => Self::H4,
            "D1" => Self::D1,
            "D7" => Self::D7,
            "1M" => Self::Month1,
            other => return Err(HbError::InvalidPeriod(other.to_string())),
        };
        Ok(period)
    }
}

// ---------------------------------------------------------------------------
// Trade metadata
// ---------------------------------------------------------------------------

/// Taker side of a public trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_table_round_trips() {
        for kind in FeedKind::ALL {
            assert_eq!(FeedKind::from_method(kind.method()), Some(kind));
        }
    }

    #[test]
    fn unknown_method() {
        assert_eq!(FeedKind::from_method("report"), None);
        assert_eq!(FeedKind::from_method("Ticker"), None);
    }

    #[test]
    fn feed_kinds_belong_to_their_feed() {
        for feed in [Feed::Ticker, Feed::OrderBook, Feed::Trades, Feed::Candles] {
            for kind in feed.kinds() {
                assert_eq!(kind.feed(), feed);
            }
        }
    }

    #[test]
    fn orderbook_methods_use_exchange_spelling() {
        assert_eq!(Feed::OrderBook.subscribe_method(), "subscribeOrderbook");
        assert_eq!(FeedKind::OrderBookUpdate.method(), "updateOrderbook");
    }

    #[test]
    fn candle_period_strings() {
        assert_eq!("H4".parse::<CandlePeriod>().unwrap(), CandlePeriod::H4);
        assert_eq!(CandlePeriod::Month1.as_str(), "1M");
        assert_eq!(serde_json::to_string(&CandlePeriod::Month1).unwrap(), "\"1M\"");
        assert!("H2".parse::<CandlePeriod>().is_err());
    }
}

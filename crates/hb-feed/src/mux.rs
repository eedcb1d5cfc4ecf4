//! The public facade: one object per exchange connection.
//!
//! [`FeedMux`] wires the dispatcher into the transport at construction and
//! exposes typed subscribe / unsubscribe calls per feed, the shared error
//! channel, reference-data queries, and a global close.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hb_core::config::FeedSettings;
use hb_core::ws::RpcTransport;
use hb_core::{
    CandlePeriod, Candles, CurrencyInfo, Feed, OrderBook, PublicTrade, Symbol, SymbolInfo, Ticker,
    TradeHistory, TradeHistoryQuery, Trades,
};
use serde_json::json;
use tracing::info;

use crate::channel::{FeedPayload, FeedReceiver};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, ErrorSink, FeedError};
use crate::json_util::decode_reply;
use crate::registry::{Topic, TopicRegistry};
use crate::subscription::{SubscriptionKey, SubscriptionManager};

/// Channel sizing for a [`FeedMux`].
#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    /// Capacity of every topic channel. `1` gives near-unbuffered delivery.
    pub channel_capacity: usize,
    /// Capacity of the error channel.
    pub error_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
            error_capacity: 256,
        }
    }
}

impl From<&FeedSettings> for FeedConfig {
    fn from(settings: &FeedSettings) -> Self {
        Self {
            channel_capacity: settings.effective_channel_capacity(),
            error_capacity: settings.effective_error_capacity(),
        }
    }
}

pub struct FeedMux {
    transport: Arc<dyn RpcTransport>,
    registry: Arc<TopicRegistry>,
    errors: Arc<ErrorSink>,
    subscriptions: SubscriptionManager,
    closed: AtomicBool,
}

impl FeedMux {
    /// Build the multiplexer and install its dispatcher as the transport's
    /// notification handler.
    pub fn new(transport: Arc<dyn RpcTransport>, config: FeedConfig) -> Self {
        let registry = Arc::new(TopicRegistry::new());
        let errors = Arc::new(ErrorSink::new(config.error_capacity));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), errors.clone()));
        transport.register_notification_handler(dispatcher);

        let subscriptions = SubscriptionManager::new(
            transport.clone(),
            registry.clone(),
            errors.clone(),
            config.channel_capacity,
        );
        Self {
            transport,
            registry,
            errors,
            subscriptions,
            closed: AtomicBool::new(false),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub async fn subscribe_ticker(&self, symbol: &str) -> Result<FeedReceiver<Ticker>, FeedError> {
        let [ticker] = self.subscribe::<Ticker, 1>(Feed::Ticker, symbol, None).await?;
        Ok(ticker)
    }

    /// Returns `(updates, snapshots)`.
    pub async fn subscribe_order_book(
        &self,
        symbol: &str,
    ) -> Result<(FeedReceiver<OrderBook>, FeedReceiver<OrderBook>), FeedError> {
        let [updates, snapshots] = self
            .subscribe::<OrderBook, 2>(Feed::OrderBook, symbol, None)
            .await?;
        Ok((updates, snapshots))
    }

    /// Returns `(updates, snapshots)`.
    pub async fn subscribe_trades(
        &self,
        symbol: &str,
    ) -> Result<(FeedReceiver<Trades>, FeedReceiver<Trades>), FeedError> {
        let [updates, snapshots] = self
            .subscribe::<Trades, 2>(Feed::Trades, symbol, None)
            .await?;
        Ok((updates, snapshots))
    }

    /// Returns `(updates, snapshots)`. `period` defaults to `M30`.
    pub async fn subscribe_candles(
        &self,
        symbol: &str,
        period: Option<CandlePeriod>,
    ) -> Result<(FeedReceiver<Candles>, FeedReceiver<Candles>), FeedError> {
        let [updates, snapshots] = self
            .subscribe::<Candles, 2>(Feed::Candles, symbol, period)
            .await?;
        Ok((updates, snapshots))
    }

    pub async fn unsubscribe_ticker(&self, symbol: &str) -> Result<(), FeedError> {
        self.unsubscribe(Feed::Ticker, symbol, None).await
    }

    pub async fn unsubscribe_order_book(&self, symbol: &str) -> Result<(), FeedError> {
        self.unsubscribe(Feed::OrderBook, symbol, None).await
    }

    pub async fn unsubscribe_trades(&self, symbol: &str) -> Result<(), FeedError> {
        self.unsubscribe(Feed::Trades, symbol, None).await
    }

    pub async fn unsubscribe_candles(
        &self,
        symbol: &str,
        period: Option<CandlePeriod>,
    ) -> Result<(), FeedError> {
        self.unsubscribe(Feed::Candles, symbol, period).await
    }

    async fn subscribe<T: FeedPayload, const N: usize>(
        &self,
        feed: Feed,
        symbol: &str,
        period: Option<CandlePeriod>,
    ) -> Result<[FeedReceiver<T>; N], FeedError> {
        self.ensure_open()?;
        let key = SubscriptionKey::new(feed, symbol, period)?;
        let receivers = self.subscriptions.subscribe::<T>(&key).await?;
        <[FeedReceiver<T>; N]>::try_from(receivers).map_err(|got| FeedError::ChannelCount {
            feed,
            expected: N,
            got: got.len(),
        })
    }

    async fn unsubscribe(
        &self,
        feed: Feed,
        symbol: &str,
        period: Option<CandlePeriod>,
    ) -> Result<(), FeedError> {
        self.ensure_open()?;
        let key = SubscriptionKey::new(feed, symbol, period)?;
        self.subscriptions.unsubscribe(&key).await
    }

    // -----------------------------------------------------------------------
    // Errors, introspection
    // -----------------------------------------------------------------------

    /// The shared error channel. Every call returns a handle to the same
    /// channel.
    pub fn errors(&self) -> FeedReceiver<DispatchError> {
        self.errors.receiver()
    }

    /// Open topics, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        self.registry.topics()
    }

    // -----------------------------------------------------------------------
    // Reference data
    // -----------------------------------------------------------------------

    pub async fn get_currency(&self, currency: &str) -> Result<CurrencyInfo, FeedError> {
        self.ensure_open()?;
        let code = Symbol::new(currency)?;
        let reply = self
            .transport
            .call("getCurrency", json!({ "currency": code.as_str() }))
            .await?;
        decode_reply("getCurrency", reply)
    }

    pub async fn get_symbol(&self, symbol: &str) -> Result<SymbolInfo, FeedError> {
        self.ensure_open()?;
        let symbol = Symbol::new(symbol)?;
        let reply = self
            .transport
            .call("getSymbol", json!({ "symbol": symbol.as_str() }))
            .await?;
        decode_reply("getSymbol", reply)
    }

    /// Recent public trades for one market, oldest or newest first per
    /// `query.sort`.
    pub async fn get_trades(
        &self,
        symbol: &str,
        query: &TradeHistoryQuery,
    ) -> Result<Vec<PublicTrade>, FeedError> {
        self.ensure_open()?;
        let symbol = Symbol::new(symbol)?;
        let reply = self.transport.call("getTrades", query.params(&symbol)).await?;
        let history: TradeHistory = decode_reply("getTrades", reply)?;
        Ok(history.data)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Tear everything down. Idempotent.
    ///
    /// The transport is closed first so that no notification is dispatched
    /// afterwards; then every topic channel and finally the error channel is
    /// closed, each exactly once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscriptions.mark_closed();
        self.transport.close().await;
        let closed = self.registry.close();
        self.errors.close();
        info!("[feed-mux] closed ({closed} topic channel(s))");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), FeedError> {
        if self.is_closed() {
            Err(FeedError::Closed)
        } else {
            Ok(())
        }
    }
}

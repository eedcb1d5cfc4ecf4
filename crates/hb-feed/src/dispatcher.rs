//! Inbound notification dispatcher.
//!
//! Installed as the transport's [`NotificationHandler`]. For each
//! notification it resolves the feed kind from the method name, decodes the
//! payload, derives the topic from the payload's own `symbol` (and `period`
//! for candles), and delivers it to that topic's channel.
//!
//! The send is awaited: a slow consumer holds up the next notification, which
//! keeps per-topic order identical to wire order. Every failure is reported
//! on the error channel and never prevents the next notification from being
//! handled.

use std::sync::Arc;

use async_trait::async_trait;
use hb_core::ws::{NotificationHandler, TransportError};
use hb_core::{Candles, Feed, FeedKind, OrderBook, Ticker, Trades};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::channel::FeedPayload;
use crate::error::{DispatchError, ErrorSink};
use crate::registry::{Route, Topic, TopicRegistry};

pub struct Dispatcher {
    registry: Arc<TopicRegistry>,
    errors: Arc<ErrorSink>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<TopicRegistry>, errors: Arc<ErrorSink>) -> Self {
        Self { registry, errors }
    }

    /// Handle one notification to completion.
    pub async fn dispatch(&self, method: &str, params: Value) {
        let Some(kind) = FeedKind::from_method(method) else {
            self.errors.report(DispatchError::UnknownMethod {
                method: method.to_string(),
                params,
            });
            return;
        };
        match kind.feed() {
            Feed::Ticker => self.route::<Ticker>(kind, params).await,
            Feed::OrderBook => self.route::<OrderBook>(kind, params).await,
            Feed::Trades => self.route::<Trades>(kind, params).await,
            Feed::Candles => self.route::<Candles>(kind, params).await,
        }
    }

    async fn route<T: FeedPayload>(&self, kind: FeedKind, params: Value) {
        let payload = match T::deserialize(&params) {
            Ok(p) => p,
            Err(e) => {
                self.errors.report(DispatchError::Decode {
                    method: kind.method().to_string(),
                    reason: e.to_string(),
                    params,
                });
                return;
            }
        };

        let topic = Topic::new(kind, payload.symbol().clone(), payload.period());
        match self.registry.route(&topic, payload) {
            Route::Deliver(tx, payload) => {
                if tx.send(payload).await.is_err() {
                    self.errors.report(DispatchError::ConsumerGone { topic });
                } else {
                    trace!("[dispatch] {topic} delivered");
                }
            }
            Route::Held => debug!("[dispatch] {topic} held until subscription confirmed"),
            Route::Unrouted => self.errors.report(DispatchError::Unrouted { topic }),
        }
    }
}

#[async_trait]
impl NotificationHandler for Dispatcher {
    async fn on_notification(&self, method: &str, params: Value) {
        self.dispatch(method, params).await;
    }

    async fn on_transport_error(&self, err: &TransportError) {
        self.errors.report(DispatchError::Transport {
            reason: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FeedReceiver;
    use hb_core::{CandlePeriod, Symbol};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn setup() -> (Dispatcher, Arc<TopicRegistry>, FeedReceiver<DispatchError>) {
        let registry = Arc::new(TopicRegistry::new());
        let errors = Arc::new(ErrorSink::new(16));
        let rx = errors.receiver();
        (Dispatcher::new(registry.clone(), errors), registry, rx)
    }

    fn ticker_params(symbol: &str) -> Value {
        json!({
            "ask": "0.054464", "bid": "0.054463", "last": "0.054463",
            "open": "0.057133", "low": "0.053615", "high": "0.057559",
            "volume": "33068.346", "volumeQuote": "1832.687530809",
            "timestamp": "2017-10-19T15:45:44.941Z", "symbol": symbol
        })
    }

    #[tokio::test]
    async fn delivers_to_topic_from_payload_symbol() {
        let (d, reg, errors) = setup();
        let topic = Topic::new(FeedKind::Ticker, Symbol::new("ETHBTC").unwrap(), None);
        let rx = reg.create::<Ticker>(&topic, 1).unwrap();

        d.dispatch("ticker", ticker_params("ETHBTC")).await;
        let t = rx.recv().await.unwrap();
        assert_eq!(t.ask, Some(dec!(0.054464)));
        assert!(errors.try_recv().is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_reported_with_params() {
        let (d, _reg, errors) = setup();
        d.dispatch("tickerz", json!({"x": 1})).await;
        match errors.recv().await.unwrap() {
            DispatchError::UnknownMethod { method, params } => {
                assert_eq!(method, "tickerz");
                assert_eq!(params, json!({"x": 1}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn decode_failure_is_reported_and_next_message_flows() {
        let (d, reg, errors) = setup();
        let topic = Topic::new(FeedKind::Ticker, Symbol::new("ETHBTC").unwrap(), None);
        let rx = reg.create::<Ticker>(&topic, 1).unwrap();

        d.dispatch("ticker", json!({"symbol": "ETHBTC", "volume": "oops"})).await;
        assert!(matches!(
            errors.recv().await,
            Some(DispatchError::Decode { method, .. }) if method == "ticker"
        ));

        d.dispatch("ticker", ticker_params("ETHBTC")).await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn notification_for_unopened_topic_is_unrouted() {
        let (d, _reg, errors) = setup();
        d.dispatch("ticker", ticker_params("LTCBTC")).await;
        match errors.recv().await.unwrap() {
            DispatchError::Unrouted { topic } => {
                assert_eq!(topic.kind, FeedKind::Ticker);
                assert_eq!(topic.symbol.as_str(), "LTCBTC");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn candles_route_by_period() {
        let (d, reg, errors) = setup();
        let sym = Symbol::new("BTCUSD").unwrap();
        let m30 = Topic::new(FeedKind::CandleUpdate, sym, Some(CandlePeriod::M30));
        let rx = reg.create::<Candles>(&m30, 4).unwrap();

        let candle = json!({
            "timestamp": "2017-10-19T16:30:00.000Z", "open": "5000", "close": "5010",
            "min": "4990", "max": "5020", "volume": "12.5", "volumeQuote": "62500"
        });
        d.dispatch("updateCandles", json!({"data": [candle], "symbol": "BTCUSD", "period": "M30"}))
            .await;
        d.dispatch("updateCandles", json!({"data": [candle], "symbol": "BTCUSD", "period": "H1"}))
            .await;

        assert_eq!(rx.recv().await.unwrap().data.len(), 1);
        assert!(matches!(
            errors.recv().await,
            Some(DispatchError::Unrouted { topic }) if topic.period == Some(CandlePeriod::H1)
        ));
    }

    #[tokio::test]
    async fn transport_error_goes_to_error_channel() {
        let (d, _reg, errors) = setup();
        d.on_transport_error(&TransportError::ConnectionLost("reset".into()))
            .await;
        assert!(matches!(errors.recv().await, Some(DispatchError::Transport { .. })));
    }
}

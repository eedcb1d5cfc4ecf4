//! Subscription manager.
//!
//! Translates subscribe / unsubscribe requests into exchange RPCs and opens
//! or removes topic channels according to the exchange's answer. A channel is
//! opened only after a confirmed subscribe and removed only after a confirmed
//! unsubscribe.
//!
//! Operations on the same subscription key are serialized by a per-key async
//! gate, so "subscribe while an unsubscribe is in flight" resolves in call
//! order. Operations on different keys run concurrently.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use hb_core::ws::RpcTransport;
use hb_core::{CandlePeriod, Feed, Symbol};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::channel::{FeedPayload, FeedReceiver};
use crate::error::{DispatchError, ErrorSink, FeedError};
use crate::json_util::ack_success;
use crate::registry::{Topic, TopicRegistry};

/// One exchange-side subscription: a feed on a market, plus the period for
/// candles. Opens one topic per kind in [`Feed::kinds`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub feed: Feed,
    pub symbol: Symbol,
    pub period: Option<CandlePeriod>,
}

impl SubscriptionKey {
    /// Validates the symbol. Candles default to [`CandlePeriod::M30`]; other
    /// feeds ignore the period.
    pub fn new(feed: Feed, symbol: &str, period: Option<CandlePeriod>) -> Result<Self, FeedError> {
        let symbol = Symbol::new(symbol)?;
        let period = match feed {
            Feed::Candles => Some(period.unwrap_or_default()),
            _ => None,
        };
        Ok(Self {
            feed,
            symbol,
            period,
        })
    }

    /// Topics opened by this subscription, updates first.
    pub fn topics(&self) -> Vec<Topic> {
        self.feed
            .kinds()
            .iter()
            .map(|kind| Topic::new(*kind, self.symbol.clone(), self.period))
            .collect()
    }

    /// RPC params: `{"symbol": ..}` plus `"period"` for candles.
    pub fn params(&self) -> Value {
        let mut params = Map::new();
        params.insert("symbol".into(), Value::String(self.symbol.to_string()));
        if let Some(period) = self.period {
            params.insert("period".into(), Value::String(period.to_string()));
        }
        Value::Object(params)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.feed, self.symbol)?;
        if let Some(period) = self.period {
            write!(f, " {period}")?;
        }
        Ok(())
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct SubscriptionManager {
    transport: Arc<dyn RpcTransport>,
    registry: Arc<TopicRegistry>,
    errors: Arc<ErrorSink>,
    gates: Mutex<AHashMap<SubscriptionKey, Gate>>,
    channel_capacity: usize,
    closed: AtomicBool,
}

impl SubscriptionManager {
    pub(crate) fn new(
        transport: Arc<dyn RpcTransport>,
        registry: Arc<TopicRegistry>,
        errors: Arc<ErrorSink>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            transport,
            registry,
            errors,
            gates: Mutex::new(AHashMap::new()),
            channel_capacity: channel_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Open the subscription's channels, issuing the subscribe RPC only if
    /// they are not open yet. Receivers are returned in [`Feed::kinds`] order.
    pub async fn subscribe<T: FeedPayload>(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Vec<FeedReceiver<T>>, FeedError> {
        self.ensure_open()?;
        let gate = self.gate(key);
        let result = {
            let _held = gate.lock().await;
            self.subscribe_gated::<T>(key).await
        };
        self.release_gate(key, gate);
        result
    }

    /// Close the subscription's channels after the exchange confirms.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) -> Result<(), FeedError> {
        self.ensure_open()?;
        let gate = self.gate(key);
        let result = {
            let _held = gate.lock().await;
            self.unsubscribe_gated(key).await
        };
        self.release_gate(key, gate);
        result
    }

    /// Refuse further operations. In-flight ones finish against the closed
    /// registry.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn ensure_open(&self) -> Result<(), FeedError> {
        if self.closed.load(Ordering::Acquire) {
            Err(FeedError::Closed)
        } else {
            Ok(())
        }
    }

    async fn subscribe_gated<T: FeedPayload>(
        &self,
        key: &SubscriptionKey,
    ) -> Result<Vec<FeedReceiver<T>>, FeedError> {
        let topics = key.topics();

        let existing: Option<Vec<FeedReceiver<T>>> = topics
            .iter()
            .map(|t| self.registry.attach::<T>(t, self.channel_capacity))
            .collect();
        if let Some(receivers) = existing {
            debug!("[feed-mux] {key} already subscribed, reusing channels");
            return Ok(receivers);
        }

        for topic in &topics {
            if let Err(e) = self.registry.reserve(topic) {
                self.abandon(&topics);
                return Err(e.into());
            }
        }

        let method = key.feed.subscribe_method();
        let reply = match self.transport.call(method, key.params()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[feed-mux] {method} {key} failed: {e}");
                self.abandon(&topics);
                return Err(e.into());
            }
        };
        if !ack_success(&reply) {
            warn!("[feed-mux] {method} {key} not confirmed: {reply}");
            self.abandon(&topics);
            return Err(FeedError::Rejected {
                method,
                subscription: key.to_string(),
            });
        }

        let mut receivers = Vec::with_capacity(topics.len());
        for topic in &topics {
            match self.registry.create::<T>(topic, self.channel_capacity) {
                Ok(rx) => receivers.push(rx),
                Err(e) => {
                    self.abandon(&topics);
                    return Err(e.into());
                }
            }
        }
        info!("[feed-mux] subscribed {key}");
        Ok(receivers)
    }

    async fn unsubscribe_gated(&self, key: &SubscriptionKey) -> Result<(), FeedError> {
        let topics = key.topics();
        if !topics.iter().any(|t| self.registry.is_open(t)) {
            return Err(FeedError::NotSubscribed(key.to_string()));
        }

        let method = key.feed.unsubscribe_method();
        let reply = self.transport.call(method, key.params()).await?;
        if !ack_success(&reply) {
            warn!("[feed-mux] {method} {key} not confirmed: {reply}");
            return Err(FeedError::Rejected {
                method,
                subscription: key.to_string(),
            });
        }

        for topic in &topics {
            // Already gone only if close() ran concurrently.
            let _ = self.registry.remove(topic);
        }
        info!("[feed-mux] unsubscribed {key}");
        Ok(())
    }

    /// Drop pending slots left by a failed subscribe, reporting any
    /// notifications they held.
    fn abandon(&self, topics: &[Topic]) {
        for topic in topics {
            let count = self.registry.abandon(topic);
            if count > 0 {
                self.errors.report(DispatchError::Discarded {
                    topic: topic.clone(),
                    count,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // Per-key gates
    // -----------------------------------------------------------------------

    fn gate(&self, key: &SubscriptionKey) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(key.clone()).or_default().clone()
    }

    /// Drop the gate once no other operation holds or waits on it.
    fn release_gate(&self, key: &SubscriptionKey, gate: Gate) {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&gate) == 2 {
            gates.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn gate_count(&self) -> usize {
        self.gates.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

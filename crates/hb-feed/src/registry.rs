//! Topic registry: the map from topic to its open channel.
//!
//! All lookups and mutations go through one mutex, so the dispatcher's
//! resolve step and the subscription manager's create/remove steps are
//! linearizable. No channel send ever happens while the lock is held; the
//! dispatcher clones the sender out and sends after unlocking.
//!
//! Besides open channels the registry holds *pending* slots for topics whose
//! subscribe call is in flight. A reply reaches its caller on a different
//! task than the notifications that follow it, so the first snapshot can be
//! dispatched before the caller has opened the channel. Pending slots hold
//! such notifications until the subscription is confirmed (flushed into the
//! new channel) or rejected (discarded).

use std::any::Any;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap;
use hb_core::{CandlePeriod, Feed, FeedKind, Symbol};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channel::{Channel, FeedPayload, FeedReceiver, TopicChannel};

/// Notifications held per pending topic before further ones are dropped.
pub const MAX_PENDING: usize = 256;

/// Routing key: one notification stream for one market.
///
/// `period` is only kept for candle kinds; each period is a separate
/// subscription on the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    pub kind: FeedKind,
    pub symbol: Symbol,
    pub period: Option<CandlePeriod>,
}

impl Topic {
    pub fn new(kind: FeedKind, symbol: Symbol, period: Option<CandlePeriod>) -> Self {
        let period = if kind.feed() == Feed::Candles {
            period
        } else {
            None
        };
        Self {
            kind,
            symbol,
            period,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.symbol)?;
        if let Some(period) = self.period {
            write!(f, ":{period}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry closed")]
    Closed,

    #[error("no open channel for {0}")]
    Missing(Topic),

    #[error("payload type does not match {0}")]
    PayloadMismatch(Topic),
}

/// Outcome of resolving a decoded notification.
pub enum Route<T> {
    /// Send the payload on this sender (outside the lock).
    Deliver(mpsc::Sender<T>, T),
    /// Held in a pending slot.
    Held,
    /// Nothing open for the topic; the payload was dropped.
    Unrouted,
}

enum Slot {
    Pending(Vec<Box<dyn Any + Send>>),
    Open(TopicChannel),
}

#[derive(Default)]
struct Inner {
    slots: AHashMap<Topic, Slot>,
    closed: bool,
}

#[derive(Default)]
pub struct TopicRegistry {
    inner: Mutex<Inner>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receiver of the open channel for `topic`, while some caller holds one.
    pub fn get<T: FeedPayload>(&self, topic: &Topic) -> Option<FeedReceiver<T>> {
        match self.lock().slots.get(topic) {
            Some(Slot::Open(ch)) => T::unwrap(ch).and_then(Channel::receiver),
            _ => None,
        }
    }

    /// Receiver for an already open topic. If every caller dropped its
    /// handle, the topic gets a fresh channel; the exchange subscription is
    /// still live, so no RPC is needed.
    pub fn attach<T: FeedPayload>(
        &self,
        topic: &Topic,
        capacity: usize,
    ) -> Option<FeedReceiver<T>> {
        match self.lock().slots.get_mut(topic) {
            Some(Slot::Open(ch)) => Self::live_receiver::<T>(topic, ch, capacity),
            _ => None,
        }
    }

    fn live_receiver<T: FeedPayload>(
        topic: &Topic,
        slot: &mut TopicChannel,
        capacity: usize,
    ) -> Option<FeedReceiver<T>> {
        let live = T::unwrap(slot)?.receiver();
        if live.is_some() {
            return live;
        }
        debug!("[feed-mux] {topic}: every receiver dropped, opening a fresh channel");
        let (channel, rx) = Channel::<T>::new(capacity);
        *slot = T::wrap(channel);
        Some(rx)
    }

    pub fn is_open(&self, topic: &Topic) -> bool {
        matches!(self.lock().slots.get(topic), Some(Slot::Open(_)))
    }

    /// Mark `topic` as awaiting confirmation. Returns `false` if a slot
    /// already exists.
    pub fn reserve(&self, topic: &Topic) -> Result<bool, RegistryError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RegistryError::Closed);
        }
        if inner.slots.contains_key(topic) {
            return Ok(false);
        }
        inner.slots.insert(topic.clone(), Slot::Pending(Vec::new()));
        Ok(true)
    }

    /// Open the channel for `topic`, or return the one already open (see
    /// [`attach`](Self::attach)).
    ///
    /// A pending slot is promoted: its held notifications are moved into the
    /// new channel, in arrival order, before the lock is released.
    pub fn create<T: FeedPayload>(
        &self,
        topic: &Topic,
        capacity: usize,
    ) -> Result<FeedReceiver<T>, RegistryError> {
        if topic.kind.feed() != T::FEED {
            return Err(RegistryError::PayloadMismatch(topic.clone()));
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(RegistryError::Closed);
        }

        if let Some(Slot::Open(ch)) = inner.slots.get_mut(topic) {
            return Self::live_receiver::<T>(topic, ch, capacity)
                .ok_or_else(|| RegistryError::PayloadMismatch(topic.clone()));
        }
        let held = match inner.slots.remove(topic) {
            Some(Slot::Pending(held)) => held,
            _ => Vec::new(),
        };

        let (channel, rx) = Channel::<T>::new(capacity.max(held.len()));
        for item in held {
            if let Ok(payload) = item.downcast::<T>() {
                if channel.tx.try_send(*payload).is_err() {
                    warn!("[feed-mux] {topic}: held notification did not fit");
                }
            }
        }
        inner.slots.insert(topic.clone(), Slot::Open(T::wrap(channel)));
        Ok(rx)
    }

    /// Drop a pending slot. Returns how many held notifications were discarded.
    pub fn abandon(&self, topic: &Topic) -> usize {
        let mut inner = self.lock();
        match inner.slots.get(topic) {
            Some(Slot::Pending(held)) => {
                let count = held.len();
                inner.slots.remove(topic);
                count
            }
            _ => 0,
        }
    }

    /// Resolve where a decoded payload goes.
    pub fn route<T: FeedPayload>(&self, topic: &Topic, payload: T) -> Route<T> {
        let mut inner = self.lock();
        match inner.slots.get_mut(topic) {
            Some(Slot::Open(ch)) => match T::unwrap(ch) {
                Some(c) => Route::Deliver(c.tx.clone(), payload),
                None => Route::Unrouted,
            },
            Some(Slot::Pending(held)) if held.len() < MAX_PENDING => {
                held.push(Box::new(payload));
                Route::Held
            }
            Some(Slot::Pending(_)) => {
                warn!("[feed-mux] {topic}: pending backlog full");
                Route::Unrouted
            }
            None => Route::Unrouted,
        }
    }

    /// Remove an open channel. Its sender is dropped, so receivers see the
    /// end of the stream once in-flight sends complete.
    pub fn remove(&self, topic: &Topic) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        match inner.slots.get(topic) {
            Some(Slot::Open(_)) => {
                inner.slots.remove(topic);
                Ok(())
            }
            _ => Err(RegistryError::Missing(topic.clone())),
        }
    }

    /// Remove every slot. Returns the number of open channels closed.
    pub fn remove_all(&self) -> usize {
        Self::clear(&mut self.lock())
    }

    /// Remove every slot and refuse further reservations and creations.
    pub fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        Self::clear(&mut inner)
    }

    fn clear(inner: &mut Inner) -> usize {
        let open = inner
            .slots
            .values()
            .filter(|s| matches!(s, Slot::Open(_)))
            .count();
        inner.slots.clear();
        open
    }

    /// Slots of either state.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open topics, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .lock()
            .slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Open(_)))
            .map(|(t, _)| t.clone())
            .collect();
        topics.sort();
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_core::{OrderBook, Ticker};

    fn book_topic(kind: FeedKind) -> Topic {
        Topic::new(kind, Symbol::new("BTCUSD").unwrap(), None)
    }

    fn book(seq: i64) -> OrderBook {
        serde_json::from_value(serde_json::json!({
            "ask": [], "bid": [], "symbol": "BTCUSD", "sequence": seq
        }))
        .unwrap()
    }

    #[test]
    fn topic_display_and_period_normalization() {
        let sym = Symbol::new("BTCUSD").unwrap();
        let t = Topic::new(FeedKind::CandleUpdate, sym.clone(), Some(CandlePeriod::H1));
        assert_eq!(t.to_string(), "updateCandles:BTCUSD:H1");
        let t = Topic::new(FeedKind::Ticker, sym, Some(CandlePeriod::H1));
        assert_eq!(t.period, None);
        assert_eq!(t.to_string(), "ticker:BTCUSD");
    }

    #[test]
    fn create_is_idempotent() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookUpdate);
        let a = reg.create::<OrderBook>(&topic, 1).unwrap();
        let b = reg.create::<OrderBook>(&topic, 1).unwrap();
        assert!(a.same_channel(&b));
        assert_eq!(reg.len(), 1);
        assert!(reg.get::<OrderBook>(&topic).unwrap().same_channel(&a));
    }

    #[tokio::test]
    async fn dropped_receivers_close_the_channel_until_reattached() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookUpdate);
        let first = reg.create::<OrderBook>(&topic, 1).unwrap();
        drop(first);

        assert!(reg.is_open(&topic));
        assert!(reg.get::<OrderBook>(&topic).is_none());
        match reg.route(&topic, book(1)) {
            Route::Deliver(tx, payload) => assert!(tx.send(payload).await.is_err()),
            _ => panic!("expected delivery"),
        }

        let fresh = reg.attach::<OrderBook>(&topic, 1).unwrap();
        assert!(reg.get::<OrderBook>(&topic).unwrap().same_channel(&fresh));
        match reg.route(&topic, book(2)) {
            Route::Deliver(tx, payload) => tx.send(payload).await.unwrap(),
            _ => panic!("expected delivery"),
        }
        assert_eq!(fresh.recv().await.unwrap().sequence, 2);
        assert!(reg.attach::<OrderBook>(&book_topic(FeedKind::OrderBookSnapshot), 1).is_none());
    }

    #[test]
    fn create_rejects_wrong_payload_type() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookUpdate);
        assert_eq!(
            reg.create::<Ticker>(&topic, 1).unwrap_err(),
            RegistryError::PayloadMismatch(topic)
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_missing_topic_fails() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookUpdate);
        assert!(matches!(reg.remove(&topic), Err(RegistryError::Missing(_))));
        reg.reserve(&topic).unwrap();
        assert!(matches!(reg.remove(&topic), Err(RegistryError::Missing(_))));
    }

    #[tokio::test]
    async fn remove_closes_the_channel() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookSnapshot);
        let rx = reg.create::<OrderBook>(&topic, 1).unwrap();
        reg.remove(&topic).unwrap();
        assert!(reg.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn route_delivers_to_open_channel() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookUpdate);
        let rx = reg.create::<OrderBook>(&topic, 1).unwrap();
        match reg.route(&topic, book(11)) {
            Route::Deliver(tx, payload) => tx.send(payload).await.unwrap(),
            _ => panic!("expected delivery"),
        }
        assert_eq!(rx.recv().await.unwrap().sequence, 11);
        assert!(matches!(
            reg.route(&book_topic(FeedKind::OrderBookSnapshot), book(1)),
            Route::Unrouted
        ));
    }

    #[tokio::test]
    async fn pending_slot_flushes_into_new_channel_in_order() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookSnapshot);
        assert!(reg.reserve(&topic).unwrap());
        assert!(!reg.reserve(&topic).unwrap());
        assert!(reg.get::<OrderBook>(&topic).is_none());

        for seq in [10, 11, 12] {
            assert!(matches!(reg.route(&topic, book(seq)), Route::Held));
        }
        let rx = reg.create::<OrderBook>(&topic, 1).unwrap();
        for seq in [10, 11, 12] {
            assert_eq!(rx.recv().await.unwrap().sequence, seq);
        }
    }

    #[test]
    fn abandon_discards_held_notifications() {
        let reg = TopicRegistry::new();
        let topic = book_topic(FeedKind::OrderBookSnapshot);
        reg.reserve(&topic).unwrap();
        let _ = reg.route(&topic, book(1));
        assert_eq!(reg.abandon(&topic), 1);
        assert!(reg.is_empty());
        assert_eq!(reg.abandon(&topic), 0);
    }

    #[tokio::test]
    async fn close_clears_and_refuses_new_slots() {
        let reg = TopicRegistry::new();
        let a = reg
            .create::<OrderBook>(&book_topic(FeedKind::OrderBookUpdate), 1)
            .unwrap();
        reg.reserve(&book_topic(FeedKind::OrderBookSnapshot)).unwrap();
        assert_eq!(reg.close(), 1);
        assert!(reg.is_empty());
        assert!(a.recv().await.is_none());
        assert_eq!(
            reg.reserve(&book_topic(FeedKind::OrderBookSnapshot)),
            Err(RegistryError::Closed)
        );
        assert!(matches!(
            reg.create::<OrderBook>(&book_topic(FeedKind::OrderBookUpdate), 1),
            Err(RegistryError::Closed)
        ));
    }

    #[test]
    fn topics_lists_open_channels_only() {
        let reg = TopicRegistry::new();
        reg.create::<OrderBook>(&book_topic(FeedKind::OrderBookUpdate), 1)
            .unwrap();
        reg.reserve(&book_topic(FeedKind::OrderBookSnapshot)).unwrap();
        assert_eq!(reg.topics(), vec![book_topic(FeedKind::OrderBookUpdate)]);
        assert_eq!(reg.remove_all(), 1);
        assert!(reg.is_empty());
    }
}

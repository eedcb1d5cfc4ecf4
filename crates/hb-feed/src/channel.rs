//! Typed topic channels.
//!
//! Each open topic owns one bounded `mpsc` channel. The registry keeps the
//! sender and a weak reference to the receiver; every subscriber to the topic
//! gets a clone of the same [`FeedReceiver`], so re-subscribing never splits
//! delivery. Once the last handle is dropped the receiver closes and sends on
//! the topic fail instead of waiting for a reader that no longer exists.

use std::sync::{Arc, Weak};

use hb_core::{CandlePeriod, Candles, Feed, OrderBook, Symbol, Ticker, Trades};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc};

/// Shared receiving end of a topic channel.
///
/// Clones read from the same queue; each message is delivered to exactly one
/// of them.
pub struct FeedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for FeedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for FeedReceiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedReceiver")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl<T> FeedReceiver<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next message, or `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }

    /// Non-blocking receive. `None` if nothing is buffered or another clone
    /// is currently inside `recv`.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }

    /// `true` if both handles read from the same channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A topic channel as held by the registry: the sender, and the receiver
/// only while some caller still holds it.
pub struct Channel<T> {
    pub(crate) tx: mpsc::Sender<T>,
    rx: Weak<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Channel<T> {
    /// A new channel and the first (owning) handle to its receiver.
    pub(crate) fn new(capacity: usize) -> (Self, FeedReceiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = FeedReceiver::new(rx);
        let channel = Self {
            tx,
            rx: Arc::downgrade(&rx.inner),
        };
        (channel, rx)
    }

    /// Another handle to the receiver, or `None` once every handle is gone.
    pub(crate) fn receiver(&self) -> Option<FeedReceiver<T>> {
        self.rx.upgrade().map(|inner| FeedReceiver { inner })
    }
}

/// A registry slot's channel, one variant per payload type.
pub enum TopicChannel {
    Ticker(Channel<Ticker>),
    OrderBook(Channel<OrderBook>),
    Trades(Channel<Trades>),
    Candles(Channel<Candles>),
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A decoded notification payload that can be routed to a topic channel.
pub trait FeedPayload: DeserializeOwned + Send + Sized + 'static {
    /// The feed whose notifications decode to this type.
    const FEED: Feed;

    /// Market the payload belongs to.
    fn symbol(&self) -> &Symbol;

    /// Candle period, for payloads keyed by one.
    fn period(&self) -> Option<CandlePeriod> {
        None
    }

    fn wrap(channel: Channel<Self>) -> TopicChannel;

    fn unwrap(channel: &TopicChannel) -> Option<&Channel<Self>>;
}

macro_rules! feed_payload {
    ($ty:ident) => {
        const FEED: Feed = Feed::$ty;

        fn symbol(&self) -> &Symbol {
            &self.symbol
        }

        fn wrap(channel: Channel<Self>) -> TopicChannel {
            TopicChannel::$ty(channel)
        }

        fn unwrap(channel: &TopicChannel) -> Option<&Channel<Self>> {
            match channel {
                TopicChannel::$ty(c) => Some(c),
                _ => None,
            }
        }
    };
}

impl FeedPayload for Ticker {
    feed_payload!(Ticker);
}

impl FeedPayload for OrderBook {
    feed_payload!(OrderBook);
}

impl FeedPayload for Trades {
    feed_payload!(Trades);
}

impl FeedPayload for Candles {
    feed_payload!(Candles);

    fn period(&self) -> Option<CandlePeriod> {
        Some(self.period)
    }
}

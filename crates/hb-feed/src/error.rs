//! Errors surfaced by the multiplexer.
//!
//! [`FeedError`] is returned synchronously from subscribe / unsubscribe /
//! query calls. [`DispatchError`] describes problems on the inbound path,
//! which has no caller to return to; those are published on the shared
//! error channel through [`ErrorSink`].

use std::sync::Mutex;

use hb_core::error::HbError;
use hb_core::ws::TransportError;
use hb_core::Feed;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::channel::FeedReceiver;
use crate::registry::{RegistryError, Topic};

/// Failure of a caller-initiated operation.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Symbol or currency code failed validation.
    #[error(transparent)]
    InvalidSymbol(#[from] HbError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The exchange answered but did not confirm.
    #[error("{method} not confirmed for {subscription}")]
    Rejected {
        method: &'static str,
        subscription: String,
    },

    /// Unsubscribe for a topic that has no open channel.
    #[error("not subscribed: {0}")]
    NotSubscribed(String),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    /// A subscription opened a different number of channels than the feed has.
    #[error("{feed} opened {got} channel(s), expected {expected}")]
    ChannelCount {
        feed: Feed,
        expected: usize,
        got: usize,
    },

    /// An RPC result did not have the expected shape.
    #[error("decode {method} reply: {reason}")]
    Decode { method: String, reason: String },

    #[error("feed multiplexer closed")]
    Closed,
}

/// Problem observed while handling an inbound notification.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Method outside the known notification set.
    #[error("unknown notification method {method:?}")]
    UnknownMethod { method: String, params: Value },

    /// Known method, payload did not decode.
    #[error("decode {method}: {reason}")]
    Decode {
        method: String,
        params: Value,
        reason: String,
    },

    /// Decoded fine but no channel is open for the topic.
    #[error("no channel for {topic}")]
    Unrouted { topic: Topic },

    /// Every receiver of an open channel was dropped.
    #[error("receiver for {topic} dropped")]
    ConsumerGone { topic: Topic },

    /// Notifications received before a subscription was confirmed, then
    /// dropped because the exchange rejected it.
    #[error("{count} early notification(s) for {topic} discarded")]
    Discarded { topic: Topic, count: usize },

    /// The connection failed under the dispatcher.
    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

// ---------------------------------------------------------------------------
// Error channel
// ---------------------------------------------------------------------------

/// Writer side of the shared error channel.
///
/// Reporting never blocks: a full channel drops the event with a warning so
/// that the dispatcher cannot stall behind an idle error consumer.
pub(crate) struct ErrorSink {
    tx: Mutex<Option<mpsc::Sender<DispatchError>>>,
    rx: FeedReceiver<DispatchError>,
}

impl ErrorSink {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx: Mutex::new(Some(tx)),
            rx: FeedReceiver::new(rx),
        }
    }

    pub(crate) fn receiver(&self) -> FeedReceiver<DispatchError> {
        self.rx.clone()
    }

    pub(crate) fn report(&self, err: DispatchError) {
        debug!("[dispatch] {err}");
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            debug!("[dispatch] error channel closed, dropping: {err}");
            return;
        };
        match tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                warn!("[dispatch] error channel full, dropping: {err}");
            }
            Err(TrySendError::Closed(err)) => {
                debug!("[dispatch] error receiver gone, dropping: {err}");
            }
        }
    }

    /// Drop the sender. Receivers drain what is buffered and then see the end
    /// of the stream.
    pub(crate) fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hb_core::{FeedKind, Symbol};

    fn topic() -> Topic {
        Topic::new(FeedKind::Ticker, Symbol::new("ETHBTC").unwrap(), None)
    }

    #[tokio::test]
    async fn full_error_channel_drops_without_blocking() {
        let sink = ErrorSink::new(1);
        let rx = sink.receiver();
        sink.report(DispatchError::Unrouted { topic: topic() });
        sink.report(DispatchError::ConsumerGone { topic: topic() });

        assert!(matches!(rx.recv().await, Some(DispatchError::Unrouted { .. })));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn close_ends_the_stream_after_buffered_events() {
        let sink = ErrorSink::new(4);
        let rx = sink.receiver();
        sink.report(DispatchError::Transport { reason: "eof".into() });
        sink.close();
        sink.report(DispatchError::Transport { reason: "late".into() });

        assert!(matches!(rx.recv().await, Some(DispatchError::Transport { .. })));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::Unrouted { topic: topic() };
        assert_eq!(err.to_string(), "no channel for ticker:ETHBTC");
        let err = DispatchError::UnknownMethod {
            method: "tickerz".into(),
            params: Value::Null,
        };
        assert_eq!(err.to_string(), "unknown notification method \"tickerz\"");
    }
}

//! # hb-feed
//!
//! HitBTC market-data multiplexer over one JSON-RPC connection.
//!
//! ## Architecture
//!
//! Every subscription opens one or two *topics* (for example the update and
//! snapshot streams of an order book). Each topic owns a bounded channel
//! whose receiver is handed to the caller. Inbound notifications are routed
//! to topics by method name and the payload's own `symbol`.
//!
//! - [`registry`]: topic → channel map, one lock for every lookup and mutation
//! - [`dispatcher`]: decodes notifications and delivers them in wire order
//! - [`subscription`]: subscribe / unsubscribe RPCs, per-key serialization
//! - [`mux`]: the [`FeedMux`] facade and global close
//! - [`channel`]: typed receiver handles shared by re-subscribers
//! - [`json_util`]: acknowledgment normalization
//!
//! Problems on the inbound path (unknown methods, undecodable payloads,
//! notifications for topics nobody opened) never stop dispatch; they are
//! published on the error channel returned by [`FeedMux::errors`].

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod json_util;
pub mod mux;
pub mod registry;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{FeedPayload, FeedReceiver};
pub use error::{DispatchError, FeedError};
pub use mux::{FeedConfig, FeedMux};
pub use registry::Topic;
pub use subscription::SubscriptionKey;

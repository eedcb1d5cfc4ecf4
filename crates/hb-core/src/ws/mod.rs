//! JSON-RPC 2.0 transport over a single WebSocket connection.
//!
//! [`RpcTransport`] is the seam the feed multiplexer is written against;
//! [`RpcClient`] is the production implementation.

pub mod client;
pub mod transport;

pub use client::{RpcClient, RpcConfig};
pub use transport::{NotificationHandler, RpcTransport, TransportError};

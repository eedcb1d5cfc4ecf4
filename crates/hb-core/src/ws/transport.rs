//! Transport traits and errors.
//!
//! A transport can `call` a method and await its reply, and invokes one
//! registered [`NotificationHandler`] for every unsolicited inbound message,
//! in arrival order, from a single logical inbound context.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures of the RPC transport itself.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport was closed locally.
    #[error("transport closed")]
    Closed,

    /// The connection dropped while the call was in flight.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No reply within the call timeout.
    #[error("call {method} timed out")]
    Timeout { method: String },

    /// The peer answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Rpc {
        code: i64,
        message: String,
        description: Option<String>,
    },
}

/// Receiver of unsolicited inbound messages.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Called once per notification, in arrival order. The transport awaits
    /// the returned future before handing over the next notification.
    async fn on_notification(&self, method: &str, params: Value);

    /// Called when the connection fails underneath the handler.
    async fn on_transport_error(&self, _err: &TransportError) {}
}

/// A bidirectional RPC connection.
///
/// `call` may be invoked concurrently from many tasks.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue a request and await its result.
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Install the handler for inbound notifications. Replaces any previous
    /// handler.
    fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>);

    /// Terminate the connection. Once this returns the handler is never
    /// invoked again.
    async fn close(&self);
}

//! JSON-RPC 2.0 client over one WebSocket connection.
//!
//! Each `RpcClient` runs two tokio tasks:
//! 1. The **connection task** owns the socket. It writes queued requests,
//!    answers pings, sends periodic keep-alive pings, routes replies to the
//!    caller awaiting them, and pushes notifications onto the inbound queue.
//! 2. The **dispatch task** drains the inbound queue in arrival order and
//!    awaits the registered [`NotificationHandler`] for each message.
//!
//! Replies never pass through the inbound queue, so a handler stalled on a
//! slow consumer only delays RPC replies once the inbound queue is full.
//!
//! There is no auto-reconnect: exchange-side subscriptions die with the
//! socket, so a disconnect fails every pending call and is reported to the
//! handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::transport::{NotificationHandler, RpcTransport, TransportError};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Pending request id → reply sender.
type PendingMap = Arc<Mutex<AHashMap<String, oneshot::Sender<Result<Value, TransportError>>>>>;

type HandlerSlot = Option<Arc<dyn NotificationHandler>>;

/// Connection settings for an [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Full WebSocket URL (e.g. `wss://api.hitbtc.com/api/2/ws`).
    pub url: String,
    /// Upper bound on a single `call` round-trip.
    pub call_timeout: Duration,
    /// Interval between keep-alive pings. `None` disables them.
    pub ping_interval: Option<Duration>,
    /// Capacity of the notification queue between socket and handler.
    pub inbound_capacity: usize,
}

/// Something the connection task hands to the dispatch task.
enum Inbound {
    Notification { method: String, params: Value },
    Failure(TransportError),
}

/// A connected JSON-RPC client.
pub struct RpcClient {
    config: RpcConfig,
    outbound_tx: mpsc::Sender<String>,
    pending: PendingMap,
    handler_tx: watch::Sender<HandlerSlot>,
    shutdown_tx: watch::Sender<bool>,
    conn_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RpcClient {
    /// Open the socket and start the connection and dispatch tasks.
    pub async fn connect(config: RpcConfig) -> Result<Arc<Self>> {
        info!("[rpc] connecting to {}", config.url);
        let stream = connect_ws(&config.url)
            .await
            .with_context(|| format!("connect {}", config.url))?;
        info!("[rpc] connected");

        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(config.inbound_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (handler_tx, handler_rx) = watch::channel::<HandlerSlot>(None);
        let pending: PendingMap = Arc::new(Mutex::new(AHashMap::new()));

        let conn_task = tokio::spawn(connection_loop(
            stream,
            config.ping_interval,
            outbound_rx,
            inbound_tx,
            Arc::clone(&pending),
            shutdown_rx,
        ));
        let dispatch_task = tokio::spawn(dispatch_loop(inbound_rx, handler_rx));

        Ok(Arc::new(Self {
            config,
            outbound_tx,
            pending,
            handler_tx,
            shutdown_tx,
            conn_task: Mutex::new(Some(conn_task)),
            dispatch_task: Mutex::new(Some(dispatch_task)),
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl RpcTransport for RpcClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        debug!("[rpc] -> {method} id={id}");
        if self.outbound_tx.send(payload.to_string()).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(TransportError::ConnectionLost("writer task gone".into()));
        }

        match tokio::time::timeout(self.config.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(TransportError::ConnectionLost("reply dropped".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!("[rpc] {method} id={id} timed out after {:?}", self.config.call_timeout);
                Err(TransportError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        self.handler_tx.send_replace(Some(handler));
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        // Dispatch goes first: the handler may be parked on a slow consumer,
        // and the connection task may be parked on the full inbound queue
        // behind it. Queued notifications are discarded.
        if let Some(task) = self.dispatch_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.conn_task.lock().await.take() {
            let _ = task.await;
        }
        info!("[rpc] closed");
    }
}

/// Owns the socket until shutdown or disconnect.
async fn connection_loop(
    stream: WsStream,
    ping_interval: Option<Duration>,
    mut outbound_rx: mpsc::Receiver<String>,
    inbound_tx: mpsc::Sender<Inbound>,
    pending: PendingMap,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut ws_write, mut ws_read) = stream.split();

    let mut ping = ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    });

    let reason = loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("[rpc] shutdown signal received");
                let _ = ws_write.close().await;
                fail_pending(&pending, TransportError::Closed).await;
                return;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_inbound(&text, &pending, &inbound_tx).await;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => route_inbound(text, &pending, &inbound_tx).await,
                        Err(_) => warn!("[rpc] dropping non-UTF-8 binary frame ({} bytes)", data.len()),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break format!("closed by peer: {frame:?}");
                    }
                    Some(Err(e)) => break format!("read error: {e}"),
                    None => break "stream ended".to_string(),
                    _ => {} // Pong, raw frames
                }
            }

            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                    break format!("send error: {e}");
                }
            }

            _ = async {
                match ping.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                if let Err(e) = ws_write.send(Message::Ping(Default::default())).await {
                    break format!("ping send error: {e}");
                }
            }
        }
    };

    error!("[rpc] disconnected: {reason}");
    let err = TransportError::ConnectionLost(reason);
    fail_pending(&pending, err.clone()).await;
    let _ = inbound_tx.send(Inbound::Failure(err)).await;
}

/// Hand every inbound message, in order, to the registered handler.
///
/// Messages that arrive before a handler is registered wait in the queue.
async fn dispatch_loop(
    mut inbound_rx: mpsc::Receiver<Inbound>,
    mut handler_rx: watch::Receiver<HandlerSlot>,
) {
    while let Some(event) = inbound_rx.recv().await {
        let handler = loop {
            let current = handler_rx.borrow_and_update().clone();
            if let Some(h) = current {
                break h;
            }
            if handler_rx.changed().await.is_err() {
                return;
            }
        };

        match event {
            Inbound::Notification { method, params } => {
                handler.on_notification(&method, params).await;
            }
            Inbound::Failure(err) => handler.on_transport_error(&err).await,
        }
    }
    debug!("[rpc] dispatch loop exited");
}

/// Route one text frame: replies to their caller, notifications to the queue.
async fn route_inbound(text: &str, pending: &PendingMap, inbound_tx: &mpsc::Sender<Inbound>) {
    let v: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("[rpc] unparseable frame: {e}: {text}");
            return;
        }
    };

    if let Some(id) = v.get("id").filter(|id| !id.is_null()) {
        let key = id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string());
        let waiter = pending.lock().await.remove(&key);
        match waiter {
            Some(tx) => {
                let _ = tx.send(parse_reply(v));
            }
            None => debug!("[rpc] reply for unknown id {key}"),
        }
        return;
    }

    let Some(method) = v.get("method").and_then(Value::as_str).map(str::to_string) else {
        warn!("[rpc] frame is neither reply nor notification: {text}");
        return;
    };
    let params = v.get("params").cloned().unwrap_or(Value::Null);
    let _ = inbound_tx.send(Inbound::Notification { method, params }).await;
}

/// Convert a JSON-RPC reply into the call result.
pub(crate) fn parse_reply(reply: Value) -> Result<Value, TransportError> {
    let Value::Object(mut map) = reply else {
        return Ok(Value::Null);
    };
    if let Some(err) = map.remove("error").filter(|e| !e.is_null()) {
        return Err(TransportError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            description: err
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(map.remove("result").unwrap_or(Value::Null))
}

async fn fail_pending(pending: &PendingMap, err: TransportError) {
    let drained: Vec<_> = pending.lock().await.drain().collect();
    if !drained.is_empty() {
        warn!("[rpc] failing {} pending call(s): {err}", drained.len());
    }
    for (_, tx) in drained {
        let _ = tx.send(Err(err.clone()));
    }
}

/// Establish a (TLS) WebSocket connection.
async fn connect_ws(url: &str) -> Result<WsStream> {
    let request = url.into_client_request()?;
    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_result_is_extracted() {
        let reply = json!({"jsonrpc": "2.0", "result": true, "id": "abc"});
        assert_eq!(parse_reply(reply).unwrap(), Value::Bool(true));
    }

    #[test]
    fn reply_error_becomes_rpc_error() {
        let reply = json!({
            "jsonrpc": "2.0",
            "error": {"code": 2001, "message": "Symbol not found", "description": "Try get /api/2/public/symbol"},
            "id": "abc"
        });
        match parse_reply(reply) {
            Err(TransportError::Rpc { code, message, description }) => {
                assert_eq!(code, 2001);
                assert_eq!(message, "Symbol not found");
                assert!(description.is_some());
            }
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn reply_without_result_is_null() {
        assert_eq!(parse_reply(json!({"id": "x"})).unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn route_inbound_resolves_pending_reply() {
        let pending: PendingMap = Arc::new(Mutex::new(AHashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert("42".into(), tx);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(4);

        route_inbound(r#"{"jsonrpc":"2.0","result":true,"id":"42"}"#, &pending, &inbound_tx).await;

        assert_eq!(rx.await.unwrap().unwrap(), Value::Bool(true));
        assert!(inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn route_inbound_queues_notifications_in_order() {
        let pending: PendingMap = Arc::new(Mutex::new(AHashMap::new()));
        let (inbound_tx, mut inbound_rx) = mpsc::channel(4);

        route_inbound(r#"{"jsonrpc":"2.0","method":"ticker","params":{"n":1}}"#, &pending, &inbound_tx).await;
        route_inbound(r#"{"jsonrpc":"2.0","method":"ticker","params":{"n":2}}"#, &pending, &inbound_tx).await;
        route_inbound("not json", &pending, &inbound_tx).await;

        for n in 1..=2 {
            match inbound_rx.try_recv() {
                Ok(Inbound::Notification { method, params }) => {
                    assert_eq!(method, "ticker");
                    assert_eq!(params["n"], n);
                }
                _ => panic!("expected notification {n}"),
            }
        }
        assert!(inbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fail_pending_drains_every_waiter() {
        let pending: PendingMap = Arc::new(Mutex::new(AHashMap::new()));
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        pending.lock().await.insert("1".into(), tx1);
        pending.lock().await.insert("2".into(), tx2);

        fail_pending(&pending, TransportError::Closed).await;

        assert!(matches!(rx1.await.unwrap(), Err(TransportError::Closed)));
        assert!(matches!(rx2.await.unwrap(), Err(TransportError::Closed)));
        assert!(pending.lock().await.is_empty());
    }

    struct Recorder(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl NotificationHandler for Recorder {
        async fn on_notification(&self, method: &str, _params: Value) {
            self.0.lock().unwrap().push(method.to_string());
        }
        async fn on_transport_error(&self, err: &TransportError) {
            self.0.lock().unwrap().push(format!("error: {err}"));
        }
    }

    #[tokio::test]
    async fn dispatch_waits_for_handler_registration() {
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let (handler_tx, handler_rx) = watch::channel::<HandlerSlot>(None);
        inbound_tx
            .send(Inbound::Notification { method: "ticker".into(), params: Value::Null })
            .await
            .unwrap();
        inbound_tx
            .send(Inbound::Failure(TransportError::ConnectionLost("eof".into())))
            .await
            .unwrap();
        drop(inbound_tx);

        let task = tokio::spawn(dispatch_loop(inbound_rx, handler_rx));
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        handler_tx.send_replace(Some(recorder.clone() as Arc<dyn NotificationHandler>));
        task.await.unwrap();

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["ticker".to_string(), "error: connection lost: eof".to_string()]);
    }
}

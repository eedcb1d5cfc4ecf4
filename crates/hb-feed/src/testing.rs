//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hb_core::ws::{NotificationHandler, RpcTransport, TransportError};
use serde_json::Value;
use tokio::sync::{oneshot, watch};

/// Records calls, answers from a reply queue (`true` when empty), and lets
/// the test inject notifications through the registered handler.
pub(crate) struct MockTransport {
    calls: Mutex<Vec<(String, Value)>>,
    call_count: watch::Sender<usize>,
    replies: Mutex<VecDeque<Result<Value, TransportError>>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    handler: Mutex<Option<Arc<dyn NotificationHandler>>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            call_count: watch::Sender::new(0),
            replies: Mutex::new(VecDeque::new()),
            hold: Mutex::new(None),
            handler: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn push_reply(&self, reply: Result<Value, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// The next call blocks until the returned sender fires (or is dropped).
    pub(crate) fn hold_next_call(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    /// Wait until at least `n` calls have been recorded.
    pub(crate) async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Deliver a notification the way the connection's dispatch task would.
    pub(crate) async fn inject(&self, method: &str, params: Value) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler.on_notification(method, params).await;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        self.call_count.send_modify(|c| *c += 1);
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Value::Bool(true)))
    }

    fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.handler.lock().unwrap().take();
    }
}

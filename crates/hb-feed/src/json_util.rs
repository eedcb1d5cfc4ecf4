//! JSON helpers for RPC replies.
//!
//! The exchange has answered subscription requests with a bare boolean
//! (`"result": true`) and with a wrapped object (`"result": {"result": true}`)
//! at different points in the protocol's life. [`ack_success`] folds both
//! into one boolean.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FeedError;

/// `true` only for an affirmative acknowledgment.
///
/// Anything that is not `true` or `{"result": true}` (recursively) counts as
/// a rejection, including `null` and missing fields.
pub fn ack_success(reply: &Value) -> bool {
    match reply {
        Value::Bool(ok) => *ok,
        Value::Object(map) => map.get("result").is_some_and(ack_success),
        _ => false,
    }
}

/// Decode a typed RPC result, tagging failures with the method name.
pub fn decode_reply<T: DeserializeOwned>(method: &str, reply: Value) -> Result<T, FeedError> {
    serde_json::from_value(reply).map_err(|e| FeedError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

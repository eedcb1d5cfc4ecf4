//! # hb-core
//!
//! Core crate for the HitBTC feed system, providing:
//!
//! - **Types** (`types`): feed kinds, symbols, candle periods, decoded payloads
//! - **Configuration** (`config`): JSON config deserialization
//! - **Error types** (`error`): domain-specific `HbError` via thiserror
//! - **Transport** (`ws`): JSON-RPC 2.0 over WebSocket behind the `RpcTransport` trait
//! - **Time utilities** (`time_util`): exchange wire timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;

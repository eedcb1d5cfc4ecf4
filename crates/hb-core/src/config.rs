//! Configuration parsing for the HitBTC feed system.
//!
//! Settings come from a single JSON config file. Every tunable is optional
//! and resolved through an `effective_*()` accessor that applies the default.
//!
//! # Example config
//!
//! ```json
//! {
//!   "module": { "module_name": "hitbtc_feed", "log_path": "/tmp/log" },
//!   "connection": { "ws_url": "wss://api.hitbtc.com/api/2/ws", "call_timeout_ms": 5000 },
//!   "feed": { "channel_capacity": 1, "error_capacity": 256 },
//!   "subscriptions": [
//!     { "feed": "ticker", "symbol": "ETHBTC" },
//!     { "feed": "candles", "symbol": "BTCUSD", "period": "M30" }
//!   ]
//! }
//! ```

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::HbError;
use crate::types::{CandlePeriod, Feed, Symbol};
use crate::ws::RpcConfig;

/// HitBTC API v2 streaming endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.hitbtc.com/api/2/ws";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub module: Option<ModuleMeta>,

    /// WebSocket / RPC connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Multiplexer channel sizing.
    #[serde(default)]
    pub feed: FeedSettings,

    /// Topics the runner subscribes to at startup.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"hitbtc_feed"`.
    pub fn module_name(&self) -> String {
        self.module
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "hitbtc_feed".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.module.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), HbError> {
        let url = self.connection.effective_ws_url();
        let parsed = url::Url::parse(&url).map_err(|e| HbError::Config(format!("ws_url {url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(HbError::Config(format!("ws_url {url:?}: expected ws:// or wss://")));
        }
        for sub in &self.subscriptions {
            if sub.period.is_some() && sub.feed != Feed::Candles {
                return Err(HbError::Config(format!(
                    "subscription {} {}: period is only valid for candles",
                    sub.feed, sub.symbol
                )));
            }
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket URL (default: [`DEFAULT_WS_URL`]).
    pub ws_url: Option<String>,

    /// Per-call reply timeout in milliseconds (default: 5000).
    pub call_timeout_ms: Option<u64>,

    /// Keep-alive ping interval in seconds; `0` disables (default: 30).
    pub ping_interval_sec: Option<u64>,

    /// Notification queue between socket and dispatcher (default: 1024).
    pub inbound_capacity: Option<usize>,
}

impl ConnectionConfig {
    pub fn effective_ws_url(&self) -> String {
        self.ws_url.clone().unwrap_or_else(|| DEFAULT_WS_URL.to_string())
    }

    pub fn effective_call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.unwrap_or(5_000))
    }

    pub fn effective_ping_interval(&self) -> Option<Duration> {
        match self.ping_interval_sec.unwrap_or(30) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn effective_inbound_capacity(&self) -> usize {
        self.inbound_capacity.unwrap_or(1024).max(1)
    }

    /// Build the transport config.
    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.effective_ws_url(),
            call_timeout: self.effective_call_timeout(),
            ping_interval: self.effective_ping_interval(),
            inbound_capacity: self.effective_inbound_capacity(),
        }
    }
}

/// Multiplexer channel sizing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedSettings {
    /// Per-topic channel capacity (default: 1, i.e. near-unbuffered).
    pub channel_capacity: Option<usize>,

    /// Error channel capacity (default: 256).
    pub error_capacity: Option<usize>,
}

impl FeedSettings {
    pub fn effective_channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(1).max(1)
    }

    pub fn effective_error_capacity(&self) -> usize {
        self.error_capacity.unwrap_or(256).max(1)
    }
}

/// One startup subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    pub feed: Feed,
    pub symbol: Symbol,
    /// Candle period (candles only, default `M30`).
    pub period: Option<CandlePeriod>,
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

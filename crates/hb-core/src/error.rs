//! Typed error definitions for the HitBTC feed system.
//!
//! Provides [`HbError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement `std::error::Error`
//! via `thiserror`, so they integrate seamlessly with `anyhow::Result`.
//!
//! Transport failures have their own enum, [`TransportError`](crate::ws::TransportError),
//! because callers of `call()` match on its variants.

use thiserror::Error;

/// Domain-specific errors for the HitBTC feed system.
#[derive(Debug, Error)]
pub enum HbError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// A market symbol failed validation (empty, or non-alphanumeric).
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Unknown candle period string.
    #[error("invalid candle period: {0:?}")]
    InvalidPeriod(String),

    /// Wire payload parsing error.
    #[error("parse error: {0}")]
    Parse(String),
}

//! Market symbol type.
//!
//! HitBTC identifies markets by an uppercase alphanumeric id (`ETHBTC`,
//! `BTCUSD`). [`Symbol`] validates and normalizes caller input once so that
//! routing keys built from user input and from exchange payloads compare
//! equal.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::HbError;

/// A validated, uppercase market identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Validate and normalize a symbol.
    ///
    /// Surrounding whitespace is trimmed and ASCII letters are uppercased.
    /// Empty input or any non-alphanumeric character is rejected.
    pub fn new(raw: &str) -> Result<Self, HbError> {
        let s = raw.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HbError::InvalidSymbol(raw.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = HbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Symbol::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(Symbol::new(" ethbtc ").unwrap().as_str(), "ETHBTC");
    }

    #[test]
    fn empty_symbol() {
        assert!(Symbol::new("").is_err());
        assert!(Symbol::new("   ").is_err());
    }

    #[test]
    fn rejects_separators() {
        assert!(Symbol::new("BTC-USD").is_err());
        assert!(Symbol::new("BTC USD").is_err());
    }

    #[test]
    fn deserialize_validates() {
        let s: Symbol = serde_json::from_str("\"btcusd\"").unwrap();
        assert_eq!(s.as_str(), "BTCUSD");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }
}

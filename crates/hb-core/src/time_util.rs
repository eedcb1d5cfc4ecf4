//! Exchange wire timestamp utilities.
//!
//! HitBTC transmits every timestamp as an ISO-8601 UTC string with
//! millisecond precision and a trailing `Z` (`2024-01-01T00:00:00.000Z`).
//! Parsing is lenient about the fractional part (RFC 3339 accepts any
//! precision); formatting always reproduces the exact wire form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

use crate::error::HbError;

/// Parse a wire timestamp into UTC.
pub fn parse_wire_timestamp(s: &str) -> Result<DateTime<Utc>, HbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| HbError::Parse(format!("timestamp {s:?}: {e}")))
}

/// Format a UTC timestamp in the exchange's wire form.
pub fn format_wire_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `#[serde(with = "wire_timestamp")]` adapter for required timestamps.
pub mod wire_timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_wire_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_wire_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "wire_timestamp_opt")]` adapter for optional timestamps.
///
/// Missing, `null` and `""` all decode to `None`.
pub mod wire_timestamp_opt {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&format_wire_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.is_empty() => parse_wire_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

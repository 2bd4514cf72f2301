//! Timestamp and duration formats for requests, responses, and stored records
//!
//! Every externally visible timestamp is UTC in `YYYY-MM-DD HH:MM:SS` form,
//! which is also the format the database operator expects for a
//! point-in-time restore target.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::Error;

/// Format string for all externally visible timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a UTC timestamp as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD HH:MM:SS` string as a UTC timestamp.
///
/// RFC 3339 input (as stored by the Kubernetes API) is accepted too, so
/// values copied from `kubectl get -o yaml` work.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, Error> {
    let trimmed = input.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            Error::validation(format!(
                "invalid timestamp '{}', expected UTC 'YYYY-MM-DD HH:MM:SS'",
                input
            ))
        })
}

/// Compact timestamp used when deriving resource names (`YYYYMMDDHHMMSS`)
pub fn name_suffix(ts: &DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

/// Parse a human-friendly duration.
///
/// Supports `Nh` (hours), `Nm` (minutes), and `Ns` (seconds); a bare number
/// is seconds. Examples: "2h", "5m", "10s", "600".
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
    let s = input.trim();
    let invalid = || {
        Error::validation(format!(
            "invalid duration '{}', expected e.g. 2h, 5m, 10s",
            input
        ))
    };
    let (digits, unit) = if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else {
        (s, 1)
    };
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    n.checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Serde adapter for `Option<DateTime<Utc>>` in `YYYY-MM-DD HH:MM:SS` form
pub mod option_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional timestamp, emitting `null` when absent
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional timestamp in either supported format
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => super::parse_timestamp(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Serde adapter for `DateTime<Utc>` in `YYYY-MM-DD HH:MM:SS` form
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a timestamp
    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    /// Deserialize a timestamp in either supported format
    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-09 07:05:03");
    }

    #[test]
    fn test_parse_timestamp_space_format() {
        let ts = parse_timestamp("2024-01-09 07:05:03").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let ts = parse_timestamp("2024-01-09T07:05:03Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap());

        // Offsets are normalised to UTC
        let ts = parse_timestamp("2024-01-09T09:05:03+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday at noon").unwrap_err();
        assert!(err.to_string().contains("YYYY-MM-DD HH:MM:SS"));
        assert!(parse_timestamp("2024-13-01 00:00:00").is_err());
    }

    #[test]
    fn test_name_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap();
        assert_eq!(name_suffix(&ts), "20240109070503");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration(" 600 ").unwrap(), Duration::from_secs(600));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-1m").is_err());
    }

    #[test]
    fn test_option_timestamp_serde() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "option_timestamp", default)]
            at: Option<DateTime<Utc>>,
        }

        let w: Wrapper = serde_json::from_str(r#"{"at":"2024-01-09 07:05:03"}"#).unwrap();
        assert_eq!(w.at, Some(Utc.with_ymd_and_hms(2024, 1, 9, 7, 5, 3).unwrap()));

        let w: Wrapper = serde_json::from_str(r#"{"at":null}"#).unwrap();
        assert!(w.at.is_none());

        let w: Wrapper = serde_json::from_str(r#"{}"#).unwrap();
        assert!(w.at.is_none());

        let json = serde_json::to_string(&Wrapper { at: None }).unwrap();
        assert_eq!(json, r#"{"at":null}"#);
    }
}

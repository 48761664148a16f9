//! Logical timestamps
//!
//! All timestamps are kept at millisecond precision and rendered as
//! `YYYY-MM-DDTHH:MM:SS.mmmZ`. The fixed width means lexicographic and
//! chronological order coincide, which the remote `updatedAt > watermark`
//! queries rely on.

use chrono::{DateTime, DurationRound, SecondsFormat, Utc};

/// Current time truncated to milliseconds
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(chrono::Duration::milliseconds(1))
        .unwrap_or(now)
}

/// Render a timestamp in the canonical wire format
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp from any RFC 3339 string, truncating to milliseconds
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
    Some(
        ts.duration_trunc(chrono::Duration::milliseconds(1))
            .unwrap_or(ts),
    )
}

/// Serde adapter for required timestamps
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for optional timestamps (`null` when absent)
pub mod iso_millis_opt {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
            None => Ok(None),
        }
    }
}

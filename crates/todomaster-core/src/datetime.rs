use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Formats a timestamp the way `Date.prototype.toISOString` does:
/// `YYYY-MM-DDTHH:MM:SS.sssZ`.
#[must_use]
pub fn to_iso_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts any RFC 3339 timestamp and normalises it to UTC.
pub fn parse_iso(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())
        .map_err(|err| anyhow::anyhow!("invalid timestamp {raw:?}: {err}"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// Drops sub-millisecond precision so an in-memory value equals what a
/// save/load cycle gives back.
#[must_use]
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

#[must_use]
pub fn format_local(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub mod iso_millis_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_iso_millis(*dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso(&raw).map_err(serde::de::Error::custom)
    }
}

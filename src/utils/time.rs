use serde::{Deserialize, Deserializer, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parse a server timestamp.
///
/// The chat server emits naive ISO 8601 timestamps with or without
/// fractional seconds; RFC 3339 timestamps are accepted and converted to UTC.
pub fn parse(s: &str) -> Option<PrimitiveDateTime> {
    let with_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let without_fraction = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, with_fraction) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(s, without_fraction) {
        return Some(dt);
    }
    OffsetDateTime::parse(s, &Rfc3339).ok().map(|dt| {
        let utc = dt.to_offset(time::UtcOffset::UTC);
        PrimitiveDateTime::new(utc.date(), utc.time())
    })
}

/// Deserialize a server timestamp into a PrimitiveDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}")))
}

/// Serialize a PrimitiveDateTime the way the server formats it
pub fn serialize<S>(datetime: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]"
        ))
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

//! Custom types for common data structures

use chrono::{DateTime, Utc};

/// Standard UTC DateTime type used across all Beacon crates
///
/// Serializes as ISO 8601 with a `Z` suffix. When used in API types add
/// `#[schema(value_type = String, format = DateTime)]` for utoipa.
pub type UtcDateTime = DateTime<Utc>;

/// Serialize a timestamp as RFC 3339 with millisecond precision, matching what
/// browsers produce with `Date.prototype.toISOString`.
pub fn iso_timestamp(value: &UtcDateTime) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serde helper for `UtcDateTime` fields emitted with [`iso_timestamp`].
pub mod iso_millis {
    use super::{iso_timestamp, UtcDateTime};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&iso_timestamp(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_timestamp_uses_millis_and_z() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(iso_timestamp(&at), "2024-01-15T14:30:00.000Z");
    }
}

// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! RFC3339-first, tolerant-on-read timestamp (de)serialization.
//!
//! The wire format is always RFC3339 on write. On read, a handful of common
//! non-RFC3339 shapes seen from vendor connectors are accepted so that
//! `toUniversal` conversions don't need their own parsing fallbacks; parse
//! failure is the adapter's concern (it records a processing note and
//! substitutes current UTC per §4.1), not this module's.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_rfc3339().serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_tolerant(&raw).map_err(de::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => v.to_rfc3339().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| parse_tolerant(&s).map_err(de::Error::custom))
            .transpose()
    }
}

/// Parses RFC3339 first, then falls back to a small set of formats
/// frequently emitted by ERP/POS vendor APIs: space-separated "naive"
/// datetimes (assumed UTC) and date-only strings (midnight UTC).
pub fn parse_tolerant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];
    for fmt in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
        if fmt == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, fmt) {
                return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
            }
        }
    }
    Err(format!("unrecognized timestamp format: `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_tolerant("2024-06-01T10:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T10:00:00+00:00");
    }

    #[test]
    fn parses_space_separated_naive() {
        let dt = parse_tolerant("2024-06-01 10:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T10:00:00+00:00");
    }

    #[test]
    fn parses_date_only_as_midnight() {
        let dt = parse_tolerant("2024-06-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_tolerant("not-a-date").is_err());
    }
}

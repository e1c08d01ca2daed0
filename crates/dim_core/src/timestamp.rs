use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::{DimError, DimResult};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidTime(pub i64);

/// `2040-01-01T00:00:00Z`, the end of every open version.
pub const SENTINEL_END: ValidTime = ValidTime(2_208_988_800 * MICROS_PER_SECOND);

impl ValidTime {
    pub fn now_micros() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64;
        Self(micros)
    }

    pub fn from_unix_seconds(seconds: i64) -> Self {
        Self(seconds * MICROS_PER_SECOND)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn is_sentinel(self) -> bool {
        self == SENTINEL_END
    }

    pub fn parse_rfc3339(value: &str) -> DimResult<Self> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| DimError::invalid(format!("invalid timestamp '{value}': {err}")))?;
        Ok(Self::from_offset(parsed))
    }

    /// Accepts RFC 3339 or a zone-less SQL `DATETIME` read as UTC.
    pub fn parse_sql_datetime(value: &str) -> DimResult<Self> {
        if let Ok(parsed) = Self::parse_rfc3339(value) {
            return Ok(parsed);
        }
        let format = format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
        );
        let parsed = PrimitiveDateTime::parse(value.trim(), format)
            .map_err(|err| DimError::invalid(format!("invalid datetime '{value}': {err}")))?;
        Ok(Self::from_offset(parsed.assume_utc()))
    }

    pub fn from_offset(value: OffsetDateTime) -> Self {
        Self((value.unix_timestamp_nanos() / 1_000) as i64)
    }

    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| format!("{}us", self.0))
    }
}

impl fmt::Display for ValidTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

// Serialized as RFC 3339; SQL datetimes and raw microseconds are accepted too.
impl Serialize for ValidTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for ValidTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Micros(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Micros(value) => Ok(ValidTime(value)),
            Raw::Text(value) => {
                ValidTime::parse_sql_datetime(&value).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ValidTime, SENTINEL_END};

    #[test]
    fn sentinel_is_2040() {
        assert_eq!(SENTINEL_END.to_rfc3339(), "2040-01-01T00:00:00Z");
        assert!(SENTINEL_END.is_sentinel());
        assert!(ValidTime::now_micros() < SENTINEL_END);
    }

    #[test]
    fn parses_rfc3339_to_micros() {
        let parsed = ValidTime::parse_rfc3339("2023-09-01T12:00:00Z").expect("parse");
        assert_eq!(parsed, ValidTime::from_unix_seconds(1_693_569_600));
        assert!(ValidTime::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn parses_sql_datetime_as_utc() {
        let plain = ValidTime::parse_sql_datetime("2023-09-01 12:00:00").expect("plain");
        let fraction = ValidTime::parse_sql_datetime("2023-09-01 12:00:00.250").expect("fraction");
        assert_eq!(plain, ValidTime::from_unix_seconds(1_693_569_600));
        assert_eq!(fraction.as_i64() - plain.as_i64(), 250_000);
        assert!(ValidTime::parse_sql_datetime("01/09/2023").is_err());
    }

    #[test]
    fn deserializes_text_and_micros() {
        let text: ValidTime = serde_json::from_str("\"2023-09-01T12:00:00Z\"").expect("text");
        let micros: ValidTime = serde_json::from_str("1693569600000000").expect("micros");
        assert_eq!(text, micros);
    }
}

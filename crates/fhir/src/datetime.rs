//! FHIR date and dateTime values.
//!
//! Upstream record systems are inconsistent about precision: the same field may arrive as a full
//! RFC 3339 instant, a local timestamp without an offset, or a bare calendar date. All three are
//! normalised into [`FhirDateTime`], which keeps the original offset so calendar-day comparisons
//! happen in the zone the record was written in.

use crate::{FhirError, FhirResult};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Layout for timestamps that carry no offset. Interpreted as UTC.
const NAIVE_DATETIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";

/// Layout for bare calendar dates. Interpreted as midnight UTC.
const DATE_LAYOUT: &str = "%Y-%m-%d";

/// A parsed FHIR `date`, `dateTime` or `instant` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FhirDateTime(DateTime<FixedOffset>);

impl FhirDateTime {
    /// Parse a FHIR temporal value.
    ///
    /// Accepted forms, tried in order:
    /// - RFC 3339 (`2024-03-01T10:15:00-05:00`, `2024-03-01T10:15:00Z`)
    /// - timestamp without offset (`2024-03-01T10:15:00`), taken as UTC
    /// - calendar date (`2024-03-01`), taken as midnight UTC
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::MalformedDate`] if `input` matches none of the accepted forms.
    pub fn parse(input: &str) -> FhirResult<Self> {
        let trimmed = input.trim();

        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self(parsed));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, NAIVE_DATETIME_LAYOUT) {
            return Ok(Self(Utc.from_utc_datetime(&naive).fixed_offset()));
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_LAYOUT) {
            return Ok(Self::from_date(date));
        }

        Err(FhirError::MalformedDate(input.to_string()))
    }

    /// Build a value from a calendar date at midnight UTC.
    pub fn from_date(date: NaiveDate) -> Self {
        let naive = date.and_time(NaiveTime::MIN);
        Self(Utc.from_utc_datetime(&naive).fixed_offset())
    }

    /// The calendar date in the offset the value was recorded with (time-of-day stripped).
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// The underlying instant.
    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl From<DateTime<Utc>> for FhirDateTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.fixed_offset())
    }
}

impl FromStr for FhirDateTime {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Serialize for FhirDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for FhirDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirDateTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = FhirDateTime::parse("2024-03-01T23:30:00-05:00").expect("rfc3339");
        // Calendar date stays in the recorded offset rather than rolling over to UTC.
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn parses_timestamp_without_offset_as_utc() {
        let parsed = FhirDateTime::parse("2024-03-01T10:15:00").expect("naive timestamp");
        assert_eq!(parsed.instant().offset().local_minus_utc(), 0);
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn parses_bare_date() {
        let parsed = FhirDateTime::parse("2012-07-15").expect("date");
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2012, 7, 15).unwrap());
    }

    #[test]
    fn rejects_unknown_layout() {
        let err = FhirDateTime::parse("15/07/2012").expect_err("should reject");
        match err {
            FhirError::MalformedDate(value) => assert_eq!(value, "15/07/2012"),
            other => panic!("expected MalformedDate, got {other:?}"),
        }
    }

    #[test]
    fn orders_by_instant() {
        let earlier = FhirDateTime::parse("2024-01-01T00:00:00Z").unwrap();
        let later = FhirDateTime::parse("2024-01-01T00:00:01Z").unwrap();
        assert!(earlier < later);
    }
}

// crates/sellout-core/src/core/time.rs
// ============================================================================
// Module: Calendar Helpers
// Description: Calculation dates and wall-clock timestamps.
// Purpose: Parse producer dates strictly and format audit timestamps uniformly.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Commission data is bucketed by a calculation date (`YYYY-MM-DD`). Audit
//! timestamps are RFC 3339 strings in UTC.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Calendar date layout used by producers.
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Date parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    /// Value is not a `YYYY-MM-DD` calendar date.
    #[error("invalid calculate date '{0}', expected YYYY-MM-DD")]
    Invalid(String),
}

// ============================================================================
// SECTION: Calculate Date
// ============================================================================

/// Calendar date a batch of commission figures belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalculateDate(Date);

impl CalculateDate {
    /// Parses a `YYYY-MM-DD` date. A trailing time component (`T...`) is
    /// ignored because some producers send full ISO timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`DateError::Invalid`] when the value is not a valid date.
    pub fn parse(value: &str) -> Result<Self, DateError> {
        let trimmed = value.trim();
        let date_part = trimmed.split_once('T').map_or(trimmed, |(date, _)| date);
        Date::parse(date_part, DATE_FORMAT)
            .map(Self)
            .map_err(|_| DateError::Invalid(trimmed.to_string()))
    }
}

impl fmt::Display for CalculateDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.0.year(), u8::from(self.0.month()), self.0.day())
    }
}

impl Serialize for CalculateDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CalculateDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Timestamps
// ============================================================================

/// Returns the current UTC time formatted as RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

/// Formats a timestamp as RFC 3339.
#[must_use]
pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::CalculateDate;

    #[test]
    fn parses_plain_and_timestamped_dates() {
        let plain = CalculateDate::parse("2024-03-31").unwrap();
        let stamped = CalculateDate::parse(" 2024-03-31T05:00:00Z ").unwrap();
        assert_eq!(plain, stamped);
        assert_eq!(plain.to_string(), "2024-03-31");
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(CalculateDate::parse("2024-02-30").is_err());
        assert!(CalculateDate::parse("31/03/2024").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let date = CalculateDate::parse("2023-01-05").unwrap();
        assert_eq!(serde_json::to_string(&date).unwrap(), "\"2023-01-05\"");
        let back: CalculateDate = serde_json::from_str("\"2023-01-05\"").unwrap();
        assert_eq!(back, date);
    }
}

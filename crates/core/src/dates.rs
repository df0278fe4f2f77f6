//! Calendar-day arithmetic shared by the planner, normalisation and the rule stages.
//!
//! All comparisons here work on calendar dates with the time of day stripped. Callers pass
//! `today` explicitly so rule evaluation is reproducible.

use chrono::{Datelike, Duration, NaiveDate};
use fhir::FhirDateTime;

/// The calendar date `days` days before `today`.
pub fn days_before(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days)
}

/// True if `instant` falls on a calendar day strictly after `threshold`.
///
/// An unknown instant is never after anything.
pub fn is_after_day(instant: Option<&FhirDateTime>, threshold: NaiveDate) -> bool {
    instant.is_some_and(|value| value.date() > threshold)
}

/// Absolute number of calendar days between two dates.
pub fn day_gap(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Whole years from `start` to `end`.
///
/// The year difference is decremented when `end`'s month/day precedes `start`'s.
pub fn years_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut years = end.year() - start.year();
    if (end.month(), end.day()) < (start.month(), start.day()) {
        years -= 1;
    }
    years
}

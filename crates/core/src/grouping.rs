//! Episode and course clustering.
//!
//! Events are sorted by timestamp and walked in order. Each event joins the current group when
//! its calendar date is within `gap_days` of the group's most recently added event; otherwise it
//! starts a new group. Comparisons use calendar dates, so two events on the same day are always
//! 0 days apart regardless of time of day.

use crate::dates::day_gap;
use chrono::NaiveDate;
use fhir::FhirDateTime;

/// Walk order for [`group_events`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    OldestFirst,
    NewestFirst,
}

/// Cluster `events` into groups of neighbours at most `gap_days` apart.
///
/// # Arguments
///
/// * `events` - Events in any order.
/// * `gap_days` - Largest day difference between neighbours within one group.
/// * `time` - Timestamp of an event. Unknown timestamps sort as the oldest instant.
/// * `direction` - Sort order of the events, and therefore of the groups and their members.
///
/// # Returns
///
/// The groups in walk order. Empty input yields no groups.
pub fn group_events<T>(
    mut events: Vec<T>,
    gap_days: i64,
    time: impl Fn(&T) -> Option<FhirDateTime>,
    direction: Direction,
) -> Vec<Vec<T>> {
    match direction {
        Direction::OldestFirst => events.sort_by(|a, b| time(a).cmp(&time(b))),
        Direction::NewestFirst => events.sort_by(|a, b| time(b).cmp(&time(a))),
    }

    let day = |event: &T| time(event).map_or(NaiveDate::MIN, |t| t.date());

    let mut groups: Vec<Vec<T>> = Vec::new();
    let mut last_day: Option<NaiveDate> = None;

    for event in events {
        let current = day(&event);
        let joins = last_day.is_some_and(|previous| day_gap(current, previous) <= gap_days);
        last_day = Some(current);

        if joins {
            if let Some(group) = groups.last_mut() {
                group.push(event);
                continue;
            }
        }
        groups.push(vec![event]);
    }

    groups
}

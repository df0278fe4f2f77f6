//! Stage B: eligibility for treatment.
//!
//! ```text
//! age 5-18
//! AND NOT biologic order in the lookback
//! AND NOT controller course started in the last 30 days
//! AND controller course in the lookback
//! AND NOT complex chronic condition
//! AND (
//!     (two or more steroid episodes AND a steroid episode in the last 183 days)
//!     OR uncontrolled control-tool score
//! )
//! ```

use super::age_in_range;
use crate::aggregate::AggregateStore;
use crate::constants::{
    CONTROLLER_COURSE_GAP_DAYS, CONTROLLER_RECENT_DAYS, STEROID_COURSE_GAP_DAYS,
    STEROID_EPISODES_REQUIRED, STEROID_RECENT_DAYS,
};
use crate::dates::{days_before, is_after_day};
use crate::grouping::{group_events, Direction};
use chrono::NaiveDate;
use fhir::MedicationRequest;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EligibleCriteria {
    pub age: bool,
    pub biologic_365: bool,
    /// Complex chronic condition. No source for this signal yet; always false.
    pub ccc: bool,
    pub controller_30_days: bool,
    pub controller_365_days: bool,
    pub scs_183: bool,
    pub scs_episode_365: bool,
    /// Date of the newest order in each of the two newest steroid episodes, newest first.
    pub scs_dates: Vec<NaiveDate>,
    pub uncontrolled_act: bool,
    /// Issue date of the newest control-tool response, if any.
    pub control_tool_date: Option<NaiveDate>,
    pub evaluation: bool,
}

impl EligibleCriteria {
    /// Evaluate every sub-criterion against the normalised store.
    pub fn evaluate(store: &AggregateStore, today: NaiveDate) -> Self {
        let steroid_episodes = courses(&store.steroid_requests, STEROID_COURSE_GAP_DAYS);
        let controller_courses = courses(&store.controller_requests, CONTROLLER_COURSE_GAP_DAYS);

        let steroid_since = days_before(today, STEROID_RECENT_DAYS);
        let controller_since = days_before(today, CONTROLLER_RECENT_DAYS);

        let scs_dates = steroid_episodes
            .iter()
            .take(STEROID_EPISODES_REQUIRED)
            .filter_map(|episode| episode.first())
            .filter_map(|order| order.authored_on.map(|t| t.date()))
            .collect();

        let mut criteria = Self {
            age: age_in_range(store.patient(), today),
            biologic_365: !store.biologic_requests.is_empty(),
            ccc: false,
            controller_30_days: newest_course_after(&controller_courses, controller_since),
            controller_365_days: !controller_courses.is_empty(),
            scs_183: newest_course_after(&steroid_episodes, steroid_since),
            scs_episode_365: steroid_episodes.len() >= STEROID_EPISODES_REQUIRED,
            scs_dates,
            uncontrolled_act: store.control_tool.is_uncontrolled(),
            control_tool_date: store.control_tool.date.map(|t| t.date()),
            evaluation: false,
        };
        criteria.evaluation = criteria.formula();
        criteria
    }

    /// The eligibility formula over the current flags.
    pub fn formula(&self) -> bool {
        self.age
            && !self.biologic_365
            && !self.controller_30_days
            && self.controller_365_days
            && !self.ccc
            && ((self.scs_episode_365 && self.scs_183) || self.uncontrolled_act)
    }
}

/// Cluster orders into courses, newest course (and newest order within it) first.
fn courses(requests: &[MedicationRequest], gap_days: i64) -> Vec<Vec<&MedicationRequest>> {
    group_events(
        requests.iter().collect(),
        gap_days,
        |mr| mr.authored_on,
        Direction::NewestFirst,
    )
}

/// True if the newest course's leading order falls after `since`.
fn newest_course_after(courses: &[Vec<&MedicationRequest>], since: NaiveDate) -> bool {
    courses
        .first()
        .and_then(|course| course.first())
        .is_some_and(|order| is_after_day(order.authored_on.as_ref(), since))
}

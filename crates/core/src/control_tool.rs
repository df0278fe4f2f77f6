//! Control-tool score selection.
//!
//! Responses are ordered newest first. The encounter the newest response was filed against is
//! the reference encounter; the score is the highest component value among responses filed
//! against that same encounter. The reported date is always the newest response's issue time,
//! which need not be the response that carried the highest value.

use crate::aggregate::{AggregateStore, ControlToolScore};
use crate::constants::UNCONTROLLED_SEVERITY;
use crate::normalise::{dedup_by_key, sort_newest_first};
use fhir::Observation;

impl ControlToolScore {
    pub fn is_uncontrolled(&self) -> bool {
        self.severity >= UNCONTROLLED_SEVERITY
    }
}

/// Select the score from responses already sorted newest first.
pub fn select_score(observations: &[Observation]) -> ControlToolScore {
    let Some(newest) = observations.first() else {
        return ControlToolScore::default();
    };
    let reference = newest.focus_id();

    let severity = observations
        .iter()
        .filter(|observation| observation.focus_id() == reference)
        .flat_map(|observation| &observation.component)
        .filter_map(|component| component.numeric_value())
        .fold(0.0_f64, f64::max);

    ControlToolScore {
        severity,
        date: newest.issued,
        reference_encounter: reference.map(str::to_string),
    }
}

/// Deduplicate and sort the store's control-tool responses, then record the selected score.
pub fn score(store: &mut AggregateStore) {
    let mut observations = dedup_by_key(std::mem::take(&mut store.control_tool_observations), |o| {
        o.id.clone()
    });
    sort_newest_first(&mut observations, |o| o.issued, |o| o.id.as_str());

    store.control_tool = select_score(&observations);
    store.control_tool_observations = observations;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{ObservationComponent, Quantity, Reference};

    fn response(id: &str, issued: &str, encounter: &str, values: &[f64]) -> Observation {
        Observation {
            id: id.into(),
            issued: Some(issued.parse().expect("date")),
            focus: vec![Reference::to_resource("Encounter", encounter)],
            component: values
                .iter()
                .map(|value| ObservationComponent {
                    value_quantity: Some(Quantity {
                        value: Some(*value),
                        unit: None,
                    }),
                    ..ObservationComponent::default()
                })
                .collect(),
            ..Observation::default()
        }
    }

    #[test]
    fn max_over_reference_encounter_with_newest_date() {
        let mut store = AggregateStore::default();
        store.control_tool_observations = vec![
            response("o-old", "2026-05-01T09:00:00Z", "e-old", &[4.0]),
            response("o-new", "2026-09-10T09:00:00Z", "e-new", &[1.0]),
            response("o-same", "2026-09-10T08:00:00Z", "e-new", &[0.0, 2.0]),
        ];

        score(&mut store);

        let selected = &store.control_tool;
        assert_eq!(selected.severity, 2.0);
        assert!(selected.is_uncontrolled());
        assert_eq!(selected.reference_encounter.as_deref(), Some("e-new"));
        assert_eq!(
            selected.date.map(|d| d.date().to_string()),
            Some("2026-09-10".to_string())
        );
        assert_eq!(store.control_tool_observations[0].id, "o-new");
    }

    #[test]
    fn no_responses_is_controlled_with_no_date() {
        let selected = select_score(&[]);
        assert_eq!(selected.severity, 0.0);
        assert!(!selected.is_uncontrolled());
        assert!(selected.date.is_none());
    }
}

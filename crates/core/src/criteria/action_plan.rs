//! Green/yellow action-plan cross-match.
//!
//! The search order is part of the contract because the first match wins:
//!
//! 1. every green-zone code that has a configured mapping, in observation → component → coding
//!    order;
//! 2. for that code, every yellow-zone code in observation → component → coding order;
//! 3. for that yellow code, every mapped target code in configured order.
//!
//! The scan stops at the first yellow code equal to a mapped target.

use fhir::Observation;
use serde::Serialize;
use std::collections::HashMap;

/// The pair of codes that satisfied the cross-match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionPlanMatch {
    pub green_code: String,
    pub yellow_code: String,
}

/// Every coded component value of `observations`, in scan order.
fn coded_values(observations: &[Observation]) -> impl Iterator<Item = &str> {
    observations
        .iter()
        .flat_map(|observation| &observation.component)
        .flat_map(|component| component.value_codings())
        .map(|coding| coding.code())
}

/// Find the first green-zone code whose mapped yellow-zone code is present.
pub fn find_cross_match(
    green_zone: &[Observation],
    yellow_zone: &[Observation],
    medication_map: &HashMap<String, Vec<String>>,
) -> Option<ActionPlanMatch> {
    coded_values(green_zone)
        .filter_map(|green| medication_map.get(green).map(|targets| (green, targets)))
        .find_map(|(green, targets)| {
            coded_values(yellow_zone).find_map(|yellow| {
                targets
                    .iter()
                    .find(|target| target.as_str() == yellow)
                    .map(|target| ActionPlanMatch {
                        green_code: green.to_string(),
                        yellow_code: target.clone(),
                    })
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir::{CodeableConcept, Coding, ObservationComponent};

    fn zone(id: &str, codes: &[&str]) -> Observation {
        Observation {
            id: id.into(),
            component: codes
                .iter()
                .map(|code| ObservationComponent {
                    value_codeable_concept: Some(CodeableConcept {
                        coding: vec![Coding {
                            code: Some(code.to_string()),
                            ..Coding::default()
                        }],
                        text: None,
                    }),
                    ..ObservationComponent::default()
                })
                .collect(),
            ..Observation::default()
        }
    }

    fn map(entries: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(green, targets)| {
                (
                    green.to_string(),
                    targets.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn later_mapped_target_still_matches() {
        let green = vec![zone("g", &["G1"])];
        let yellow = vec![zone("y1", &["X"]), zone("y2", &["B"])];
        let found = find_cross_match(&green, &yellow, &map(&[("G1", &["A", "B"])]));
        assert_eq!(
            found,
            Some(ActionPlanMatch {
                green_code: "G1".into(),
                yellow_code: "B".into(),
            })
        );
    }

    #[test]
    fn first_green_code_in_scan_order_wins() {
        let green = vec![zone("g1", &["UNMAPPED", "G2"]), zone("g2", &["G1"])];
        let yellow = vec![zone("y", &["A", "C"])];
        let found = find_cross_match(
            &green,
            &yellow,
            &map(&[("G1", &["A"]), ("G2", &["C"])]),
        )
        .expect("match");
        assert_eq!(found.green_code, "G2");
        assert_eq!(found.yellow_code, "C");
    }

    #[test]
    fn yellow_order_decides_between_targets() {
        let green = vec![zone("g", &["G1"])];
        let yellow = vec![zone("y", &["B", "A"])];
        let found =
            find_cross_match(&green, &yellow, &map(&[("G1", &["A", "B"])])).expect("match");
        assert_eq!(found.yellow_code, "B");
    }

    #[test]
    fn no_mapping_or_no_yellow_means_no_match() {
        let green = vec![zone("g", &["G1"])];
        assert_eq!(find_cross_match(&green, &[], &map(&[("G1", &["A"])])), None);
        assert_eq!(
            find_cross_match(&green, &[zone("y", &["A"])], &HashMap::new()),
            None
        );
    }
}

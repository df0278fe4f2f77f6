//! Stage C: treatment already initiated.
//!
//! ```text
//! age 5-18
//! AND newest controller order is ICS-formoterol
//! AND (that order has a scheduled + as-needed signature OR action plan cross-match)
//! ```

use super::action_plan::{find_cross_match, ActionPlanMatch};
use super::age_in_range;
use crate::aggregate::AggregateStore;
use crate::config::CdsConfig;
use chrono::NaiveDate;
use fhir::MedicationRequest;
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InitiatedCriteria {
    pub age: bool,
    pub icsf: bool,
    pub combination_signature: bool,
    pub action_plan: bool,
    /// The codes that satisfied the action-plan cross-match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_plan_match: Option<ActionPlanMatch>,
    pub evaluation: bool,
}

impl InitiatedCriteria {
    /// Evaluate every sub-criterion against the normalised store.
    pub fn evaluate(store: &AggregateStore, cfg: &CdsConfig, today: NaiveDate) -> Self {
        let newest_controller = store.controller_requests.first();
        let icsf = newest_controller.is_some_and(|order| {
            cfg.patterns()
                .ics_formoterol
                .is_match(store.vocabulary_code(&order.id).unwrap_or_default())
        });
        let combination_signature = icsf && newest_controller.is_some_and(has_combination_signature);

        let action_plan_match = find_cross_match(
            &store.action_plan.green_zone,
            &store.action_plan.yellow_zone,
            &cfg.action_plan().medication_map,
        );

        let mut criteria = Self {
            age: age_in_range(store.patient(), today),
            icsf,
            combination_signature,
            action_plan: action_plan_match.is_some(),
            action_plan_match,
            evaluation: false,
        };
        criteria.evaluation = criteria.formula();
        criteria
    }

    /// The initiated formula over the current flags.
    pub fn formula(&self) -> bool {
        self.age && self.icsf && (self.combination_signature || self.action_plan)
    }
}

/// Exactly two dosage lines, one scheduled and one as-needed.
fn has_combination_signature(order: &MedicationRequest) -> bool {
    match order.dosage_instruction.as_slice() {
        [first, second] => first.as_needed() != second.as_needed(),
        _ => false,
    }
}

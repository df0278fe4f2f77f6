//! Eligibility rule stages.
//!
//! Stage A ([`registry`]) always runs. Stages B ([`eligible`]) and C ([`initiated`]) run only
//! when stage A passes and are independent of each other. Each stage is a struct of named
//! boolean sub-criteria plus an `evaluation` flag computed by that stage's `formula`.

pub mod action_plan;
pub mod eligible;
pub mod initiated;
pub mod registry;

pub use action_plan::{find_cross_match, ActionPlanMatch};
pub use eligible::EligibleCriteria;
pub use initiated::InitiatedCriteria;
pub use registry::RegistryCriteria;

use crate::aggregate::AggregateStore;
use crate::config::CdsConfig;
use crate::constants::{MAX_AGE_YEARS, MIN_AGE_YEARS};
use crate::dates::years_between;
use chrono::NaiveDate;
use fhir::Patient;
use serde::Serialize;

/// Results of all stages that ran.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Criteria {
    pub registry: RegistryCriteria,
    pub eligible: Option<EligibleCriteria>,
    pub initiated: Option<InitiatedCriteria>,
}

impl Criteria {
    /// True when the treatment suggestion should be shown: in the registry, eligible, and not
    /// already initiated.
    pub fn recommends_treatment(&self) -> bool {
        self.registry.evaluation
            && self.eligible.as_ref().is_some_and(|e| e.evaluation)
            && !self.initiated.as_ref().is_some_and(|i| i.evaluation)
    }
}

/// Run the stages in order over a normalised, read-only store.
pub fn evaluate(store: &AggregateStore, cfg: &CdsConfig, today: NaiveDate) -> Criteria {
    let registry = RegistryCriteria::evaluate(store, cfg, today);
    if !registry.evaluation {
        return Criteria {
            registry,
            eligible: None,
            initiated: None,
        };
    }

    Criteria {
        registry,
        eligible: Some(EligibleCriteria::evaluate(store, today)),
        initiated: Some(InitiatedCriteria::evaluate(store, cfg, today)),
    }
}

/// Age in whole years within the treatment range. Unknown birth date fails.
pub(crate) fn age_in_range(patient: Option<&Patient>, today: NaiveDate) -> bool {
    patient
        .and_then(|patient| patient.birth_date)
        .map(|birth| years_between(birth.date(), today))
        .is_some_and(|age| (MIN_AGE_YEARS..=MAX_AGE_YEARS).contains(&age))
}

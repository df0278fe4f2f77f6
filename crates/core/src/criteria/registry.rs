//! Stage A: asthma registry membership.
//!
//! ```text
//! alive
//! AND qualifying visit (encounter of a recognised type, or an upcoming appointment)
//! AND (
//!     ((asthma on problem list OR asthma visit diagnosis) AND antiasthmatic order)
//!     OR persistent asthma on problem list
//! )
//! ```

use crate::aggregate::{AggregateStore, MedicationCategory};
use crate::config::CdsConfig;
use crate::constants::{EXCLUDED_VISIT_STATUSES, HOSPITAL_PROBLEM_LOOKBACK_DAYS, ICD10_CM_SYSTEM};
use crate::dates::{days_before, is_after_day};
use chrono::NaiveDate;
use fhir::{Condition, Patient};
use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RegistryCriteria {
    pub alive: bool,
    pub encounter: bool,
    pub asthma: bool,
    pub persistent_asthma: bool,
    pub asthma_medication: bool,
    pub asthma_encounter_diagnosis: bool,
    pub evaluation: bool,
}

impl RegistryCriteria {
    /// Evaluate every sub-criterion against the normalised store.
    pub fn evaluate(store: &AggregateStore, cfg: &CdsConfig, today: NaiveDate) -> Self {
        let (asthma, persistent_asthma) = problem_list_asthma(store, cfg);

        let mut criteria = Self {
            alive: !store.patient().is_some_and(Patient::is_deceased),
            encounter: qualifying_encounter(store, cfg) || upcoming_appointment(store, today),
            asthma,
            persistent_asthma,
            asthma_medication: store.category_count(MedicationCategory::Antiasthmatic) > 0,
            asthma_encounter_diagnosis: asthma_visit_diagnosis(store, cfg, today),
            evaluation: false,
        };
        criteria.evaluation = criteria.formula();
        criteria
    }

    /// The registry formula over the current flags.
    pub fn formula(&self) -> bool {
        self.alive
            && self.encounter
            && (((self.asthma || self.asthma_encounter_diagnosis) && self.asthma_medication)
                || self.persistent_asthma)
    }
}

fn is_excluded_status(status: &str) -> bool {
    EXCLUDED_VISIT_STATUSES.contains(&status)
}

/// An encounter of a recognised visit type that was not cancelled or missed.
fn qualifying_encounter(store: &AggregateStore, cfg: &CdsConfig) -> bool {
    let type_system = &cfg.patterns().encounter_type_system;
    let visit_codes = cfg.visit_type_codes();

    store
        .encounters
        .iter()
        .filter(|encounter| !is_excluded_status(&encounter.status))
        .flat_map(|encounter| &encounter.type_)
        .flat_map(|concept| &concept.coding)
        .any(|coding| {
            type_system.is_match(coding.system())
                && visit_codes.iter().any(|code| code == coding.code())
        })
}

/// An appointment today or later that was not cancelled or missed.
fn upcoming_appointment(store: &AggregateStore, today: NaiveDate) -> bool {
    let yesterday = days_before(today, 1);
    store.appointments.iter().any(|appointment| {
        is_after_day(appointment.start.as_ref(), yesterday)
            && !is_excluded_status(&appointment.status)
    })
}

/// (asthma on the active problem list, persistent asthma on the active problem list)
fn problem_list_asthma(store: &AggregateStore, cfg: &CdsConfig) -> (bool, bool) {
    let asthma_icd = &cfg.patterns().asthma_icd;
    let mut asthma = false;
    let mut persistent = false;

    for coding in store
        .problem_list
        .iter()
        .flat_map(|problem| &problem.code.coding)
        .filter(|coding| coding.system() == ICD10_CM_SYSTEM && asthma_icd.is_match(coding.code()))
    {
        asthma = true;
        if coding.display().to_lowercase().contains("persistent") {
            persistent = true;
            break;
        }
    }

    (asthma, persistent)
}

/// Asthma among encounter diagnoses or recent hospital problems.
fn asthma_visit_diagnosis(store: &AggregateStore, cfg: &CdsConfig, today: NaiveDate) -> bool {
    let asthma_icd = &cfg.patterns().asthma_icd;
    let since = days_before(today, HOSPITAL_PROBLEM_LOOKBACK_DAYS);

    let recent_hospital_problems = store.hospital_problems.iter().filter(|problem| {
        problem
            .encounter
            .as_ref()
            .and_then(|reference| reference.target_id())
            .and_then(|id| store.encounter_dates.get(id))
            .is_some_and(|start| is_after_day(Some(start), since))
    });

    store
        .encounter_diagnoses
        .iter()
        .chain(recent_hospital_problems)
        .flat_map(|diagnosis: &Condition| &diagnosis.code.coding)
        .any(|coding| asthma_icd.is_match(coding.code()))
}

//! The per-evaluation aggregate of a patient's fetched records.
//!
//! One [`AggregateStore`] is created per evaluation request. During the fetch phase it is shared
//! as a [`SharedStore`] and every mutation (dispatching a payload, one normalisation pass) takes
//! the single lock for its full duration. Once all fetch groups have joined, the pipeline takes
//! the store out of the lock and the rule stages read it without locking.

use fhir::{
    Appointment, Condition, Encounter, FhirDateTime, List, Medication, MedicationRequest,
    Observation, Patient,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// The aggregate shared between fetch tasks.
pub type SharedStore = Arc<Mutex<AggregateStore>>;

/// Who and where an evaluation is about.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatientContext {
    /// FHIR id of the patient, from the hook context.
    pub patient_id: String,
    /// FHIR id of the encounter the hook fired in, if any.
    pub encounter_id: Option<String>,
    pub user_id: Option<String>,
    /// Medical record number, resolved after the Patient fetch.
    pub mrn: Option<String>,
    /// Visit sequence number of `encounter_id`, resolved during encounter normalisation.
    pub encounter_csn: Option<String>,
    #[serde(skip)]
    pub patient: Option<Patient>,
}

impl PatientContext {
    pub fn new(patient_id: &str, encounter_id: Option<&str>, user_id: Option<&str>) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            encounter_id: encounter_id.filter(|id| !id.is_empty()).map(str::to_string),
            user_id: user_id.filter(|id| !id.is_empty()).map(str::to_string),
            ..Self::default()
        }
    }
}

/// Medication classes recognised by vocabulary-code pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicationCategory {
    Antiasthmatic,
    Biologic,
    Controller,
    Steroid,
}

impl MedicationCategory {
    pub const ALL: [MedicationCategory; 4] = [
        MedicationCategory::Antiasthmatic,
        MedicationCategory::Biologic,
        MedicationCategory::Controller,
        MedicationCategory::Steroid,
    ];
}

impl fmt::Display for MedicationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MedicationCategory::Antiasthmatic => "antiasthmatic",
            MedicationCategory::Biologic => "biologic",
            MedicationCategory::Controller => "controller",
            MedicationCategory::Steroid => "steroid",
        };
        f.write_str(name)
    }
}

/// Action-plan observations split by zone.
#[derive(Clone, Debug, Default)]
pub struct ActionPlanObservations {
    pub green_zone: Vec<Observation>,
    pub yellow_zone: Vec<Observation>,
}

/// Control-tool responses and the score selected from them.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ControlToolScore {
    /// Highest component value among responses filed against the reference encounter.
    pub severity: f64,
    /// Issue time of the most recent response.
    pub date: Option<FhirDateTime>,
    /// Encounter the most recent response was filed against.
    pub reference_encounter: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AggregateStore {
    pub context: PatientContext,

    pub appointments: Vec<Appointment>,
    pub encounters: Vec<Encounter>,
    /// Active problem-list conditions (after normalisation).
    pub problem_list: Vec<Condition>,
    /// Problems referenced from a hospital problem list.
    pub hospital_problems: Vec<Condition>,
    pub encounter_diagnoses: Vec<Condition>,
    pub hospital_problem_lists: Vec<List>,

    /// Medications keyed by id.
    pub medications: HashMap<String, Medication>,
    /// Medication orders, newest first, excluding anaesthesia-context orders.
    pub medication_requests: Vec<MedicationRequest>,
    pub biologic_requests: Vec<MedicationRequest>,
    pub controller_requests: Vec<MedicationRequest>,
    pub steroid_requests: Vec<MedicationRequest>,

    pub action_plan: ActionPlanObservations,
    pub control_tool_observations: Vec<Observation>,
    pub control_tool: ControlToolScore,

    /// Visit sequence number → appointment status.
    pub csn_status: HashMap<String, String>,
    /// Encounter id → period start.
    pub encounter_dates: HashMap<String, FhirDateTime>,
    /// Medication id → vocabulary code, filled on first resolution.
    pub vocabulary_cache: HashMap<String, Option<String>>,
    /// Medication request id → vocabulary code of its medication.
    pub request_codes: HashMap<String, String>,
    /// Category → ids of the medication requests in it.
    pub medication_categories: BTreeMap<MedicationCategory, BTreeSet<String>>,
}

impl AggregateStore {
    pub fn new(context: PatientContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Wrap the store for concurrent mutation.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Vocabulary code linked to a medication request during normalisation.
    pub fn vocabulary_code(&self, request_id: &str) -> Option<&str> {
        self.request_codes.get(request_id).map(String::as_str)
    }

    pub fn in_category(&self, request_id: &str, category: MedicationCategory) -> bool {
        self.medication_categories
            .get(&category)
            .is_some_and(|ids| ids.contains(request_id))
    }

    /// Number of distinct requests classified into `category`.
    pub fn category_count(&self, category: MedicationCategory) -> usize {
        self.medication_categories
            .get(&category)
            .map_or(0, BTreeSet::len)
    }

    pub fn patient(&self) -> Option<&Patient> {
        self.context.patient.as_ref()
    }
}

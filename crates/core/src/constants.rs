//! Constants used throughout the eligibility core.
//!
//! Lookback periods, grouping thresholds and query shapes are fixed at build time. Anything a
//! deploying organisation needs to vary lives in [`crate::config::CdsConfig`] instead.

/// Days of visit history fetched for encounters and appointments.
pub const VISIT_LOOKBACK_DAYS: i64 = 730;

/// Number of windowed calls the visit lookback is split into.
pub const VISIT_SPLITS: usize = 2;

/// Days of medication order history fetched.
pub const MEDICATION_LOOKBACK_DAYS: i64 = 365;

/// Number of windowed calls the medication lookback is split into.
pub const MEDICATION_SPLITS: usize = 2;

/// Days back an encounter may start and still have its diagnoses fetched.
pub const ENCOUNTER_DIAGNOSIS_LOOKBACK_DAYS: i64 = 365;

/// Maximum encounter ids joined into one encounter-diagnosis query.
pub const ENCOUNTER_DIAGNOSIS_CHUNK: usize = 30;

/// Days back a hospital problem's encounter may start and still count as a diagnosis.
pub const HOSPITAL_PROBLEM_LOOKBACK_DAYS: i64 = 365;

/// Days back control-tool responses are requested.
pub const CONTROL_TOOL_LOOKBACK_DAYS: i64 = 183;

/// Gap (days) that separates two steroid courses.
pub const STEROID_COURSE_GAP_DAYS: i64 = 14;

/// Steroid episodes needed in the lookback. Also the most episode dates reported.
pub const STEROID_EPISODES_REQUIRED: usize = 2;

/// Days back the most recent steroid course must fall.
pub const STEROID_RECENT_DAYS: i64 = 183;

/// Gap (days) that separates two controller courses.
pub const CONTROLLER_COURSE_GAP_DAYS: i64 = 30;

/// Days back a controller course start counts as "recently started".
pub const CONTROLLER_RECENT_DAYS: i64 = 30;

/// Inclusive age range (years) for treatment eligibility.
pub const MIN_AGE_YEARS: i32 = 5;
pub const MAX_AGE_YEARS: i32 = 18;

/// Control-tool severity at or above which asthma is considered uncontrolled.
pub const UNCONTROLLED_SEVERITY: f64 = 2.0;

/// Search parameter used for windowed queries.
pub const DATE_SEARCH_PARAM: &str = "date";

/// Calendar date format for query parameters.
pub const QUERY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Coding system for problem-list ICD codes.
pub const ICD10_CM_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-10-cm";

/// Condition category labels, matched against category text or code.
pub const PROBLEM_LIST_CATEGORY_TEXT: &str = "Problem List Item";
pub const PROBLEM_LIST_CATEGORY_CODE: &str = "problem-list-item";
pub const ENCOUNTER_DIAGNOSIS_CATEGORY_TEXT: &str = "Encounter Diagnosis";
pub const ENCOUNTER_DIAGNOSIS_CATEGORY_CODE: &str = "encounter-diagnosis";

/// Encounter/appointment statuses that never count as a visit.
pub const EXCLUDED_VISIT_STATUSES: &[&str] = &["cancelled", "noshow"];

/// Appointment statuses that close out a visit and override the encounter's own status.
pub const TERMINAL_APPOINTMENT_STATUSES: &[&str] =
    &["fulfilled", "cancelled", "noshow", "entered-in-error"];

/// Ordering-context display that excludes a medication order from the main sequence.
pub const EXCLUDED_ORDER_CONTEXT: &str = "Anesthesia";

/// Identifier type text that marks the patient's MRN.
pub const MRN_IDENTIFIER_TYPE: &str = "EPI";

/// Suffix stripped from the FHIR base URL to reach the vendor utility API.
pub const FHIR_BASE_SUFFIX: &str = "/FHIR/R4";

/// Utility path for SmartData write-back.
pub const WRITE_BACK_PATH: &str = "/epic/2013/Clinical/Utility/SETSMARTDATAVALUES/SmartData/Values";

/// Source label written alongside stored values.
pub const WRITE_BACK_SOURCE: &str = "SMART Asthma Service";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default title marking a hospital problem list.
pub const DEFAULT_HOSPITAL_PROBLEM_LIST_TITLE: &str = "Hospital Problem List";

/// Default medication vocabulary system (GPI).
pub const DEFAULT_VOCABULARY_SYSTEM: &str = "urn:oid:2.16.840.1.113883.6.68";

/// Default encounter type codes that count as a qualifying visit.
pub const DEFAULT_VISIT_TYPE_CODES: &[&str] = &["3", "101", "153"];

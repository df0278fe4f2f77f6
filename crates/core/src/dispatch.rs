//! Routing decoded resources into the aggregate store.
//!
//! Decoding (see [`fhir::decode_payload`]) happens outside the store lock; routing happens under
//! it. Anything the pipeline does not consume is dropped quietly:
//!
//! - resource types other than the eight the pipeline reads,
//! - conditions with no recognised category,
//! - lists whose title is not the hospital-problem-list marker,
//! - observations whose codes match no configured zone or control-tool code.

use crate::aggregate::AggregateStore;
use crate::config::CdsConfig;
use crate::constants::{
    ENCOUNTER_DIAGNOSIS_CATEGORY_CODE, ENCOUNTER_DIAGNOSIS_CATEGORY_TEXT,
    PROBLEM_LIST_CATEGORY_CODE, PROBLEM_LIST_CATEGORY_TEXT,
};
use fhir::{CodeableConcept, Condition, Observation, Resource};

/// Where a condition belongs, by category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConditionBucket {
    ProblemList,
    EncounterDiagnosis,
}

/// Where an observation belongs, by code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ObservationBucket {
    GreenZone,
    YellowZone,
    ControlTool,
}

/// Counts reported by one dispatch call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchCounts {
    pub routed: usize,
    pub dropped: usize,
}

/// Route every resource into its typed sink.
pub fn dispatch(
    store: &mut AggregateStore,
    resources: Vec<Resource>,
    cfg: &CdsConfig,
) -> DispatchCounts {
    let mut counts = DispatchCounts::default();

    for resource in resources {
        let routed = route(store, resource, cfg);
        if routed {
            counts.routed += 1;
        } else {
            counts.dropped += 1;
        }
    }

    counts
}

fn route(store: &mut AggregateStore, resource: Resource, cfg: &CdsConfig) -> bool {
    match resource {
        Resource::Appointment(appointment) => store.appointments.push(appointment),
        Resource::Encounter(encounter) => store.encounters.push(encounter),
        Resource::MedicationRequest(request) => store.medication_requests.push(request),
        Resource::Medication(medication) => {
            store.medications.insert(medication.id.clone(), medication);
        }
        Resource::Patient(patient) => store.context.patient = Some(patient),
        Resource::Condition(condition) => match condition_bucket(&condition) {
            Some(ConditionBucket::ProblemList) => store.problem_list.push(condition),
            Some(ConditionBucket::EncounterDiagnosis) => {
                store.encounter_diagnoses.push(condition)
            }
            None => return false,
        },
        Resource::List(list) => {
            if list.title() != cfg.hospital_problem_list_title() {
                return false;
            }
            store.hospital_problem_lists.push(list);
        }
        Resource::Observation(observation) => match observation_bucket(&observation, cfg) {
            Some(ObservationBucket::GreenZone) => store.action_plan.green_zone.push(observation),
            Some(ObservationBucket::YellowZone) => {
                store.action_plan.yellow_zone.push(observation)
            }
            Some(ObservationBucket::ControlTool) => {
                store.control_tool_observations.push(observation)
            }
            None => return false,
        },
        Resource::Unrecognised(resource_type) => {
            tracing::trace!(resource_type = %resource_type, "ignoring unrecognised resource");
            return false;
        }
    }
    true
}

/// First category recognised by text or code.
fn condition_bucket(condition: &Condition) -> Option<ConditionBucket> {
    condition.category.iter().find_map(|category| {
        if is_category(category, PROBLEM_LIST_CATEGORY_TEXT, PROBLEM_LIST_CATEGORY_CODE) {
            Some(ConditionBucket::ProblemList)
        } else if is_category(
            category,
            ENCOUNTER_DIAGNOSIS_CATEGORY_TEXT,
            ENCOUNTER_DIAGNOSIS_CATEGORY_CODE,
        ) {
            Some(ConditionBucket::EncounterDiagnosis)
        } else {
            None
        }
    })
}

fn is_category(category: &CodeableConcept, text: &str, code: &str) -> bool {
    category.text() == text || category.has_code(code)
}

/// First observation coding that matches a configured code set.
fn observation_bucket(observation: &Observation, cfg: &CdsConfig) -> Option<ObservationBucket> {
    let plan = cfg.action_plan();
    observation.code.coding.iter().find_map(|coding| {
        let code = coding.code();
        if code.is_empty() {
            None
        } else if code == plan.green_zone {
            Some(ObservationBucket::GreenZone)
        } else if code == plan.yellow_zone {
            Some(ObservationBucket::YellowZone)
        } else if cfg.control_tool_codes().contains(code) {
            Some(ObservationBucket::ControlTool)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PatientContext;
    use crate::config::test_config;
    use fhir::decode_payload;

    fn dispatch_json(store: &mut AggregateStore, json: &str) -> DispatchCounts {
        let resources = decode_payload(json.as_bytes()).expect("decode");
        dispatch(store, resources, &test_config())
    }

    fn store() -> AggregateStore {
        AggregateStore::new(PatientContext::new("p1", None, None))
    }

    #[test]
    fn conditions_route_by_category_text_or_code() {
        let mut store = store();
        let counts = dispatch_json(
            &mut store,
            r#"{ "resourceType": "Bundle", "entry": [
                { "resource": { "resourceType": "Condition", "id": "c1",
                    "category": [ { "text": "Problem List Item" } ] } },
                { "resource": { "resourceType": "Condition", "id": "c2",
                    "category": [ { "coding": [ { "code": "encounter-diagnosis" } ] } ] } },
                { "resource": { "resourceType": "Condition", "id": "c3",
                    "category": [ { "text": "Health Concern" } ] } }
            ] }"#,
        );

        assert_eq!(counts, DispatchCounts { routed: 2, dropped: 1 });
        assert_eq!(store.problem_list[0].id, "c1");
        assert_eq!(store.encounter_diagnoses[0].id, "c2");
    }

    #[test]
    fn condition_with_two_categories_routes_once() {
        let mut store = store();
        dispatch_json(
            &mut store,
            r#"{ "resourceType": "Condition", "id": "c1", "category": [
                { "text": "Encounter Diagnosis" }, { "text": "Problem List Item" } ] }"#,
        );
        assert_eq!(store.encounter_diagnoses.len(), 1);
        assert!(store.problem_list.is_empty());
    }

    #[test]
    fn lists_kept_only_with_hospital_title() {
        let mut store = store();
        dispatch_json(
            &mut store,
            r#"{ "resourceType": "Bundle", "entry": [
                { "resource": { "resourceType": "List", "id": "l1", "title": "Hospital Problem List" } },
                { "resource": { "resourceType": "List", "id": "l2", "title": "Allergies" } }
            ] }"#,
        );
        assert_eq!(store.hospital_problem_lists.len(), 1);
        assert_eq!(store.hospital_problem_lists[0].id, "l1");
    }

    #[test]
    fn observations_route_by_zone_and_control_tool_code() {
        let mut store = store();
        let counts = dispatch_json(
            &mut store,
            r#"{ "resourceType": "Bundle", "entry": [
                { "resource": { "resourceType": "Observation", "id": "o1",
                    "code": { "coding": [ { "code": "GREEN" } ] } } },
                { "resource": { "resourceType": "Observation", "id": "o2",
                    "code": { "coding": [ { "code": "other" }, { "code": "YELLOW" } ] } } },
                { "resource": { "resourceType": "Observation", "id": "o3",
                    "code": { "coding": [ { "code": "ACT-1" } ] } } },
                { "resource": { "resourceType": "Observation", "id": "o4",
                    "code": { "coding": [ { "code": "BMI" } ] } } }
            ] }"#,
        );

        assert_eq!(counts.dropped, 1);
        assert_eq!(store.action_plan.green_zone[0].id, "o1");
        assert_eq!(store.action_plan.yellow_zone[0].id, "o2");
        assert_eq!(store.control_tool_observations[0].id, "o3");
    }

    #[test]
    fn direct_types_are_appended_and_unknown_types_ignored() {
        let mut store = store();
        let counts = dispatch_json(
            &mut store,
            r#"{ "resourceType": "Bundle", "entry": [
                { "resource": { "resourceType": "Patient", "id": "p1" } },
                { "resource": { "resourceType": "Medication", "id": "m1" } },
                { "resource": { "resourceType": "MedicationRequest", "id": "mr1" } },
                { "resource": { "resourceType": "Encounter", "id": "e1" } },
                { "resource": { "resourceType": "Appointment", "id": "a1" } },
                { "resource": { "resourceType": "OperationOutcome" } }
            ] }"#,
        );

        assert_eq!(counts, DispatchCounts { routed: 5, dropped: 1 });
        assert_eq!(store.patient().map(|p| p.id.as_str()), Some("p1"));
        assert!(store.medications.contains_key("m1"));
        assert_eq!(store.medication_requests.len(), 1);
        assert_eq!(store.encounters.len(), 1);
        assert_eq!(store.appointments.len(), 1);
    }
}

//! Post-fetch normalisation passes.
//!
//! Each pass runs exactly once per evaluation, after its fetch batch (and any nested batches)
//! has drained, and is called through [`crate::fetch::orchestrator::Orchestrator::mutate`] so the
//! whole pass holds the store lock. Passes are idempotent: running one twice leaves the store
//! unchanged.

use crate::aggregate::{AggregateStore, MedicationCategory};
use crate::config::CdsConfig;
use crate::constants::{EXCLUDED_ORDER_CONTEXT, MRN_IDENTIFIER_TYPE, TERMINAL_APPOINTMENT_STATUSES};
use crate::dates::{days_before, is_after_day};
use chrono::NaiveDate;
use fhir::{FhirDateTime, Identifier, MedicationRequest};
use regex::Regex;
use std::collections::HashSet;
use std::hash::Hash;

// ============================================================================
// Generic helpers
// ============================================================================

/// Drop later items whose key was already seen. First-seen order is kept.
pub fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect()
}

/// Stable sort newest first; equal timestamps order by ascending status.
///
/// An unknown timestamp sorts as the oldest possible instant.
pub fn sort_newest_first<T>(
    items: &mut [T],
    time: impl Fn(&T) -> Option<FhirDateTime>,
    status: impl Fn(&T) -> &str,
) {
    items.sort_by(|a, b| {
        time(b)
            .cmp(&time(a))
            .then_with(|| status(a).cmp(status(b)))
    });
}

/// Value of the last identifier whose system matches `system`.
fn identifier_matching<'a>(identifiers: &'a [Identifier], system: &Regex) -> Option<&'a str> {
    identifiers
        .iter()
        .filter(|identifier| system.is_match(identifier.system()))
        .map(Identifier::value)
        .last()
}

// ============================================================================
// Per-type passes
// ============================================================================

/// Resolve the MRN from the patient's identifiers.
pub fn patient(store: &mut AggregateStore) {
    let mrn = store.context.patient.as_ref().and_then(|patient| {
        patient
            .identifier
            .iter()
            .filter(|identifier| identifier.type_text() == MRN_IDENTIFIER_TYPE)
            .map(|identifier| identifier.value().to_string())
            .last()
    });
    store.context.mrn = mrn;
}

/// Deduplicate appointments and record each visit's appointment status by CSN.
pub fn appointments(store: &mut AggregateStore, cfg: &CdsConfig) {
    store.appointments = dedup_by_key(std::mem::take(&mut store.appointments), |a| a.id.clone());

    let csn_system = &cfg.patterns().csn_system;
    for appointment in &store.appointments {
        for identifier in &appointment.identifier {
            if csn_system.is_match(identifier.system()) {
                store
                    .csn_status
                    .insert(identifier.value().to_string(), appointment.status.clone());
            }
        }
    }
}

/// Deduplicate and sort encounters, then reconcile them with appointments.
///
/// Must run after [`appointments`]. Fills the encounter-date map, captures the CSN of the hook
/// encounter, and overwrites an encounter's status with a terminal appointment status recorded
/// for the same CSN.
pub fn encounters(store: &mut AggregateStore, cfg: &CdsConfig) {
    let mut encounters = dedup_by_key(std::mem::take(&mut store.encounters), |e| e.id.clone());
    sort_newest_first(&mut encounters, |e| e.period.start, |e| e.status.as_str());

    let csn_system = &cfg.patterns().csn_system;
    for encounter in &mut encounters {
        if let Some(start) = encounter.period.start {
            store.encounter_dates.insert(encounter.id.clone(), start);
        }

        let Some(csn) = identifier_matching(&encounter.identifier, csn_system) else {
            continue;
        };
        let csn = csn.to_string();

        if store.context.encounter_id.as_deref() == Some(encounter.id.as_str()) {
            store.context.encounter_csn = Some(csn.clone());
        }

        if let Some(status) = store.csn_status.get(&csn) {
            if TERMINAL_APPOINTMENT_STATUSES.contains(&status.as_str()) {
                encounter.status = status.clone();
            }
        }
    }

    store.encounters = encounters;
}

/// Ids of encounters that started within the last `lookback_days`.
pub fn recent_encounter_ids(
    store: &AggregateStore,
    lookback_days: i64,
    today: NaiveDate,
) -> Vec<String> {
    let since = days_before(today, lookback_days);
    store
        .encounters
        .iter()
        .filter(|encounter| is_after_day(encounter.period.start.as_ref(), since))
        .map(|encounter| encounter.id.clone())
        .collect()
}

/// Keep active problems and collect the problems named by hospital problem lists.
pub fn problems(store: &mut AggregateStore) {
    let fetched = dedup_by_key(std::mem::take(&mut store.problem_list), |c| c.id.clone());
    store.hospital_problem_lists =
        dedup_by_key(std::mem::take(&mut store.hospital_problem_lists), |l| l.id.clone());

    let referenced: HashSet<&str> = store
        .hospital_problem_lists
        .iter()
        .flat_map(|list| &list.entry)
        .filter_map(|entry| entry.item.target_id())
        .collect();

    store.hospital_problems = fetched
        .iter()
        .filter(|condition| referenced.contains(condition.id.as_str()))
        .cloned()
        .collect();
    store.problem_list = fetched
        .into_iter()
        .filter(|condition| condition.is_active())
        .collect();
}

/// Deduplicate encounter diagnoses gathered from the chunked lookups.
pub fn encounter_diagnoses(store: &mut AggregateStore) {
    store.encounter_diagnoses =
        dedup_by_key(std::mem::take(&mut store.encounter_diagnoses), |c| c.id.clone());
}

/// Deduplicate action-plan observations per zone.
pub fn action_plan(store: &mut AggregateStore) {
    let plan = &mut store.action_plan;
    plan.green_zone = dedup_by_key(std::mem::take(&mut plan.green_zone), |o| o.id.clone());
    plan.yellow_zone = dedup_by_key(std::mem::take(&mut plan.yellow_zone), |o| o.id.clone());
}

/// Deduplicate, sort, link, classify and filter medication orders.
pub fn medications(store: &mut AggregateStore, cfg: &CdsConfig) {
    let mut requests = dedup_by_key(std::mem::take(&mut store.medication_requests), |mr| {
        mr.id.clone()
    });
    sort_newest_first(&mut requests, |mr| mr.authored_on, |mr| mr.status.as_str());

    link_vocabulary_codes(store, &requests, cfg.vocabulary_system());
    classify(store, &requests, cfg);

    requests.retain(|mr| mr.encounter_display() != EXCLUDED_ORDER_CONTEXT);
    store.medication_requests = requests;
}

/// Attach each order's medication vocabulary code, resolving each medication once.
fn link_vocabulary_codes(
    store: &mut AggregateStore,
    requests: &[MedicationRequest],
    vocabulary_system: &str,
) {
    for request in requests {
        let Some(medication_id) = request.medication_id() else {
            continue;
        };
        let Some(medication) = store.medications.get(medication_id) else {
            continue;
        };

        let code = store
            .vocabulary_cache
            .entry(medication_id.to_string())
            .or_insert_with(|| medication.code_in(vocabulary_system).map(str::to_string));

        if let Some(code) = code {
            store.request_codes.insert(request.id.clone(), code.clone());
        }
    }
}

/// Populate the category map and the per-category order sequences.
fn classify(store: &mut AggregateStore, requests: &[MedicationRequest], cfg: &CdsConfig) {
    let patterns = cfg.patterns();
    store.biologic_requests.clear();
    store.controller_requests.clear();
    store.steroid_requests.clear();

    for request in requests {
        let code = store.vocabulary_code(&request.id).unwrap_or_default().to_string();

        for category in MedicationCategory::ALL {
            let pattern = match category {
                MedicationCategory::Antiasthmatic => &patterns.antiasthmatic,
                MedicationCategory::Biologic => &patterns.biologic,
                MedicationCategory::Controller => &patterns.controller,
                MedicationCategory::Steroid => &patterns.steroid,
            };
            if !pattern.is_match(&code) {
                continue;
            }

            store
                .medication_categories
                .entry(category)
                .or_default()
                .insert(request.id.clone());

            let sequence = match category {
                MedicationCategory::Antiasthmatic => None,
                MedicationCategory::Biologic => Some(&mut store.biologic_requests),
                MedicationCategory::Controller => Some(&mut store.controller_requests),
                MedicationCategory::Steroid => Some(&mut store.steroid_requests),
            };
            if let Some(sequence) = sequence {
                sequence.push(request.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PatientContext;
    use crate::config::test_config;
    use fhir::{
        Appointment, CodeableConcept, Coding, Condition, Encounter, List, ListEntry, Medication,
        Period, Reference,
    };

    fn store() -> AggregateStore {
        AggregateStore::new(PatientContext::new("p1", Some("e-hook"), None))
    }

    fn at(s: &str) -> Option<FhirDateTime> {
        Some(s.parse().expect("date"))
    }

    fn csn(value: &str) -> Identifier {
        Identifier {
            system: Some("urn:oid:1.2.840.114350.1.13.8.698084".into()),
            value: Some(value.into()),
            ..Identifier::default()
        }
    }

    fn order(id: &str, authored: &str, status: &str, medication: &str) -> MedicationRequest {
        MedicationRequest {
            id: id.into(),
            status: status.into(),
            authored_on: at(authored),
            medication_reference: Some(Reference::to_resource("Medication", medication)),
            ..MedicationRequest::default()
        }
    }

    fn medication(id: &str, code: &str) -> Medication {
        Medication {
            id: id.into(),
            code: CodeableConcept {
                coding: vec![Coding {
                    system: Some("urn:oid:2.16.840.1.113883.6.68".into()),
                    code: Some(code.into()),
                    display: None,
                }],
                text: None,
            },
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence_position() {
        let items = vec![("a", 1), ("b", 2), ("a", 3), ("c", 4)];
        let deduped = dedup_by_key(items, |(id, _)| *id);
        assert_eq!(deduped, vec![("a", 1), ("b", 2), ("c", 4)]);
    }

    #[test]
    fn identical_timestamps_sort_by_ascending_status() {
        let mut requests = vec![
            order("1", "2026-01-01T10:00:00Z", "stopped", "m"),
            order("2", "2026-03-01T10:00:00Z", "active", "m"),
            order("3", "2026-01-01T10:00:00Z", "active", "m"),
            MedicationRequest {
                id: "4".into(),
                ..MedicationRequest::default()
            },
        ];
        sort_newest_first(&mut requests, |mr| mr.authored_on, |mr| mr.status.as_str());
        let ids: Vec<&str> = requests.iter().map(|mr| mr.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1", "4"]);
    }

    #[test]
    fn medications_are_linked_classified_and_filtered() {
        let cfg = test_config();
        let mut store = store();
        store.medications.insert("m-ctl".into(), medication("m-ctl", "44400010"));
        store.medications.insert("m-scs".into(), medication("m-scs", "22100030"));
        store.medication_requests = vec![
            order("mr1", "2026-09-01", "active", "m-ctl"),
            order("mr2", "2026-08-01", "completed", "m-scs"),
            order("mr1", "2026-09-01", "active", "m-ctl"),
            MedicationRequest {
                encounter: Some(Reference {
                    display: Some("Anesthesia".into()),
                    ..Reference::default()
                }),
                ..order("mr3", "2026-07-01", "completed", "m-scs")
            },
            order("mr4", "2026-06-01", "completed", "m-unknown"),
        ];

        medications(&mut store, &cfg);

        let ids: Vec<&str> = store.medication_requests.iter().map(|mr| mr.id.as_str()).collect();
        assert_eq!(ids, vec!["mr1", "mr2", "mr4"]);
        assert_eq!(store.vocabulary_code("mr1"), Some("44400010"));
        assert_eq!(store.vocabulary_code("mr4"), None);
        assert!(store.in_category("mr1", MedicationCategory::Controller));
        assert!(store.in_category("mr1", MedicationCategory::Antiasthmatic));
        assert_eq!(store.category_count(MedicationCategory::Steroid), 2);
        let steroids: Vec<&str> = store.steroid_requests.iter().map(|mr| mr.id.as_str()).collect();
        assert_eq!(steroids, vec!["mr2", "mr3"], "anesthesia orders stay in the typed sequences");
        assert_eq!(store.controller_requests[0].id, "mr1");
        assert_eq!(store.vocabulary_cache.len(), 2);
    }

    #[test]
    fn classification_is_idempotent() {
        let cfg = test_config();
        let mut store = store();
        store.medications.insert("m".into(), medication("m", "22100030"));
        store.medication_requests = vec![order("mr1", "2026-09-01", "active", "m")];

        medications(&mut store, &cfg);
        let first = store.medication_categories.clone();
        medications(&mut store, &cfg);

        assert_eq!(store.medication_categories, first);
        assert_eq!(store.steroid_requests.len(), 1);
    }

    #[test]
    fn terminal_appointment_status_overrides_encounter() {
        let cfg = test_config();
        let mut store = store();
        store.appointments = vec![
            Appointment {
                id: "a1".into(),
                status: "noshow".into(),
                identifier: vec![csn("111")],
                ..Appointment::default()
            },
            Appointment {
                id: "a2".into(),
                status: "booked".into(),
                identifier: vec![csn("222")],
                ..Appointment::default()
            },
        ];
        store.encounters = vec![
            Encounter {
                id: "e1".into(),
                status: "finished".into(),
                identifier: vec![csn("111")],
                period: Period {
                    start: at("2026-05-01"),
                    end: None,
                },
                ..Encounter::default()
            },
            Encounter {
                id: "e-hook".into(),
                status: "planned".into(),
                identifier: vec![csn("222")],
                period: Period {
                    start: at("2026-10-18"),
                    end: None,
                },
                ..Encounter::default()
            },
        ];

        appointments(&mut store, &cfg);
        encounters(&mut store, &cfg);

        assert_eq!(store.encounters[0].id, "e-hook");
        assert_eq!(store.encounters[0].status, "planned");
        assert_eq!(store.encounters[1].status, "noshow");
        assert_eq!(store.context.encounter_csn.as_deref(), Some("222"));
        assert_eq!(store.encounter_dates.len(), 2);

        let today = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
        assert_eq!(recent_encounter_ids(&store, 30, today), vec!["e-hook"]);
        assert_eq!(recent_encounter_ids(&store, 365, today), vec!["e-hook", "e1"]);
        assert!(recent_encounter_ids(&store, 0, today).is_empty());
    }

    #[test]
    fn problems_keep_active_and_collect_hospital_problems() {
        let mut store = store();
        let condition = |id: &str, status: &str| Condition {
            id: id.into(),
            clinical_status: Some(CodeableConcept {
                coding: Vec::new(),
                text: Some(status.into()),
            }),
            ..Condition::default()
        };
        store.problem_list = vec![condition("c1", "Active"), condition("c2", "Resolved")];
        store.hospital_problem_lists = vec![List {
            id: "l1".into(),
            title: Some("Hospital Problem List".into()),
            encounter: None,
            entry: vec![ListEntry {
                item: Reference::to_resource("Condition", "c2"),
            }],
        }];

        problems(&mut store);

        assert_eq!(store.problem_list.len(), 1);
        assert_eq!(store.problem_list[0].id, "c1");
        assert_eq!(store.hospital_problems.len(), 1);
        assert_eq!(store.hospital_problems[0].id, "c2");
    }

    #[test]
    fn mrn_comes_from_epi_identifier() {
        let mut store = store();
        store.context.patient = Some(fhir::Patient {
            id: "p1".into(),
            identifier: vec![
                Identifier {
                    value: Some("x".into()),
                    ..Identifier::default()
                },
                Identifier {
                    value: Some("MRN42".into()),
                    type_: Some(CodeableConcept {
                        coding: Vec::new(),
                        text: Some("EPI".into()),
                    }),
                    ..Identifier::default()
                },
            ],
            ..fhir::Patient::default()
        });

        patient(&mut store);
        assert_eq!(store.context.mrn.as_deref(), Some("MRN42"));
    }
}

//! One eligibility evaluation, end to end.
//!
//! ```text
//! evaluation
//! ├── medications            batch → normalise
//! ├── patient                batch → normalise
//! ├── problems
//! │   ├── problem list       batch
//! │   └── hospital lists     batch
//! │                          → normalise
//! ├── visits
//! │   ├── encounters         batch
//! │   └── appointments       batch → normalise
//! │                          → normalise encounters
//! │                          → encounter diagnoses batch → normalise
//! ├── control tool           batch → score
//! └── action plan            batch → normalise
//! ```
//!
//! Every group drains completely before it reports; any failure anywhere discards the whole
//! evaluation. Criteria run only after the top-level group has joined, over a store nobody else
//! holds any more.

use crate::aggregate::{AggregateStore, ControlToolScore, PatientContext};
use crate::config::CdsConfig;
use crate::constants::ENCOUNTER_DIAGNOSIS_LOOKBACK_DAYS;
use crate::criteria::{self, Criteria};
use crate::fetch::group::TaskGroup;
use crate::fetch::orchestrator::Orchestrator;
use crate::fetch::requests::RequestFactory;
use crate::fetch::{fhir_headers, FetchRequest, Fetcher};
use crate::{control_tool, normalise, writeback};
use crate::{CdsError, CdsResult};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Identity and credentials for one evaluation.
#[derive(Clone, Debug)]
pub struct EvaluationRequest {
    /// FHIR base URL of the record system.
    pub base_url: String,
    pub patient_id: String,
    pub encounter_id: Option<String>,
    pub user_id: Option<String>,
    pub access_token: String,
}

impl EvaluationRequest {
    fn headers(&self) -> Vec<(String, String)> {
        fhir_headers(&self.access_token)
    }
}

/// Outcome of one evaluation.
#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    pub criteria: Criteria,
    pub context: PatientContext,
    pub control_tool: ControlToolScore,
}

impl Evaluation {
    pub fn recommends_treatment(&self) -> bool {
        self.criteria.recommends_treatment()
    }

    /// RTF alert text, only when treatment is recommended.
    pub fn alert_text(&self) -> Option<String> {
        if !self.recommends_treatment() {
            return None;
        }
        self.criteria.eligible.as_ref().map(writeback::build_rtf)
    }
}

/// Runs evaluations against upstream record systems. Cheap to clone.
#[derive(Clone)]
pub struct EligibilityService {
    cfg: Arc<CdsConfig>,
    fetcher: Arc<dyn Fetcher>,
}

impl EligibilityService {
    pub fn new(cfg: Arc<CdsConfig>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { cfg, fetcher }
    }

    pub fn config(&self) -> &CdsConfig {
        &self.cfg
    }

    /// Fetch, normalise and evaluate one patient.
    ///
    /// # Arguments
    ///
    /// * `request` - Patient, encounter, base URL and bearer token.
    /// * `today` - Reference date for every lookback and age computation.
    ///
    /// # Returns
    ///
    /// The criteria of every stage that ran, with the resolved patient context.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::InvalidInput`] for a blank patient id, [`CdsError::InvalidUrl`] for a
    /// base URL that is not absolute, and the first batch, decode or task error otherwise.
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
        today: NaiveDate,
    ) -> CdsResult<Evaluation> {
        if request.patient_id.trim().is_empty() {
            return Err(CdsError::InvalidInput("patient id is required".into()));
        }
        Url::parse(&request.base_url).map_err(|e| CdsError::InvalidUrl {
            url: request.base_url.clone(),
            reason: e.to_string(),
        })?;

        let context = PatientContext::new(
            &request.patient_id,
            request.encounter_id.as_deref(),
            request.user_id.as_deref(),
        );
        let store = AggregateStore::new(context).into_shared();
        let orchestrator = Orchestrator::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.cfg),
            store.clone(),
            &request.patient_id,
        );
        let factory = RequestFactory::new(&request.base_url, &request.patient_id, request.headers());

        self.gather(&orchestrator, &factory, today).await?;

        let store = std::mem::take(&mut *store.lock());
        let criteria = criteria::evaluate(&store, &self.cfg, today);

        tracing::info!(
            patient = %store.context.patient_id,
            mrn = store.context.mrn.as_deref().unwrap_or_default(),
            encounter = store.context.encounter_id.as_deref().unwrap_or_default(),
            csn = store.context.encounter_csn.as_deref().unwrap_or_default(),
            registry = criteria.registry.evaluation,
            eligible = criteria.eligible.as_ref().is_some_and(|c| c.evaluation),
            initiated = criteria.initiated.as_ref().is_some_and(|c| c.evaluation),
            "evaluation complete"
        );

        Ok(Evaluation {
            criteria,
            context: store.context,
            control_tool: store.control_tool,
        })
    }

    /// Store the alert text for a recommended patient. Does nothing otherwise.
    ///
    /// # Errors
    ///
    /// See [`writeback::write_back`].
    pub async fn write_back(
        &self,
        request: &EvaluationRequest,
        evaluation: &Evaluation,
    ) -> CdsResult<()> {
        let Some(alert_text) = evaluation.alert_text() else {
            return Ok(());
        };
        writeback::write_back(
            self.fetcher.as_ref(),
            &self.cfg,
            &request.base_url,
            &evaluation.context,
            &request.headers(),
            alert_text,
        )
        .await
    }

    /// Run every top-level group to completion.
    async fn gather(
        &self,
        orchestrator: &Orchestrator,
        factory: &RequestFactory,
        today: NaiveDate,
    ) -> CdsResult<()> {
        // Plan everything up front so a planning error spawns nothing.
        let medications = factory.medication_requests(today)?;
        let encounters = factory.encounters(today)?;
        let appointments = factory.appointments(today)?;
        let patient = factory.patient();
        let problem_list = factory.problem_list();
        let hospital_lists = factory.hospital_problem_lists();
        let control_tool_requests = factory.control_tool(&self.cfg, today);
        let action_plan_requests = factory.action_plan(&self.cfg);

        let mut evaluation = TaskGroup::new("evaluation");

        let orch = orchestrator.clone();
        evaluation.spawn(async move {
            orch.run_batch("medications", medications).await?;
            orch.mutate(normalise::medications);
            Ok(())
        });

        let orch = orchestrator.clone();
        evaluation.spawn(async move {
            orch.run_batch("patient", patient).await?;
            orch.mutate(|store, _| normalise::patient(store));
            Ok(())
        });

        let orch = orchestrator.clone();
        evaluation.spawn(async move {
            let mut problems = TaskGroup::new("problems");
            problems.spawn(batch(orch.clone(), "problem-list", problem_list));
            problems.spawn(batch(orch.clone(), "hospital-problem-lists", hospital_lists));
            problems.join_all().await?;
            orch.mutate(|store, _| normalise::problems(store));
            Ok(())
        });

        let orch = orchestrator.clone();
        let diagnoses = factory.clone();
        evaluation.spawn(async move {
            let mut visits = TaskGroup::new("visits");
            visits.spawn(batch(orch.clone(), "encounters", encounters));
            let appointments_orch = orch.clone();
            visits.spawn(async move {
                appointments_orch.run_batch("appointments", appointments).await?;
                appointments_orch.mutate(normalise::appointments);
                Ok(())
            });
            visits.join_all().await?;

            let recent = orch.mutate(|store, cfg| {
                normalise::encounters(store, cfg);
                normalise::recent_encounter_ids(store, ENCOUNTER_DIAGNOSIS_LOOKBACK_DAYS, today)
            });
            orch.run_batch("encounter-diagnoses", diagnoses.encounter_diagnoses(&recent))
                .await?;
            orch.mutate(|store, _| normalise::encounter_diagnoses(store));
            Ok(())
        });

        let orch = orchestrator.clone();
        evaluation.spawn(async move {
            orch.run_batch("control-tool", control_tool_requests).await?;
            orch.mutate(|store, _| control_tool::score(store));
            Ok(())
        });

        let orch = orchestrator.clone();
        evaluation.spawn(async move {
            orch.run_batch("action-plan", action_plan_requests).await?;
            orch.mutate(|store, _| normalise::action_plan(store));
            Ok(())
        });

        evaluation.join_all().await?;
        Ok(())
    }
}

async fn batch(
    orchestrator: Orchestrator,
    group: &'static str,
    requests: Vec<FetchRequest>,
) -> CdsResult<()> {
    orchestrator.run_batch(group, requests).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::FetchFailure;
    use crate::fetch::stub::StubFetcher;
    use crate::fetch::{FetchOutcome, Method};
    use serde_json::{json, Value};

    const BASE: &str = "https://ehr.example.org/api/FHIR/R4";
    const VOCABULARY: &str = "urn:oid:2.16.840.1.113883.6.68";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            base_url: BASE.into(),
            patient_id: "p1".into(),
            encounter_id: Some("e1".into()),
            user_id: Some("u1".into()),
            access_token: "token".into(),
        }
    }

    fn bundle(resources: Vec<Value>) -> Value {
        json!({
            "resourceType": "Bundle",
            "entry": resources.into_iter().map(|r| json!({ "resource": r })).collect::<Vec<_>>()
        })
    }

    fn order(id: &str, medication: &str, authored: &str) -> Value {
        json!({
            "resourceType": "MedicationRequest",
            "id": id,
            "status": "active",
            "intent": "order",
            "authoredOn": authored,
            "medicationReference": { "reference": format!("Medication/{medication}") },
            "dosageInstruction": [ { "text": "daily" } ]
        })
    }

    fn medication(id: &str, code: &str) -> Value {
        json!({
            "resourceType": "Medication",
            "id": id,
            "code": { "coding": [ { "system": VOCABULARY, "code": code } ] }
        })
    }

    /// Registry member with two recent steroid episodes and an established controller.
    fn eligible_patient() -> StubFetcher {
        StubFetcher::new()
            .route(
                |r| r.method() == Method::Put,
                FetchOutcome::Body(Vec::new()),
            )
            .json(
                |r| r.url().ends_with("/Patient/p1"),
                json!({
                    "resourceType": "Patient",
                    "id": "p1",
                    "birthDate": "2014-03-03",
                    "identifier": [ { "type": { "text": "EPI" }, "value": "MRN1" } ]
                }),
            )
            .json(
                |r| r.url().ends_with("/Encounter"),
                bundle(vec![json!({
                    "resourceType": "Encounter",
                    "id": "e1",
                    "status": "finished",
                    "identifier": [
                        { "system": "urn:oid:1.2.840.114350.1.13.0.1.7.2.698084.8.698084", "value": "CSN1" }
                    ],
                    "type": [ { "coding": [
                        { "system": "urn:oid:1.2.840.114350.1.13.0.1.7.10.698084.10110", "code": "101" }
                    ] } ],
                    "period": { "start": "2026-09-01T10:00:00Z" }
                })]),
            )
            .json(
                |r| r.url().ends_with("/MedicationRequest"),
                bundle(vec![
                    order("mr-ctl", "m-ctl", "2026-06-01"),
                    order("mr-s1", "m-scs", "2026-09-20"),
                    order("mr-s2", "m-scs", "2026-03-01"),
                    medication("m-ctl", "44400010"),
                    medication("m-scs", "22100010"),
                ]),
            )
            .json(
                |r| {
                    r.url().ends_with("/Condition")
                        && r.param_values("category").any(|c| c == "problem-list-item")
                },
                bundle(vec![json!({
                    "resourceType": "Condition",
                    "id": "c1",
                    "clinicalStatus": { "coding": [ { "code": "active" } ] },
                    "category": [ { "coding": [ { "code": "problem-list-item" } ] } ],
                    "code": { "coding": [ {
                        "system": "http://hl7.org/fhir/sid/icd-10-cm",
                        "code": "J45.40",
                        "display": "Moderate persistent asthma, uncomplicated"
                    } ] }
                })]),
            )
    }

    fn service(stub: StubFetcher) -> (EligibilityService, Arc<StubFetcher>) {
        let stub = Arc::new(stub);
        let service = EligibilityService::new(Arc::new(test_config()), stub.clone());
        (service, stub)
    }

    #[tokio::test]
    async fn eligible_patient_is_recommended() {
        let (service, stub) = service(eligible_patient());
        let evaluation = service.evaluate(&request(), today()).await.expect("evaluation");

        let registry = &evaluation.criteria.registry;
        assert!(registry.alive);
        assert!(registry.encounter);
        assert!(registry.persistent_asthma);
        assert!(registry.asthma_medication);
        assert!(registry.evaluation);

        let eligible = evaluation.criteria.eligible.as_ref().expect("stage B ran");
        assert!(eligible.age);
        assert!(eligible.controller_365_days);
        assert!(!eligible.controller_30_days);
        assert!(eligible.scs_183);
        assert!(eligible.scs_episode_365);
        assert!(eligible.evaluation);

        let initiated = evaluation.criteria.initiated.as_ref().expect("stage C ran");
        assert!(!initiated.icsf);
        assert!(!initiated.evaluation);

        assert!(evaluation.recommends_treatment());
        assert_eq!(evaluation.context.mrn.as_deref(), Some("MRN1"));
        assert_eq!(evaluation.context.encounter_csn.as_deref(), Some("CSN1"));

        // two windows each for encounters, appointments and medications, one diagnosis chunk
        let diagnosis_calls = stub
            .calls()
            .iter()
            .filter(|r| r.param_values("category").any(|c| c == "encounter-diagnosis"))
            .count();
        assert_eq!(diagnosis_calls, 1);
        assert!(stub.calls().iter().all(|r| r.method() == Method::Get));
    }

    fn encounter(id: &str, start: &str) -> Value {
        json!({
            "resourceType": "Encounter",
            "id": id,
            "status": "finished",
            "period": { "start": start }
        })
    }

    fn asthma_condition(id: &str, category: &str, status: &str, encounter: &str) -> Value {
        json!({
            "resourceType": "Condition",
            "id": id,
            "clinicalStatus": { "coding": [ { "code": status } ] },
            "category": [ { "coding": [ { "code": category } ] } ],
            "code": { "coding": [ {
                "system": "http://hl7.org/fhir/sid/icd-10-cm",
                "code": "J45.909",
                "display": "Unspecified asthma, uncomplicated"
            } ] },
            "encounter": { "reference": format!("Encounter/{encounter}") }
        })
    }

    #[tokio::test]
    async fn recent_encounter_ids_reach_the_diagnosis_lookup() {
        let stub = StubFetcher::new()
            .json(
                |r| r.url().ends_with("/Encounter"),
                bundle(vec![
                    encounter("e-old", "2025-06-01T09:00:00Z"),
                    encounter("e2", "2026-08-01T09:00:00Z"),
                    encounter("e1", "2026-09-01T09:00:00Z"),
                ]),
            )
            .json(
                |r| r.param_values("category").any(|c| c == "encounter-diagnosis"),
                bundle(vec![asthma_condition("d1", "encounter-diagnosis", "active", "e2")]),
            );
        let (service, stub) = service(stub);
        let evaluation = service.evaluate(&request(), today()).await.expect("evaluation");

        let lookups: Vec<FetchRequest> = stub
            .calls()
            .into_iter()
            .filter(|r| r.param_values("category").any(|c| c == "encounter-diagnosis"))
            .collect();
        assert_eq!(lookups.len(), 1);
        let ids: Vec<&str> = lookups[0].param_values("encounter").collect();
        assert_eq!(ids, vec!["e1,e2"]);
        assert!(evaluation.criteria.registry.asthma_encounter_diagnosis);
    }

    /// A hospital problem list naming an inactive asthma problem from a recent visit.
    fn hospital_problem_patient(with_list: bool) -> StubFetcher {
        let stub = StubFetcher::new()
            .json(
                |r| r.url().ends_with("/Encounter"),
                bundle(vec![encounter("e1", "2026-09-01T09:00:00Z")]),
            )
            .json(
                |r| r.param_values("category").any(|c| c == "problem-list-item"),
                bundle(vec![asthma_condition(
                    "c-hosp",
                    "problem-list-item",
                    "resolved",
                    "e1",
                )]),
            );
        if !with_list {
            return stub;
        }
        stub.json(
            |r| r.url().ends_with("/List"),
            bundle(vec![json!({
                "resourceType": "List",
                "id": "l1",
                "title": "Hospital Problem List",
                "entry": [ { "item": { "reference": "Condition/c-hosp" } } ]
            })]),
        )
    }

    #[tokio::test]
    async fn hospital_problem_list_feeds_visit_diagnosis() {
        let (listed, _) = service(hospital_problem_patient(true));
        let evaluation = listed.evaluate(&request(), today()).await.expect("evaluation");

        let registry = &evaluation.criteria.registry;
        assert!(!registry.asthma, "inactive problem stays off the problem list");
        assert!(registry.asthma_encounter_diagnosis);

        let (unlisted, _) = service(hospital_problem_patient(false));
        let evaluation = unlisted.evaluate(&request(), today()).await.expect("evaluation");
        assert!(!evaluation.criteria.registry.asthma_encounter_diagnosis);
    }

    #[tokio::test]
    async fn write_back_sends_alert_for_recommended_patient() {
        let (service, stub) = service(eligible_patient());
        let request = request();
        let evaluation = service.evaluate(&request, today()).await.expect("evaluation");
        service.write_back(&request, &evaluation).await.expect("write back");

        let puts: Vec<FetchRequest> = stub
            .calls()
            .into_iter()
            .filter(|r| r.method() == Method::Put)
            .collect();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].url().starts_with("https://ehr.example.org/api/epic/"));

        let body: Value = serde_json::from_slice(puts[0].body().expect("body")).expect("json");
        assert_eq!(body["ContactID"], "CSN1");
        let rtf = body["SmartDataValues"][0]["Values"][0].as_str().expect("rtf");
        assert!(rtf.contains("(09/20/2026, 03/01/2026)"));
    }

    #[tokio::test]
    async fn patient_without_asthma_skips_later_stages_and_write_back() {
        let (service, stub) = service(StubFetcher::new());
        let request = request();
        let evaluation = service.evaluate(&request, today()).await.expect("evaluation");

        assert!(!evaluation.criteria.registry.evaluation);
        assert!(evaluation.criteria.eligible.is_none());
        assert!(evaluation.alert_text().is_none());

        service.write_back(&request, &evaluation).await.expect("no-op");
        assert!(stub.calls().iter().all(|r| r.method() == Method::Get));
    }

    #[tokio::test]
    async fn any_failed_fetch_discards_the_evaluation() {
        let stub = eligible_patient().route(
            |r| r.url().ends_with("/Appointment"),
            FetchOutcome::Failed(FetchFailure::Status {
                url: format!("{BASE}/Appointment"),
                status: 500,
                body: "unavailable".into(),
            }),
        );
        let (service, _) = service(stub);

        let err = service
            .evaluate(&request(), today())
            .await
            .expect_err("appointments failed");
        match err {
            CdsError::BatchFailed { group, failed, total } => {
                assert_eq!(group, "appointments");
                assert_eq!(failed, 2);
                assert_eq!(total, 2);
            }
            other => panic!("expected BatchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_bad_identity_before_fetching() {
        let (service, stub) = service(StubFetcher::new());

        let blank = EvaluationRequest {
            patient_id: " ".into(),
            ..request()
        };
        assert!(matches!(
            service.evaluate(&blank, today()).await,
            Err(CdsError::InvalidInput(_))
        ));

        let relative = EvaluationRequest {
            base_url: "/FHIR/R4".into(),
            ..request()
        };
        assert!(matches!(
            service.evaluate(&relative, today()).await,
            Err(CdsError::InvalidUrl { .. })
        ));
        assert!(stub.calls().is_empty());
    }
}

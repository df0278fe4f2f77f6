//! Request shapes for each resource category.

use super::FetchRequest;
use crate::config::CdsConfig;
use crate::constants::{
    CONTROL_TOOL_LOOKBACK_DAYS, ENCOUNTER_DIAGNOSIS_CATEGORY_CODE, ENCOUNTER_DIAGNOSIS_CHUNK,
    MEDICATION_LOOKBACK_DAYS, MEDICATION_SPLITS, PROBLEM_LIST_CATEGORY_CODE, QUERY_DATE_FORMAT,
    VISIT_LOOKBACK_DAYS, VISIT_SPLITS,
};
use crate::dates::days_before;
use crate::planner::{chunk_ids, plan_windows};
use crate::CdsResult;
use chrono::NaiveDate;
use std::sync::Arc;

/// Builds every outbound read for one patient against one FHIR base URL.
#[derive(Clone, Debug)]
pub struct RequestFactory {
    base_url: Arc<str>,
    patient_id: Arc<str>,
    headers: Arc<[(String, String)]>,
}

impl RequestFactory {
    pub fn new(base_url: &str, patient_id: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            base_url: Arc::from(base_url.trim_end_matches('/')),
            patient_id: Arc::from(patient_id),
            headers: Arc::from(headers),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    fn search(&self, resource_type: &str) -> FetchRequest {
        FetchRequest::get(format!("{}/{resource_type}", self.base_url))
            .with_headers(&self.headers)
            .with_param("patient", self.patient_id.as_ref())
    }

    fn windowed(
        &self,
        resource_type: &str,
        extra: &[(&str, &str)],
        lookback_days: i64,
        splits: usize,
        today: NaiveDate,
    ) -> CdsResult<Vec<FetchRequest>> {
        let windows = plan_windows(lookback_days, splits, today)?;
        Ok(windows
            .iter()
            .map(|window| {
                extra
                    .iter()
                    .fold(self.search(resource_type), |request, (key, value)| {
                        request.with_param(*key, *value)
                    })
                    .with_window(window)
            })
            .collect())
    }

    pub fn patient(&self) -> Vec<FetchRequest> {
        vec![
            FetchRequest::get(format!("{}/Patient/{}", self.base_url, self.patient_id))
                .with_headers(&self.headers),
        ]
    }

    /// # Errors
    ///
    /// Propagates window planning errors.
    pub fn encounters(&self, today: NaiveDate) -> CdsResult<Vec<FetchRequest>> {
        self.windowed("Encounter", &[], VISIT_LOOKBACK_DAYS, VISIT_SPLITS, today)
    }

    /// # Errors
    ///
    /// Propagates window planning errors.
    pub fn appointments(&self, today: NaiveDate) -> CdsResult<Vec<FetchRequest>> {
        self.windowed("Appointment", &[], VISIT_LOOKBACK_DAYS, VISIT_SPLITS, today)
    }

    /// # Errors
    ///
    /// Propagates window planning errors.
    pub fn medication_requests(&self, today: NaiveDate) -> CdsResult<Vec<FetchRequest>> {
        self.windowed(
            "MedicationRequest",
            &[
                ("intent", "order"),
                ("status", "active,completed,stopped"),
                ("_include", "MedicationRequest:medicationReference"),
            ],
            MEDICATION_LOOKBACK_DAYS,
            MEDICATION_SPLITS,
            today,
        )
    }

    pub fn problem_list(&self) -> Vec<FetchRequest> {
        vec![self
            .search("Condition")
            .with_param("category", PROBLEM_LIST_CATEGORY_CODE)]
    }

    pub fn hospital_problem_lists(&self) -> Vec<FetchRequest> {
        vec![self.search("List").with_param("code", "hospital-problems")]
    }

    /// One request per chunk of at most 30 encounter ids. No ids, no requests.
    pub fn encounter_diagnoses(&self, encounter_ids: &[String]) -> Vec<FetchRequest> {
        chunk_ids(encounter_ids, ENCOUNTER_DIAGNOSIS_CHUNK)
            .into_iter()
            .map(|ids| {
                self.search("Condition")
                    .with_param("category", ENCOUNTER_DIAGNOSIS_CATEGORY_CODE)
                    .with_param("encounter", ids)
            })
            .collect()
    }

    pub fn action_plan(&self, cfg: &CdsConfig) -> Vec<FetchRequest> {
        let plan = cfg.action_plan();
        let codes = smartdata_codes(
            cfg.observation_oid(),
            [plan.green_zone.as_str(), plan.yellow_zone.as_str()],
        );
        vec![self
            .search("Observation")
            .with_param("category", "smartdata")
            .with_param("code", codes)]
    }

    pub fn control_tool(&self, cfg: &CdsConfig, today: NaiveDate) -> Vec<FetchRequest> {
        let codes = smartdata_codes(
            cfg.observation_oid(),
            cfg.control_tool_codes().iter().map(String::as_str),
        );
        let since = days_before(today, CONTROL_TOOL_LOOKBACK_DAYS);
        vec![self
            .search("Observation")
            .with_param("category", "smartdata")
            .with_param("code", codes)
            .with_param("issued", format!("ge{}", since.format(QUERY_DATE_FORMAT)))]
    }
}

/// `oid|code` pairs joined by commas.
fn smartdata_codes<'a>(oid: &str, codes: impl IntoIterator<Item = &'a str>) -> String {
    codes
        .into_iter()
        .map(|code| format!("{oid}|{code}"))
        .collect::<Vec<_>>()
        .join(",")
}

//! Write-back of the rendered alert text to the record system.
//!
//! The alert is a small RTF document with two checkbox lines, stored in a SmartData slot on the
//! current encounter through the vendor utility API (which lives beside, not under, the FHIR
//! base).

use crate::aggregate::PatientContext;
use crate::config::CdsConfig;
use crate::constants::{FHIR_BASE_SUFFIX, WRITE_BACK_PATH, WRITE_BACK_SOURCE};
use crate::criteria::EligibleCriteria;
use crate::error::FetchFailure;
use crate::fetch::{FetchOutcome, FetchRequest, Fetcher};
use crate::{CdsError, CdsResult};
use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

const RTF_HEADER: &str =
    r"{\rtf1\ansi{\colortbl;\red0\green128\blue0;\red255\green0\blue0;}{\fonttbl\f0\fArial;}\fs22";
const BOX_EMPTY: &str = r"\u9744";
const BOX_FILLED: &str = r"\u9745";
const ALERT_DATE_FORMAT: &str = "%m/%d/%Y";
const WRITE_BACK_COMMENT: &str = "Set by the SMART Asthma eligibility service";

/// Body of the SmartData save call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaveRequest {
    #[serde(rename = "ContextName")]
    pub context_name: String,
    #[serde(rename = "EntityID")]
    pub entity_id: String,
    #[serde(rename = "EntityIDType")]
    pub entity_id_type: String,
    #[serde(rename = "ContactID")]
    pub contact_id: String,
    #[serde(rename = "ContactIDType")]
    pub contact_id_type: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
    #[serde(rename = "UserIDType")]
    pub user_id_type: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "SmartDataValues")]
    pub smart_data_values: Vec<SmartDataValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SmartDataValue {
    #[serde(rename = "SmartDataID")]
    pub smart_data_id: String,
    #[serde(rename = "SmartDataIDType")]
    pub smart_data_id_type: String,
    #[serde(rename = "Comments")]
    pub comments: Vec<String>,
    #[serde(rename = "Values")]
    pub values: Vec<String>,
}

impl SaveRequest {
    /// Payload storing `alert_text` in the configured slot on the hook encounter.
    pub fn new(cfg: &CdsConfig, context: &PatientContext, alert_text: String) -> Self {
        Self {
            context_name: "Encounter".into(),
            entity_id: context.patient_id.clone(),
            entity_id_type: "FHIR".into(),
            contact_id: context.encounter_csn.clone().unwrap_or_default(),
            contact_id_type: "CSN".into(),
            user_id: cfg.system_user().to_string(),
            user_id_type: "FHIR".into(),
            source: WRITE_BACK_SOURCE.into(),
            smart_data_values: vec![SmartDataValue {
                smart_data_id: cfg.alert_text_location().to_string(),
                smart_data_id_type: "SDI".into(),
                comments: vec![WRITE_BACK_COMMENT.into()],
                values: vec![alert_text],
            }],
        }
    }
}

fn format_alert_date(date: NaiveDate) -> String {
    date.format(ALERT_DATE_FORMAT).to_string()
}

/// Render the alert text shown to clinicians.
pub fn build_rtf(criteria: &EligibleCriteria) -> String {
    let mut rtf = String::from(RTF_HEADER);

    let (icon, dates) = if criteria.scs_183 && criteria.scs_episode_365 {
        let dates: Vec<String> = criteria.scs_dates.iter().copied().map(format_alert_date).collect();
        (BOX_FILLED, format!(" ({})", dates.join(", ")))
    } else {
        (BOX_EMPTY, String::new())
    };
    rtf.push_str(&format!(
        r"{{\fs28  {icon}}}{{  >= 2 rx for systemic steroids in last 365 days{dates}}}\line"
    ));

    let icon = if criteria.uncontrolled_act {
        BOX_FILLED
    } else {
        BOX_EMPTY
    };
    let date = match criteria.control_tool_date {
        Some(date) => format!(" ({})", format_alert_date(date)),
        None => " (Not on file in last 6 months)".to_string(),
    };
    rtf.push_str(&format!(
        r"{{\fs28  {icon}}}{{  Poorly/Uncontrolled Asthma from Asthma Control Tool{date}}}"
    ));

    rtf.push('}');
    rtf
}

/// Remove the FHIR R4 path suffix (and trailing slashes) from a server base URL.
///
/// # Errors
///
/// Returns [`CdsError::InvalidUrl`] if `base_url` is not an absolute URL.
pub fn strip_fhir_suffix(base_url: &str) -> CdsResult<String> {
    let mut url = Url::parse(base_url).map_err(|e| CdsError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let trimmed = url.path().trim_end_matches('/');
    let path = trimmed
        .strip_suffix(FHIR_BASE_SUFFIX)
        .unwrap_or(trimmed)
        .to_string();
    url.set_path(&path);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// PUT the alert text into the record system.
///
/// # Arguments
///
/// * `fetcher` - Outbound transport.
/// * `cfg` - Supplies the slot id and system user.
/// * `base_url` - FHIR base URL from the hook request.
/// * `context` - Patient and encounter identity; the encounter CSN addresses the visit.
/// * `headers` - Upstream headers including the bearer token.
/// * `alert_text` - Rendered RTF.
///
/// # Errors
///
/// Returns [`CdsError::WriteBack`] if the server answers anything other than `200`,
/// [`CdsError::WriteBackFetch`] if the call itself failed, and [`CdsError::InvalidUrl`] or
/// [`CdsError::Serialization`] if the request could not be built.
pub async fn write_back(
    fetcher: &dyn Fetcher,
    cfg: &CdsConfig,
    base_url: &str,
    context: &PatientContext,
    headers: &[(String, String)],
    alert_text: String,
) -> CdsResult<()> {
    let url = format!("{}{}", strip_fhir_suffix(base_url)?, WRITE_BACK_PATH);
    let body = serde_json::to_vec(&SaveRequest::new(cfg, context, alert_text))
        .map_err(CdsError::Serialization)?;

    let request = FetchRequest::put(url, body)
        .with_headers(headers)
        .require_status(200);

    match fetcher.fetch(&request).await {
        FetchOutcome::Body(_) => {
            tracing::info!(patient = %context.patient_id, "alert text written");
            Ok(())
        }
        FetchOutcome::Failed(FetchFailure::Status { status, body, .. }) => {
            Err(CdsError::WriteBack { status, body })
        }
        FetchOutcome::Failed(failure) => Err(CdsError::WriteBackFetch(failure)),
    }
}

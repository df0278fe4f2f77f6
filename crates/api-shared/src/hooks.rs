//! CDS Hooks wire types.
//!
//! Only the subset of the CDS Hooks 1.x / 2.0 model this service reads or writes is modelled.
//! Field names follow the published JSON exactly; vendor extensions are named where they are
//! used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Id of the only service this server exposes.
pub const ELIGIBILITY_SERVICE_ID: &str = "eligibility";

/// Hook the eligibility service listens on.
pub const PATIENT_VIEW_HOOK: &str = "patient-view";

/// Detail content-type extension key understood by the EHR.
pub const DETAIL_CONTENT_TYPE_EXTENSION: &str = "com.epic.cdshooks.card.detail.content-type";

/// Coding system that marks a suggestion code as an order-set key.
pub const ORDER_SET_CODE_SYSTEM: &str = "urn:com.epic.cdshooks.action.code.system.orderset-item";

const MEDICATION_REQUEST_CATEGORY_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/medicationrequest-category";

// ============================================================================
// Request
// ============================================================================

/// Body of a hook invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HookRequest {
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub hook_instance: String,
    #[serde(default)]
    pub fhir_server: String,
    #[serde(default)]
    pub fhir_authorization: FhirAuthorization,
    #[serde(default)]
    pub context: HookContext,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FhirAuthorization {
    #[serde(default)]
    pub access_token: String,
}

impl std::fmt::Debug for FhirAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirAuthorization")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HookContext {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub encounter_id: String,
    #[serde(default)]
    pub user_id: String,
}

// ============================================================================
// Discovery
// ============================================================================

/// `GET /cds-services` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceDiscovery {
    pub services: Vec<ServiceDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceDefinition {
    pub hook: String,
    pub title: String,
    pub description: String,
    pub id: String,
    pub prefetch: BTreeMap<String, String>,
}

impl ServiceDiscovery {
    /// The discovery document advertising the eligibility service.
    pub fn eligibility() -> Self {
        let prefetch = BTreeMap::from([
            (
                "encounter".to_string(),
                "Encounter?patient={{context.patientId}}".to_string(),
            ),
            (
                "medications".to_string(),
                "MedicationRequest?patient={{context.patientId}}".to_string(),
            ),
        ]);

        Self {
            services: vec![ServiceDefinition {
                hook: PATIENT_VIEW_HOOK.into(),
                title: "Check SMART Asthma Eligibility".into(),
                description: "Checks if a patient is eligible for SMART asthma therapy".into(),
                id: ELIGIBILITY_SERVICE_ID.into(),
                prefetch,
            }],
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Hook response. `cards` is always present, possibly empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    pub cards: Vec<Card>,
    pub system_actions: Vec<SystemAction>,
}

/// Placeholder: this service never requests system actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SystemAction {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub uuid: String,
    pub summary: String,
    pub detail: String,
    pub indicator: Indicator,
    pub source: CardSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<CardExtension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardSource {
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Coding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardExtension {
    #[serde(rename = "com.epic.cdshooks.card.detail.content-type")]
    pub detail_content_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub label: String,
    pub url: String,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResourceReference {
    pub reference: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Suggestion {
    pub label: String,
    pub uuid: String,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Action {
    #[serde(rename = "type")]
    pub type_: String,
    pub description: String,
    pub resource: ServiceRequest,
}

/// Draft order proposed by a suggestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub resource_type: String,
    pub status: String,
    pub intent: String,
    pub category: Vec<CodeableConcept>,
    pub code: CodeableConcept,
    pub subject: ResourceReference,
}

impl Suggestion {
    /// Suggest opening the configured order set for `patient_id`.
    pub fn order_set(order_set_key: &str, patient_id: &str) -> Self {
        Self {
            label: "SMART Asthma SmartSet".into(),
            uuid: "order-set-request-test".into(),
            actions: vec![Action {
                type_: "create".into(),
                description: "SMART Asthma Therapy".into(),
                resource: ServiceRequest {
                    resource_type: "ServiceRequest".into(),
                    status: "draft".into(),
                    intent: "proposal".into(),
                    category: vec![CodeableConcept {
                        coding: vec![Coding {
                            system: MEDICATION_REQUEST_CATEGORY_SYSTEM.into(),
                            code: "outpatient".into(),
                            display: "Outpatient".into(),
                        }],
                    }],
                    code: CodeableConcept {
                        coding: vec![Coding {
                            system: ORDER_SET_CODE_SYSTEM.into(),
                            code: order_set_key.into(),
                            display: String::new(),
                        }],
                    },
                    subject: ResourceReference {
                        reference: format!("Patient/{patient_id}"),
                    },
                },
            }],
        }
    }
}

//! Wire models for the FHIR R4 resources consumed by the eligibility pipeline.
//!
//! Only the fields the pipeline reads are modelled. Unlike on-disk formats these structs do not
//! deny unknown fields: upstream servers add elements freely and that must not break decoding.
//! A present field with the wrong shape is still a decode error.

use crate::datetime::FhirDateTime;
use crate::reference::Reference;
use serde::{Deserialize, Serialize};

// ============================================================================
// Shared data types
// ============================================================================

/// A code from a terminology system.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn system(&self) -> &str {
        self.system.as_deref().unwrap_or_default()
    }

    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    pub fn display(&self) -> &str {
        self.display.as_deref().unwrap_or_default()
    }
}

/// A concept expressed as a set of codings plus free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// True if any coding carries `code`.
    pub fn has_code(&self, code: &str) -> bool {
        self.coding.iter().any(|c| c.code() == code)
    }
}

/// A business identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<CodeableConcept>,
}

impl Identifier {
    pub fn system(&self) -> &str {
        self.system.as_deref().unwrap_or_default()
    }

    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    /// Free-text label of the identifier type (for example `EPI`).
    pub fn type_text(&self) -> &str {
        self.type_.as_ref().map(CodeableConcept::text).unwrap_or_default()
    }
}

/// A time range. Either bound may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<FhirDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<FhirDateTime>,
}

/// A measured amount.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

// ============================================================================
// Resources
// ============================================================================

/// Patient demographics relevant to eligibility.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deceased_boolean: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deceased_date_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<FhirDateTime>,
}

impl Patient {
    /// True if a death has been recorded in either form.
    pub fn is_deceased(&self) -> bool {
        let has_date = self
            .deceased_date_time
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty());
        has_date || self.deceased_boolean.unwrap_or(false)
    }
}

/// A completed or in-progress visit.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub identifier: Vec<Identifier>,

    #[serde(rename = "type", default)]
    pub type_: Vec<CodeableConcept>,

    #[serde(default)]
    pub period: Period,
}

/// A scheduled visit.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub identifier: Vec<Identifier>,

    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<FhirDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<FhirDateTime>,
}

/// A problem or diagnosis.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_status: Option<CodeableConcept>,

    #[serde(default)]
    pub category: Vec<CodeableConcept>,

    #[serde(default)]
    pub code: CodeableConcept,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
}

impl Condition {
    /// True if the clinical status is `active`, by text or by code.
    pub fn is_active(&self) -> bool {
        self.clinical_status.as_ref().is_some_and(|status| {
            status.text().eq_ignore_ascii_case("active") || status.has_code("active")
        })
    }
}

/// One entry of a FHIR `List`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListEntry {
    #[serde(default)]
    pub item: Reference,
}

/// A curated list of references, used for hospital problem lists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct List {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,

    #[serde(default)]
    pub entry: Vec<ListEntry>,
}

impl List {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

/// A drug product definition, referenced from medication orders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Medication {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub code: CodeableConcept,
}

impl Medication {
    /// Code from `system`, if the medication carries one. The last matching coding wins.
    pub fn code_in(&self, system: &str) -> Option<&str> {
        self.code
            .coding
            .iter()
            .filter(|coding| coding.system() == system)
            .map(Coding::code)
            .last()
    }
}

/// One dosage line of a medication order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dosage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_needed_boolean: Option<bool>,
}

impl Dosage {
    /// True for a PRN (as-needed) instruction.
    pub fn as_needed(&self) -> bool {
        self.as_needed_boolean.unwrap_or(false)
    }
}

/// A medication order.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequest {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub intent: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_reference: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored_on: Option<FhirDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorder: Option<Reference>,

    #[serde(default)]
    pub dosage_instruction: Vec<Dosage>,
}

impl MedicationRequest {
    /// Id of the referenced `Medication`, if the order links to one.
    pub fn medication_id(&self) -> Option<&str> {
        self.medication_reference
            .as_ref()
            .and_then(Reference::target_id)
    }

    /// Display of the ordering encounter context, or an empty string.
    pub fn encounter_display(&self) -> &str {
        self.encounter
            .as_ref()
            .map(Reference::display)
            .unwrap_or_default()
    }
}

/// One component of a multi-part observation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_codeable_concept: Option<CodeableConcept>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
}

impl ObservationComponent {
    /// Codings of the coded value, empty when the value is not coded.
    pub fn value_codings(&self) -> &[Coding] {
        self.value_codeable_concept
            .as_ref()
            .map(|concept| concept.coding.as_slice())
            .unwrap_or_default()
    }

    /// Numeric value, when the component carries a quantity.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value_quantity.as_ref().and_then(|quantity| quantity.value)
    }
}

/// A recorded data point (action plan entries, control-tool scores).
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<FhirDateTime>,

    #[serde(default)]
    pub code: CodeableConcept,

    #[serde(default)]
    pub component: Vec<ObservationComponent>,

    #[serde(default)]
    pub focus: Vec<Reference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<Reference>,
}

impl Observation {
    /// Id of the first focus target (the encounter the value was filed against).
    pub fn focus_id(&self) -> Option<&str> {
        self.focus.first().and_then(Reference::target_id)
    }
}

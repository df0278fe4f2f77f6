//! FHIR wire/boundary support for the eligibility service.
//!
//! This crate provides **wire models** and **decoding helpers** for the FHIR R4 resources the
//! decision core consumes from an upstream health-record API:
//! - resource structs (Patient, Encounter, Appointment, Condition, List, Medication,
//!   MedicationRequest, Observation)
//! - the response envelope (single resource or paginated `Bundle`)
//! - `Type/Id` reference parsing and FHIR date/time parsing
//!
//! This crate performs no I/O. Fetching, routing and rule evaluation live in `cds-core`.

pub mod datetime;
pub mod envelope;
pub mod reference;
pub mod resources;

// Re-export facades
pub use datetime::FhirDateTime;
pub use envelope::{decode_payload, Resource};
pub use reference::{parse_reference, Reference, ResourceTarget};
pub use resources::{
    Appointment, CodeableConcept, Coding, Condition, Dosage, Encounter, Identifier, List,
    ListEntry, Medication, MedicationRequest, Observation, ObservationComponent, Patient, Period,
    Quantity,
};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid response envelope: {0}")]
    Envelope(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("malformed reference: '{0}'")]
    MalformedReference(String),

    #[error("malformed FHIR date: '{0}'")]
    MalformedDate(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

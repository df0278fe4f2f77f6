//! Response envelopes: single resources and paginated `Bundle`s.
//!
//! A response body is first decoded far enough to read its `resourceType` discriminator. Bundles
//! are unwrapped entry by entry (recursively, since a bundle entry may itself be a bundle) and
//! every entry is decoded into a typed [`Resource`]. Resource types the pipeline does not consume
//! decode to [`Resource::Unrecognised`] and are not an error.

use crate::resources::{
    Appointment, Condition, Encounter, List, Medication, MedicationRequest, Observation, Patient,
};
use crate::{FhirError, FhirResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Discriminator value for paginated collections.
pub const BUNDLE: &str = "Bundle";

/// A decoded resource, tagged by its declared type.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Appointment(Appointment),
    Condition(Condition),
    Encounter(Encounter),
    List(List),
    Medication(Medication),
    MedicationRequest(MedicationRequest),
    Observation(Observation),
    Patient(Patient),
    /// A well-formed resource of a type the pipeline does not consume.
    Unrecognised(String),
}

impl Resource {
    /// Decode one resource object by its `resourceType`.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] if the resource is of a recognised type but its fields
    /// do not match the wire model. The message includes the JSON path of the failing field.
    pub fn from_value(value: Value) -> FhirResult<Self> {
        let resource_type = resource_type(&value).unwrap_or_default().to_string();

        let resource = match resource_type.as_str() {
            "Appointment" => Resource::Appointment(decode(value, &resource_type)?),
            "Condition" => Resource::Condition(decode(value, &resource_type)?),
            "Encounter" => Resource::Encounter(decode(value, &resource_type)?),
            "List" => Resource::List(decode(value, &resource_type)?),
            "Medication" => Resource::Medication(decode(value, &resource_type)?),
            "MedicationRequest" => Resource::MedicationRequest(decode(value, &resource_type)?),
            "Observation" => Resource::Observation(decode(value, &resource_type)?),
            "Patient" => Resource::Patient(decode(value, &resource_type)?),
            _ => Resource::Unrecognised(resource_type),
        };

        Ok(resource)
    }

    /// Declared resource type name.
    pub fn type_name(&self) -> &str {
        match self {
            Resource::Appointment(_) => "Appointment",
            Resource::Condition(_) => "Condition",
            Resource::Encounter(_) => "Encounter",
            Resource::List(_) => "List",
            Resource::Medication(_) => "Medication",
            Resource::MedicationRequest(_) => "MedicationRequest",
            Resource::Observation(_) => "Observation",
            Resource::Patient(_) => "Patient",
            Resource::Unrecognised(name) => name,
        }
    }
}

/// Read the `resourceType` discriminator of a JSON object.
pub fn resource_type(value: &Value) -> Option<&str> {
    value.get("resourceType").and_then(Value::as_str)
}

/// Decode a raw response body into its resources, unwrapping bundles.
///
/// # Errors
///
/// Returns [`FhirError::Envelope`] if the body is not a JSON object, and
/// [`FhirError::Translation`] if any recognised resource inside it is malformed.
pub fn decode_payload(body: &[u8]) -> FhirResult<Vec<Resource>> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FhirError::Envelope(e.to_string()))?;
    if !value.is_object() {
        return Err(FhirError::Envelope(
            "response body is not a JSON object".into(),
        ));
    }

    let mut resources = Vec::new();
    collect(value, &mut resources)?;
    Ok(resources)
}

fn collect(value: Value, out: &mut Vec<Resource>) -> FhirResult<()> {
    if resource_type(&value) != Some(BUNDLE) {
        out.push(Resource::from_value(value)?);
        return Ok(());
    }

    let Value::Object(mut bundle) = value else {
        return Ok(());
    };
    let entries = match bundle.remove("entry") {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(FhirError::Translation(
                "Bundle schema mismatch at entry: expected an array".into(),
            ))
        }
    };

    for entry in entries {
        let Value::Object(mut entry) = entry else {
            continue;
        };
        if let Some(resource) = entry.remove("resource") {
            if resource.is_object() {
                collect(resource, out)?;
            }
        }
    }

    Ok(())
}

fn decode<T: DeserializeOwned>(value: Value, resource_type: &str) -> FhirResult<T> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>"
        } else {
            path.as_str()
        };
        FhirError::Translation(format!("{resource_type} schema mismatch at {path}: {source}"))
    })
}

//! FHIR `Reference` values and `Type/Id` parsing.
//!
//! The wire struct keeps the literal reference string exactly as received. Splitting it into a
//! resource type and a logical id is a separate pure function so malformed references surface as
//! an explicit error rather than a silently empty field.

use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// The resource a literal reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceTarget<'a> {
    /// Resource type segment, for example `Encounter`.
    pub resource_type: &'a str,
    /// Logical id segment.
    pub id: &'a str,
}

/// Split a literal reference into its resource type and logical id.
///
/// Relative references (`Encounter/123`) and absolute URLs
/// (`https://host/api/FHIR/R4/Encounter/123`) are both accepted; for absolute URLs the last two
/// path segments are used.
///
/// # Errors
///
/// Returns [`FhirError::MalformedReference`] if the value has no `/` separator or if either the
/// type or the id segment is empty.
pub fn parse_reference(raw: &str) -> FhirResult<ResourceTarget<'_>> {
    let trimmed = raw.trim().trim_end_matches('/');
    let Some((head, id)) = trimmed.rsplit_once('/') else {
        return Err(FhirError::MalformedReference(raw.to_string()));
    };
    let resource_type = head.rsplit('/').next().unwrap_or(head);

    if resource_type.is_empty() || id.is_empty() {
        return Err(FhirError::MalformedReference(raw.to_string()));
    }

    Ok(ResourceTarget { resource_type, id })
}

/// Wire representation of a FHIR `Reference`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// Build a relative reference such as `Patient/abc`.
    pub fn to_resource(resource_type: &str, id: &str) -> Self {
        Self {
            reference: Some(format!("{resource_type}/{id}")),
            ..Self::default()
        }
    }

    /// Parse the literal reference into its target.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::MalformedReference`] if the literal is absent or malformed.
    pub fn target(&self) -> FhirResult<ResourceTarget<'_>> {
        match self.reference.as_deref() {
            Some(raw) => parse_reference(raw),
            None => Err(FhirError::MalformedReference(String::new())),
        }
    }

    /// Logical id of the target, or `None` when the reference is absent or malformed.
    pub fn target_id(&self) -> Option<&str> {
        self.target().ok().map(|target| target.id)
    }

    /// Display text, or an empty string.
    pub fn display(&self) -> &str {
        self.display.as_deref().unwrap_or_default()
    }
}

//! Local (fullUrl) reference resolution.
//!
//! Builds a lookup table mapping each entry's `fullUrl` to the permanent
//! identity of its resource, then walks every resource rewriting matching
//! `reference` fields to `<resourceType>/<id>`. References with no matching
//! entry are left byte-for-byte unchanged and reported as warnings.
//!
//! The walk assumes resource containment forms a tree; cyclic containment
//! is out of scope and undefined behavior.

use crate::model::{Bundle, BundleEntry};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("duplicate fullUrl in bundle: {0}")]
    DuplicateFullUrl(String),
}

/// The permanent identity a resource carries once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity {
    pub resource_type: String,
    pub id: String,
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Non-fatal findings from a resolution pass.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Reference values that matched no entry in the bundle, one record per
    /// occurrence. The original value is left in place.
    pub unresolved: Vec<String>,
}

/// Lookup table from temporary `fullUrl` to permanent resource identity.
///
/// Built once per bundle and read-only afterwards.
#[derive(Debug)]
pub struct LocalReferenceMap {
    mapping: HashMap<String, ResourceIdentity>,
}

impl LocalReferenceMap {
    /// Build the map in a single linear pass over the entries.
    ///
    /// Entries whose resource carries no `id` get a client-reserved UUID
    /// written into the payload first, so their `fullUrl` still resolves and
    /// a later upsert has a definite identity. Duplicate `fullUrl` values
    /// fail before any entry is touched.
    pub fn build(entries: &mut [BundleEntry]) -> Result<Self, ResolveError> {
        // Duplicate check up front: a failed build must leave the bundle
        // exactly as it was.
        let mut seen = HashSet::new();
        for entry in entries.iter() {
            if let Some(full_url) = &entry.full_url {
                if !seen.insert(full_url.clone()) {
                    return Err(ResolveError::DuplicateFullUrl(full_url.clone()));
                }
            }
        }

        let mut mapping = HashMap::new();
        for entry in entries.iter_mut() {
            let Some(full_url) = entry.full_url.clone() else {
                continue;
            };
            let Some(resource) = entry.resource.as_mut() else {
                continue;
            };
            let Some(resource_type) = resource
                .get("resourceType")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
            else {
                continue;
            };

            let id = match resource.get("id").and_then(JsonValue::as_str) {
                Some(id) => id.to_string(),
                None => {
                    let reserved = Uuid::new_v4().to_string();
                    if let Some(obj) = resource.as_object_mut() {
                        obj.insert("id".to_string(), JsonValue::String(reserved.clone()));
                    }
                    tracing::debug!(
                        full_url = %full_url,
                        id = %reserved,
                        "reserved id for resource without one"
                    );
                    reserved
                }
            };

            mapping.insert(full_url, ResourceIdentity { resource_type, id });
        }

        Ok(Self { mapping })
    }

    pub fn resolve(&self, value: &str) -> Option<&ResourceIdentity> {
        self.mapping.get(value)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// Rewrite every local reference in the bundle to its permanent form.
///
/// Fails with [`ResolveError::DuplicateFullUrl`] if two entries share a
/// `fullUrl`, in which case no rewrite has been applied.
pub fn resolve_references(bundle: &mut Bundle) -> Result<ResolveReport, ResolveError> {
    let mut report = ResolveReport::default();
    let Some(entries) = bundle.entry.as_mut() else {
        return Ok(report);
    };

    let map = LocalReferenceMap::build(entries)?;
    for entry in entries.iter_mut() {
        if let Some(resource) = entry.resource.as_mut() {
            rewrite_value(resource, &map, &mut report);
        }
    }

    for value in &report.unresolved {
        tracing::warn!(reference = %value, "unresolved reference, left unchanged");
    }

    Ok(report)
}

/// Depth-first walk over a resource, including contained resources and
/// array-valued fields. A node is a reference field when it is an object
/// member named `reference` holding a string.
fn rewrite_value(value: &mut JsonValue, map: &LocalReferenceMap, report: &mut ResolveReport) {
    match value {
        JsonValue::Object(obj) => {
            for (key, child) in obj.iter_mut() {
                if key == "reference" {
                    if let JsonValue::String(reference) = child {
                        match map.resolve(reference) {
                            Some(identity) => *reference = identity.to_string(),
                            None => report.unresolved.push(reference.clone()),
                        }
                        continue;
                    }
                }
                rewrite_value(child, map, report);
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                rewrite_value(item, map, report);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle_from(value: JsonValue) -> Bundle {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rewrites_reference_to_permanent_identity() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:1",
                    "resource": {"resourceType": "Patient", "id": "p1"}
                },
                {
                    "fullUrl": "urn:uuid:2",
                    "resource": {
                        "resourceType": "Observation",
                        "id": "o1",
                        "subject": {"reference": "urn:uuid:1"}
                    }
                }
            ]
        }));

        let report = resolve_references(&mut bundle).unwrap();
        assert!(report.unresolved.is_empty());

        let entries = bundle.entry.unwrap();
        let observation = entries[1].resource.as_ref().unwrap();
        assert_eq!(observation["subject"]["reference"], "Patient/p1");
    }

    #[test]
    fn duplicate_full_url_fails_without_partial_rewrite() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:1",
                    "resource": {"resourceType": "Patient", "id": "p1"}
                },
                {
                    "fullUrl": "urn:uuid:2",
                    "resource": {
                        "resourceType": "Observation",
                        "id": "o1",
                        "subject": {"reference": "urn:uuid:1"}
                    }
                },
                {
                    "fullUrl": "urn:uuid:1",
                    "resource": {"resourceType": "Patient", "id": "p2"}
                }
            ]
        }));

        let err = resolve_references(&mut bundle).unwrap_err();
        assert!(matches!(err, ResolveError::DuplicateFullUrl(ref url) if url == "urn:uuid:1"));

        // The reference must still hold its temporary value.
        let entries = bundle.entry.unwrap();
        let observation = entries[1].resource.as_ref().unwrap();
        assert_eq!(observation["subject"]["reference"], "urn:uuid:1");
    }

    #[test]
    fn unmatched_reference_is_unchanged_with_one_warning() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [{
                "fullUrl": "urn:uuid:1",
                "resource": {
                    "resourceType": "Observation",
                    "id": "o1",
                    "subject": {"reference": "Patient/already-permanent"},
                    "performer": [{"reference": "urn:uuid:missing"}]
                }
            }]
        }));

        let report = resolve_references(&mut bundle).unwrap();
        assert_eq!(report.unresolved.len(), 2);
        assert!(report
            .unresolved
            .contains(&"Patient/already-permanent".to_string()));
        assert!(report.unresolved.contains(&"urn:uuid:missing".to_string()));

        let entries = bundle.entry.unwrap();
        let observation = entries[0].resource.as_ref().unwrap();
        assert_eq!(
            observation["subject"]["reference"],
            "Patient/already-permanent"
        );
        assert_eq!(
            observation["performer"][0]["reference"],
            "urn:uuid:missing"
        );
    }

    #[test]
    fn walks_contained_resources_and_arrays() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:org",
                    "resource": {"resourceType": "Organization", "id": "org-1"}
                },
                {
                    "fullUrl": "urn:uuid:report",
                    "resource": {
                        "resourceType": "DiagnosticReport",
                        "id": "r1",
                        "contained": [{
                            "resourceType": "Observation",
                            "id": "inner",
                            "performer": [
                                {"reference": "urn:uuid:org"},
                                {"reference": "urn:uuid:report"}
                            ]
                        }]
                    }
                }
            ]
        }));

        let report = resolve_references(&mut bundle).unwrap();
        assert!(report.unresolved.is_empty());

        let entries = bundle.entry.unwrap();
        let contained = &entries[1].resource.as_ref().unwrap()["contained"][0];
        assert_eq!(contained["performer"][0]["reference"], "Organization/org-1");
        assert_eq!(
            contained["performer"][1]["reference"],
            "DiagnosticReport/r1"
        );
    }

    #[test]
    fn reserves_id_for_resource_without_one() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:1",
                    "resource": {"resourceType": "Patient"}
                },
                {
                    "fullUrl": "urn:uuid:2",
                    "resource": {
                        "resourceType": "Observation",
                        "id": "o1",
                        "subject": {"reference": "urn:uuid:1"}
                    }
                }
            ]
        }));

        let report = resolve_references(&mut bundle).unwrap();
        assert!(report.unresolved.is_empty());

        let entries = bundle.entry.unwrap();
        let patient = entries[0].resource.as_ref().unwrap();
        let reserved = patient["id"].as_str().unwrap();
        assert!(!reserved.is_empty());

        let observation = entries[1].resource.as_ref().unwrap();
        assert_eq!(
            observation["subject"]["reference"].as_str().unwrap(),
            format!("Patient/{reserved}")
        );
    }

    #[test]
    fn non_string_reference_member_is_recursed_not_rewritten() {
        // `reference` holding an object (e.g. an extension-only element)
        // is not a reference field; its children still get walked.
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:1",
                    "resource": {"resourceType": "Patient", "id": "p1"}
                },
                {
                    "fullUrl": "urn:uuid:2",
                    "resource": {
                        "resourceType": "Observation",
                        "id": "o1",
                        "subject": {
                            "reference": {
                                "extension": [{
                                    "url": "http://example.org/actual",
                                    "valueReference": {"reference": "urn:uuid:1"}
                                }]
                            }
                        }
                    }
                }
            ]
        }));

        let report = resolve_references(&mut bundle).unwrap();
        assert!(report.unresolved.is_empty());

        let entries = bundle.entry.unwrap();
        let observation = entries[1].resource.as_ref().unwrap();
        assert_eq!(
            observation["subject"]["reference"]["extension"][0]["valueReference"]["reference"],
            "Patient/p1"
        );
    }

    #[test]
    fn empty_bundle_resolves_to_empty_report() {
        let mut bundle = bundle_from(json!({
            "resourceType": "Bundle",
            "type": "transaction"
        }));
        let report = resolve_references(&mut bundle).unwrap();
        assert!(report.unresolved.is_empty());
    }
}

//! Bundle data structures.
//!
//! Only the fields this tool needs are typed; everything else is kept in
//! flattened maps so a document round-trips unchanged through the model.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// The bundle types this tool can process.
///
/// Any other `Bundle.type` value is not an error; the document is simply
/// skipped by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    Transaction,
    Batch,
    Collection,
}

impl BundleType {
    /// Parse a raw `Bundle.type` code. Returns `None` for unprocessable types.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "transaction" => Some(Self::Transaction),
            "batch" => Some(Self::Batch),
            "collection" => Some(Self::Collection),
            _ => None,
        }
    }
}

impl std::fmt::Display for BundleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transaction => write!(f, "transaction"),
            Self::Batch => write!(f, "batch"),
            Self::Collection => write!(f, "collection"),
        }
    }
}

/// A FHIR Bundle document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Raw `Bundle.type` code. Kept as a string so unsupported documents
    /// still deserialize and can be reported instead of rejected.
    #[serde(rename = "type")]
    pub bundle_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<Vec<BundleEntry>>,

    #[serde(flatten)]
    pub extensions: HashMap<String, JsonValue>,
}

impl Bundle {
    /// The parsed bundle type, if it is one this tool can process.
    pub fn known_type(&self) -> Option<BundleType> {
        BundleType::from_code(&self.bundle_type)
    }
}

/// One entry of a bundle: a temporary identifier plus a resource payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Temporary, bundle-scoped identifier other entries may reference.
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,

    /// The resource payload, kept as raw JSON so the reference walk sees
    /// every nested field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<JsonValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,

    #[serde(flatten)]
    pub extensions: HashMap<String, JsonValue>,
}

/// The intended operation for an entry (`Bundle.entry.request`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,

    #[serde(flatten)]
    pub extensions: HashMap<String, JsonValue>,
}

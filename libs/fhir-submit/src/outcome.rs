//! Submission units and their per-unit outcomes.

use fhirlift_client::TransportError;
use serde_json::Value as JsonValue;

/// One schedulable piece of work: a single resolved resource (split mode)
/// or a whole resolved bundle (transaction mode).
#[derive(Debug, Clone)]
pub enum SubmissionUnit {
    Resource {
        resource_type: String,
        id: String,
        resource: JsonValue,
    },
    Bundle {
        resource: JsonValue,
    },
}

impl SubmissionUnit {
    /// Human-readable identity used in outcomes and log lines.
    pub fn label(&self) -> String {
        match self {
            Self::Resource {
                resource_type, id, ..
            } => format!("{resource_type}/{id}"),
            Self::Bundle { resource } => match resource.get("id").and_then(JsonValue::as_str) {
                Some(id) => format!("Bundle/{id}"),
                None => "Bundle".to_string(),
            },
        }
    }
}

/// The terminal result of one unit's submission.
///
/// Outcomes are returned as values from every submission task; failures
/// never unwind across task boundaries.
#[derive(Debug)]
pub enum Outcome {
    Success {
        unit: String,
        resource: JsonValue,
    },
    Failure {
        unit: String,
        error: TransportError,
    },
}

impl Outcome {
    pub fn unit(&self) -> &str {
        match self {
            Self::Success { unit, .. } | Self::Failure { unit, .. } => unit,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

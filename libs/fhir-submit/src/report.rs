//! Per-unit outcome reporting.

use crate::outcome::Outcome;
use serde_json::Value as JsonValue;

/// Consumes outcomes as the drain loop produces them and emits one record
/// per submitted unit. Never alters outcomes and never influences the run's
/// exit code.
#[derive(Debug, Default)]
pub struct Reporter {
    succeeded: usize,
    failed: usize,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Success { unit, resource } => {
                self.succeeded += 1;
                let resource_type = resource
                    .get("resourceType")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("unknown");
                tracing::info!(resource_type, "submitted {unit}");
            }
            Outcome::Failure { unit, error } => {
                self.failed += 1;
                tracing::error!("failed to submit {unit}: {error}");
            }
        }
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

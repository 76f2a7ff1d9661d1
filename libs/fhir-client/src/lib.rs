//! HTTP transport for submitting FHIR resources to a server.
//!
//! The [`Transport`] trait is the seam between the submission orchestrator
//! and the network: an idempotent per-resource upsert plus an atomic
//! whole-bundle transaction. [`RestClient`] is the reqwest-backed
//! implementation.

mod error;
mod rest;

pub use error::{ClientError, TransportError};
pub use rest::RestClient;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// The submit capability the orchestrator dispatches through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create-or-update a single resource at `{base}/{type}/{id}`.
    async fn upsert(
        &self,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
    ) -> Result<JsonValue, TransportError>;

    /// Submit a whole bundle for atomic server-side processing.
    async fn submit_transaction(&self, bundle: &JsonValue) -> Result<JsonValue, TransportError>;
}

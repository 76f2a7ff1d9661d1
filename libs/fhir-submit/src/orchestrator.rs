//! Dispatch, admission gating and rate-limit retry.

use crate::outcome::{Outcome, SubmissionUnit};
use crate::report::Reporter;
use fhirlift_client::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Total attempts per unit: the initial call plus one retry on throttling.
pub const MAX_ATTEMPTS: u32 = 2;

/// Limits applied to one bundle's submission run.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Maximum number of in-flight transport calls.
    pub concurrency: usize,
    /// Fixed delay before the single throttle retry.
    pub throttle_backoff: Duration,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            throttle_backoff: Duration::from_secs(1),
        }
    }
}

/// Submit every unit through the transport, bounded by a fresh admission
/// gate, and drain outcomes in completion order.
///
/// Every input unit yields exactly one [`Outcome`], handed to the reporter
/// as it arrives. The gate is scoped to this call; concurrent runs never
/// share one.
pub async fn submit_all(
    units: Vec<SubmissionUnit>,
    transport: Arc<dyn Transport>,
    options: &SubmitOptions,
    reporter: &mut Reporter,
) -> Vec<Outcome> {
    let gate = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for unit in units {
        let gate = Arc::clone(&gate);
        let transport = Arc::clone(&transport);
        let backoff = options.throttle_backoff;
        tasks.spawn(async move { submit_unit(unit, transport, gate, backoff).await });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                reporter.record(&outcome);
                outcomes.push(outcome);
            }
            // A panicked task loses its outcome but must not abort the drain.
            Err(err) => tracing::error!("submission task failed to complete: {err}"),
        }
    }

    outcomes
}

async fn submit_unit(
    unit: SubmissionUnit,
    transport: Arc<dyn Transport>,
    gate: Arc<Semaphore>,
    backoff: Duration,
) -> Outcome {
    let label = unit.label();

    // Suspends until a slot is free. The gate is never closed while tasks
    // are running, so acquisition cannot fail.
    let _permit = gate
        .acquire_owned()
        .await
        .expect("admission gate closed during submission");

    let mut attempt = 0;
    loop {
        attempt += 1;
        match dispatch(&unit, transport.as_ref()).await {
            Ok(resource) => {
                return Outcome::Success {
                    unit: label,
                    resource,
                }
            }
            Err(error) if error.is_throttled() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    unit = %label,
                    backoff_ms = backoff.as_millis() as u64,
                    "throttled by server, retrying once"
                );
                // The slot stays held through the backoff.
                sleep(backoff).await;
            }
            Err(error) => return Outcome::Failure { unit: label, error },
        }
    }
}

async fn dispatch(
    unit: &SubmissionUnit,
    transport: &dyn Transport,
) -> Result<serde_json::Value, fhirlift_client::TransportError> {
    match unit {
        SubmissionUnit::Resource {
            resource_type,
            id,
            resource,
        } => transport.upsert(resource_type, id, resource).await,
        SubmissionUnit::Bundle { resource } => transport.submit_transaction(resource).await,
    }
}

//! Bounded-concurrency submission of resolved FHIR resources.
//!
//! The orchestrator dispatches every [`SubmissionUnit`] at once, gates the
//! actual transport calls behind a bounded admission gate, retries a
//! throttled call exactly once after a fixed backoff, and drains outcomes
//! first-finished-first. One unit's failure never aborts or delays the
//! others.

mod orchestrator;
mod outcome;
mod report;

pub use orchestrator::{submit_all, SubmitOptions, MAX_ATTEMPTS};
pub use outcome::{Outcome, SubmissionUnit};
pub use report::Reporter;

use thiserror::Error;

/// Failure constructing a [`crate::RestClient`]. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server URL must be an absolute http(s) URI: {0}")]
    InvalidBaseUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Failure of a single transport call.
///
/// `Throttled` is kept separate from every other variant so the orchestrator
/// can apply its one-shot retry to rate limiting only.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server throttled the request (HTTP 429)")]
    Throttled,
    #[error("server returned HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// True when the server signalled a request-rate limit.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

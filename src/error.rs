//! Error types for the scrub pipeline.
//!
//! Errors never escape [`crate::scrubber::Scrubber::scrub`]; they are
//! converted into diagnostic audit fields at the orchestrator boundary.

use thiserror::Error;

/// Errors from an LLM provider call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Authentication or authorization failure (HTTP 401). Not retried.
    #[error("authentication failed for provider '{provider}'")]
    AuthFailed { provider: String },

    /// The provider rejected the request as malformed (HTTP 400). Not retried.
    #[error("invalid request to provider '{provider}': {reason}")]
    InvalidRequest { provider: String, reason: String },

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited by provider '{provider}'")]
    RateLimited {
        provider: String,
        /// Suggested wait in seconds, when the provider supplied one.
        retry_after: Option<u64>,
    },

    /// The request exceeded its deadline.
    #[error("request to provider '{provider}' timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    /// Network failure or non-2xx status outside the cases above.
    #[error("request to provider '{provider}' failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    /// The provider returned a body that could not be interpreted.
    #[error("invalid response from provider '{provider}': {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether the detector should retry after this error.
    ///
    /// Auth and validation failures are final; everything else (timeouts,
    /// rate limits, network errors, 5xx) is considered transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::AuthFailed { .. } | Self::InvalidRequest { .. }
        )
    }
}

/// Internal pipeline failures, observable only through the audit record.
#[derive(Debug, Error)]
pub enum ScrubError {
    /// Chunking produced windows that violate the chunk invariants.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// A chunk worker failed or panicked.
    #[error("chunk {index} failed: {reason}")]
    ChunkFailed { index: usize, reason: String },

    /// The redactor could not build its matcher.
    #[error("redaction failed: {0}")]
    Redaction(String),
}

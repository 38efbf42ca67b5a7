use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes of a single provider call, kept machine-readable so the
/// gateway can pick the right retry policy.
#[derive(Debug, Error, Clone)]
pub enum OracleApiError {
    /// Provider signalled a rate limit, optionally with a retry delay hint.
    #[error("provider rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Network-level failure or non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Configuration error; the only failure the gateway surfaces hard.
    #[error("missing provider credentials")]
    MissingCredentials,
}

/// A single text-generation call against the external prediction provider.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, OracleApiError>;
}

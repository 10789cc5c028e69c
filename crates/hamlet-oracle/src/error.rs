//! Error types for the oracle client.
//!
//! The first four variants are the failure kinds a caller has to plan for:
//! every stage of the conversation pipeline maps them to a fallback. The
//! rest are setup errors or internal signals.

use std::time::Duration;

/// Errors that can occur while talking to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The rate budget stayed exhausted through every backoff attempt, or
    /// the backend itself answered with a rate-limit status.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested wait before trying again.
        retry_after: Duration,
    },

    /// The call did not finish within its deadline.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend was unreachable or answered with an error status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered but the content could not be used.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request was cancelled before it finished.
    #[error("request cancelled")]
    Cancelled,

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),
}

impl OracleError {
    /// Whether a single retry with jitter is worth attempting.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }

    /// Short label for logs and stage records.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the mercato workspace.
///
/// Admission denials from the limit manager are not errors; they are returned
/// as values. The variants below cover provider failures, exhaustion across
/// providers, configuration problems and storage issues.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MercatoError {
    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// An individual provider returned an error.
    #[error("{provider} failed: {msg}")]
    Provider {
        /// Provider identifier that failed.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// An individual provider call exceeded the configured timeout.
    #[error("provider timed out: {request_type} via {provider}")]
    ProviderTimeout {
        /// Provider identifier that timed out.
        provider: String,
        /// Request type label (e.g. "quote", "history").
        request_type: String,
    },

    /// All attempted providers failed; contains the individual failures.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<MercatoError>),

    /// All attempted providers timed out for the request type.
    #[error("all providers timed out: {request_type}")]
    AllProvidersTimedOut {
        /// Request type label that timed out across all providers.
        request_type: String,
    },

    /// No enabled provider currently admits the request.
    #[error("no eligible provider for {request_type}: {reasons:?}")]
    NoEligibleProvider {
        /// Request type label.
        request_type: String,
        /// One `provider: reason` line per rejected provider.
        reasons: Vec<String>,
    },

    /// The request exceeds the configured quota budget for the current window.
    #[error("quota exceeded: remaining={remaining} reset_in_ms={reset_in_ms}")]
    QuotaExceeded {
        /// Remaining units at the time of rejection.
        remaining: u64,
        /// Milliseconds until the quota window resets.
        reset_in_ms: u64,
    },

    /// The request rate exceeds the configured rate limit.
    #[error("rate limit exceeded: limit={limit} window_ms={window_ms}")]
    RateLimitExceeded {
        /// Allowed number of requests in the window.
        limit: u64,
        /// Window length in milliseconds.
        window_ms: u64,
    },

    /// The backend circuit breaker is open; retry after `reset_in_ms`.
    #[error("circuit breaker open: reset_in_ms={reset_in_ms}")]
    CircuitOpen {
        /// Milliseconds remaining until the breaker allows the next probe.
        reset_in_ms: u64,
    },

    /// A required configuration value is missing or empty.
    #[error("missing required configuration: {key}")]
    MissingConfig {
        /// Dotted configuration path, e.g. `api.base_url`.
        key: String,
    },

    /// Configuration could not be parsed or fetched.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(String),

    /// Value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl MercatoError {
    /// Helper: build a `Provider` error with the provider id and message.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `ProviderTimeout` error.
    pub fn provider_timeout(provider: impl Into<String>, request_type: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
            request_type: request_type.into(),
        }
    }

    /// Helper: build a `MissingConfig` error for a dotted key.
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// Helper: build a `Storage` error from any displayable cause.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    /// Returns true if this error should be surfaced to users as actionable.
    ///
    /// Transient conditions (rate limiting, open breaker) are not actionable;
    /// aggregates are classified based on their contents.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. } => false,
            Self::AllProvidersFailed(inner) => inner.iter().any(Self::is_actionable),
            _ => true,
        }
    }

    /// Flatten nested `AllProvidersFailed` structures into a plain vector.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::AllProvidersFailed(list) => list.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }
}

impl From<serde_json::Error> for MercatoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

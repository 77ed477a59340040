use serde::{Deserialize, Serialize};

use crate::{ProviderId, RequestType};

/// Quota usage level that triggered a threshold event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// Usage crossed the warning threshold (70% by default).
    Warning,
    /// Usage crossed the critical threshold (90% by default).
    Critical,
}

/// Events published by the limit manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum LimitEvent {
    /// Quota usage crossed a threshold within the current window.
    QuotaThreshold {
        /// Provider whose quota crossed the threshold.
        provider: ProviderId,
        /// Quota scope.
        request_type: RequestType,
        /// Which threshold was crossed.
        level: ThresholdLevel,
        /// `used / limit` at the time of crossing.
        usage_rate: f64,
    },
    /// A quota window elapsed and usage was reset to zero.
    QuotaReset {
        /// Provider whose quota was reset.
        provider: ProviderId,
        /// Quota scope.
        request_type: RequestType,
    },
    /// A provider call failed and the health score was lowered.
    RequestFailed {
        /// Failing provider.
        provider: ProviderId,
        /// Request scope.
        request_type: RequestType,
        /// Health score after the penalty.
        health_score: u8,
    },
    /// Every eligible provider failed or was ineligible for a request.
    ProvidersExhausted {
        /// Request scope.
        request_type: RequestType,
        /// Symbol being requested, when known.
        symbol: Option<String>,
    },
}

//! Health monitoring primitives.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One endpoint probed on every health cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Stable name used as key in [`HealthStatus::endpoints`].
    pub name: String,
    /// Path appended to the API base URL.
    pub path: String,
    /// Critical endpoints decide between `Down` and the ratio-based states.
    pub critical: bool,
}

impl EndpointSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, path: impl Into<String>, critical: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            critical,
        }
    }
}

/// Configuration of the health service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Delay between health cycles.
    pub check_interval: Duration,
    /// Upper bound for a single endpoint probe.
    pub probe_timeout: Duration,
    /// Consecutive failing cycles that open the breaker.
    pub failure_threshold: u32,
    /// How long an open breaker suppresses probing.
    pub circuit_breaker_timeout: Duration,
    /// Endpoints probed on each cycle.
    pub endpoints: Vec<EndpointSpec>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            circuit_breaker_timeout: Duration::from_secs(60),
            endpoints: vec![
                EndpointSpec::new("health", "/health", true),
                EndpointSpec::new("api-health", "/api/health", true),
                EndpointSpec::new("api-keys", "/api/settings/api-keys", false),
            ],
        }
    }
}

/// Aggregate status across all probed endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// No cycle has completed yet.
    #[default]
    Unknown,
    /// At least 80% of endpoints are healthy and every critical endpoint is up.
    Healthy,
    /// Partially available.
    Degraded,
    /// Less than half of the endpoints are healthy.
    Unhealthy,
    /// Every critical endpoint is failing.
    Down,
}

impl OverallHealth {
    /// Cycles classified as failing count towards opening the breaker.
    #[must_use]
    pub const fn is_failing(self) -> bool {
        matches!(self, Self::Unhealthy | Self::Down)
    }

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Down => "down",
        }
    }
}

/// Outcome of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResult {
    /// Whether the endpoint answered with a success status in time.
    pub healthy: bool,
    /// Copied from the endpoint spec.
    pub critical: bool,
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Round-trip time in milliseconds.
    pub latency_ms: u64,
    /// Failure description for unhealthy results.
    pub error: Option<String>,
    /// When the probe finished.
    pub checked_at: DateTime<Utc>,
}

impl EndpointResult {
    /// A healthy probe result.
    #[must_use]
    pub fn healthy(critical: bool, status_code: Option<u16>, latency_ms: u64) -> Self {
        Self {
            healthy: true,
            critical,
            status_code,
            latency_ms,
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// A failed probe result.
    pub fn failed(
        critical: bool,
        status_code: Option<u16>,
        latency_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            healthy: false,
            critical,
            status_code,
            latency_ms,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Snapshot published after each health cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Aggregate classification.
    pub overall: OverallHealth,
    /// Latest probe result per endpoint name.
    pub endpoints: BTreeMap<String, EndpointResult>,
    /// Completion time of the last cycle that actually probed.
    pub last_check: Option<DateTime<Utc>>,
    /// Failing cycles in a row.
    pub consecutive_failures: u32,
    /// Whether probing is currently suppressed.
    pub circuit_breaker_open: bool,
}

/// Degradation mode recommended for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Operate normally.
    None,
    /// Disable non-essential features.
    GracefulDegradation,
    /// Prefer locally cached data.
    LocalCache,
    /// Operate without the backend.
    OfflineMode,
}

impl From<OverallHealth> for FallbackStrategy {
    fn from(h: OverallHealth) -> Self {
        match h {
            OverallHealth::Healthy | OverallHealth::Unknown => Self::None,
            OverallHealth::Degraded => Self::GracefulDegradation,
            OverallHealth::Unhealthy => Self::LocalCache,
            OverallHealth::Down => Self::OfflineMode,
        }
    }
}

//! Provider identities, quota rules and the limit manager configuration.

use core::fmt;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RequestType;

/// Identifier of an upstream data provider (e.g. `"alpaca"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Construct a provider id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Budget of calls for one request type within a reset interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRule {
    /// Maximum number of calls per interval.
    pub limit: u64,
    /// Length of the accounting window.
    pub reset_interval: Duration,
}

impl QuotaRule {
    /// Convenience: `limit` calls per minute.
    #[must_use]
    pub const fn per_minute(limit: u64) -> Self {
        Self {
            limit,
            reset_interval: Duration::from_secs(60),
        }
    }

    /// Convenience: `limit` calls per day.
    #[must_use]
    pub const fn per_day(limit: u64) -> Self {
        Self {
            limit,
            reset_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Short-term throughput limits for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Maximum calls within any sliding one-second window.
    pub per_second: u32,
    /// Maximum calls in flight at the same time.
    pub max_concurrent: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_second: 10,
            max_concurrent: 5,
        }
    }
}

/// Static description of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub id: ProviderId,
    /// Preference order; `1` is the primary provider.
    pub priority: u32,
    /// Disabled providers are never ranked or called.
    pub enabled: bool,
    /// Quota budgets per request type. Request types without a rule are unsupported.
    pub quotas: BTreeMap<RequestType, QuotaRule>,
    /// Throughput limits.
    pub rate_limits: RateLimits,
    /// Share of each quota withheld from `Standard`/`Low` priority traffic, in `[0, 1]`.
    pub reserved_fraction: f64,
}

impl ProviderConfig {
    /// Create an enabled provider with no quotas and default rate limits.
    pub fn new(id: impl Into<ProviderId>, priority: u32) -> Self {
        Self {
            id: id.into(),
            priority,
            enabled: true,
            quotas: BTreeMap::new(),
            rate_limits: RateLimits::default(),
            reserved_fraction: 0.1,
        }
    }

    /// Builder-style: add or replace the quota for a request type.
    #[must_use]
    pub fn with_quota(mut self, request_type: RequestType, rule: QuotaRule) -> Self {
        self.quotas.insert(request_type, rule);
        self
    }

    /// Builder-style: replace the rate limits.
    #[must_use]
    pub const fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    /// Builder-style: replace the reserved fraction (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_reserved_fraction(mut self, fraction: f64) -> Self {
        self.reserved_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Builder-style: enable or disable the provider.
    #[must_use]
    pub const fn enabled(mut self, yes: bool) -> Self {
        self.enabled = yes;
        self
    }

    /// Number of calls withheld from non-priority traffic for a given limit.
    #[must_use]
    pub fn reserved_units(&self, limit: u64) -> u64 {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let reserved = (limit as f64 * self.reserved_fraction.clamp(0.0, 1.0)).ceil() as u64;
        reserved.min(limit)
    }
}

/// Configuration of the limit manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Registered providers.
    pub providers: Vec<ProviderConfig>,
    /// Timeout applied to each provider call during failover.
    pub provider_timeout: Duration,
    /// How long request timestamps are kept for rate accounting.
    pub history_retention: Duration,
    /// How often quota windows are checked for reset.
    pub reset_check_interval: Duration,
    /// How often request history is pruned.
    pub prune_interval: Duration,
    /// Usage rate that raises a warning threshold event.
    pub warning_threshold: f64,
    /// Usage rate that raises a critical threshold event.
    pub critical_threshold: f64,
    /// Score bonus for the primary provider on `Critical` requests (scaled by rank).
    pub critical_bonus: f64,
    /// Score bonus for the primary provider on `High` requests (scaled by rank).
    pub high_bonus: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            provider_timeout: Duration::from_secs(10),
            history_retention: Duration::from_secs(5 * 60),
            reset_check_interval: Duration::from_secs(60),
            prune_interval: Duration::from_secs(60 * 60),
            warning_threshold: 0.7,
            critical_threshold: 0.9,
            critical_bonus: 20.0,
            high_bonus: 10.0,
        }
    }
}

/// The three market-data providers configured out of the box.
#[must_use]
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("alpaca", 1)
            .with_quota(RequestType::Quote, QuotaRule::per_minute(200))
            .with_quota(RequestType::History, QuotaRule::per_minute(200))
            .with_quota(RequestType::News, QuotaRule::per_minute(200))
            .with_quota(RequestType::Screener, QuotaRule::per_minute(100))
            .with_rate_limits(RateLimits {
                per_second: 10,
                max_concurrent: 5,
            }),
        ProviderConfig::new("polygon", 2)
            .with_quota(RequestType::Quote, QuotaRule::per_minute(300))
            .with_quota(RequestType::History, QuotaRule::per_minute(300))
            .with_quota(RequestType::Fundamentals, QuotaRule::per_minute(300))
            .with_quota(RequestType::Reference, QuotaRule::per_minute(300))
            .with_rate_limits(RateLimits {
                per_second: 5,
                max_concurrent: 3,
            }),
        ProviderConfig::new("finnhub", 3)
            .with_quota(RequestType::Quote, QuotaRule::per_minute(60))
            .with_quota(RequestType::Fundamentals, QuotaRule::per_minute(60))
            .with_quota(RequestType::News, QuotaRule::per_minute(60))
            .with_quota(RequestType::Search, QuotaRule::per_minute(60))
            .with_rate_limits(RateLimits {
                per_second: 30,
                max_concurrent: 5,
            }),
    ]
}

/// Snapshot of a quota budget at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaState {
    /// Configured maximum units per window.
    pub limit: u64,
    /// Units consumed in the current window (may exceed `limit`).
    pub used: u64,
    /// Remaining units available in the current window.
    pub remaining: u64,
    /// Time remaining until the current window resets.
    pub reset_in: Duration,
}

/// Serializable usage report for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderUsage {
    /// Provider identifier.
    pub provider: ProviderId,
    /// Whether the provider is enabled.
    pub enabled: bool,
    /// Configured priority (1 = primary).
    pub priority: u32,
    /// Current health score in `[0, 100]`.
    pub health_score: u8,
    /// Calls in flight.
    pub active_requests: u32,
    /// Calls recorded within the last second.
    pub requests_last_second: u32,
    /// Calls kept in the rolling history.
    pub requests_in_history: usize,
    /// Quota snapshots per request type.
    pub quotas: BTreeMap<RequestType, QuotaState>,
}

//! Provider quota, rate and concurrency tracking with ranked failover.
//!
//! [`ApiLimitManager`] keeps, per provider, one quota window per supported
//! request type, a rolling history of call timestamps, the number of calls in
//! flight and a health score. Admission is decided by three gates in order:
//! quota (with a reserve kept for `High`/`Critical` traffic), a sliding
//! one-second rate window, and the concurrency ceiling.

mod quota;
mod rate;
mod score;
mod symbols;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use mercato_core::{EventBus, PeriodicTask, TaskHandle};
use mercato_types::{
    LimitEvent, LimitsConfig, MercatoError, ProviderConfig, ProviderId, ProviderUsage,
    RequestPriority, RequestType,
};
use tokio::sync::broadcast;
use tokio::time::Instant;

use self::quota::QuotaWindow;
use self::rate::{RATE_WINDOW, RequestHistory, headroom};
pub use self::score::{ScoreInput, priority_rank, provider_score};
pub use self::symbols::SymbolPriorities;

const HEALTH_MAX: u8 = 100;
const HEALTH_SUCCESS_STEP: u8 = 1;
const HEALTH_FAILURE_STEP: u8 = 5;

/// Why a provider was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DenyReason {
    /// The provider id is not registered.
    UnknownProvider,
    /// The provider is disabled.
    ProviderDisabled,
    /// The provider has no quota rule for the request type.
    UnsupportedRequestType,
    /// Quota window exhausted for this priority.
    QuotaExceeded {
        /// Units used in the current window.
        used: u64,
        /// Units available to this priority.
        ceiling: u64,
        /// Time until the window resets.
        reset_in: Duration,
    },
    /// Too many calls in the last second.
    RateLimitExceeded {
        /// Configured per-second budget.
        per_second: u32,
    },
    /// Too many calls in flight.
    ConcurrencyLimit {
        /// Configured concurrency ceiling.
        max_concurrent: u32,
    },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownProvider => "Unknown provider",
            Self::ProviderDisabled => "Provider disabled",
            Self::UnsupportedRequestType => "Request type not supported",
            Self::QuotaExceeded { .. } => "Quota exceeded",
            Self::RateLimitExceeded { .. } => "Rate limit exceeded",
            Self::ConcurrencyLimit { .. } => "Concurrent request limit reached",
        })
    }
}

impl From<DenyReason> for MercatoError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::QuotaExceeded {
                used,
                ceiling,
                reset_in,
            } => Self::QuotaExceeded {
                remaining: ceiling.saturating_sub(used),
                reset_in_ms: u64::try_from(reset_in.as_millis()).unwrap_or(u64::MAX),
            },
            DenyReason::RateLimitExceeded { per_second } => Self::RateLimitExceeded {
                limit: u64::from(per_second),
                window_ms: 1000,
            },
            other => Self::InvalidArg(other.to_string()),
        }
    }
}

/// Outcome of an admission check. Denials are values, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Allowed,
    /// The call must not be sent to this provider now.
    Denied(DenyReason),
}

impl Admission {
    /// Whether the call may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Denial reason, if denied.
    #[must_use]
    pub const fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allowed => None,
            Self::Denied(r) => Some(*r),
        }
    }
}

struct ProviderState {
    cfg: ProviderConfig,
    windows: BTreeMap<RequestType, QuotaWindow>,
    history: RequestHistory,
    active: u32,
    health: u8,
}

impl ProviderState {
    fn new(cfg: ProviderConfig, now: Instant) -> Self {
        let windows = cfg
            .quotas
            .iter()
            .map(|(rt, rule)| (*rt, QuotaWindow::new(*rule, now)))
            .collect();
        Self {
            cfg,
            windows,
            history: RequestHistory::default(),
            active: 0,
            health: HEALTH_MAX,
        }
    }

    fn admission(
        &self,
        request_type: RequestType,
        priority: RequestPriority,
        now: Instant,
    ) -> Admission {
        if !self.cfg.enabled {
            return Admission::Denied(DenyReason::ProviderDisabled);
        }
        let Some(window) = self.windows.get(&request_type) else {
            return Admission::Denied(DenyReason::UnsupportedRequestType);
        };
        let reserved = self.cfg.reserved_units(window.limit());
        if !window.admits(priority, reserved) {
            let ceiling = if priority.may_use_reserve() {
                window.limit()
            } else {
                window.limit().saturating_sub(reserved)
            };
            return Admission::Denied(DenyReason::QuotaExceeded {
                used: window.used(),
                ceiling,
                reset_in: window.reset_in(now),
            });
        }
        let per_second = self.cfg.rate_limits.per_second;
        if self.history.count_within(now, RATE_WINDOW) >= per_second as usize {
            return Admission::Denied(DenyReason::RateLimitExceeded { per_second });
        }
        let max_concurrent = self.cfg.rate_limits.max_concurrent;
        if self.active >= max_concurrent {
            return Admission::Denied(DenyReason::ConcurrencyLimit { max_concurrent });
        }
        Admission::Allowed
    }
}

struct LimitState {
    providers: Vec<ProviderState>,
    symbols: SymbolPriorities,
}

impl LimitState {
    fn provider(&self, id: &ProviderId) -> Option<&ProviderState> {
        self.providers.iter().find(|p| &p.cfg.id == id)
    }

    fn provider_mut(&mut self, id: &ProviderId) -> Option<&mut ProviderState> {
        self.providers.iter_mut().find(|p| &p.cfg.id == id)
    }
}

/// Decrements the provider's in-flight count on drop.
struct ActiveSlot<'a> {
    state: &'a Mutex<LimitState>,
    provider: ProviderId,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        let mut st = self.state.lock().expect("mutex poisoned");
        if let Some(p) = st.provider_mut(&self.provider) {
            p.active = p.active.saturating_sub(1);
        }
    }
}

/// Tracks provider budgets and routes requests to the best available provider.
pub struct ApiLimitManager {
    cfg: LimitsConfig,
    state: Mutex<LimitState>,
    events: EventBus<LimitEvent>,
}

impl Default for ApiLimitManager {
    fn default() -> Self {
        Self::new(LimitsConfig::default())
    }
}

impl ApiLimitManager {
    /// Build a manager for the configured providers.
    #[must_use]
    pub fn new(cfg: LimitsConfig) -> Self {
        let now = Instant::now();
        let providers = cfg
            .providers
            .iter()
            .cloned()
            .map(|p| ProviderState::new(p, now))
            .collect();
        Self {
            cfg,
            state: Mutex::new(LimitState {
                providers,
                symbols: SymbolPriorities::new(),
            }),
            events: EventBus::default(),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &LimitsConfig {
        &self.cfg
    }

    /// Subscribe to threshold, reset, failure and exhaustion events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LimitEvent> {
        self.events.subscribe()
    }

    fn publish(&self, events: Vec<LimitEvent>) {
        for event in events {
            #[cfg(feature = "tracing")]
            tracing::debug!(?event, "limit event");
            self.events.publish(event);
        }
    }

    /// Evaluate the quota, rate and concurrency gates for one provider.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn can_make_request(
        &self,
        provider: &ProviderId,
        request_type: RequestType,
        priority: RequestPriority,
    ) -> Admission {
        let now = Instant::now();
        let st = self.state.lock().expect("mutex poisoned");
        st.provider(provider).map_or(
            Admission::Denied(DenyReason::UnknownProvider),
            |p| p.admission(request_type, priority, now),
        )
    }

    /// Account for a completed call.
    ///
    /// Usage is counted on success and failure alike. The health score moves
    /// by +1 on success (capped at 100) and -5 on failure (floored at 0).
    /// Unknown providers are ignored.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn record_request(&self, provider: &ProviderId, request_type: RequestType, success: bool) {
        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut st = self.state.lock().expect("mutex poisoned");
            let Some(p) = st.provider_mut(provider) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(%provider, "record_request for unknown provider");
                return;
            };
            if let Some(window) = p.windows.get_mut(&request_type)
                && let Some(level) =
                    window.consume(self.cfg.warning_threshold, self.cfg.critical_threshold)
            {
                events.push(LimitEvent::QuotaThreshold {
                    provider: provider.clone(),
                    request_type,
                    level,
                    usage_rate: window.usage_rate(),
                });
            }
            p.history.push(now);
            if success {
                p.health = p.health.saturating_add(HEALTH_SUCCESS_STEP).min(HEALTH_MAX);
            } else {
                p.health = p.health.saturating_sub(HEALTH_FAILURE_STEP);
                events.push(LimitEvent::RequestFailed {
                    provider: provider.clone(),
                    request_type,
                    health_score: p.health,
                });
            }
        }
        self.publish(events);
    }

    /// Current health score of a provider.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn health_score(&self, provider: &ProviderId) -> Option<u8> {
        let st = self.state.lock().expect("mutex poisoned");
        st.provider(provider).map(|p| p.health)
    }

    /// Scores of every admitted provider, best first.
    ///
    /// Ties break by configured priority, then by id.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn ranked_providers(
        &self,
        request_type: RequestType,
        priority: RequestPriority,
    ) -> Vec<(ProviderId, f64)> {
        let now = Instant::now();
        let st = self.state.lock().expect("mutex poisoned");
        let n = st.providers.len();
        let mut scored: Vec<(f64, u32, ProviderId)> = st
            .providers
            .iter()
            .filter(|p| p.admission(request_type, priority, now).is_allowed())
            .map(|p| {
                let usage_rate = p
                    .windows
                    .get(&request_type)
                    .map_or(1.0, QuotaWindow::usage_rate);
                let input = ScoreInput {
                    health: p.health,
                    priority: p.cfg.priority,
                    provider_count: n,
                    usage_rate,
                    rate_headroom: headroom(
                        p.history.count_within(now, RATE_WINDOW),
                        p.cfg.rate_limits.per_second,
                    ),
                    request_priority: priority,
                };
                (provider_score(&input, &self.cfg), p.cfg.priority, p.cfg.id.clone())
            })
            .collect();
        drop(st);
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        scored.into_iter().map(|(s, _, id)| (id, s)).collect()
    }

    /// Admitted providers for a request, best first.
    #[must_use]
    pub fn optimal_provider_list(
        &self,
        request_type: RequestType,
        priority: RequestPriority,
    ) -> Vec<ProviderId> {
        self.ranked_providers(request_type, priority)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Best admitted provider for a request.
    #[must_use]
    pub fn optimal_provider(
        &self,
        request_type: RequestType,
        priority: RequestPriority,
    ) -> Option<ProviderId> {
        self.ranked_providers(request_type, priority)
            .into_iter()
            .next()
            .map(|(id, _)| id)
    }

    /// Re-check admission and take a concurrency slot atomically.
    fn acquire(
        &self,
        provider: &ProviderId,
        request_type: RequestType,
        priority: RequestPriority,
    ) -> Result<ActiveSlot<'_>, DenyReason> {
        let now = Instant::now();
        let mut st = self.state.lock().expect("mutex poisoned");
        let p = st
            .provider_mut(provider)
            .ok_or(DenyReason::UnknownProvider)?;
        if let Admission::Denied(reason) = p.admission(request_type, priority, now) {
            return Err(reason);
        }
        p.active += 1;
        Ok(ActiveSlot {
            state: &self.state,
            provider: provider.clone(),
        })
    }

    fn denial_reasons(&self, request_type: RequestType, priority: RequestPriority) -> Vec<String> {
        let now = Instant::now();
        let st = self.state.lock().expect("mutex poisoned");
        st.providers
            .iter()
            .filter_map(|p| {
                p.admission(request_type, priority, now)
                    .reason()
                    .map(|r| format!("{}: {r}", p.cfg.id))
            })
            .collect()
    }

    /// Call providers in ranked order until one succeeds.
    ///
    /// Each attempt re-checks admission, holds a concurrency slot for the
    /// duration of the call and is bounded by `provider_timeout`. The outcome
    /// is recorded before moving to the next provider. When `priority` is
    /// `None` the symbol's bucket is used (`Standard` without a symbol).
    ///
    /// # Errors
    /// - `NoEligibleProvider` when no provider admits the request.
    /// - `AllProvidersTimedOut` when every attempted provider timed out.
    /// - `AllProvidersFailed` otherwise, carrying each provider's error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "mercato::limits::make_optimal_request",
            skip(self, request_fn, request_type, symbol),
            fields(request_type = %request_type, symbol = symbol.unwrap_or("")),
        )
    )]
    pub async fn make_optimal_request<T, F, Fut>(
        &self,
        request_type: RequestType,
        symbol: Option<&str>,
        request_fn: F,
        priority: Option<RequestPriority>,
    ) -> Result<T, MercatoError>
    where
        F: Fn(ProviderId) -> Fut,
        Fut: Future<Output = Result<T, MercatoError>>,
    {
        let priority = priority.unwrap_or_else(|| {
            symbol.map_or_else(RequestPriority::default, |s| self.symbol_priority(s))
        });
        let ranked = self.optimal_provider_list(request_type, priority);

        let mut errors: Vec<MercatoError> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        for id in ranked {
            let slot = match self.acquire(&id, request_type, priority) {
                Ok(slot) => slot,
                Err(reason) => {
                    skipped.push(format!("{id}: {reason}"));
                    continue;
                }
            };
            let outcome = tokio::time::timeout(self.cfg.provider_timeout, request_fn(id.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(MercatoError::provider_timeout(id.as_str(), request_type.as_str()))
                });
            drop(slot);

            match outcome {
                Ok(value) => {
                    self.record_request(&id, request_type, true);
                    return Ok(value);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(provider = %id, error = %e, "provider call failed; failing over");
                    self.record_request(&id, request_type, false);
                    errors.push(tag_err(&id, e));
                }
            }
        }

        self.publish(vec![LimitEvent::ProvidersExhausted {
            request_type,
            symbol: symbol.map(str::to_string),
        }]);
        if errors.is_empty() {
            if skipped.is_empty() {
                skipped = self.denial_reasons(request_type, priority);
            }
            return Err(MercatoError::NoEligibleProvider {
                request_type: request_type.to_string(),
                reasons: skipped,
            });
        }
        Err(collapse_errors(request_type, errors))
    }

    /// Assign `symbol` to a priority bucket, removing it from any other.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_symbol_priority(&self, symbol: &str, priority: RequestPriority) {
        self.state
            .lock()
            .expect("mutex poisoned")
            .symbols
            .set(symbol, priority);
    }

    /// Bucket of `symbol`; `Standard` when unassigned.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn symbol_priority(&self, symbol: &str) -> RequestPriority {
        self.state.lock().expect("mutex poisoned").symbols.get(symbol)
    }

    /// Symbols explicitly assigned to `priority`, sorted.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn symbols_with_priority(&self, priority: RequestPriority) -> Vec<String> {
        self.state
            .lock()
            .expect("mutex poisoned")
            .symbols
            .symbols_in(priority)
    }

    /// Zero every quota window whose reset interval has elapsed.
    ///
    /// Returns the number of windows reset.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn reset_expired_quotas(&self) -> usize {
        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut st = self.state.lock().expect("mutex poisoned");
            for p in &mut st.providers {
                for (rt, window) in &mut p.windows {
                    if window.is_due(now) {
                        window.reset(now);
                        events.push(LimitEvent::QuotaReset {
                            provider: p.cfg.id.clone(),
                            request_type: *rt,
                        });
                    }
                }
            }
        }
        let count = events.len();
        self.publish(events);
        count
    }

    /// Drop call timestamps older than `history_retention`.
    ///
    /// Returns the number of timestamps removed.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn prune_history(&self) -> usize {
        let now = Instant::now();
        let retention = self.cfg.history_retention;
        let mut st = self.state.lock().expect("mutex poisoned");
        st.providers
            .iter_mut()
            .map(|p| p.history.prune(now, retention))
            .sum()
    }

    /// Spawn the quota-reset and history-prune jobs.
    ///
    /// Both jobs hold a weak reference and stop doing work once the manager is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Vec<TaskHandle> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let reset_weak = weak.clone();
        let reset = PeriodicTask::new("quota-reset", self.cfg.reset_check_interval).spawn(move || {
            let weak = reset_weak.clone();
            async move {
                if let Some(m) = weak.upgrade() {
                    m.reset_expired_quotas();
                }
            }
        });
        let prune = PeriodicTask::new("history-prune", self.cfg.prune_interval).spawn(move || {
            let weak = weak.clone();
            async move {
                if let Some(m) = weak.upgrade() {
                    m.prune_history();
                }
            }
        });
        vec![reset, prune]
    }

    /// Overwrite quota usage with a value reported by the backend.
    ///
    /// # Errors
    /// `InvalidArg` if the provider is unknown or has no quota for `request_type`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_quota_usage(
        &self,
        provider: &ProviderId,
        request_type: RequestType,
        used: u64,
    ) -> Result<(), MercatoError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        let window = st
            .provider_mut(provider)
            .ok_or_else(|| MercatoError::InvalidArg(format!("unknown provider: {provider}")))?
            .windows
            .get_mut(&request_type)
            .ok_or_else(|| {
                MercatoError::InvalidArg(format!("{provider} has no quota for {request_type}"))
            })?;
        window.set_used(used, self.cfg.warning_threshold, self.cfg.critical_threshold);
        Ok(())
    }

    /// Enable or disable a provider.
    ///
    /// # Errors
    /// `InvalidArg` if the provider is unknown.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_provider_enabled(
        &self,
        provider: &ProviderId,
        enabled: bool,
    ) -> Result<(), MercatoError> {
        let mut st = self.state.lock().expect("mutex poisoned");
        let p = st
            .provider_mut(provider)
            .ok_or_else(|| MercatoError::InvalidArg(format!("unknown provider: {provider}")))?;
        p.cfg.enabled = enabled;
        Ok(())
    }

    /// Serializable per-provider usage report, in configuration order.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn usage_snapshot(&self) -> Vec<ProviderUsage> {
        let now = Instant::now();
        let st = self.state.lock().expect("mutex poisoned");
        st.providers
            .iter()
            .map(|p| ProviderUsage {
                provider: p.cfg.id.clone(),
                enabled: p.cfg.enabled,
                priority: p.cfg.priority,
                health_score: p.health,
                active_requests: p.active,
                requests_last_second: u32::try_from(p.history.count_within(now, RATE_WINDOW))
                    .unwrap_or(u32::MAX),
                requests_in_history: p.history.len(),
                quotas: p.windows.iter().map(|(rt, w)| (*rt, w.state(now))).collect(),
            })
            .collect()
    }
}

/// Attach the provider id to errors that do not already carry one.
fn tag_err(provider: &ProviderId, e: MercatoError) -> MercatoError {
    match e {
        e @ (MercatoError::Provider { .. }
        | MercatoError::ProviderTimeout { .. }
        | MercatoError::AllProvidersFailed(_)
        | MercatoError::AllProvidersTimedOut { .. }) => e,
        other => MercatoError::provider(provider.as_str(), other.to_string()),
    }
}

/// Fold per-provider errors into one outcome.
///
/// All timeouts become `AllProvidersTimedOut`; anything else becomes
/// `AllProvidersFailed` with the individual errors.
fn collapse_errors(request_type: RequestType, errors: Vec<MercatoError>) -> MercatoError {
    if !errors.is_empty()
        && errors
            .iter()
            .all(|e| matches!(e, MercatoError::ProviderTimeout { .. }))
    {
        return MercatoError::AllProvidersTimedOut {
            request_type: request_type.to_string(),
        };
    }
    MercatoError::AllProvidersFailed(errors)
}

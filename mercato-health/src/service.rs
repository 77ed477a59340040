//! Periodic multi-endpoint health checks behind a circuit breaker.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mercato_core::{HealthProbe, PeriodicTask, TaskHandle};
use mercato_types::{
    EndpointResult, EndpointSpec, FallbackStrategy, HealthConfig, HealthStatus, MercatoError,
    OverallHealth,
};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::CircuitBreaker;

/// Share of healthy endpoints at or above which a cycle is `Healthy`.
pub const HEALTHY_RATIO: f64 = 0.8;
/// Share of healthy endpoints at or above which a cycle is `Degraded`.
pub const DEGRADED_RATIO: f64 = 0.5;

/// Handle returned by [`ApiHealthService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&HealthStatus) + Send + Sync>;

/// Classify one cycle of endpoint results.
///
/// - no results: `Unknown`
/// - critical endpoints exist and none is healthy: `Down`
/// - some but not all critical endpoints healthy: `Degraded`
/// - otherwise by healthy ratio: `>= 0.8` `Healthy`, `>= 0.5` `Degraded`, else `Unhealthy`
#[must_use]
pub fn determine_overall_health(results: &BTreeMap<String, EndpointResult>) -> OverallHealth {
    if results.is_empty() {
        return OverallHealth::Unknown;
    }
    let critical_total = results.values().filter(|r| r.critical).count();
    let critical_healthy = results
        .values()
        .filter(|r| r.critical && r.healthy)
        .count();
    if critical_total > 0 && critical_healthy == 0 {
        return OverallHealth::Down;
    }
    if critical_healthy < critical_total {
        return OverallHealth::Degraded;
    }

    let healthy = results.values().filter(|r| r.healthy).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = healthy as f64 / results.len() as f64;
    if ratio >= HEALTHY_RATIO {
        OverallHealth::Healthy
    } else if ratio >= DEGRADED_RATIO {
        OverallHealth::Degraded
    } else {
        OverallHealth::Unhealthy
    }
}

struct Inner {
    status: HealthStatus,
    breaker: CircuitBreaker,
}

/// Backend health monitor.
///
/// Probes every configured endpoint concurrently on each cycle, classifies
/// the cycle, drives the [`CircuitBreaker`] and notifies subscribers.
pub struct ApiHealthService {
    cfg: HealthConfig,
    probe: Arc<dyn HealthProbe>,
    inner: Mutex<Inner>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
    watch_tx: watch::Sender<HealthStatus>,
}

impl ApiHealthService {
    /// Build a service that checks `cfg.endpoints` through `probe`.
    #[must_use]
    pub fn new(cfg: HealthConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let breaker = CircuitBreaker::new(cfg.failure_threshold, cfg.circuit_breaker_timeout);
        let (watch_tx, _) = watch::channel(HealthStatus::default());
        Self {
            cfg,
            probe,
            inner: Mutex::new(Inner {
                status: HealthStatus::default(),
                breaker,
            }),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            watch_tx,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HealthConfig {
        &self.cfg
    }

    /// Run one health cycle and return the resulting status.
    ///
    /// While the breaker is open and `circuit_breaker_timeout` has not passed
    /// since the last probing cycle, nothing is probed and the current status
    /// is returned unchanged.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "mercato::health::check_health", skip(self))
    )]
    pub async fn check_health(&self) -> HealthStatus {
        {
            let inner = self.inner.lock().expect("mutex poisoned");
            if inner.breaker.should_skip(Instant::now()) {
                #[cfg(feature = "tracing")]
                tracing::debug!("circuit breaker open; skipping health check");
                return inner.status.clone();
            }
        }

        let probes = self.cfg.endpoints.iter().map(|ep| self.probe_one(ep));
        let results: BTreeMap<String, EndpointResult> = futures::future::join_all(probes)
            .await
            .into_iter()
            .collect();
        let overall = determine_overall_health(&results);

        let status = {
            let mut inner = self.inner.lock().expect("mutex poisoned");
            inner.breaker.record_cycle(overall, Instant::now());
            inner.status = HealthStatus {
                overall,
                endpoints: results,
                last_check: Some(chrono::Utc::now()),
                consecutive_failures: inner.breaker.consecutive_failures(),
                circuit_breaker_open: inner.breaker.is_open(),
            };
            inner.status.clone()
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(overall = overall.as_str(), failures = status.consecutive_failures, "health cycle complete");
        self.notify(&status);
        status
    }

    async fn probe_one(&self, ep: &EndpointSpec) -> (String, EndpointResult) {
        let started = Instant::now();
        let result = tokio::time::timeout(self.cfg.probe_timeout, self.probe.probe(ep))
            .await
            .unwrap_or_else(|_| {
                let waited = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                EndpointResult::failed(
                    ep.critical,
                    None,
                    waited,
                    format!("timed out after {waited}ms"),
                )
            });
        #[cfg(feature = "tracing")]
        if !result.healthy {
            tracing::warn!(endpoint = %ep.name, error = ?result.error, "endpoint unhealthy");
        }
        (ep.name.clone(), result)
    }

    fn notify(&self, status: &HealthStatus) {
        self.watch_tx.send_replace(status.clone());
        let callbacks: Vec<(SubscriptionId, Callback)> =
            self.subscribers.lock().expect("mutex poisoned").clone();
        for (id, cb) in callbacks {
            Self::deliver(id, &cb, status);
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn deliver(id: SubscriptionId, cb: &Callback, status: &HealthStatus) {
        if catch_unwind(AssertUnwindSafe(|| cb(status))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(subscription = id.0, "health subscriber panicked");
        }
    }

    /// Register a callback; it receives the current status immediately and
    /// after every probing cycle. Panics inside callbacks are caught.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&HealthStatus) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cb: Callback = Arc::new(callback);
        self.subscribers
            .lock()
            .expect("mutex poisoned")
            .push((id, Arc::clone(&cb)));
        Self::deliver(id, &cb, &self.status());
        id
    }

    /// Remove a callback; returns whether it was registered.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock().expect("mutex poisoned");
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Receiver that always holds the latest status.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<HealthStatus> {
        self.watch_tx.subscribe()
    }

    /// Snapshot of the current status.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.inner.lock().expect("mutex poisoned").status.clone()
    }

    /// Recommended degradation mode for the current status.
    #[must_use]
    pub fn fallback_strategy(&self) -> FallbackStrategy {
        FallbackStrategy::from(self.status().overall)
    }

    /// Whether requests should be sent to the backend right now.
    ///
    /// False while the breaker is open or the last cycle was `Down`.
    #[must_use]
    pub fn is_api_available(&self) -> bool {
        let status = self.status();
        !status.circuit_breaker_open && status.overall != OverallHealth::Down
    }

    /// `Ok` when the backend may be called.
    ///
    /// # Errors
    /// `CircuitOpen` while the breaker is open, with the time until the next probe.
    ///
    /// # Panics
    /// Panics if an internal mutex is poisoned.
    pub fn ensure_available(&self) -> Result<(), MercatoError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        if inner.breaker.is_open() {
            let reset_in = inner.breaker.reset_in(Instant::now());
            return Err(MercatoError::CircuitOpen {
                reset_in_ms: u64::try_from(reset_in.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    /// Spawn the periodic health check, running the first cycle immediately.
    ///
    /// The job holds a weak reference and does nothing once the service is dropped.
    pub fn start(self: &Arc<Self>) -> TaskHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::new("health-check", self.cfg.check_interval)
            .run_immediately(true)
            .spawn(move || {
                let weak = weak.clone();
                async move {
                    if let Some(svc) = weak.upgrade() {
                        svc.check_health().await;
                    }
                }
            })
    }
}

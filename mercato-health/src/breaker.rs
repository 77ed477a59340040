use std::time::Duration;

use mercato_types::OverallHealth;
use tokio::time::Instant;

/// Circuit breaker driven by health-check cycles.
///
/// Failing cycles (`Unhealthy`/`Down`) accumulate; once `failure_threshold`
/// is reached the breaker opens. While open, checks are suppressed until
/// `timeout` has passed since the last probing cycle. Any non-failing cycle
/// closes the breaker and clears the counter.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    consecutive_failures: u32,
    open: bool,
    last_check: Option<Instant>,
}

impl CircuitBreaker {
    /// Closed breaker.
    #[must_use]
    pub const fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold,
            timeout,
            consecutive_failures: 0,
            open: false,
            last_check: None,
        }
    }

    /// Whether the breaker is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open
    }

    /// Failing cycles in a row.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a check at `now` must be skipped.
    #[must_use]
    pub fn should_skip(&self, now: Instant) -> bool {
        self.open
            && self
                .last_check
                .is_some_and(|at| now.saturating_duration_since(at) < self.timeout)
    }

    /// Time until the next check may probe; zero when closed or expired.
    #[must_use]
    pub fn reset_in(&self, now: Instant) -> Duration {
        match (self.open, self.last_check) {
            (true, Some(at)) => self
                .timeout
                .saturating_sub(now.saturating_duration_since(at)),
            _ => Duration::ZERO,
        }
    }

    /// Fold the outcome of a probing cycle into the breaker.
    pub fn record_cycle(&mut self, overall: OverallHealth, now: Instant) {
        self.last_check = Some(now);
        if overall.is_failing() {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            if self.consecutive_failures >= self.failure_threshold.max(1) && !self.open {
                self.open = true;
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    failures = self.consecutive_failures,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "circuit breaker opened"
                );
            }
        } else {
            #[cfg(feature = "tracing")]
            if self.open {
                tracing::info!("circuit breaker closed");
            }
            self.consecutive_failures = 0;
            self.open = false;
        }
    }
}

//! Per-provider, per-request-type quota windows.

use std::time::Duration;

use mercato_types::{QuotaRule, QuotaState, RequestPriority, ThresholdLevel};
use tokio::time::Instant;

/// Usage counter for one quota rule within the current window.
#[derive(Debug, Clone)]
pub(crate) struct QuotaWindow {
    limit: u64,
    used: u64,
    window_start: Instant,
    reset_interval: Duration,
    warned: bool,
    critical: bool,
}

impl QuotaWindow {
    pub(crate) fn new(rule: QuotaRule, now: Instant) -> Self {
        Self {
            limit: rule.limit,
            used: 0,
            window_start: now,
            reset_interval: rule.reset_interval.max(Duration::from_millis(1)),
            warned: false,
            critical: false,
        }
    }

    pub(crate) const fn limit(&self) -> u64 {
        self.limit
    }

    pub(crate) const fn used(&self) -> u64 {
        self.used
    }

    /// `used / limit`; a zero limit counts as fully used.
    pub(crate) fn usage_rate(&self) -> f64 {
        if self.limit == 0 {
            return 1.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.used as f64 / self.limit as f64;
        rate
    }

    /// Whether a call of `priority` fits, given `reserved` units withheld from
    /// priorities that may not touch the reserve.
    pub(crate) const fn admits(&self, priority: RequestPriority, reserved: u64) -> bool {
        let ceiling = if priority.may_use_reserve() {
            self.limit
        } else {
            self.limit.saturating_sub(reserved)
        };
        self.used < ceiling
    }

    /// Count one call and report a newly crossed threshold, if any.
    ///
    /// Each level fires at most once per window. When a single step crosses
    /// both, only `Critical` is reported.
    pub(crate) fn consume(&mut self, warning: f64, critical: f64) -> Option<ThresholdLevel> {
        self.used = self.used.saturating_add(1);
        let rate = self.usage_rate();
        if rate >= critical && !self.critical {
            self.critical = true;
            self.warned = true;
            return Some(ThresholdLevel::Critical);
        }
        if rate >= warning && !self.warned {
            self.warned = true;
            return Some(ThresholdLevel::Warning);
        }
        None
    }

    /// Overwrite usage with an externally reported value.
    ///
    /// Threshold flags follow the new usage so later crossings still fire.
    pub(crate) fn set_used(&mut self, used: u64, warning: f64, critical: f64) {
        self.used = used;
        let rate = self.usage_rate();
        self.warned = rate >= warning;
        self.critical = rate >= critical;
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.reset_interval
    }

    /// Zero usage and advance the window start to the latest boundary.
    pub(crate) fn reset(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        let windows_passed = elapsed.as_nanos() / self.reset_interval.as_nanos();
        let boundary_offset = Duration::from_nanos(
            (windows_passed * self.reset_interval.as_nanos())
                .try_into()
                .unwrap_or(u64::MAX),
        );
        self.window_start += boundary_offset;
        self.used = 0;
        self.warned = false;
        self.critical = false;
    }

    pub(crate) fn reset_in(&self, now: Instant) -> Duration {
        self.reset_interval
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    pub(crate) fn state(&self, now: Instant) -> QuotaState {
        QuotaState {
            limit: self.limit,
            used: self.used,
            remaining: self.limit.saturating_sub(self.used),
            reset_in: self.reset_in(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(limit: u64) -> QuotaWindow {
        QuotaWindow::new(QuotaRule::per_minute(limit), Instant::now())
    }

    #[test]
    fn thresholds_fire_once_per_window() {
        let mut w = window(10);
        let fired: Vec<_> = (0..10).filter_map(|_| w.consume(0.7, 0.9)).collect();
        assert_eq!(fired, [ThresholdLevel::Warning, ThresholdLevel::Critical]);
        assert_eq!(w.consume(0.7, 0.9), None);

        w.reset(Instant::now() + Duration::from_secs(61));
        assert_eq!(w.used(), 0);
        let again: Vec<_> = (0..10).filter_map(|_| w.consume(0.7, 0.9)).collect();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn reserve_only_for_priority_traffic() {
        let mut w = window(10);
        for _ in 0..9 {
            w.consume(0.7, 0.9);
        }
        assert!(!w.admits(RequestPriority::Standard, 1));
        assert!(!w.admits(RequestPriority::Low, 1));
        assert!(w.admits(RequestPriority::High, 1));
        assert!(w.admits(RequestPriority::Critical, 1));
        w.consume(0.7, 0.9);
        assert!(!w.admits(RequestPriority::Critical, 1));
    }

    #[test]
    fn reset_aligns_to_boundary() {
        let start = Instant::now();
        let mut w = QuotaWindow::new(QuotaRule::per_minute(5), start);
        w.reset(start + Duration::from_secs(150));
        assert_eq!(w.reset_in(start + Duration::from_secs(150)), Duration::from_secs(30));
    }

    #[test]
    fn zero_limit_is_always_exhausted() {
        let w = window(0);
        assert!(!w.admits(RequestPriority::Critical, 0));
        assert!((w.usage_rate() - 1.0).abs() < f64::EPSILON);
    }
}

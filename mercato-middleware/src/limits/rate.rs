//! Rolling request history used for the one-second rate gate.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Window used by the rate gate.
pub(crate) const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Timestamps of recorded calls, oldest first.
#[derive(Debug, Default, Clone)]
pub(crate) struct RequestHistory {
    stamps: VecDeque<Instant>,
}

impl RequestHistory {
    pub(crate) fn push(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }

    /// Calls recorded within `window` before `now`.
    pub(crate) fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.stamps
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) < window)
            .count()
    }

    /// Drop timestamps older than `retention`; returns how many were removed.
    pub(crate) fn prune(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.stamps.len();
        while self
            .stamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) > retention)
        {
            self.stamps.pop_front();
        }
        before - self.stamps.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.stamps.len()
    }
}

/// Fraction of the per-second budget still unused, in `[0, 1]`.
pub(crate) fn headroom(recent: usize, per_second: u32) -> f64 {
    if per_second == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let used = recent as f64 / f64::from(per_second);
    (1.0 - used).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_counts_recent_only() {
        let start = Instant::now();
        let mut h = RequestHistory::default();
        h.push(start);
        h.push(start + Duration::from_millis(400));
        h.push(start + Duration::from_millis(900));

        assert_eq!(h.count_within(start + Duration::from_millis(950), RATE_WINDOW), 3);
        assert_eq!(h.count_within(start + Duration::from_millis(1200), RATE_WINDOW), 2);
        assert_eq!(h.count_within(start + Duration::from_secs(3), RATE_WINDOW), 0);
    }

    #[test]
    fn prune_keeps_retained_entries() {
        let start = Instant::now();
        let mut h = RequestHistory::default();
        h.push(start);
        h.push(start + Duration::from_secs(200));
        assert_eq!(h.prune(start + Duration::from_secs(301), Duration::from_secs(300)), 1);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn headroom_is_clamped() {
        assert!((headroom(0, 10) - 1.0).abs() < f64::EPSILON);
        assert!((headroom(5, 10) - 0.5).abs() < f64::EPSILON);
        assert!(headroom(20, 10).abs() < f64::EPSILON);
        assert!(headroom(0, 0).abs() < f64::EPSILON);
    }
}

//! Cancellable periodic jobs with overlap protection.
//!
//! Each tick spawns the job on its own task so a slow run never delays the
//! scheduler. A shared in-flight flag makes the scheduler skip ticks that fire
//! while the previous run is still executing.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counters shared between a running task and its handle.
#[derive(Debug, Default)]
struct TaskCounters {
    runs: AtomicU64,
    skipped: AtomicU64,
}

/// Clears the in-flight flag when a run finishes, including on panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Schedule description for a periodic job.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: &'static str,
    period: Duration,
    run_immediately: bool,
    token: Option<CancellationToken>,
}

impl PeriodicTask {
    /// A job named `name` that runs every `period`, first run after one period.
    #[must_use]
    pub const fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            run_immediately: false,
            token: None,
        }
    }

    /// Run once right away instead of waiting for the first period.
    #[must_use]
    pub const fn run_immediately(mut self, yes: bool) -> Self {
        self.run_immediately = yes;
        self
    }

    /// Tie the task to an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Spawn the scheduler on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn<F, Fut>(self, mut job: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.unwrap_or_default();
        let counters = Arc::new(TaskCounters::default());
        let busy = Arc::new(AtomicBool::new(false));
        let period = self.period.max(Duration::from_millis(1));
        let name = self.name;

        let loop_token = token.clone();
        let loop_counters = Arc::clone(&counters);
        let scheduler = tokio::spawn(async move {
            let start = if self.run_immediately {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut current: Option<JoinHandle<()>> = None;

            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = interval.tick() => {
                        if busy.swap(true, Ordering::AcqRel) {
                            loop_counters.skipped.fetch_add(1, Ordering::Relaxed);
                            #[cfg(feature = "tracing")]
                            tracing::debug!(task = name, "previous run still in flight; skipping tick");
                            continue;
                        }
                        loop_counters.runs.fetch_add(1, Ordering::Relaxed);
                        let guard = InFlight(Arc::clone(&busy));
                        let fut = job();
                        current = Some(tokio::spawn(async move {
                            let _guard = guard;
                            fut.await;
                        }));
                    }
                }
            }

            if let Some(run) = current.take() {
                let _ = run.await;
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(task = name, "periodic task stopped");
        });

        TaskHandle {
            name,
            token,
            counters,
            inner: Some(scheduler),
        }
    }
}

/// Handle to a running [`PeriodicTask`].
///
/// Dropping the handle cancels the schedule and aborts the scheduler task.
pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    counters: Arc<TaskCounters>,
    inner: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Name given to the task.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of runs started so far.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.counters.runs.load(Ordering::Relaxed)
    }

    /// Number of ticks skipped because a run was still in flight.
    #[must_use]
    pub fn skipped_ticks(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    /// Whether the scheduler has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request a graceful stop and wait for the in-flight run to complete.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(h) = self.inner.take() {
            let _ = h.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(h) = self.inner.take()
            && !h.is_finished()
        {
            h.abort();
        }
    }
}

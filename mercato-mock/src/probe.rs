use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mercato_core::{EndpointResult, EndpointSpec, HealthProbe};

/// Scripted result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Answer `200` immediately.
    Healthy,
    /// Answer with a non-success status code.
    Status(u16),
    /// Fail without a response (connection refused, DNS, ...).
    Error(String),
    /// Answer `200` after a delay.
    Slow(Duration),
    /// Never answer.
    Hang,
}

#[derive(Default)]
struct ProbeState {
    default: Option<ProbeOutcome>,
    fixed: HashMap<String, ProbeOutcome>,
    scripts: HashMap<String, VecDeque<ProbeOutcome>>,
}

/// Health probe driven entirely by test scripts.
///
/// Resolution order per endpoint: the endpoint's script, then its fixed
/// outcome, then the probe-wide default (`Healthy` unless changed).
#[derive(Default)]
pub struct MockProbe {
    state: Mutex<ProbeState>,
    calls: AtomicU64,
}

impl MockProbe {
    /// Probe that reports every endpoint healthy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe-wide default outcome.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_default(&self, outcome: ProbeOutcome) {
        self.state.lock().expect("mutex poisoned").default = Some(outcome);
    }

    /// Fixed outcome for one endpoint, by name.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_endpoint(&self, name: &str, outcome: ProbeOutcome) {
        self.state
            .lock()
            .expect("mutex poisoned")
            .fixed
            .insert(name.to_string(), outcome);
    }

    /// Queue one-shot outcomes for an endpoint.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn push_script(&self, name: &str, outcomes: impl IntoIterator<Item = ProbeOutcome>) {
        self.state
            .lock()
            .expect("mutex poisoned")
            .scripts
            .entry(name.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Total probes executed.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, name: &str) -> ProbeOutcome {
        let mut st = self.state.lock().expect("mutex poisoned");
        if let Some(next) = st.scripts.get_mut(name).and_then(VecDeque::pop_front) {
            return next;
        }
        st.fixed
            .get(name)
            .or(st.default.as_ref())
            .cloned()
            .unwrap_or(ProbeOutcome::Healthy)
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self, endpoint: &EndpointSpec) -> EndpointResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome(&endpoint.name) {
            ProbeOutcome::Healthy => EndpointResult::healthy(endpoint.critical, Some(200), 1),
            ProbeOutcome::Status(code) => EndpointResult::failed(
                endpoint.critical,
                Some(code),
                1,
                format!("HTTP {code}"),
            ),
            ProbeOutcome::Error(msg) => EndpointResult::failed(endpoint.critical, None, 0, msg),
            ProbeOutcome::Slow(delay) => {
                tokio::time::sleep(delay).await;
                EndpointResult::healthy(
                    endpoint.critical,
                    Some(200),
                    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                )
            }
            ProbeOutcome::Hang => std::future::pending::<EndpointResult>().await,
        }
    }
}

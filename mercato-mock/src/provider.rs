use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use mercato_core::{MercatoError, ProviderId};

/// Instruction for how one provider call behaves.
#[derive(Debug, Clone)]
pub enum MockBehavior<T> {
    /// Return the value immediately.
    Return(T),
    /// Return the value after a delay.
    Delay(Duration, T),
    /// Fail immediately with the error.
    Fail(MercatoError),
    /// Never complete (simulate a timeout).
    Hang,
}

struct ProviderScript<T> {
    default: MockBehavior<T>,
    queue: VecDeque<MockBehavior<T>>,
    calls: u64,
}

/// Scripted upstream providers keyed by [`ProviderId`].
///
/// Unconfigured providers fail with `MercatoError::Provider`.
pub struct MockProvider<T> {
    scripts: Mutex<HashMap<ProviderId, ProviderScript<T>>>,
    order: Mutex<Vec<ProviderId>>,
}

impl<T> Default for MockProvider<T> {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send> MockProvider<T> {
    /// Provider set with nothing configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Behavior used for `provider` whenever its queue is empty.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_behavior(&self, provider: impl Into<ProviderId>, behavior: MockBehavior<T>) {
        let mut scripts = self.scripts.lock().expect("mutex poisoned");
        match scripts.entry(provider.into()) {
            std::collections::hash_map::Entry::Occupied(mut e) => e.get_mut().default = behavior,
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(ProviderScript {
                    default: behavior,
                    queue: VecDeque::new(),
                    calls: 0,
                });
            }
        }
    }

    /// Queue one-shot behaviors for `provider` ahead of its default.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn push_script(
        &self,
        provider: impl Into<ProviderId>,
        behaviors: impl IntoIterator<Item = MockBehavior<T>>,
    ) {
        let id = provider.into();
        let mut scripts = self.scripts.lock().expect("mutex poisoned");
        let script = scripts.entry(id.clone()).or_insert_with(|| ProviderScript {
            default: MockBehavior::Fail(MercatoError::provider(id.as_str(), "no script")),
            queue: VecDeque::new(),
            calls: 0,
        });
        script.queue.extend(behaviors);
    }

    /// Calls made to `provider` so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self, provider: &str) -> u64 {
        self.scripts
            .lock()
            .expect("mutex poisoned")
            .get(&ProviderId::from(provider))
            .map_or(0, |s| s.calls)
    }

    /// Providers in the order they were called.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn call_order(&self) -> Vec<ProviderId> {
        self.order.lock().expect("mutex poisoned").clone()
    }

    /// Execute one scripted call.
    ///
    /// # Errors
    /// Returns the scripted failure, or `Provider` for unconfigured providers.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub async fn call(&self, provider: ProviderId) -> Result<T, MercatoError> {
        self.order
            .lock()
            .expect("mutex poisoned")
            .push(provider.clone());
        let behavior = {
            let mut scripts = self.scripts.lock().expect("mutex poisoned");
            match scripts.get_mut(&provider) {
                Some(s) => {
                    s.calls += 1;
                    s.queue.pop_front().unwrap_or_else(|| s.default.clone())
                }
                None => MockBehavior::Fail(MercatoError::provider(
                    provider.as_str(),
                    "provider not configured",
                )),
            }
        };
        match behavior {
            MockBehavior::Return(v) => Ok(v),
            MockBehavior::Delay(d, v) => {
                tokio::time::sleep(d).await;
                Ok(v)
            }
            MockBehavior::Fail(e) => Err(e),
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

use std::future::Future;
use std::sync::{Arc, Mutex};

use mercato_core::{HealthProbe, MemoryStore, PersistentStore, TaskHandle};
use mercato_health::{ApiHealthService, HttpProbe};
use mercato_middleware::{ApiLimitManager, CacheService};
use mercato_types::{
    CacheConfig, HealthConfig, LimitsConfig, MercatoError, ProviderId, ResolvedConfig,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::request::FetchRequest;

/// Cached JSON payloads keyed by request.
pub type ResponseCache = CacheService<serde_json::Value>;

/// Resilience layer wiring the cache, limit manager and health monitor
/// around one resolved configuration.
///
/// Background jobs are owned by the instance; dropping it cancels them.
pub struct Mercato {
    config: Arc<ResolvedConfig>,
    cache: Arc<ResponseCache>,
    limits: Arc<ApiLimitManager>,
    health: Arc<ApiHealthService>,
    tasks: Mutex<Vec<TaskHandle>>,
}

/// Builder for constructing a [`Mercato`] instance.
pub struct MercatoBuilder {
    config: Option<Arc<ResolvedConfig>>,
    cache: Option<CacheConfig>,
    limits: LimitsConfig,
    health: Option<HealthConfig>,
    store: Option<Arc<dyn PersistentStore>>,
    probe: Option<Arc<dyn HealthProbe>>,
}

impl Default for MercatoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MercatoBuilder {
    /// Create a builder with the safety configuration and default providers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            cache: None,
            limits: LimitsConfig::default(),
            health: None,
            store: None,
            probe: None,
        }
    }

    /// Resolved configuration the services derive their tunables from.
    ///
    /// Usually `ConfigurationService::current()` after `initialize()`.
    #[must_use]
    pub fn config(mut self, cfg: Arc<ResolvedConfig>) -> Self {
        self.config = Some(cfg);
        self
    }

    /// Cache tunables; derived from the resolved configuration when unset.
    #[must_use]
    pub fn cache_config(mut self, cfg: CacheConfig) -> Self {
        self.cache = Some(cfg);
        self
    }

    /// Provider table and limit manager tunables.
    #[must_use]
    pub fn limits(mut self, cfg: LimitsConfig) -> Self {
        self.limits = cfg;
        self
    }

    /// Health monitor tunables; derived from the resolved configuration when unset.
    #[must_use]
    pub fn health_config(mut self, cfg: HealthConfig) -> Self {
        self.health = Some(cfg);
        self
    }

    /// Second-tier store for persisted cache entries.
    ///
    /// Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Probe used by the health monitor.
    ///
    /// Defaults to an HTTP probe against `api.base_url`.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build the services.
    ///
    /// Persisted cache entries are hydrated immediately; background jobs only
    /// run after [`Mercato::start`].
    ///
    /// # Errors
    /// - `InvalidArg` when no provider is registered.
    /// - `Config` when the default HTTP probe cannot use `api.base_url`.
    pub fn build(self) -> Result<Mercato, MercatoError> {
        if self.limits.providers.is_empty() {
            return Err(MercatoError::InvalidArg(
                "no providers configured; add at least one via limits(...)".to_string(),
            ));
        }
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(ResolvedConfig::safety()));

        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(p) => p,
            None => Arc::new(HttpProbe::new(&config.api.base_url)?),
        };
        let health_cfg = self
            .health
            .unwrap_or_else(|| HealthConfig::from(config.as_ref()));
        let cache_cfg = self
            .cache
            .unwrap_or_else(|| CacheConfig::from(config.as_ref()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn PersistentStore>);

        let cache = Arc::new(CacheService::with_store(cache_cfg, store));
        let _loaded = cache.load_persisted();
        #[cfg(feature = "tracing")]
        tracing::debug!(loaded = _loaded, "hydrated persisted cache entries");

        Ok(Mercato {
            cache,
            limits: Arc::new(ApiLimitManager::new(self.limits)),
            health: Arc::new(ApiHealthService::new(health_cfg, probe)),
            config,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

impl Mercato {
    /// Start building a new instance.
    #[must_use]
    pub fn builder() -> MercatoBuilder {
        MercatoBuilder::new()
    }

    /// Configuration the services were built from.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Response cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Provider limit manager.
    #[must_use]
    pub const fn limits(&self) -> &Arc<ApiLimitManager> {
        &self.limits
    }

    /// Backend health monitor.
    #[must_use]
    pub const fn health(&self) -> &Arc<ApiHealthService> {
        &self.health
    }

    /// Whether a feature flag is on in the configuration.
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.config.feature(name)
    }

    /// Spawn the background jobs: cache cleanup, quota reset, history pruning
    /// and health checks. Calling it again while running is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().expect("mutex poisoned");
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.cache.spawn_cleanup());
        tasks.extend(self.limits.spawn_maintenance());
        tasks.push(self.health.start());
        #[cfg(feature = "tracing")]
        tracing::info!(jobs = tasks.len(), "mercato background jobs started");
    }

    /// Stop every background job and wait for them to finish.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub async fn shutdown(&self) {
        let tasks: Vec<TaskHandle> =
            std::mem::take(&mut *self.tasks.lock().expect("mutex poisoned"));
        for task in tasks {
            task.stop().await;
        }
    }

    /// Number of background jobs currently owned.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.tasks.lock().expect("mutex poisoned").len()
    }

    /// Serve `req` from cache, or route it to the best provider and cache the result.
    ///
    /// A cached value is returned even while the backend breaker is open.
    /// On a miss the breaker is consulted first, then `request_fn` is called
    /// with each admitted provider in ranked order until one succeeds.
    ///
    /// # Errors
    /// - `CircuitOpen` on a miss while the breaker is open.
    /// - Any error from `ApiLimitManager::make_optimal_request`.
    /// - `Serialization` if the value does not round-trip through JSON.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "mercato::fetch",
            skip(self, req, request_fn),
            fields(request_type = %req.request_type, key = %req.cache_key()),
        )
    )]
    pub async fn fetch<T, F, Fut>(&self, req: &FetchRequest, request_fn: F) -> Result<T, MercatoError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(ProviderId) -> Fut,
        Fut: Future<Output = Result<T, MercatoError>>,
    {
        let key = req.cache_key();
        let ttl = req.ttl.unwrap_or(self.cache.config().default_ttl);
        let persist = req.persist.unwrap_or(self.config.cache.persist);

        let request_fn = &request_fn;
        let value = self
            .cache
            .cache_api_call(
                &key,
                || async move {
                    self.health.ensure_available()?;
                    let fresh = self
                        .limits
                        .make_optimal_request(
                            req.request_type,
                            req.symbol.as_deref(),
                            request_fn,
                            req.priority,
                        )
                        .await?;
                    Ok::<_, MercatoError>(serde_json::to_value(fresh)?)
                },
                ttl,
                persist,
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`fetch`](Self::fetch), but a cached value older than
    /// `ttl * refresh_threshold` is returned immediately while a background
    /// task fetches a replacement.
    ///
    /// A failed background refresh leaves the cached value in place.
    ///
    /// # Errors
    /// On a miss, the same errors as [`fetch`](Self::fetch).
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "mercato::fetch_with_refresh",
            skip(self, req, request_fn),
            fields(request_type = %req.request_type, key = %req.cache_key()),
        )
    )]
    pub async fn fetch_with_refresh<T, F, Fut>(
        &self,
        req: &FetchRequest,
        request_fn: F,
    ) -> Result<T, MercatoError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(ProviderId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, MercatoError>> + Send + 'static,
    {
        let key = req.cache_key();
        if !self.cache.has(&key) {
            return self.fetch(req, request_fn).await;
        }
        let ttl = req.ttl.unwrap_or(self.cache.config().default_ttl);

        let health = Arc::clone(&self.health);
        let limits = Arc::clone(&self.limits);
        let request_type = req.request_type;
        let symbol = req.symbol.clone();
        let priority = req.priority;
        let loader = move || async move {
            health.ensure_available()?;
            let fresh = limits
                .make_optimal_request(request_type, symbol.as_deref(), &request_fn, priority)
                .await?;
            Ok::<_, MercatoError>(serde_json::to_value(fresh)?)
        };

        let value = self
            .cache
            .get_with_refresh(&key, loader, ttl, self.cache.config().refresh_threshold)
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

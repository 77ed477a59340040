//! Layer merging, validation and the service holding the resolved configuration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use mercato_types::{
    ApiSettings, AuthSettings, CacheSettings, ConfigLayer, HealthSettings, MercatoError,
    PartialConfig, ResolvedConfig,
};

use crate::defaults::{DEFAULT_API_TIMEOUT_MS, defaults, is_placeholder};
use crate::env::EnvSnapshot;
use crate::sources::{RemoteConfigSource, RuntimeOverrides};

/// Merge the three local layers, lowest priority first.
#[must_use]
pub fn merge_configurations(
    default: PartialConfig,
    env: PartialConfig,
    runtime: PartialConfig,
) -> PartialConfig {
    default.merge(env).merge(runtime)
}

/// Check a merged layer and turn it into a resolved configuration.
///
/// Only a missing or blank `api.base_url` is fatal; other problems are
/// returned as warnings.
///
/// # Errors
/// `MissingConfig("api.base_url")` when no layer provides a base URL.
pub fn validate(
    merged: PartialConfig,
    layers: Vec<ConfigLayer>,
) -> Result<(ResolvedConfig, Vec<String>), MercatoError> {
    let mut warnings = Vec::new();

    let base_url = merged
        .api
        .base_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| MercatoError::missing_config("api.base_url"))?;
    if let Err(e) = url::Url::parse(&base_url) {
        warnings.push(format!("api.base_url {base_url:?} is not a valid URL: {e}"));
    }
    if let Some(ws) = merged.api.websocket_url.as_deref()
        && url::Url::parse(ws).is_err()
    {
        warnings.push(format!("api.websocket_url {ws:?} is not a valid URL"));
    }

    let auth_enabled = merged.auth.enabled.unwrap_or(false);
    let user_pool_id = merged.auth.user_pool_id.unwrap_or_default();
    let client_id = merged.auth.client_id.unwrap_or_default();
    if auth_enabled {
        for (key, value) in [
            ("auth.user_pool_id", &user_pool_id),
            ("auth.client_id", &client_id),
        ] {
            if is_placeholder(value) {
                warnings.push(format!("{key} is not configured ({value:?})"));
            }
        }
    }

    let fallback = ResolvedConfig::safety();
    let resolved = ResolvedConfig {
        environment: merged.environment.unwrap_or_default(),
        api: ApiSettings {
            base_url,
            timeout: Duration::from_millis(
                merged.api.timeout_ms.unwrap_or(DEFAULT_API_TIMEOUT_MS),
            ),
            websocket_url: merged.api.websocket_url,
        },
        auth: AuthSettings {
            enabled: auth_enabled,
            region: merged.auth.region.unwrap_or(fallback.auth.region),
            user_pool_id,
            client_id,
            domain: merged.auth.domain,
        },
        features: merged.features,
        cache: CacheSettings {
            default_ttl: merged
                .cache
                .default_ttl_ms
                .map_or(fallback.cache.default_ttl, Duration::from_millis),
            max_size: merged.cache.max_size.unwrap_or(fallback.cache.max_size),
            persist: merged.cache.persist.unwrap_or(fallback.cache.persist),
        },
        health: HealthSettings {
            check_interval: merged
                .health
                .check_interval_ms
                .map_or(fallback.health.check_interval, Duration::from_millis),
            circuit_breaker_timeout: merged
                .health
                .circuit_breaker_timeout_ms
                .map_or(fallback.health.circuit_breaker_timeout, Duration::from_millis),
            failure_threshold: merged
                .health
                .failure_threshold
                .unwrap_or(fallback.health.failure_threshold)
                .max(1),
        },
        layers,
    };
    Ok((resolved, warnings))
}

/// Resolves configuration from its layered sources and holds the current result.
///
/// Until [`initialize`](Self::initialize) succeeds the service serves the
/// safety configuration. Readers get a cheap `Arc` snapshot; reloads replace it
/// atomically.
pub struct ConfigurationService {
    defaults: PartialConfig,
    env: EnvSnapshot,
    runtime: RuntimeOverrides,
    remote: Option<RemoteConfigSource>,
    current: ArcSwap<ResolvedConfig>,
    warnings: Mutex<Vec<String>>,
}

impl Default for ConfigurationService {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigurationService {
    /// Start building a service; defaults to the process environment.
    #[must_use]
    pub fn builder() -> ConfigurationServiceBuilder {
        ConfigurationServiceBuilder::new()
    }

    /// Resolve only the local layers (defaults, environment, runtime).
    ///
    /// # Errors
    /// `MissingConfig` when the merged result has no base URL.
    pub fn resolve_local(&self) -> Result<(ResolvedConfig, Vec<String>), MercatoError> {
        let (merged, layers, mut warnings) = self.merge_local();
        let (resolved, mut more) = validate(merged, layers)?;
        warnings.append(&mut more);
        Ok((resolved, warnings))
    }

    fn merge_local(&self) -> (PartialConfig, Vec<ConfigLayer>, Vec<String>) {
        let (env_layer, warnings) = self.env.to_partial();
        let runtime_layer = self.runtime.layer().clone();

        let mut layers = vec![ConfigLayer::Defaults];
        if !env_layer.is_empty() {
            layers.push(ConfigLayer::Environment);
        }
        if !runtime_layer.is_empty() {
            layers.push(ConfigLayer::Runtime);
        }
        let merged = merge_configurations(self.defaults.clone(), env_layer, runtime_layer);
        (merged, layers, warnings)
    }

    /// Resolve every layer, including the remote one when configured.
    ///
    /// A remote layer that cannot be fetched is skipped.
    ///
    /// # Errors
    /// `MissingConfig` when the merged result has no base URL.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "mercato::config::resolve", skip(self))
    )]
    pub async fn resolve(&self) -> Result<(ResolvedConfig, Vec<String>), MercatoError> {
        let remote_layer = match &self.remote {
            Some(source) => source.fetch().await,
            None => None,
        };

        let (mut merged, mut layers, mut warnings) = self.merge_local();
        if let Some(remote) = remote_layer {
            layers.push(ConfigLayer::Remote);
            merged = merged.merge(remote);
        }

        let (resolved, mut more) = validate(merged, layers)?;
        warnings.append(&mut more);
        Ok((resolved, warnings))
    }

    /// Resolve and store the configuration, falling back to the safety
    /// configuration on error. Returns the stored snapshot.
    pub async fn initialize(&self) -> Arc<ResolvedConfig> {
        match self.resolve().await {
            Ok((cfg, warnings)) => self.install(cfg, warnings),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "configuration invalid, using safety configuration");
                self.install(
                    ResolvedConfig::safety(),
                    vec![format!("using safety configuration: {e}")],
                )
            }
        }
    }

    /// Re-resolve and swap in the result.
    ///
    /// # Errors
    /// The resolution error; the previous configuration stays in place.
    pub async fn reload(&self) -> Result<Arc<ResolvedConfig>, MercatoError> {
        let (cfg, warnings) = self.resolve().await?;
        Ok(self.install(cfg, warnings))
    }

    fn install(&self, cfg: ResolvedConfig, warnings: Vec<String>) -> Arc<ResolvedConfig> {
        #[cfg(feature = "tracing")]
        for w in &warnings {
            tracing::warn!(warning = %w, "configuration warning");
        }
        let cfg = Arc::new(cfg);
        self.current.store(Arc::clone(&cfg));
        *self.warnings.lock().expect("mutex poisoned") = warnings;
        cfg
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<ResolvedConfig> {
        self.current.load_full()
    }

    /// Warnings produced by the last resolution.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().expect("mutex poisoned").clone()
    }

    /// Whether a feature flag is on in the current configuration.
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.current.load().feature(name)
    }
}

/// Builder for [`ConfigurationService`].
#[derive(Default)]
pub struct ConfigurationServiceBuilder {
    defaults: Option<PartialConfig>,
    env: Option<EnvSnapshot>,
    runtime: RuntimeOverrides,
    remote: Option<RemoteConfigSource>,
}

impl ConfigurationServiceBuilder {
    /// New builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the compiled-in defaults layer.
    #[must_use]
    pub fn defaults(mut self, layer: PartialConfig) -> Self {
        self.defaults = Some(layer);
        self
    }

    /// Use a fixed environment instead of the process environment.
    #[must_use]
    pub fn env(mut self, env: EnvSnapshot) -> Self {
        self.env = Some(env);
        self
    }

    /// Host-injected overrides.
    #[must_use]
    pub fn runtime(mut self, overrides: RuntimeOverrides) -> Self {
        self.runtime = overrides;
        self
    }

    /// Fetch a remote layer during resolution.
    #[must_use]
    pub fn remote(mut self, source: RemoteConfigSource) -> Self {
        self.remote = Some(source);
        self
    }

    /// Build the service; it serves the safety configuration until initialized.
    #[must_use]
    pub fn build(self) -> ConfigurationService {
        ConfigurationService {
            defaults: self.defaults.unwrap_or_else(defaults),
            env: self.env.unwrap_or_else(EnvSnapshot::from_process),
            runtime: self.runtime,
            remote: self.remote,
            current: ArcSwap::from_pointee(ResolvedConfig::safety()),
            warnings: Mutex::new(Vec::new()),
        }
    }
}

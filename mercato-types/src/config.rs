//! Typed configuration schema shared by the configuration service and its consumers.
//!
//! Every source (defaults, environment, runtime overrides, remote) produces a
//! [`PartialConfig`] where each field is optional. Layers are merged field by
//! field with [`PartialConfig::merge`]; the final record is a [`ResolvedConfig`].

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CacheConfig, HealthConfig, MercatoError};

/// Backend used when nothing else is configured, and by the safety configuration.
pub const FALLBACK_API_URL: &str = "http://localhost:3001";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = MercatoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "test" | "testing" => Ok(Self::Test),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(MercatoError::Config(format!("unknown environment: {other}"))),
        }
    }
}

/// Backend API settings, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Base URL of the REST backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Streaming endpoint, when the backend exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket_url: Option<String>,
}

impl ApiSection {
    fn merge(self, higher: Self) -> Self {
        Self {
            base_url: higher.base_url.or(self.base_url),
            timeout_ms: higher.timeout_ms.or(self.timeout_ms),
            websocket_url: higher.websocket_url.or(self.websocket_url),
        }
    }
}

/// Authentication settings, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Whether authentication features are active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Identity provider region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// User pool identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_pool_id: Option<String>,
    /// Application client identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Hosted login domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl AuthSection {
    fn merge(self, higher: Self) -> Self {
        Self {
            enabled: higher.enabled.or(self.enabled),
            region: higher.region.or(self.region),
            user_pool_id: higher.user_pool_id.or(self.user_pool_id),
            client_id: higher.client_id.or(self.client_id),
            domain: higher.domain.or(self.domain),
        }
    }
}

/// Cache tunables, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Default TTL in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_ms: Option<u64>,
    /// Maximum in-memory entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
    /// Whether API responses are mirrored to the persistent store by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist: Option<bool>,
}

impl CacheSection {
    fn merge(self, higher: Self) -> Self {
        Self {
            default_ttl_ms: higher.default_ttl_ms.or(self.default_ttl_ms),
            max_size: higher.max_size.or(self.max_size),
            persist: higher.persist.or(self.persist),
        }
    }
}

/// Health monitoring tunables, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    /// Delay between health cycles in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval_ms: Option<u64>,
    /// Breaker cooldown in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker_timeout_ms: Option<u64>,
    /// Failing cycles before the breaker opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
}

impl HealthSection {
    fn merge(self, higher: Self) -> Self {
        Self {
            check_interval_ms: higher.check_interval_ms.or(self.check_interval_ms),
            circuit_breaker_timeout_ms: higher
                .circuit_breaker_timeout_ms
                .or(self.circuit_breaker_timeout_ms),
            failure_threshold: higher.failure_threshold.or(self.failure_threshold),
        }
    }
}

/// One configuration layer; every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    /// Deployment environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    /// Backend API settings.
    pub api: ApiSection,
    /// Authentication settings.
    pub auth: AuthSection,
    /// Feature flags; merged key by key.
    pub features: BTreeMap<String, bool>,
    /// Cache tunables.
    pub cache: CacheSection,
    /// Health monitoring tunables.
    pub health: HealthSection,
}

impl PartialConfig {
    /// Merge `higher` on top of `self`.
    ///
    /// Scalars present in `higher` replace those in `self`; nested sections and
    /// the feature map are merged recursively.
    #[must_use]
    pub fn merge(self, higher: Self) -> Self {
        let mut features = self.features;
        features.extend(higher.features);
        Self {
            environment: higher.environment.or(self.environment),
            api: self.api.merge(higher.api),
            auth: self.auth.merge(higher.auth),
            features,
            cache: self.cache.merge(higher.cache),
            health: self.health.merge(higher.health),
        }
    }

    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Layer that contributed to a resolved configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLayer {
    /// Compiled-in defaults.
    Defaults,
    /// Process environment variables.
    Environment,
    /// Overrides injected by the host at runtime.
    Runtime,
    /// Configuration fetched from the backend.
    Remote,
    /// Hardcoded safety configuration used after an initialization failure.
    Safety,
}

/// Resolved backend API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the REST backend; never empty.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Streaming endpoint, when configured.
    pub websocket_url: Option<String>,
}

/// Resolved authentication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Whether authentication features are active.
    pub enabled: bool,
    /// Identity provider region.
    pub region: String,
    /// User pool identifier.
    pub user_pool_id: String,
    /// Application client identifier.
    pub client_id: String,
    /// Hosted login domain.
    pub domain: Option<String>,
}

/// Resolved cache tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default TTL.
    pub default_ttl: Duration,
    /// Maximum in-memory entries.
    pub max_size: usize,
    /// Default persistence flag for API responses.
    pub persist: bool,
}

/// Resolved health tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Delay between health cycles.
    pub check_interval: Duration,
    /// Breaker cooldown.
    pub circuit_breaker_timeout: Duration,
    /// Failing cycles before the breaker opens.
    pub failure_threshold: u32,
}

/// Fully resolved configuration; immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Backend API settings.
    pub api: ApiSettings,
    /// Authentication settings.
    pub auth: AuthSettings,
    /// Feature flags.
    pub features: BTreeMap<String, bool>,
    /// Cache tunables.
    pub cache: CacheSettings,
    /// Health tunables.
    pub health: HealthSettings,
    /// Layers that contributed, lowest priority first.
    pub layers: Vec<ConfigLayer>,
}

impl ResolvedConfig {
    /// Hardcoded configuration used when resolution fails.
    ///
    /// Points at [`FALLBACK_API_URL`], disables authentication and turns every
    /// optional feature off except offline mode.
    #[must_use]
    pub fn safety() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiSettings {
                base_url: FALLBACK_API_URL.to_string(),
                timeout: Duration::from_secs(30),
                websocket_url: None,
            },
            auth: AuthSettings {
                enabled: false,
                region: "us-east-1".to_string(),
                user_pool_id: String::new(),
                client_id: String::new(),
                domain: None,
            },
            features: BTreeMap::from([("offline_mode".to_string(), true)]),
            cache: CacheSettings {
                default_ttl: Duration::from_secs(300),
                max_size: 1000,
                persist: false,
            },
            health: HealthSettings {
                check_interval: Duration::from_secs(30),
                circuit_breaker_timeout: Duration::from_secs(60),
                failure_threshold: 3,
            },
            layers: vec![ConfigLayer::Safety],
        }
    }

    /// Whether a named feature flag is on; unknown flags are off.
    #[must_use]
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// Whether this configuration is the safety fallback.
    #[must_use]
    pub fn is_safety_fallback(&self) -> bool {
        self.layers.contains(&ConfigLayer::Safety)
    }
}

impl From<&ResolvedConfig> for CacheConfig {
    fn from(cfg: &ResolvedConfig) -> Self {
        Self {
            max_size: cfg.cache.max_size,
            default_ttl: cfg.cache.default_ttl,
            ..Self::default()
        }
    }
}

impl From<&ResolvedConfig> for HealthConfig {
    fn from(cfg: &ResolvedConfig) -> Self {
        Self {
            check_interval: cfg.health.check_interval,
            circuit_breaker_timeout: cfg.health.circuit_breaker_timeout,
            failure_threshold: cfg.health.failure_threshold,
            ..Self::default()
        }
    }
}

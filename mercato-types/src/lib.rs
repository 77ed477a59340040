//! Mercato data transfer objects, configuration primitives and the unified error type.
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod events;
mod health;
mod priority;
mod provider;
mod request;

pub use cache::{CacheConfig, CacheStats};
pub use config::{
    ApiSection, ApiSettings, AuthSection, AuthSettings, CacheSection, CacheSettings, ConfigLayer,
    Environment, FALLBACK_API_URL, HealthSection, HealthSettings, PartialConfig, ResolvedConfig,
};
pub use error::MercatoError;
pub use events::{LimitEvent, ThresholdLevel};
pub use health::{
    EndpointResult, EndpointSpec, FallbackStrategy, HealthConfig, HealthStatus, OverallHealth,
};
pub use priority::RequestPriority;
pub use provider::{
    LimitsConfig, ProviderConfig, ProviderId, ProviderUsage, QuotaRule, QuotaState, RateLimits,
    default_providers,
};
pub use request::RequestType;

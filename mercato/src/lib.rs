//! Mercato is a client-side resilience layer for market-data APIs.
//!
//! Overview
//! - [`CacheService`]: TTL cache with size-based eviction, a persistent second
//!   tier and stale-while-revalidate reads.
//! - [`ApiLimitManager`]: per-provider quotas, rate and concurrency limits,
//!   health scoring and ranked failover with priority-reserved capacity.
//! - [`ApiHealthService`]: periodic endpoint probing with a circuit breaker.
//! - [`ConfigurationService`]: layered configuration (defaults, environment,
//!   runtime overrides, remote) with a safety fallback.
//!
//! [`Mercato`] wires the four together: a [`fetch`](Mercato::fetch) is served
//! from cache when possible, refused while the backend breaker is open, and
//! otherwise routed across providers in score order.
//! [`fetch_with_refresh`](Mercato::fetch_with_refresh) additionally serves
//! ageing entries while a replacement is fetched in the background.
//!
//! Key behaviors and trade-offs
//! - Cache hits are served even while the breaker is open; stale data beats
//!   no data.
//! - Concurrent misses for the same key each call upstream; there is no
//!   request coalescing.
//! - Quotas may be overshot by in-flight requests; admission treats
//!   `used >= ceiling` as unavailable.
//!
//! Example
//! ```rust,ignore
//! use mercato::{ConfigurationService, FetchRequest, Mercato, RequestType};
//!
//! let config = ConfigurationService::default();
//! let resolved = config.initialize().await;
//!
//! let mercato = Mercato::builder().config(resolved).build()?;
//! mercato.start();
//!
//! let quote: serde_json::Value = mercato
//!     .fetch(&FetchRequest::for_symbol(RequestType::Quote, "AAPL"), |provider| async move {
//!         fetch_quote_from(provider, "AAPL").await
//!     })
//!     .await?;
//!
//! mercato.shutdown().await;
//! ```
//!
//! See `mercato/examples/` for a runnable demonstration.
#![warn(missing_docs)]

pub(crate) mod core;
mod request;

pub use crate::core::{Mercato, MercatoBuilder, ResponseCache};
pub use request::FetchRequest;

pub use mercato_config::{
    ConfigurationService, ConfigurationServiceBuilder, EnvSnapshot, RemoteConfigSource,
    RuntimeOverrides, merge_configurations,
};
pub use mercato_core::{FileStore, HealthProbe, MemoryStore, PersistentStore, TaskHandle};
pub use mercato_health::{ApiHealthService, HttpProbe, SubscriptionId};
pub use mercato_middleware::{
    Admission, ApiLimitManager, CacheService, DenyReason, EntryInfo, cache_key,
};

// Re-export shared types for convenience
pub use mercato_types::{
    CacheConfig, CacheStats, ConfigLayer, EndpointResult, EndpointSpec, Environment,
    FallbackStrategy, HealthConfig, HealthStatus, LimitEvent, LimitsConfig, MercatoError,
    OverallHealth, PartialConfig, ProviderConfig, ProviderId, ProviderUsage, QuotaRule,
    QuotaState, RateLimits, RequestPriority, RequestType, ResolvedConfig, ThresholdLevel,
};

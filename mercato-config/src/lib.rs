//! mercato-config
//!
//! Layered configuration resolution. Sources are merged lowest priority
//! first: compiled-in defaults, environment variables, host-injected runtime
//! overrides and an optional remote document. The result is validated once
//! and held by [`ConfigurationService`], which falls back to
//! [`ResolvedConfig::safety`](mercato_types::ResolvedConfig::safety) when
//! resolution fails.
#![warn(missing_docs)]

pub mod defaults;
pub mod env;
mod service;
mod sources;

pub use defaults::{defaults, is_placeholder};
pub use env::EnvSnapshot;
pub use mercato_types::{FALLBACK_API_URL, PartialConfig, ResolvedConfig};
pub use service::{
    ConfigurationService, ConfigurationServiceBuilder, merge_configurations, validate,
};
pub use sources::{RemoteConfigSource, RuntimeOverrides};

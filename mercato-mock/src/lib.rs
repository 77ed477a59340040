//! Deterministic test doubles for the mercato services.
//!
//! - [`MockProbe`]: a `HealthProbe` whose per-endpoint outcomes are scripted.
//! - [`MockProvider`]: an upstream provider whose per-provider responses are
//!   scripted, usable as the `request_fn` of `make_optimal_request`.
//!
//! Scripts are consumed front to back; once a script runs dry the configured
//! default behavior applies.
#![warn(missing_docs)]

mod probe;
mod provider;

pub use probe::{MockProbe, ProbeOutcome};
pub use provider::{MockBehavior, MockProvider};

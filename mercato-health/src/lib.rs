//! mercato-health
//!
//! [`ApiHealthService`] probes a fixed list of backend endpoints on an
//! interval, classifies each cycle as healthy / degraded / unhealthy / down,
//! and opens a [`CircuitBreaker`] after repeated failing cycles. Probing goes
//! through the `HealthProbe` seam; [`HttpProbe`] is the `reqwest` implementation.
#![warn(missing_docs)]

mod breaker;
mod http;
/// Health service and cycle classification.
pub mod service;

pub use breaker::CircuitBreaker;
pub use http::HttpProbe;
pub use service::{ApiHealthService, SubscriptionId, determine_overall_health};

use async_trait::async_trait;
use mercato_types::{EndpointResult, EndpointSpec};

/// Probe used by the health service to check one endpoint.
///
/// Implementations report failures inside the returned [`EndpointResult`]
/// rather than as errors; the health service additionally bounds every call
/// with its probe timeout.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Human-readable probe name for logging.
    fn name(&self) -> &'static str;

    /// Check `endpoint` once.
    async fn probe(&self, endpoint: &EndpointSpec) -> EndpointResult;
}

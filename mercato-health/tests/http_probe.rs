use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use mercato_core::HealthProbe;
use mercato_health::{ApiHealthService, HttpProbe};
use mercato_types::{EndpointSpec, HealthConfig, MercatoError, OverallHealth};

#[tokio::test]
async fn success_status_is_healthy() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).body("ok");
        })
        .await;

    let probe = HttpProbe::new(&server.base_url()).unwrap();
    let result = probe
        .probe(&EndpointSpec::new("health", "/health", true))
        .await;

    mock.assert_async().await;
    assert!(result.healthy);
    assert!(result.critical);
    assert_eq!(result.status_code, Some(200));
}

#[tokio::test]
async fn error_status_is_unhealthy() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/health");
            then.status(503);
        })
        .await;

    let probe = HttpProbe::new(&format!("{}/", server.base_url())).unwrap();
    let result = probe
        .probe(&EndpointSpec::new("api-health", "api/health", false))
        .await;
    assert!(!result.healthy);
    assert_eq!(result.status_code, Some(503));
    assert!(result.error.unwrap().contains("503"));
}

#[tokio::test]
async fn unreachable_host_reports_transport_error() {
    // nothing listens on port 9 (discard) in test environments
    let probe = HttpProbe::new("http://127.0.0.1:9").unwrap();
    let result = probe.probe(&EndpointSpec::new("health", "/health", true)).await;
    assert!(!result.healthy);
    assert_eq!(result.status_code, None);
    assert!(result.error.unwrap().starts_with("request failed"));
}

#[test]
fn invalid_base_urls_are_rejected() {
    assert!(matches!(HttpProbe::new("not a url"), Err(MercatoError::Config(_))));
    assert!(matches!(
        HttpProbe::new("ftp://example.com"),
        Err(MercatoError::Config(_))
    ));
    let probe = HttpProbe::new("https://api.example.com/").unwrap();
    assert_eq!(
        probe.url_for(&EndpointSpec::new("keys", "/api/settings/api-keys", false)),
        "https://api.example.com/api/settings/api-keys"
    );
}

#[tokio::test]
async fn service_over_http_degrades_on_partial_outage() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/health");
            then.status(200);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/settings/api-keys");
            then.status(500);
        })
        .await;

    let probe = Arc::new(HttpProbe::new(&server.base_url()).unwrap());
    let svc = ApiHealthService::new(
        HealthConfig {
            probe_timeout: Duration::from_secs(2),
            ..HealthConfig::default()
        },
        probe,
    );
    let status = svc.check_health().await;
    assert_eq!(status.overall, OverallHealth::Degraded);
    assert!(status.endpoints["health"].healthy);
    assert!(!status.endpoints["api-keys"].healthy);
}

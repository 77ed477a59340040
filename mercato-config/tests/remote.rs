use std::time::Duration;

use httpmock::prelude::*;
use mercato_config::{ConfigurationService, EnvSnapshot, RemoteConfigSource};
use mercato_types::{ConfigLayer, MercatoError};

#[tokio::test]
async fn remote_layer_overrides_local_layers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/config");
            then.status(200).json_body(serde_json::json!({
                "api": { "base_url": "https://remote.example" },
                "features": { "screener": false }
            }));
        })
        .await;

    let svc = ConfigurationService::builder()
        .env(EnvSnapshot::from_pairs([("API_URL", "https://env.example")]))
        .remote(RemoteConfigSource::new(&server.url("/config")).unwrap())
        .build();
    let cfg = svc.initialize().await;

    mock.assert_async().await;
    assert_eq!(cfg.api.base_url, "https://remote.example");
    assert!(!cfg.feature("screener"));
    assert_eq!(cfg.layers.last(), Some(&ConfigLayer::Remote));
}

#[tokio::test]
async fn emergency_endpoint_used_when_primary_fails() {
    let server = MockServer::start_async().await;
    let primary = server
        .mock_async(|when, then| {
            when.method(GET).path("/config");
            then.status(503);
        })
        .await;
    let emergency = server
        .mock_async(|when, then| {
            when.method(GET).path("/config/emergency");
            then.status(200)
                .json_body(serde_json::json!({ "cache": { "max_size": 50 } }));
        })
        .await;

    let source = RemoteConfigSource::new(&server.url("/config"))
        .unwrap()
        .with_emergency(&server.url("/config/emergency"))
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    let layer = source.fetch().await.unwrap();

    primary.assert_async().await;
    emergency.assert_async().await;
    assert_eq!(layer.cache.max_size, Some(50));
}

#[tokio::test]
async fn unreachable_remote_is_skipped() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/config");
            then.status(200).body("<html>not json</html>");
        })
        .await;

    let svc = ConfigurationService::builder()
        .env(EnvSnapshot::default())
        .remote(RemoteConfigSource::new(&server.url("/config")).unwrap())
        .build();
    let (cfg, _) = svc.resolve().await.unwrap();
    assert!(!cfg.layers.contains(&ConfigLayer::Remote));
    assert!(!cfg.is_safety_fallback());
}

#[test]
fn invalid_remote_urls_are_rejected() {
    assert!(matches!(
        RemoteConfigSource::new("::nope::"),
        Err(MercatoError::Config(_))
    ));
}

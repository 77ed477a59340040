use std::io::Write;

use mercato_config::{
    ConfigurationService, EnvSnapshot, FALLBACK_API_URL, RuntimeOverrides, defaults,
    merge_configurations,
};
use mercato_types::{ConfigLayer, Environment, MercatoError, PartialConfig};

fn layer(json: &str) -> PartialConfig {
    serde_json::from_str(json).unwrap()
}

#[test]
fn runtime_wins_every_key() {
    let default = layer(
        r#"{"api":{"base_url":"https://default","timeout_ms":1000},
            "cache":{"max_size":10},"features":{"screener":true}}"#,
    );
    let env = layer(
        r#"{"api":{"base_url":"https://env","timeout_ms":2000},
            "cache":{"max_size":20},"features":{"screener":false}}"#,
    );
    let runtime = layer(
        r#"{"api":{"base_url":"https://runtime","timeout_ms":3000},
            "cache":{"max_size":30},"features":{"screener":true}}"#,
    );

    let merged = merge_configurations(default, env, runtime);
    assert_eq!(merged.api.base_url.as_deref(), Some("https://runtime"));
    assert_eq!(merged.api.timeout_ms, Some(3000));
    assert_eq!(merged.cache.max_size, Some(30));
    assert_eq!(merged.features["screener"], true);
}

#[test]
fn lower_layers_fill_gaps() {
    let merged = merge_configurations(
        defaults(),
        layer(r#"{"api":{"timeout_ms":5000}}"#),
        layer(r#"{"features":{"beta":true}}"#),
    );
    assert_eq!(merged.api.base_url.as_deref(), Some(FALLBACK_API_URL));
    assert_eq!(merged.api.timeout_ms, Some(5000));
    assert_eq!(merged.features["beta"], true);
    assert_eq!(merged.features["screener"], true);
}

#[test]
fn environment_candidates_feed_the_layer() {
    let env = EnvSnapshot::from_pairs([
        ("APP_ENV", "prod"),
        ("API_BASE_URL", "https://api.example.com"),
        ("MERCATO_API_TIMEOUT_MS", "not-a-number"),
        ("COGNITO_USER_POOL_ID", "us-east-1_abc123"),
        ("COGNITO_CLIENT_ID", "4f1d2c"),
        ("MERCATO_CACHE_PERSIST", "yes"),
        ("MERCATO_FAILURE_THRESHOLD", "5"),
        ("MERCATO_FEATURE_OFFLINE_MODE", "on"),
    ]);
    let (partial, warnings) = env.to_partial();

    assert_eq!(partial.environment, Some(Environment::Production));
    assert_eq!(partial.api.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(partial.api.timeout_ms, None);
    assert_eq!(partial.cache.persist, Some(true));
    assert_eq!(partial.health.failure_threshold, Some(5));
    assert_eq!(partial.features["offline_mode"], true);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("MERCATO_API_TIMEOUT_MS"));
}

#[test]
fn resolve_local_records_layers_and_clears_placeholder_warnings() {
    let svc = ConfigurationService::builder()
        .env(EnvSnapshot::from_pairs([
            ("MERCATO_USER_POOL_ID", "us-east-1_abc123"),
            ("MERCATO_CLIENT_ID", "4f1d2c"),
        ]))
        .runtime(RuntimeOverrides::from_json_str(r#"{"cache":{"default_ttl_ms":1000}}"#).unwrap())
        .build();

    let (cfg, warnings) = svc.resolve_local().unwrap();
    assert_eq!(
        cfg.layers,
        vec![
            ConfigLayer::Defaults,
            ConfigLayer::Environment,
            ConfigLayer::Runtime
        ]
    );
    assert_eq!(cfg.cache.default_ttl.as_millis(), 1000);
    assert!(cfg.auth.enabled);
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn runtime_overrides_reject_malformed_json() {
    let err = RuntimeOverrides::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, MercatoError::Config(_)));
}

#[test]
fn runtime_overrides_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"api":{{"base_url":"https://file.example"}}}}"#).unwrap();

    let overrides = RuntimeOverrides::from_file(file.path()).unwrap();
    assert_eq!(
        overrides.layer().api.base_url.as_deref(),
        Some("https://file.example")
    );

    let missing = RuntimeOverrides::from_file(file.path().with_extension("missing"));
    assert!(matches!(missing, Err(MercatoError::Config(_))));
}

#[tokio::test]
async fn missing_base_url_falls_back_to_safety() {
    let mut no_url = defaults();
    no_url.api.base_url = None;
    let svc = ConfigurationService::builder()
        .defaults(no_url)
        .env(EnvSnapshot::default())
        .build();

    assert!(matches!(
        svc.resolve().await,
        Err(MercatoError::MissingConfig { ref key }) if key == "api.base_url"
    ));

    let cfg = svc.initialize().await;
    assert!(cfg.is_safety_fallback());
    assert!(!cfg.auth.enabled);
    assert_eq!(cfg.api.base_url, FALLBACK_API_URL);
    assert!(svc.warnings()[0].contains("api.base_url"));
}

#[tokio::test]
async fn serves_safety_until_initialized_then_swaps() {
    let svc = ConfigurationService::builder()
        .env(EnvSnapshot::from_pairs([("MERCATO_FEATURE_SCREENER", "false")]))
        .build();
    assert!(svc.current().is_safety_fallback());

    let cfg = svc.initialize().await;
    assert!(!cfg.is_safety_fallback());
    assert!(!svc.is_feature_enabled("screener"));
    assert!(svc.is_feature_enabled("advanced_charts"));
    assert!(!svc.is_feature_enabled("no_such_flag"));
    assert_eq!(svc.warnings().len(), 2);
}

#[tokio::test]
async fn failed_reload_keeps_previous_config() {
    let svc = ConfigurationService::builder()
        .env(EnvSnapshot::default())
        .build();
    let first = svc.initialize().await;

    let ok = svc.reload().await.unwrap();
    assert_eq!(ok.api, first.api);

    let mut no_url = defaults();
    no_url.api.base_url = Some(String::new());
    let broken = ConfigurationService::builder()
        .defaults(no_url)
        .env(EnvSnapshot::default())
        .build();
    broken.initialize().await;
    assert!(broken.reload().await.is_err());
    assert!(broken.current().is_safety_fallback());
}

use mercato_types::{ApiSection, AuthSection, Environment, PartialConfig};

fn layer(base_url: Option<&str>, region: Option<&str>) -> PartialConfig {
    PartialConfig {
        api: ApiSection {
            base_url: base_url.map(str::to_string),
            ..ApiSection::default()
        },
        auth: AuthSection {
            region: region.map(str::to_string),
            ..AuthSection::default()
        },
        ..PartialConfig::default()
    }
}

#[test]
fn higher_layer_wins_for_scalars() {
    let low = layer(Some("https://low.example"), Some("us-east-1"));
    let high = layer(Some("https://high.example"), None);

    let merged = low.merge(high);
    assert_eq!(merged.api.base_url.as_deref(), Some("https://high.example"));
    // absent in the higher layer -> lower value survives
    assert_eq!(merged.auth.region.as_deref(), Some("us-east-1"));
}

#[test]
fn feature_map_merges_key_by_key() {
    let mut low = PartialConfig::default();
    low.features.insert("realtime".into(), true);
    low.features.insert("screener".into(), true);
    let mut high = PartialConfig::default();
    high.features.insert("screener".into(), false);

    let merged = low.merge(high);
    assert_eq!(merged.features.get("realtime"), Some(&true));
    assert_eq!(merged.features.get("screener"), Some(&false));
}

#[test]
fn partial_config_parses_sparse_json() {
    let json = r#"{
        "environment": "production",
        "api": { "base_url": "https://api.example.com" },
        "features": { "realtime": true }
    }"#;
    let cfg: PartialConfig = serde_json::from_str(json).expect("parse partial config");

    assert_eq!(cfg.environment, Some(Environment::Production));
    assert_eq!(cfg.api.base_url.as_deref(), Some("https://api.example.com"));
    assert!(cfg.api.timeout_ms.is_none());
    assert!(cfg.auth.user_pool_id.is_none());
    assert_eq!(cfg.features.get("realtime"), Some(&true));
}

#[test]
fn empty_layer_is_identity() {
    let base = layer(Some("https://a.example"), Some("eu-west-1"));
    assert_eq!(base.clone().merge(PartialConfig::default()), base);
    assert!(PartialConfig::default().is_empty());
}

#[test]
fn environment_aliases_parse() {
    assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    assert_eq!(" Dev ".parse::<Environment>().unwrap(), Environment::Development);
    assert!("moon".parse::<Environment>().is_err());
}

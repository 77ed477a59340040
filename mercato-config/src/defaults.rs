//! Compiled-in defaults layer.

use std::collections::BTreeMap;

use mercato_types::{
    ApiSection, AuthSection, CacheSection, Environment, FALLBACK_API_URL, HealthSection,
    PartialConfig,
};

/// Request timeout applied when no layer sets one.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Marker values that indicate an unconfigured identity setting.
pub const PLACEHOLDER_MARKERS: &[&str] = &[
    "your-",
    "your_",
    "replace",
    "changeme",
    "placeholder",
    "xxxx",
    "todo",
];

/// Feature flags known to the application, with their default state.
pub const DEFAULT_FEATURES: &[(&str, bool)] = &[
    ("realtime_quotes", true),
    ("screener", true),
    ("advanced_charts", true),
    ("news_feed", true),
    ("offline_mode", false),
];

/// Compiled-in defaults layer.
#[must_use]
pub fn defaults() -> PartialConfig {
    PartialConfig {
        environment: Some(Environment::Development),
        api: ApiSection {
            base_url: Some(FALLBACK_API_URL.to_string()),
            timeout_ms: Some(DEFAULT_API_TIMEOUT_MS),
            websocket_url: None,
        },
        auth: AuthSection {
            enabled: Some(true),
            region: Some("us-east-1".to_string()),
            user_pool_id: Some("your-user-pool-id".to_string()),
            client_id: Some("your-client-id".to_string()),
            domain: None,
        },
        features: DEFAULT_FEATURES
            .iter()
            .map(|(k, v)| ((*k).to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        cache: CacheSection {
            default_ttl_ms: Some(5 * 60 * 1000),
            max_size: Some(1000),
            persist: Some(false),
        },
        health: HealthSection {
            check_interval_ms: Some(30_000),
            circuit_breaker_timeout_ms: Some(60_000),
            failure_threshold: Some(3),
        },
    }
}

/// Whether `value` looks like an unfilled template value.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.is_empty() || PLACEHOLDER_MARKERS.iter().any(|m| v.contains(m))
}

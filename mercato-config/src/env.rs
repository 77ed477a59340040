//! Environment-variable configuration source.

use std::collections::HashMap;
use std::str::FromStr;

use mercato_types::{Environment, PartialConfig};

/// Prefix of per-feature flag variables, e.g. `MERCATO_FEATURE_SCREENER=false`.
pub const FEATURE_PREFIX: &str = "MERCATO_FEATURE_";

const ENVIRONMENT: &[&str] = &["MERCATO_ENV", "APP_ENV", "NODE_ENV"];
const API_URL: &[&str] = &["MERCATO_API_URL", "API_URL", "API_BASE_URL"];
const API_TIMEOUT: &[&str] = &["MERCATO_API_TIMEOUT_MS", "API_TIMEOUT_MS"];
const WS_URL: &[&str] = &["MERCATO_WS_URL", "WEBSOCKET_URL", "WS_URL"];
const AUTH_ENABLED: &[&str] = &["MERCATO_AUTH_ENABLED", "AUTH_ENABLED"];
const AUTH_REGION: &[&str] = &["MERCATO_AUTH_REGION", "COGNITO_REGION", "AWS_REGION"];
const USER_POOL_ID: &[&str] = &[
    "MERCATO_USER_POOL_ID",
    "COGNITO_USER_POOL_ID",
    "USER_POOL_ID",
];
const CLIENT_ID: &[&str] = &["MERCATO_CLIENT_ID", "COGNITO_CLIENT_ID", "CLIENT_ID"];
const AUTH_DOMAIN: &[&str] = &["MERCATO_AUTH_DOMAIN", "COGNITO_DOMAIN"];
const CACHE_TTL: &[&str] = &["MERCATO_CACHE_TTL_MS"];
const CACHE_MAX: &[&str] = &["MERCATO_CACHE_MAX_SIZE"];
const CACHE_PERSIST: &[&str] = &["MERCATO_CACHE_PERSIST"];
const HEALTH_INTERVAL: &[&str] = &["MERCATO_HEALTH_INTERVAL_MS"];
const BREAKER_TIMEOUT: &[&str] = &["MERCATO_CIRCUIT_BREAKER_TIMEOUT_MS"];
const FAILURE_THRESHOLD: &[&str] = &["MERCATO_FAILURE_THRESHOLD"];

/// Captured set of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// First non-empty value among `candidates`, trimmed.
    #[must_use]
    pub fn first(&self, candidates: &[&str]) -> Option<&str> {
        candidates
            .iter()
            .filter_map(|name| self.vars.get(*name))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    fn string(&self, candidates: &[&str]) -> Option<String> {
        self.first(candidates).map(str::to_string)
    }

    fn parsed<T: FromStr>(&self, candidates: &[&str], warnings: &mut Vec<String>) -> Option<T> {
        let raw = self.first(candidates)?;
        if let Ok(v) = raw.parse() {
            Some(v)
        } else {
            warnings.push(format!(
                "ignoring {}: cannot parse {raw:?}",
                candidates.first().copied().unwrap_or_default()
            ));
            None
        }
    }

    fn flag(&self, candidates: &[&str], warnings: &mut Vec<String>) -> Option<bool> {
        let raw = self.first(candidates)?;
        let parsed = parse_bool(raw);
        if parsed.is_none() {
            warnings.push(format!(
                "ignoring {}: not a boolean: {raw:?}",
                candidates.first().copied().unwrap_or_default()
            ));
        }
        parsed
    }

    /// Environment layer plus any parse warnings.
    ///
    /// Unparseable values are skipped with a warning rather than failing.
    #[must_use]
    pub fn to_partial(&self) -> (PartialConfig, Vec<String>) {
        let mut warnings = Vec::new();
        let mut cfg = PartialConfig::default();

        cfg.environment = self.first(ENVIRONMENT).and_then(|raw| {
            Environment::from_str(raw)
                .map_err(|e| warnings.push(format!("ignoring environment: {e}")))
                .ok()
        });

        cfg.api.base_url = self.string(API_URL);
        cfg.api.timeout_ms = self.parsed(API_TIMEOUT, &mut warnings);
        cfg.api.websocket_url = self.string(WS_URL);

        cfg.auth.enabled = self.flag(AUTH_ENABLED, &mut warnings);
        cfg.auth.region = self.string(AUTH_REGION);
        cfg.auth.user_pool_id = self.string(USER_POOL_ID);
        cfg.auth.client_id = self.string(CLIENT_ID);
        cfg.auth.domain = self.string(AUTH_DOMAIN);

        cfg.cache.default_ttl_ms = self.parsed(CACHE_TTL, &mut warnings);
        cfg.cache.max_size = self.parsed(CACHE_MAX, &mut warnings);
        cfg.cache.persist = self.flag(CACHE_PERSIST, &mut warnings);

        cfg.health.check_interval_ms = self.parsed(HEALTH_INTERVAL, &mut warnings);
        cfg.health.circuit_breaker_timeout_ms = self.parsed(BREAKER_TIMEOUT, &mut warnings);
        cfg.health.failure_threshold = self.parsed(FAILURE_THRESHOLD, &mut warnings);

        for (name, raw) in &self.vars {
            let Some(feature) = name.strip_prefix(FEATURE_PREFIX) else {
                continue;
            };
            match parse_bool(raw) {
                Some(on) => {
                    cfg.features.insert(feature.to_ascii_lowercase(), on);
                }
                None => warnings.push(format!("ignoring {name}: not a boolean: {raw:?}")),
            }
        }
        warnings.sort();

        (cfg, warnings)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_empty_candidate_wins() {
        let env = EnvSnapshot::from_pairs([
            ("MERCATO_API_URL", "  "),
            ("API_URL", "https://b.example"),
            ("API_BASE_URL", "https://c.example"),
        ]);
        assert_eq!(env.first(API_URL), Some("https://b.example"));
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for raw in ["1", "TRUE", "yes", " on "] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "False", "no", "off"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}

use std::time::Duration;

use mercato_middleware::cache_key;
use mercato_types::{RequestPriority, RequestType};

/// Describes one cached, provider-routed fetch.
///
/// The cache key defaults to `<request_type>?symbol=<SYMBOL>` and can be
/// replaced with [`key`](Self::key) or extended with [`param`](Self::param).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub(crate) request_type: RequestType,
    pub(crate) symbol: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) ttl: Option<Duration>,
    pub(crate) persist: Option<bool>,
    pub(crate) priority: Option<RequestPriority>,
}

impl FetchRequest {
    /// Request of the given type with no symbol.
    #[must_use]
    pub const fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            symbol: None,
            key: None,
            params: Vec::new(),
            ttl: None,
            persist: None,
            priority: None,
        }
    }

    /// Request of the given type for one symbol.
    #[must_use]
    pub fn for_symbol(request_type: RequestType, symbol: &str) -> Self {
        Self::new(request_type).symbol(symbol)
    }

    /// Attach a symbol; its priority bucket applies unless overridden.
    #[must_use]
    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.trim().to_ascii_uppercase());
        self
    }

    /// Extra query parameter folded into the derived cache key.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// Use an explicit cache key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// TTL for the cached result; the configured default otherwise.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Mirror the result to the persistent store.
    #[must_use]
    pub const fn persist(mut self, yes: bool) -> Self {
        self.persist = Some(yes);
        self
    }

    /// Override the priority used for admission.
    #[must_use]
    pub const fn priority(mut self, priority: RequestPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Request type being fetched.
    #[must_use]
    pub const fn request_type(&self) -> RequestType {
        self.request_type
    }

    /// Cache key this request reads and writes.
    #[must_use]
    pub fn cache_key(&self) -> String {
        if let Some(k) = &self.key {
            return k.clone();
        }
        let mut params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(s) = &self.symbol {
            params.push(("symbol", s.as_str()));
        }
        cache_key(self.request_type.as_str(), &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_key_includes_symbol_and_params() {
        let req = FetchRequest::for_symbol(RequestType::History, " aapl ").param("range", "1y");
        assert_eq!(req.cache_key(), "history?range=1y&symbol=AAPL");
        assert_eq!(FetchRequest::new(RequestType::News).cache_key(), "news");
        assert_eq!(
            FetchRequest::new(RequestType::Quote).key("custom").cache_key(),
            "custom"
        );
    }
}

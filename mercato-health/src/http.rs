use async_trait::async_trait;
use mercato_core::HealthProbe;
use mercato_types::{EndpointResult, EndpointSpec, MercatoError};
use tokio::time::Instant;

/// Probe that issues `GET {base_url}{path}` and treats any 2xx as healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbe {
    /// Probe with a default client.
    ///
    /// # Errors
    /// `Config` if `base_url` is not an absolute http(s) URL; `Http` if the
    /// client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, MercatoError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MercatoError::Http(e.to_string()))?;
        Self::with_client(client, base_url)
    }

    /// Probe that reuses an existing client.
    ///
    /// # Errors
    /// `Config` if `base_url` is not an absolute http(s) URL.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, MercatoError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| MercatoError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MercatoError::Config(format!(
                "unsupported scheme for base url: {}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL probed for `endpoint`.
    #[must_use]
    pub fn url_for(&self, endpoint: &EndpointSpec) -> String {
        if endpoint.path.starts_with('/') {
            format!("{}{}", self.base_url, endpoint.path)
        } else {
            format!("{}/{}", self.base_url, endpoint.path)
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn probe(&self, endpoint: &EndpointSpec) -> EndpointResult {
        let started = Instant::now();
        let outcome = self.client.get(self.url_for(endpoint)).send().await;
        let latency = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(resp) if resp.status().is_success() => {
                EndpointResult::healthy(endpoint.critical, Some(resp.status().as_u16()), latency)
            }
            Ok(resp) => EndpointResult::failed(
                endpoint.critical,
                Some(resp.status().as_u16()),
                latency,
                format!("HTTP {}", resp.status()),
            ),
            Err(e) => EndpointResult::failed(
                endpoint.critical,
                None,
                latency,
                format!("request failed: {e}"),
            ),
        }
    }
}

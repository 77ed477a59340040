//! Runtime and remote configuration sources.

use std::path::Path;
use std::time::Duration;

use mercato_types::{MercatoError, PartialConfig};

/// Overrides injected by the host application as a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides(PartialConfig);

impl RuntimeOverrides {
    /// Wrap an already-built layer.
    #[must_use]
    pub const fn new(layer: PartialConfig) -> Self {
        Self(layer)
    }

    /// Parse a sparse JSON document.
    ///
    /// # Errors
    /// `Config` if the document is not valid JSON for the schema.
    pub fn from_json_str(json: &str) -> Result<Self, MercatoError> {
        serde_json::from_str(json)
            .map(Self)
            .map_err(|e| MercatoError::Config(format!("runtime overrides: {e}")))
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    /// `Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MercatoError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MercatoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// The override layer.
    #[must_use]
    pub const fn layer(&self) -> &PartialConfig {
        &self.0
    }

    /// Consume into the override layer.
    #[must_use]
    pub fn into_layer(self) -> PartialConfig {
        self.0
    }
}

/// Remote configuration endpoint with an optional emergency fallback URL.
#[derive(Debug, Clone)]
pub struct RemoteConfigSource {
    client: reqwest::Client,
    primary: String,
    emergency: Option<String>,
    timeout: Duration,
}

impl RemoteConfigSource {
    /// Source that fetches `primary` with a 5 second timeout.
    ///
    /// # Errors
    /// `Config` if `primary` is not a valid URL.
    pub fn new(primary: &str) -> Result<Self, MercatoError> {
        check_url(primary)?;
        Ok(Self {
            client: reqwest::Client::new(),
            primary: primary.to_string(),
            emergency: None,
            timeout: Duration::from_secs(5),
        })
    }

    /// URL tried when the primary fails.
    ///
    /// # Errors
    /// `Config` if `url` is not a valid URL.
    pub fn with_emergency(mut self, url: &str) -> Result<Self, MercatoError> {
        check_url(url)?;
        self.emergency = Some(url.to_string());
        Ok(self)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reuse an existing HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Fetch the remote layer, trying the primary and then the emergency URL.
    ///
    /// Failures are logged and yield `None`.
    pub async fn fetch(&self) -> Option<PartialConfig> {
        for url in std::iter::once(&self.primary).chain(self.emergency.as_ref()) {
            match self.fetch_one(url).await {
                Ok(layer) => return Some(layer),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(url = %url, error = %_e, "remote configuration unavailable");
                }
            }
        }
        None
    }

    async fn fetch_one(&self, url: &str) -> Result<PartialConfig, MercatoError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MercatoError::Http(e.to_string()))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| MercatoError::Http(e.to_string()))?;
        resp.json::<PartialConfig>()
            .await
            .map_err(|e| MercatoError::Config(format!("remote configuration: {e}")))
    }
}

fn check_url(raw: &str) -> Result<(), MercatoError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| MercatoError::Config(format!("invalid url {raw:?}: {e}")))
}

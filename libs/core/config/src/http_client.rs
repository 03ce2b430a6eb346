use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for an outbound HTTP service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Join a path onto the base URL without doubling slashes
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Reads `<PREFIX>_URL` and `<PREFIX>_TIMEOUT_SECS`.
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, ConfigError> {
        let base_url = env_or_default(&format!("{prefix}_URL"), DEFAULT_BASE_URL);
        let timeout_secs = env_parse_or(&format!("{prefix}_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            base_url,
            timeout_secs,
        })
    }
}

impl FromEnv for HttpClientConfig {
    /// Reads `EMBEDDING_SERVICE_URL` (default http://127.0.0.1:5000)
    /// and `EMBEDDING_SERVICE_TIMEOUT_SECS` (default 30)
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_prefixed("EMBEDDING_SERVICE")
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

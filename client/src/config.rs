//! HTTP client configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8081/api";

/// Where the backend lives and how long to wait for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL without a trailing slash (default: `http://localhost:8081/api`)
    pub base_url: String,
    /// Per-request timeout in seconds (default: 15)
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Reads `TRIPLY_API_URL` and `TRIPLY_HTTP_TIMEOUT_SECS`, falling back
    /// to the defaults for anything missing or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("TRIPLY_API_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map_or(defaults.base_url, |url| url.trim_end_matches('/').to_string()),
            timeout_secs: env::var("TRIPLY_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_strips_trailing_slash() {
        let config = ClientConfig::default()
            .with_base_url("https://api.triply.in/api/")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(config.base_url, "https://api.triply.in/api");
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_secs(15));
    }
}

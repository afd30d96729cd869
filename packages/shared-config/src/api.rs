//! Fallback HTTP API configuration

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Fallback request/response API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the chat API (e.g. `http://localhost/iChat/api`)
    pub base_url: String,

    /// Shared secret sent as `X-API-SECRET` on every call
    pub api_secret: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl ApiConfig {
    /// Load API configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let base_url = get_env_or_default("API_BASE_URL", "http://localhost/iChat/api");
        validate_http_url("API_BASE_URL", &base_url)?;

        Ok(Self {
            base_url,
            api_secret: std::env::var("API_SECRET").ok().filter(|s| !s.is_empty()),
            timeout_secs: parse_env("API_TIMEOUT", 10)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            base_url: url.into(),
            api_secret: None,
            timeout_secs: 10,
        }
    }

    /// Set the shared API secret
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }

    /// Build the full URL for an endpoint relative to the base URL
    pub fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            name.trim_start_matches('/')
        )
    }

    /// URL for typing updates
    pub fn typing_url(&self) -> String {
        self.endpoint("typing.php")
    }

    /// URL for read-receipt confirmations
    pub fn read_receipts_url(&self) -> String {
        self.endpoint("read_receipts.php")
    }

    /// URL for key-exchange calls
    pub fn key_exchange_url(&self) -> String {
        self.endpoint("key_exchange.php")
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::with_url("http://localhost/iChat/api")
    }
}

fn validate_http_url(name: &str, value: &str) -> ConfigResult<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl(
            name.to_string(),
            format!("unsupported scheme '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, "http://localhost/iChat/api");
        assert!(config.api_secret.is_none());
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_endpoint_urls() {
        let config = ApiConfig::with_url("http://chat.local/api");
        assert_eq!(config.typing_url(), "http://chat.local/api/typing.php");
        assert_eq!(
            config.read_receipts_url(),
            "http://chat.local/api/read_receipts.php"
        );
        assert_eq!(
            config.key_exchange_url(),
            "http://chat.local/api/key_exchange.php"
        );
    }

    #[test]
    fn test_endpoint_urls_with_trailing_slash() {
        let config = ApiConfig::with_url("http://chat.local/api/");
        assert_eq!(config.typing_url(), "http://chat.local/api/typing.php");
    }

    #[test]
    fn test_rejects_websocket_scheme() {
        temp_env::with_var("API_BASE_URL", Some("ws://chat.local"), || {
            let result = ApiConfig::from_env();
            assert!(matches!(result, Err(ConfigError::InvalidUrl(_, _))));
        });
    }

    #[test]
    fn test_empty_secret_is_none() {
        temp_env::with_vars(
            [("API_BASE_URL", None), ("API_SECRET", Some(""))],
            || {
                let config = ApiConfig::from_env().unwrap();
                assert!(config.api_secret.is_none());
            },
        );
    }
}

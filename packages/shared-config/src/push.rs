//! Push channel (WebSocket) configuration

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Shared persistent connection configuration
#[derive(Debug, Clone)]
pub struct PushChannelConfig {
    /// WebSocket server URL
    pub url: String,

    /// Interval between keepalive pings in seconds
    pub keepalive_secs: u64,

    /// Whether to attempt a push connection at all
    pub enabled: bool,
}

impl PushChannelConfig {
    /// Load push channel configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_env_or_default("WS_URL", "ws://localhost:8420");
        let parsed =
            url::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl("WS_URL".into(), e.to_string()))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl(
                "WS_URL".to_string(),
                format!("expected ws:// or wss://, got '{}'", parsed.scheme()),
            ));
        }

        Ok(Self {
            url,
            keepalive_secs: parse_env("WS_KEEPALIVE", 30)?,
            enabled: parse_env("WS_ENABLED", true)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build the connection URL carrying the user's handle and optional secret
    pub fn connect_url(&self, user_handle: &str, api_secret: Option<&str>) -> ConfigResult<String> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl("WS_URL".to_string(), e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_handle", user_handle);
            if let Some(secret) = api_secret {
                query.append_pair("api_secret", secret);
            }
        }
        Ok(url.into())
    }
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8420".to_string(),
            keepalive_secs: 30,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PushChannelConfig::default();
        assert_eq!(config.url, "ws://localhost:8420");
        assert_eq!(config.keepalive_secs, 30);
        assert!(config.enabled);
    }

    #[test]
    fn test_connect_url_encodes_handle() {
        let config = PushChannelConfig::default();
        let url = config.connect_url("jane doe", Some("s3cr&t")).unwrap();
        assert_eq!(
            url,
            "ws://localhost:8420/?user_handle=jane+doe&api_secret=s3cr%26t"
        );
    }

    #[test]
    fn test_connect_url_without_secret() {
        let config = PushChannelConfig::with_url("wss://chat.example.com/ws");
        let url = config.connect_url("alice", None).unwrap();
        assert_eq!(url, "wss://chat.example.com/ws?user_handle=alice");
    }

    #[test]
    fn test_rejects_http_scheme() {
        temp_env::with_var("WS_URL", Some("http://localhost:8420"), || {
            assert!(matches!(
                PushChannelConfig::from_env(),
                Err(ConfigError::InvalidUrl(_, _))
            ));
        });
    }
}

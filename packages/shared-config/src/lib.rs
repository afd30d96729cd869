//! Shared configuration types for the Sentinel chat client
//!
//! This crate provides the configuration consumed by the real-time
//! synchronization layer and the terminal client, loaded from environment
//! variables with development-friendly defaults.

mod api;
mod error;
mod push;
mod timing;

pub use api::ApiConfig;
pub use error::{ConfigError, ConfigResult};
pub use push::PushChannelConfig;
pub use timing::TimingConfig;

use std::env;
use std::path::PathBuf;

/// Complete client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Handle of the local user (the identity every call is made as)
    pub user_handle: String,

    /// Fallback HTTP API configuration
    pub api: ApiConfig,

    /// Push channel (WebSocket) configuration
    pub push: PushChannelConfig,

    /// Typing and polling cadences
    pub timing: TimingConfig,

    /// Location of the durable public-key store (in-memory when unset)
    pub key_store_path: Option<PathBuf>,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl ClientConfig {
    /// Load `.env` (if present) and then the configuration from the environment
    pub fn load() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load client configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let user_handle = get_required_env("USER_HANDLE")?;
        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .parse()
            .unwrap_or_default();

        let config = Self {
            user_handle: user_handle.trim().to_string(),
            api: ApiConfig::from_env()?,
            push: PushChannelConfig::from_env()?,
            timing: TimingConfig::from_env()?,
            key_store_path: env::var("KEY_STORE_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            environment,
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Create a configuration for the given user against a local server (useful for testing)
    pub fn for_user(user_handle: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            user_handle: user_handle.into(),
            api: ApiConfig::with_url(api_url),
            push: PushChannelConfig::default(),
            timing: TimingConfig::default(),
            key_store_path: None,
            environment: Environment::Development,
            log_level: "info".to_string(),
        }
    }

    /// Cross-field validation
    pub fn validate(&self) -> ConfigResult<()> {
        if self.user_handle.is_empty() {
            return Err(ConfigError::ValidationError(
                "USER_HANDLE cannot be empty".to_string(),
            ));
        }
        if self.environment.is_production() && self.api.api_secret.is_none() {
            return Err(ConfigError::ValidationError(
                "API_SECRET is required in production".to_string(),
            ));
        }
        self.timing.validate()
    }

    /// Check if a durable key store is configured
    pub fn has_key_store_path(&self) -> bool {
        self.key_store_path.is_some()
    }

    /// File holding the local key pair, next to the key store
    pub fn identity_key_path(&self) -> Option<PathBuf> {
        self.key_store_path
            .as_ref()
            .map(|path| path.with_extension("identity.key"))
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "stage".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(format!("{}", Environment::Production), "production");
        assert_eq!(format!("{}", Environment::Staging), "staging");
        assert_eq!(format!("{}", Environment::Development), "development");
    }

    #[test]
    fn test_user_handle_is_required() {
        temp_env::with_vars_unset(["USER_HANDLE"], || {
            let result = ClientConfig::from_env();
            assert!(matches!(result, Err(ConfigError::MissingEnvVar(name)) if name == "USER_HANDLE"));
        });
    }

    #[test]
    fn test_from_env_uses_defaults() {
        temp_env::with_vars(
            [
                ("USER_HANDLE", Some("alice")),
                ("ENVIRONMENT", None),
                ("API_BASE_URL", None),
                ("API_SECRET", None),
                ("WS_URL", None),
                ("TYPING_THROTTLE_MS", None),
                ("TYPING_DEBOUNCE_MS", None),
                ("EXCHANGE_POLL_SECS", None),
                ("KEY_STORE_PATH", None),
            ],
            || {
                let config = ClientConfig::from_env().unwrap();
                assert_eq!(config.user_handle, "alice");
                assert_eq!(config.timing.typing_throttle_ms, 300);
                assert_eq!(config.timing.typing_debounce_ms, 1000);
                assert_eq!(config.timing.exchange_poll_secs, 30);
                assert!(!config.has_key_store_path());
                assert!(config.environment.is_development());
            },
        );
    }

    #[test]
    fn test_production_requires_api_secret() {
        temp_env::with_vars(
            [
                ("USER_HANDLE", Some("alice")),
                ("ENVIRONMENT", Some("production")),
                ("API_SECRET", None),
            ],
            || {
                let result = ClientConfig::from_env();
                assert!(matches!(result, Err(ConfigError::ValidationError(_))));
            },
        );
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        temp_env::with_var("TYPING_DEBOUNCE_MS", Some("soon"), || {
            let result: ConfigResult<u64> = parse_env("TYPING_DEBOUNCE_MS", 1000);
            assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "TYPING_DEBOUNCE_MS"));
        });
    }

    #[test]
    fn test_identity_key_path_sits_next_to_key_store() {
        let mut config = ClientConfig::for_user("alice", "http://localhost/api");
        assert_eq!(config.identity_key_path(), None);

        config.key_store_path = Some(PathBuf::from("/var/lib/sentinel/public_keys.json"));
        assert_eq!(
            config.identity_key_path(),
            Some(PathBuf::from("/var/lib/sentinel/public_keys.identity.key"))
        );
    }
}

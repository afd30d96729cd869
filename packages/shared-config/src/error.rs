//! Configuration error types

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Missing required environment variable
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable could not be parsed into the expected type
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Endpoint URL is malformed or uses the wrong scheme
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),

    /// Values parsed individually but are inconsistent together
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

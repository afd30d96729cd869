//! Error types for the real-time synchronization layer

use thiserror::Error;

/// Errors raised by the transport, dispatch chain and coordinators
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("failed to parse payload: {0}")]
    Parse(#[from] serde_json::Error),

    /// Server answered with `success: false`
    #[error("{message}")]
    Api { message: String },

    /// Server answered with a non-2xx status
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// A handler is already registered for this frame type
    #[error("a handler for frame type '{0}' is already registered")]
    DuplicateHandler(String),

    /// No pending key exchange with this id is visible
    #[error("no pending key exchange with id {0}")]
    UnknownExchange(String),

    /// A key exchange request was asked to leave a non-pending state
    #[error("key exchange {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    /// Key store could not be read or written
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Push channel is closed
    #[error("push channel is closed")]
    ChannelClosed,

    /// WebSocket protocol failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Invalid input provided to an operation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be applied
    #[error("configuration error: {0}")]
    Config(#[from] sentinel_shared_config::ConfigError),
}

impl RealtimeError {
    /// Check if this error is transient (the next attempt may succeed)
    ///
    /// Transient:
    /// - Timeouts
    /// - Transport errors (connect, timeout)
    /// - Server errors (5xx)
    /// - A closed push channel
    pub fn is_transient(&self) -> bool {
        match self {
            RealtimeError::Timeout | RealtimeError::ChannelClosed => true,
            RealtimeError::Status { status, .. } => *status >= 500,
            RealtimeError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            RealtimeError::WebSocket(_) => true,
            _ => false,
        }
    }

    /// Reason string suitable for showing to the user
    pub fn user_reason(&self) -> String {
        match self {
            RealtimeError::Api { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for real-time operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

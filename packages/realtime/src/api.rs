//! Fallback request/response client for the chat API

use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use sentinel_shared_config::ApiConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{RealtimeError, RealtimeResult};
use crate::frames::OutboundFrame;
use crate::models::{
    Ack, ApiEnvelope, ExchangeCall, ExchangeReply, KeyExchangeRequest, MarkReadRequest,
    PendingExchanges,
};

/// Maximum error body size kept in errors
const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Header carrying the shared API secret
const API_SECRET_HEADER: &str = "X-API-SECRET";

/// Header naming the local user
const USER_HANDLE_HEADER: &str = "X-User-Handle";

/// One-shot JSON calls against the chat API
///
/// `ApiClient` is `Clone + Send + Sync`; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http_client: Client,
    config: ApiConfig,
    user_handle: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("user_handle", &self.user_handle)
            .field("api_secret", &self.config.api_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    /// Create a new API client acting as `user_handle`
    ///
    /// # Errors
    /// Returns `RealtimeError::InvalidInput` if the handle is empty
    pub fn new(config: &ApiConfig, user_handle: impl Into<String>) -> RealtimeResult<Self> {
        let user_handle = user_handle.into();
        if user_handle.trim().is_empty() {
            return Err(RealtimeError::InvalidInput(
                "user handle cannot be empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Sentinel/1.0")
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
            user_handle,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Handle of the local user
    pub fn user_handle(&self) -> &str {
        &self.user_handle
    }

    /// Truncate error body, respecting UTF-8 boundaries
    fn truncate_error_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_SIZE {
            return body;
        }

        let truncate_at = body
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
            .last()
            .unwrap_or(0);

        format!("{}... (truncated)", &body[..truncate_at])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(USER_HANDLE_HEADER, &self.user_handle);
        match &self.config.api_secret {
            Some(secret) => request.header(API_SECRET_HEADER, secret),
            None => request,
        }
    }

    /// Send a request and unwrap the `{success, error}` envelope
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> RealtimeResult<T> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                RealtimeError::Timeout
            } else {
                RealtimeError::Http(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            // Error bodies may still carry a usable `error` reason
            if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<Ack>>(&text) {
                if let Some(message) = envelope.error {
                    return Err(RealtimeError::Api { message });
                }
            }
            return Err(RealtimeError::Status {
                status: status.as_u16(),
                body: Self::truncate_error_body(text),
            });
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&text)?;
        if !envelope.success {
            return Err(RealtimeError::Api {
                message: envelope
                    .error
                    .unwrap_or_else(|| "request was not successful".to_string()),
            });
        }
        Ok(envelope.data)
    }

    async fn post<B, T>(&self, url: String, body: &B) -> RealtimeResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.http_client.post(url).json(body)).await
    }

    /// Fallback path for a frame that could not go over the push channel
    #[instrument(skip(self), fields(kind = frame.kind()))]
    pub async fn send_frame(&self, frame: &OutboundFrame) -> RealtimeResult<()> {
        match frame {
            OutboundFrame::Typing { .. } => {
                let _: Ack = self.post(self.config.typing_url(), frame).await?;
                Ok(())
            }
            other => Err(RealtimeError::InvalidInput(format!(
                "'{}' frames need an open push channel",
                other.kind()
            ))),
        }
    }

    /// Tell the server the local user has read a message
    #[instrument(skip(self))]
    pub async fn mark_read(&self, message_id: &str, from_user: &str) -> RealtimeResult<()> {
        let body = MarkReadRequest {
            message_id: message_id.to_string(),
            from_user: from_user.to_string(),
        };
        let _: Ack = self.post(self.config.read_receipts_url(), &body).await?;
        debug!(message_id = %message_id, "Read receipt confirmed");
        Ok(())
    }

    /// Issue a key-exchange request or accept
    #[instrument(skip(self, call))]
    pub async fn exchange(&self, call: &ExchangeCall) -> RealtimeResult<ExchangeReply> {
        self.post(self.config.key_exchange_url(), call).await
    }

    /// List handshakes addressed to the local user
    #[instrument(skip(self))]
    pub async fn pending_exchanges(&self) -> RealtimeResult<Vec<KeyExchangeRequest>> {
        let request = self
            .http_client
            .get(self.config.key_exchange_url())
            .query(&[("action", "pending")]);
        let pending: PendingExchanges = self.execute(request).await?;
        Ok(pending.exchanges)
    }
}

//! Mock chat API server for testing fallback calls and key exchange
//!
//! Provides a [`MockChatApiServer`] that simulates the HTTP endpoints the
//! client falls back to when the push channel is down, plus the key-exchange
//! endpoints that are always request/response.

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock chat API server
///
/// This struct wraps a [`wiremock::MockServer`]. Every mock only matches
/// requests carrying the server's API secret in `X-API-SECRET`.
///
/// # Example
///
/// ```rust,ignore
/// use sentinel_test_utils::{MockChatApiServer, PendingExchangeFixture};
///
/// #[tokio::test]
/// async fn test_poll() {
///     let server = MockChatApiServer::start().await;
///     server
///         .mock_pending_exchanges(vec![PendingExchangeFixture::from_peer(7, "bob")])
///         .await;
///
///     // Configure ApiConfig::with_url(server.url()).with_secret(server.api_secret())
/// }
/// ```
pub struct MockChatApiServer {
    server: MockServer,
    api_secret: String,
}

impl MockChatApiServer {
    /// Start a new mock server with the default API secret
    pub async fn start() -> Self {
        Self::start_with_secret("test-api-secret").await
    }

    /// Start a new mock server with a custom API secret
    pub async fn start_with_secret(api_secret: &str) -> Self {
        let server = MockServer::start().await;
        Self {
            server,
            api_secret: api_secret.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the API secret
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    fn authorized(&self, http_method: &str, endpoint: &str) -> wiremock::MockBuilder {
        Mock::given(method(http_method))
            .and(path(format!("/{endpoint}")))
            .and(header("X-API-SECRET", self.api_secret.as_str()))
    }

    /// Mount a mock accepting typing updates
    pub async fn mock_typing_ok(&self) {
        self.authorized("POST", "typing.php")
            .respond_with(ok(json!({})))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a successful read confirmation
    pub async fn mock_mark_read_success(&self) {
        self.authorized("POST", "read_receipts.php")
            .respond_with(ok(json!({})))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a read confirmation the server refuses
    pub async fn mock_mark_read_failure(&self, reason: &str) {
        self.authorized("POST", "read_receipts.php")
            .respond_with(refused(reason))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for an unreachable read-receipt endpoint
    pub async fn mock_mark_read_unavailable(&self) {
        self.authorized("POST", "read_receipts.php")
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock where a handshake request is resolved on the spot
    pub async fn mock_exchange_auto_accepted(&self, peer_public_key: &str) {
        self.authorized("POST", "key_exchange.php")
            .and(body_partial_json(json!({"exchangeAction": "request"})))
            .respond_with(ok(json!({
                "status": "accepted",
                "publicKey": peer_public_key
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock where a handshake request waits for the peer
    pub async fn mock_exchange_pending(&self, exchange_id: i64) {
        self.authorized("POST", "key_exchange.php")
            .and(body_partial_json(json!({"exchangeAction": "request"})))
            .respond_with(ok(json!({
                "status": "pending",
                "exchangeId": exchange_id
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock refusing every handshake request or accept
    pub async fn mock_exchange_failure(&self, reason: &str) {
        self.authorized("POST", "key_exchange.php")
            .respond_with(refused(reason))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for a successful accept
    pub async fn mock_accept_success(&self, exchange_id: i64, peer_public_key: &str) {
        self.authorized("POST", "key_exchange.php")
            .and(body_partial_json(json!({
                "exchangeAction": "accept",
                "exchangeId": exchange_id
            })))
            .respond_with(ok(json!({
                "status": "accepted",
                "publicKey": peer_public_key
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for an accept whose reply carries no key
    ///
    /// The client then has to use the key listed with the pending request.
    pub async fn mock_accept_without_key(&self, exchange_id: i64) {
        self.authorized("POST", "key_exchange.php")
            .and(body_partial_json(json!({
                "exchangeAction": "accept",
                "exchangeId": exchange_id
            })))
            .respond_with(ok(json!({"status": "accepted"})))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock listing pending handshakes
    pub async fn mock_pending_exchanges(&self, exchanges: Vec<PendingExchangeFixture>) {
        self.pending_mock(exchanges)
            .mount(&self.server)
            .await;
    }

    /// Mount a mock listing pending handshakes for the next `times` polls only
    ///
    /// Later polls fall through to mocks mounted afterwards.
    pub async fn mock_pending_exchanges_times(
        &self,
        exchanges: Vec<PendingExchangeFixture>,
        times: u64,
    ) {
        self.pending_mock(exchanges)
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    fn pending_mock(&self, exchanges: Vec<PendingExchangeFixture>) -> Mock {
        let exchanges: Vec<Value> = exchanges.iter().map(|e| e.to_json()).collect();
        self.authorized("GET", "key_exchange.php")
            .and(query_param("action", "pending"))
            .respond_with(ok(json!({"exchanges": exchanges})))
    }

    /// Mount a mock for an unreachable pending-exchange query
    pub async fn mock_pending_unavailable(&self) {
        self.authorized("GET", "key_exchange.php")
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&self.server)
            .await;
    }

    /// JSON bodies received on an endpoint, in arrival order
    pub async fn received_bodies(&self, endpoint: &str) -> Vec<Value> {
        let wanted = format!("/{endpoint}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == wanted)
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Number of requests received on an endpoint
    pub async fn request_count(&self, endpoint: &str) -> usize {
        let wanted = format!("/{endpoint}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == wanted)
            .count()
    }
}

fn ok(mut data: Value) -> ResponseTemplate {
    if let Some(object) = data.as_object_mut() {
        object.insert("success".to_string(), Value::Bool(true));
    }
    ResponseTemplate::new(200).set_body_json(data)
}

fn refused(reason: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": false,
        "error": reason
    }))
}

/// Fixture for pending key-exchange entries
#[derive(Debug, Clone)]
pub struct PendingExchangeFixture {
    pub id: i64,
    pub from_handle: String,
    pub to_handle: String,
    pub public_key: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl PendingExchangeFixture {
    /// A pending request from `peer` without key material attached
    pub fn from_peer(id: i64, peer: &str) -> Self {
        Self {
            id,
            from_handle: peer.to_string(),
            to_handle: "alice".to_string(),
            public_key: None,
            status: "pending".to_string(),
            created_at: "2024-05-01 12:30:00".to_string(),
        }
    }

    /// Attach the requester's public key
    pub fn with_public_key(mut self, public_key: &str) -> Self {
        self.public_key = Some(public_key.to_string());
        self
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "fromHandle": self.from_handle,
            "toHandle": self.to_handle,
            "publicKey": self.public_key,
            "status": self.status,
            "createdAt": self.created_at
        })
    }
}

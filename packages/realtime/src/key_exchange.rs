//! Key-exchange handshake coordination
//!
//! Two flows meet here. As requester, the local user asks a peer for a
//! handshake; the server either resolves it on the spot (auto-accept, the
//! peer already consented) or keeps it pending on the peer's side. As
//! recipient, a background poll lists handshakes addressed to the local user
//! and each one is offered for accept or reject.
//!
//! Unlike typing and receipts, handshake failures are always shown to the
//! user: an unresolved handshake blocks encryption for that conversation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::ApiClient;
use crate::error::{RealtimeError, RealtimeResult};
use crate::identity::IdentityKeys;
use crate::key_store::KeyStore;
use crate::models::{ExchangeCall, ExchangeId, ExchangeStatus, KeyExchangeRequest};
use crate::view::{InteractionView, Notification};

/// Result of asking a peer for a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The server resolved the handshake immediately
    Accepted { public_key: String },
    /// The peer still has to accept
    Waiting,
}

/// Owns the visible pending handshakes and the peer key cache
pub struct KeyExchangeCoordinator {
    api: ApiClient,
    store: Arc<dyn KeyStore>,
    view: Arc<dyn InteractionView>,
    identity: OnceCell<IdentityKeys>,
    pending: Mutex<Vec<KeyExchangeRequest>>,
    /// Ids accepted or rejected this session; never offered again
    settled: Mutex<HashSet<ExchangeId>>,
    poll_interval: Duration,
    poller: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for KeyExchangeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyExchangeCoordinator")
            .field("user", &self.api.user_handle())
            .field("poll_interval", &self.poll_interval)
            .field("pending", &self.pending_exchanges().len())
            .field("polling", &self.is_polling())
            .finish()
    }
}

impl KeyExchangeCoordinator {
    pub fn new(
        api: ApiClient,
        store: Arc<dyn KeyStore>,
        view: Arc<dyn InteractionView>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            view,
            identity: OnceCell::new(),
            pending: Mutex::new(Vec::new()),
            settled: Mutex::new(HashSet::new()),
            poll_interval,
            poller: Mutex::new(None),
        }
    }

    /// Use existing key material instead of generating it on first use
    pub fn with_identity(mut self, identity: IdentityKeys) -> Self {
        self.identity = OnceCell::new_with(Some(identity));
        self
    }

    /// Local key material, generated on first use
    pub async fn ensure_identity(&self) -> &IdentityKeys {
        self.identity
            .get_or_init(|| async {
                let keys = IdentityKeys::generate();
                info!("Generated local key material");
                keys
            })
            .await
    }

    /// Ask `peer` for a handshake
    ///
    /// # Errors
    /// Any failure is also shown to the user with its reason.
    #[instrument(skip(self))]
    pub async fn request_exchange(&self, peer: &str) -> RealtimeResult<ExchangeOutcome> {
        let peer = peer.trim();
        if peer.is_empty() {
            return Err(self.surface(
                "Key exchange request failed",
                RealtimeError::InvalidInput("peer handle cannot be empty".to_string()),
            ));
        }

        let public_key = self.ensure_identity().await.public_key_base64();
        let call = ExchangeCall::Request {
            to_user_handle: peer.to_string(),
            public_key,
        };

        let reply = self
            .api
            .exchange(&call)
            .await
            .map_err(|e| self.surface("Key exchange request failed", e))?;

        let accepted = reply.is_accepted();
        match reply.public_key.filter(|_| accepted) {
            Some(peer_key) => {
                self.store_public_key(peer, &peer_key)
                    .map_err(|e| self.surface("Could not save public key", e))?;
                info!(peer = %peer, "Key exchange auto-accepted");
                self.view.notify(Notification::success(format!(
                    "Key exchange with {peer} completed"
                )));
                Ok(ExchangeOutcome::Accepted {
                    public_key: peer_key,
                })
            }
            None => {
                debug!(peer = %peer, status = ?reply.status, "Key exchange awaiting peer");
                self.view.notify(Notification::info(format!(
                    "Key exchange request sent to {peer}, waiting for them to accept"
                )));
                Ok(ExchangeOutcome::Waiting)
            }
        }
    }

    /// Refresh the visible pending set from the server
    ///
    /// # Errors
    /// Failures are also shown to the user with their reason.
    #[instrument(skip(self))]
    pub async fn poll_pending(&self) -> RealtimeResult<Vec<KeyExchangeRequest>> {
        self.refresh()
            .await
            .map_err(|e| self.surface("Could not load key exchange requests", e))
    }

    async fn refresh(&self) -> RealtimeResult<Vec<KeyExchangeRequest>> {
        let listed = self.api.pending_exchanges().await?;

        let fresh: Vec<KeyExchangeRequest> = {
            // A listing fetched before a local accept or reject may still
            // carry the settled id
            let settled = self.settled.lock().unwrap_or_else(|e| e.into_inner());
            listed
                .into_iter()
                .filter(|request| request.is_pending() && !settled.contains(&request.id))
                .collect()
        };

        let (added, removed) = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            let added: Vec<KeyExchangeRequest> = fresh
                .iter()
                .filter(|request| !pending.iter().any(|p| p.id == request.id))
                .cloned()
                .collect();
            let removed: Vec<ExchangeId> = pending
                .iter()
                .filter(|p| !fresh.iter().any(|request| request.id == p.id))
                .map(|p| p.id.clone())
                .collect();
            *pending = fresh.clone();
            (added, removed)
        };

        for id in &removed {
            self.view.remove_pending_exchange(id);
        }
        for request in &added {
            info!(exchange_id = %request.id, from = %request.from_handle, "Key exchange request received");
            self.view.show_pending_exchange(request);
        }

        Ok(fresh)
    }

    /// Accept a visible pending handshake
    ///
    /// Withdraws the pending item once the server confirms, stores the
    /// counterpart's key and refreshes the pending set.
    #[instrument(skip(self))]
    pub async fn accept(&self, id: &ExchangeId) -> RealtimeResult<()> {
        let request = self
            .find_pending(id)
            .ok_or_else(|| self.surface("Cannot accept", RealtimeError::UnknownExchange(id.to_string())))?;

        let public_key = self.ensure_identity().await.public_key_base64();
        let call = ExchangeCall::Accept {
            exchange_id: id.clone(),
            public_key,
        };

        let reply = self
            .api
            .exchange(&call)
            .await
            .map_err(|e| self.surface("Key exchange accept failed", e))?;

        let resolved = request
            .resolve(ExchangeStatus::Accepted)
            .map_err(|e| self.surface("Cannot accept", e))?;
        // Resolved on the server; never offer it again even if storing fails
        self.settle(id);

        match reply.public_key.or_else(|| resolved.public_key.clone()) {
            Some(peer_key) => self
                .store_public_key(&resolved.from_handle, &peer_key)
                .map_err(|e| self.surface("Could not save public key", e))?,
            None => warn!(exchange_id = %id, "Accepted key exchange carried no public key"),
        }

        info!(exchange_id = %id, peer = %resolved.from_handle, "Key exchange accepted");
        self.view.notify(Notification::success(format!(
            "Key exchange with {} accepted",
            resolved.from_handle
        )));

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh after accept failed");
        }
        Ok(())
    }

    /// Dismiss a visible pending handshake
    ///
    /// Nothing is sent to the server. The id stays settled for the rest of
    /// the session so polling does not offer it again.
    pub fn reject(&self, id: &ExchangeId) -> RealtimeResult<()> {
        let request = self
            .find_pending(id)
            .ok_or_else(|| self.surface("Cannot reject", RealtimeError::UnknownExchange(id.to_string())))?;
        let resolved = request
            .resolve(ExchangeStatus::Rejected)
            .map_err(|e| self.surface("Cannot reject", e))?;

        self.settle(id);

        info!(exchange_id = %id, peer = %resolved.from_handle, "Key exchange rejected");
        self.view.notify(Notification::info(format!(
            "Key exchange from {} rejected",
            resolved.from_handle
        )));
        Ok(())
    }

    /// Accepted public key of a peer
    pub fn get_public_key(&self, handle: &str) -> Option<String> {
        self.store.get(handle)
    }

    /// Record a peer's public key
    pub fn store_public_key(&self, handle: &str, public_key: &str) -> RealtimeResult<()> {
        self.store.set(handle, public_key)?;
        debug!(peer = %handle, "Stored public key");
        Ok(())
    }

    /// Snapshot of the visible pending handshakes
    pub fn pending_exchanges(&self) -> Vec<KeyExchangeRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn find_pending(&self, id: &ExchangeId) -> Option<KeyExchangeRequest> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|request| &request.id == id)
            .cloned()
    }

    /// Mark a handshake resolved and withdraw its pending item
    fn settle(&self, id: &ExchangeId) {
        self.settled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone());
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|request| &request.id != id);
        self.view.remove_pending_exchange(id);
    }

    fn surface(&self, context: &str, error: RealtimeError) -> RealtimeError {
        warn!(error = %error, "{}", context);
        self.view
            .notify(Notification::error(format!("{context}: {}", error.user_reason())));
        error
    }

    /// Start the background poll
    ///
    /// The first poll runs immediately. A previous poller, if any, is stopped.
    /// Poll failures are logged and the next tick proceeds independently.
    pub fn start_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token.clone())
        {
            previous.cancel();
        }

        let coordinator = Arc::downgrade(self);
        // interval() panics on a zero period
        let period = self.poll_interval.max(Duration::from_millis(1));
        info!(period_secs = period.as_secs_f64(), "Starting key exchange polling");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                if let Err(e) = coordinator.refresh().await {
                    warn!(error = %e, "Key exchange poll failed");
                }
            }
            debug!("Key exchange polling stopped");
        })
    }

    /// Stop the background poll
    pub fn stop_polling(&self) {
        if let Some(token) = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for KeyExchangeCoordinator {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_store::MemoryKeyStore;
    use crate::view::{NotificationLevel, NullView};
    use assert_matches::assert_matches;
    use sentinel_shared_config::ApiConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct NotificationLog(Mutex<Vec<Notification>>);

    impl InteractionView for NotificationLog {
        fn notify(&self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn coordinator(server: &MockServer, view: Arc<dyn InteractionView>) -> KeyExchangeCoordinator {
        let api = ApiClient::new(&ApiConfig::with_url(server.uri()), "alice").unwrap();
        KeyExchangeCoordinator::new(
            api,
            Arc::new(MemoryKeyStore::new()),
            view,
            Duration::from_secs(30),
        )
    }

    async fn mount_pending(server: &MockServer, exchanges: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/key_exchange.php"))
            .and(query_param("action", "pending"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "exchanges": exchanges})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_identity_is_generated_once() {
        let server = MockServer::start().await;
        let exchange = coordinator(&server, Arc::new(NullView));

        let first = exchange.ensure_identity().await.public_key_base64();
        let second = exchange.ensure_identity().await.public_key_base64();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_injected_identity_is_sent() {
        let server = MockServer::start().await;
        let identity = IdentityKeys::from_secret_bytes([9u8; 32]);
        let expected_key = identity.public_key_base64();

        Mock::given(method("POST"))
            .and(path("/key_exchange.php"))
            .and(body_partial_json(json!({
                "exchangeAction": "request",
                "toUserHandle": "bob",
                "publicKey": expected_key
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "status": "pending"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let exchange = coordinator(&server, Arc::new(NullView)).with_identity(identity);
        let outcome = exchange.request_exchange("bob").await.unwrap();
        assert_eq!(outcome, ExchangeOutcome::Waiting);
        assert!(exchange.pending_exchanges().is_empty());
        assert_eq!(exchange.get_public_key("bob"), None);
    }

    #[tokio::test]
    async fn test_empty_peer_is_rejected() {
        let server = MockServer::start().await;
        let view = Arc::new(NotificationLog::default());
        let exchange = coordinator(&server, view.clone());

        assert_matches!(
            exchange.request_exchange("  ").await,
            Err(RealtimeError::InvalidInput(_))
        );
        assert_eq!(view.0.lock().unwrap()[0].level, NotificationLevel::Error);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reject_is_local_and_sticky() {
        let server = MockServer::start().await;
        mount_pending(&server, json!([{"id": 3, "fromHandle": "mallory"}])).await;

        let exchange = coordinator(&server, Arc::new(NullView));
        assert_eq!(exchange.poll_pending().await.unwrap().len(), 1);

        exchange.reject(&ExchangeId::Number(3)).unwrap();
        assert!(exchange.pending_exchanges().is_empty());

        // The server still lists it; it stays settled
        assert!(exchange.poll_pending().await.unwrap().is_empty());

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.method.to_string() == "GET"));
    }

    #[tokio::test]
    async fn test_unknown_exchange() {
        let server = MockServer::start().await;
        let exchange = coordinator(&server, Arc::new(NullView));

        assert_matches!(
            exchange.accept(&ExchangeId::Number(99)).await,
            Err(RealtimeError::UnknownExchange(ref id)) if id == "99"
        );
        assert_matches!(
            exchange.reject(&ExchangeId::from("nope")),
            Err(RealtimeError::UnknownExchange(_))
        );
    }

    #[tokio::test]
    async fn test_poll_failure_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/key_exchange.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "error": "Not logged in"})),
            )
            .mount(&server)
            .await;

        let view = Arc::new(NotificationLog::default());
        let exchange = coordinator(&server, view.clone());

        assert_matches!(exchange.poll_pending().await, Err(RealtimeError::Api { .. }));
        let notes = view.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].message.ends_with("Not logged in"));
    }

    #[tokio::test]
    async fn test_non_pending_entries_are_not_offered() {
        let server = MockServer::start().await;
        mount_pending(
            &server,
            json!([
                {"id": 1, "fromHandle": "bob", "status": "accepted"},
                {"id": 2, "fromHandle": "carol", "status": "pending"}
            ]),
        )
        .await;

        let exchange = coordinator(&server, Arc::new(NullView));
        let pending = exchange.poll_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].from_handle, "carol");
    }

    #[tokio::test]
    async fn test_stop_polling() {
        let server = MockServer::start().await;
        mount_pending(&server, json!([])).await;

        let exchange = Arc::new(coordinator(&server, Arc::new(NullView)));
        let task = exchange.start_polling();
        assert!(exchange.is_polling());

        exchange.stop_polling();
        assert!(!exchange.is_polling());
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[derive(Default)]
    struct PendingLog(Mutex<Vec<String>>);

    impl InteractionView for PendingLog {
        fn show_pending_exchange(&self, request: &KeyExchangeRequest) {
            self.0.lock().unwrap().push(format!("show:{}", request.id));
        }

        fn remove_pending_exchange(&self, id: &ExchangeId) {
            self.0.lock().unwrap().push(format!("remove:{id}"));
        }
    }

    #[tokio::test]
    async fn test_stale_listing_does_not_revive_accepted_exchange() {
        let server = MockServer::start().await;
        // The first two listings are slow and still show exchange 7
        Mock::given(method("GET"))
            .and(path("/key_exchange.php"))
            .and(query_param("action", "pending"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "success": true,
                        "exchanges": [{"id": 7, "fromHandle": "bob", "publicKey": "BOBKEY"}]
                    }))
                    .set_delay(Duration::from_millis(400)),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        mount_pending(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path("/key_exchange.php"))
            .and(body_partial_json(json!({"exchangeAction": "accept", "exchangeId": 7})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "status": "accepted"})),
            )
            .mount(&server)
            .await;

        let view = Arc::new(PendingLog::default());
        let exchange = Arc::new(coordinator(&server, view.clone()));
        assert_eq!(exchange.poll_pending().await.unwrap().len(), 1);

        let in_flight = {
            let exchange = Arc::clone(&exchange);
            tokio::spawn(async move { exchange.poll_pending().await })
        };
        // Let the second listing reach the server before accepting
        tokio::time::sleep(Duration::from_millis(100)).await;

        exchange.accept(&ExchangeId::Number(7)).await.unwrap();
        assert!(exchange.pending_exchanges().is_empty());

        let stale = in_flight.await.unwrap().unwrap();
        assert!(stale.is_empty());
        assert!(exchange.pending_exchanges().is_empty());
        assert_eq!(exchange.get_public_key("bob").as_deref(), Some("BOBKEY"));
        assert_eq!(*view.0.lock().unwrap(), vec!["show:7", "remove:7"]);
    }

    #[tokio::test]
    async fn test_reject_errors_are_shown() {
        let server = MockServer::start().await;
        let view = Arc::new(NotificationLog::default());
        let exchange = coordinator(&server, view.clone());

        assert!(exchange.reject(&ExchangeId::Number(4)).is_err());

        let notes = view.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert!(notes[0].message.starts_with("Cannot reject"));
    }
}

//! Common test utilities for realtime integration tests
//!
//! This module provides a recording view and helpers for wiring
//! coordinators against the mock servers.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentinel_realtime::{
    ApiClient, ExchangeId, InteractionView, KeyExchangeRequest, Notification, NotificationLevel,
    ReceiptMark,
};
use sentinel_shared_config::ApiConfig;
use sentinel_test_utils::MockChatApiServer;

pub use sentinel_test_utils::{MockPushServer, PendingExchangeFixture};

/// Everything the coordinators asked the view to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    ShowTyping(String),
    HideTyping(String),
    Receipt(String, ReceiptMark),
    ShowPending(ExchangeId),
    RemovePending(ExchangeId),
    Notify(NotificationLevel, String),
}

/// View that records every call
#[derive(Debug, Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(NotificationLevel, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ViewEvent::Notify(level, message) => Some((level, message)),
                _ => None,
            })
            .collect()
    }

    pub fn last_notification(&self) -> Option<(NotificationLevel, String)> {
        self.notifications().pop()
    }

    /// Wait until an event matching `predicate` was recorded
    pub async fn wait_for(&self, predicate: impl Fn(&ViewEvent) -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.events().iter().any(&predicate) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl InteractionView for RecordingView {
    fn show_typing(&self, peer: &str) {
        self.record(ViewEvent::ShowTyping(peer.to_string()));
    }

    fn hide_typing(&self, peer: &str) {
        self.record(ViewEvent::HideTyping(peer.to_string()));
    }

    fn render_receipt(&self, message_id: &str, mark: ReceiptMark) {
        self.record(ViewEvent::Receipt(message_id.to_string(), mark));
    }

    fn show_pending_exchange(&self, request: &KeyExchangeRequest) {
        self.record(ViewEvent::ShowPending(request.id.clone()));
    }

    fn remove_pending_exchange(&self, id: &ExchangeId) {
        self.record(ViewEvent::RemovePending(id.clone()));
    }

    fn notify(&self, notification: Notification) {
        self.record(ViewEvent::Notify(notification.level, notification.message));
    }
}

/// API client acting as "alice" against the mock server
pub fn api_client(server: &MockChatApiServer) -> ApiClient {
    let config = ApiConfig::with_url(server.url()).with_secret(server.api_secret());
    ApiClient::new(&config, "alice").unwrap()
}

/// API client pointed at a port nothing listens on
pub fn unreachable_api_client() -> ApiClient {
    let mut config = ApiConfig::with_url("http://127.0.0.1:9");
    config.timeout_secs = 2;
    ApiClient::new(&config, "alice").unwrap()
}

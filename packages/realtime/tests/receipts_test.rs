//! Integration tests for read receipts
//!
//! Covers the confirm-then-flip read path against the mock chat API and
//! inbound receipts routed through the dispatch chain.

mod common;

use std::sync::Arc;

use common::{api_client, unreachable_api_client, RecordingView, ViewEvent};
use sentinel_realtime::{MessageDispatchChain, ReadReceiptTracker, ReceiptMark};
use sentinel_test_utils::MockChatApiServer;
use serde_json::json;

#[tokio::test]
async fn test_mark_read_network_failure_keeps_sent() {
    let view = RecordingView::new();
    let receipts = ReadReceiptTracker::new(unreachable_api_client(), view.clone());

    assert_eq!(receipts.render("m1", false, true), Some(ReceiptMark::Sent));
    assert!(!receipts.mark_as_read("m1", "bob").await);

    assert_eq!(receipts.mark("m1"), Some(ReceiptMark::Sent));
    assert_eq!(
        view.events(),
        vec![ViewEvent::Receipt("m1".to_string(), ReceiptMark::Sent)]
    );
}

#[tokio::test]
async fn test_mark_read_server_error_keeps_state() {
    let server = MockChatApiServer::start().await;
    server.mock_mark_read_unavailable().await;

    let view = RecordingView::new();
    let receipts = ReadReceiptTracker::new(api_client(&server), view.clone());

    assert!(!receipts.mark_as_read("m5", "bob").await);
    assert_eq!(receipts.mark("m5"), None);
    assert!(view.events().is_empty());
}

#[tokio::test]
async fn test_mark_read_success_sends_wire_body() {
    let server = MockChatApiServer::start().await;
    server.mock_mark_read_success().await;

    let view = RecordingView::new();
    let receipts = ReadReceiptTracker::new(api_client(&server), view.clone());

    assert!(receipts.mark_as_read("m9", "bob").await);

    assert_eq!(receipts.mark("m9"), Some(ReceiptMark::Read));
    assert_eq!(
        server.received_bodies("read_receipts.php").await,
        vec![json!({"messageId": "m9", "fromUser": "bob"})]
    );
    assert_eq!(
        view.events(),
        vec![ViewEvent::Receipt("m9".to_string(), ReceiptMark::Read)]
    );
}

#[tokio::test]
async fn test_inbound_receipts_through_dispatch_chain() {
    let server = MockChatApiServer::start().await;
    let view = RecordingView::new();
    let receipts = Arc::new(ReadReceiptTracker::new(api_client(&server), view.clone()));
    let chain = MessageDispatchChain::new();
    receipts.register(&chain).unwrap();

    receipts.render("m1", false, true);
    receipts.render("m2", false, true);

    chain.dispatch_text(r#"{"type":"read_receipt","messageId":"m1"}"#);
    chain.dispatch_text(r#"{"type":"read_receipt","messageId":"m1","isRead":false}"#);
    chain.dispatch_text(r#"{"type":"read_receipt","messageId":"m2","isRead":false}"#);

    assert_eq!(receipts.mark("m1"), Some(ReceiptMark::Read));
    assert_eq!(receipts.mark("m2"), Some(ReceiptMark::Sent));

    // Re-rendering after the inbound receipt keeps the read marker
    assert_eq!(receipts.render("m1", false, true), Some(ReceiptMark::Read));
}

#[tokio::test]
async fn test_second_tracker_cannot_claim_receipts() {
    let server = MockChatApiServer::start().await;
    let chain = MessageDispatchChain::new();

    let first = Arc::new(ReadReceiptTracker::new(api_client(&server), RecordingView::new()));
    let second = Arc::new(ReadReceiptTracker::new(api_client(&server), RecordingView::new()));

    first.register(&chain).unwrap();
    assert!(second.register(&chain).is_err());

    chain.dispatch(&json!({"type": "read_receipt", "messageId": "m3"}));
    assert_eq!(first.mark("m3"), Some(ReceiptMark::Read));
    assert_eq!(second.mark("m3"), None);
}

//! Shared test utilities for the Sentinel workspace
//!
//! This crate provides mock implementations of the chat server for testing
//! without a running backend.
//!
//! # Mock Services
//!
//! - [`MockChatApiServer`] - Mock HTTP API (typing, read receipts, key exchange)
//! - [`MockPushServer`] - Local WebSocket server standing in for the push channel
//!
//! # Example
//!
//! ```rust,ignore
//! use sentinel_test_utils::{MockChatApiServer, MockPushServer};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let api = MockChatApiServer::start().await;
//!     api.mock_typing_ok().await;
//!
//!     let push = MockPushServer::start().await;
//!     // Use api.url() and push.url() to configure the client
//! }
//! ```

mod chat_api;
mod push;

pub use chat_api::{MockChatApiServer, PendingExchangeFixture};
pub use push::MockPushServer;

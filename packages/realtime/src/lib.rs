//! Real-time interaction sync for the Sentinel chat client
//!
//! This crate keeps a user's view of ephemeral conversation state in sync
//! with the server over one shared push channel:
//!
//! - [`TypingCoordinator`] - throttled/debounced typing presence per conversation
//! - [`ReadReceiptTracker`] - monotonic read receipts on the user's own messages
//! - [`KeyExchangeCoordinator`] - request/accept/reject key-exchange handshakes
//!
//! Outbound events go through [`TransportAdapter`], which falls back to the
//! HTTP API ([`ApiClient`]) when the [`PushChannel`] is down. Inbound frames
//! enter through a single [`MessageDispatchChain`].
//!
//! # Thread Safety
//!
//! Every coordinator is `Send + Sync` and is meant to be shared behind an
//! `Arc`. Per-conversation and per-message state is guarded internally.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sentinel_realtime::{
//!     ApiClient, KeyExchangeCoordinator, MemoryKeyStore, MessageDispatchChain,
//!     PushChannel, ReadReceiptTracker, TracingView, TransportAdapter, TypingCoordinator,
//! };
//! use sentinel_shared_config::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::for_user("alice", "http://localhost/iChat/api");
//! let api = ApiClient::new(&config.api, &config.user_handle)?;
//! let view = Arc::new(TracingView);
//!
//! let dispatch = Arc::new(MessageDispatchChain::new());
//! let transport = Arc::new(TransportAdapter::new(api.clone()));
//!
//! let typing = Arc::new(TypingCoordinator::new(transport.clone(), view.clone(), config.timing));
//! typing.register(&dispatch)?;
//! let receipts = Arc::new(ReadReceiptTracker::new(api.clone(), view.clone()));
//! receipts.register(&dispatch)?;
//!
//! let (channel, _session) = PushChannel::connect(
//!     &config.push,
//!     &config.user_handle,
//!     config.api.api_secret.as_deref(),
//!     dispatch.clone(),
//! )
//! .await?;
//! transport.attach_channel(channel);
//!
//! typing.input("bob").await;
//!
//! let exchange = Arc::new(KeyExchangeCoordinator::new(
//!     api,
//!     Arc::new(MemoryKeyStore::new()),
//!     view,
//!     config.timing.exchange_poll_interval(),
//! ));
//! exchange.start_polling();
//! exchange.request_exchange("bob").await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod channel;
mod dispatch;
mod error;
mod frames;
mod identity;
mod key_exchange;
mod key_store;
mod models;
mod receipts;
mod transport;
mod typing;
mod view;

pub use api::ApiClient;
pub use channel::PushChannel;
pub use dispatch::{FrameHandler, MessageDispatchChain};
pub use error::{RealtimeError, RealtimeResult};
pub use frames::{
    frame_type, ErrorFrame, OutboundFrame, ReadReceiptFrame, TypingFrame, READ_RECEIPT_FRAME,
    TYPING_FRAME,
};
pub use identity::IdentityKeys;
pub use key_exchange::{ExchangeOutcome, KeyExchangeCoordinator};
pub use key_store::{FileKeyStore, KeyStore, MemoryKeyStore};
pub use models::{
    ExchangeCall, ExchangeId, ExchangeReply, ExchangeStatus, KeyExchangeRequest, MarkReadRequest,
    Message, ReceiptMark,
};
pub use receipts::ReadReceiptTracker;
pub use transport::TransportAdapter;
pub use typing::TypingCoordinator;
pub use view::{InteractionView, Notification, NotificationLevel, NullView, TracingView};

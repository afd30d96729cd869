//! UI capability consumed by the coordinators
//!
//! The coordinators never draw anything themselves. They drive an injected
//! [`InteractionView`], which a front-end implements for whichever surface it
//! owns (terminal, desktop window, test recorder).

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::models::{ExchangeId, KeyExchangeRequest, ReceiptMark};

/// Severity of a user-visible notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A "show notification" request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

/// Rendering surface for typing indicators, receipts and handshakes
///
/// Every method defaults to a no-op so a front-end only implements the
/// pieces it actually shows.
pub trait InteractionView: Send + Sync {
    /// Show the "peer is typing" indicator
    fn show_typing(&self, _peer: &str) {}

    /// Hide the "peer is typing" indicator
    fn hide_typing(&self, _peer: &str) {}

    /// Replace the receipt marker of a message
    fn render_receipt(&self, _message_id: &str, _mark: ReceiptMark) {}

    /// Offer Accept/Reject for an inbound handshake
    fn show_pending_exchange(&self, _request: &KeyExchangeRequest) {}

    /// Withdraw the affordance for a handshake
    fn remove_pending_exchange(&self, _id: &ExchangeId) {}

    /// Show a transient notification
    fn notify(&self, _notification: Notification) {}
}

/// View that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl InteractionView for NullView {}

/// View that renders everything into the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingView;

impl InteractionView for TracingView {
    fn show_typing(&self, peer: &str) {
        info!(peer = %peer, "{} is typing...", peer);
    }

    fn hide_typing(&self, peer: &str) {
        debug!(peer = %peer, "Typing indicator hidden");
    }

    fn render_receipt(&self, message_id: &str, mark: ReceiptMark) {
        info!(message_id = %message_id, mark = %mark, "{} {}", message_id, mark.glyph());
    }

    fn show_pending_exchange(&self, request: &KeyExchangeRequest) {
        info!(
            exchange_id = %request.id,
            from = %request.from_handle,
            "Key exchange request from {} (/accept {} or /reject {})",
            request.from_handle,
            request.id,
            request.id
        );
    }

    fn remove_pending_exchange(&self, id: &ExchangeId) {
        debug!(exchange_id = %id, "Pending key exchange withdrawn");
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => error!("{}", notification.message),
            NotificationLevel::Warning => warn!("{}", notification.message),
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(level = %notification.level, "{}", notification.message)
            }
        }
    }
}

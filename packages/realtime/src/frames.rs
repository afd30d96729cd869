//! Push channel frame types
//!
//! Every frame on the shared connection is a JSON object discriminated by
//! its `type` field. Outbound frames are produced by the coordinators;
//! inbound frames are routed by [`crate::MessageDispatchChain`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Frame type for typing updates (both directions)
pub const TYPING_FRAME: &str = "typing";

/// Frame type for inbound read receipts
pub const READ_RECEIPT_FRAME: &str = "read_receipt";

// =============================================================================
// Client -> Server
// =============================================================================

/// Frames sent by this client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// The local user started or stopped typing in a conversation
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_with: String,
        is_typing: bool,
    },

    /// Announce presence right after connecting
    PresenceUpdate { status: String },

    /// Keepalive
    Ping,
}

impl OutboundFrame {
    pub fn typing(conversation_with: impl Into<String>, is_typing: bool) -> Self {
        Self::Typing {
            conversation_with: conversation_with.into(),
            is_typing,
        }
    }

    pub fn online() -> Self {
        Self::PresenceUpdate {
            status: "online".to_string(),
        }
    }

    /// Frame type discriminator, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Typing { .. } => TYPING_FRAME,
            Self::PresenceUpdate { .. } => "presence_update",
            Self::Ping => "ping",
        }
    }

    /// Whether the frame only makes sense on a live connection
    ///
    /// Keepalive and presence frames have no fallback-call equivalent.
    pub fn requires_channel(&self) -> bool {
        !matches!(self, Self::Typing { .. })
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// A peer's typing notification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingFrame {
    /// Handle of the peer who is typing
    #[serde(rename = "fromUser", alias = "userHandle")]
    pub from_user: String,

    /// Absent means the peer is typing
    #[serde(rename = "isTyping", default = "default_true")]
    pub is_typing: bool,
}

/// Remote confirmation that a message was read
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadReceiptFrame {
    #[serde(rename = "messageId", deserialize_with = "string_or_number")]
    pub message_id: String,

    /// Absent means the message was read
    #[serde(rename = "isRead", default = "default_true")]
    pub is_read: bool,
}

/// Server-side error notice
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    #[serde(default = "unknown_error")]
    pub message: String,
}

/// Extract the `type` discriminator of a raw frame
pub fn frame_type(frame: &Value) -> Option<&str> {
    frame.get("type").and_then(Value::as_str)
}

fn default_true() -> bool {
    true
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

/// Accept ids sent either as JSON strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

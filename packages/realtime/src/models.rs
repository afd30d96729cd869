//! Fallback API payloads and domain records

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{RealtimeError, RealtimeResult};

// =============================================================================
// Response envelope
// =============================================================================

/// Every fallback call answers with `{success, error?, ...}`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

/// Body-less acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {}

// =============================================================================
// Read receipts
// =============================================================================

/// Remote "mark read" call body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_id: String,
    pub from_user: String,
}

/// Receipt marker shown on the user's own outgoing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptMark {
    /// Delivered, not yet read (one mark)
    Sent,
    /// Read by the recipient (two marks)
    Read,
}

impl ReceiptMark {
    pub fn from_read(is_read: bool) -> Self {
        if is_read {
            Self::Read
        } else {
            Self::Sent
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read)
    }

    /// Glyph used by text front-ends
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Sent => "✓",
            Self::Read => "✓✓",
        }
    }
}

impl fmt::Display for ReceiptMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// Read state of a single message as known to this client
///
/// `read_at` is monotonic: once set it is never cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub is_own_message: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: impl Into<String>, is_own_message: bool) -> Self {
        Self {
            id: id.into(),
            is_own_message,
            read_at: None,
        }
    }

    /// Record the read time; earlier reads win
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.read_at.is_some() {
            return false;
        }
        self.read_at = Some(at);
        true
    }

    pub fn mark(&self) -> ReceiptMark {
        ReceiptMark::from_read(self.read_at.is_some())
    }
}

// =============================================================================
// Key exchange
// =============================================================================

/// Server-assigned handshake id, numeric or textual on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExchangeId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ExchangeId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for ExchangeId {
    fn from(id: &str) -> Self {
        id.parse().map(Self::Number).unwrap_or_else(|_| Self::Text(id.to_string()))
    }
}

/// Handshake lifecycle; leaves `Pending` exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl ExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key-exchange handshake as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyExchangeRequest {
    pub id: ExchangeId,
    pub from_handle: String,
    #[serde(default)]
    pub to_handle: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub status: ExchangeStatus,
    #[serde(default, deserialize_with = "lenient_timestamp", skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl KeyExchangeRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ExchangeStatus::Pending
    }

    /// Produce the resolved form of this request
    ///
    /// The receiver is left untouched; only a `Pending` request may resolve,
    /// and only to `Accepted` or `Rejected`.
    pub fn resolve(&self, status: ExchangeStatus) -> RealtimeResult<Self> {
        if !self.is_pending() || status == ExchangeStatus::Pending {
            return Err(RealtimeError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status.as_str(),
                to: status.as_str(),
            });
        }
        Ok(Self {
            status,
            ..self.clone()
        })
    }
}

/// Body of the request/accept call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "exchangeAction", rename_all = "lowercase")]
pub enum ExchangeCall {
    #[serde(rename_all = "camelCase")]
    Request {
        to_user_handle: String,
        public_key: String,
    },
    #[serde(rename_all = "camelCase")]
    Accept {
        exchange_id: ExchangeId,
        public_key: String,
    },
}

/// Answer to a request/accept call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub exchange_id: Option<ExchangeId>,
    #[serde(default)]
    pub from_handle: Option<String>,
}

impl ExchangeReply {
    /// Whether the server resolved the handshake on the spot
    pub fn is_accepted(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(ExchangeStatus::Accepted.as_str()))
    }
}

/// Answer to the pending-exchange query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingExchanges {
    #[serde(default)]
    pub exchanges: Vec<KeyExchangeRequest>,
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC); anything else becomes `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }))
}

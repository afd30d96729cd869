//! Read receipts
//!
//! Tracks the read state of messages this client has rendered. Read state
//! only ever moves forward: a message that has been read stays read no
//! matter what arrives later.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::api::ApiClient;
use crate::dispatch::MessageDispatchChain;
use crate::error::RealtimeResult;
use crate::frames::{ReadReceiptFrame, READ_RECEIPT_FRAME};
use crate::models::{Message, ReceiptMark};
use crate::view::InteractionView;

/// Owns per-message read state and its receipt markers
pub struct ReadReceiptTracker {
    api: ApiClient,
    view: Arc<dyn InteractionView>,
    messages: Mutex<HashMap<String, Message>>,
}

impl std::fmt::Debug for ReadReceiptTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadReceiptTracker")
            .field("tracked", &self.messages.lock().map(|m| m.len()).unwrap_or(0))
            .finish()
    }
}

impl ReadReceiptTracker {
    pub fn new(api: ApiClient, view: Arc<dyn InteractionView>) -> Self {
        Self {
            api,
            view,
            messages: Mutex::new(HashMap::new()),
        }
    }

    /// Claim inbound `read_receipt` frames on the dispatch chain
    pub fn register(self: &Arc<Self>, chain: &MessageDispatchChain) -> RealtimeResult<()> {
        let tracker = Arc::clone(self);
        chain.register(READ_RECEIPT_FRAME, move |frame: &Value| {
            tracker.handle_frame(frame)
        })
    }

    /// Render the receipt marker of a message
    ///
    /// Only the user's own messages carry a marker; `None` is returned for
    /// everything else. Rendering again replaces the marker, and a message
    /// already known to be read keeps its read marker.
    pub fn render(&self, message_id: &str, is_read: bool, is_own_message: bool) -> Option<ReceiptMark> {
        if !is_own_message {
            return None;
        }

        let mark = {
            let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
            let message = messages
                .entry(message_id.to_string())
                .or_insert_with(|| Message::new(message_id, true));
            if is_read {
                message.mark_read(Utc::now());
            }
            message.mark()
        };

        self.view.render_receipt(message_id, mark);
        Some(mark)
    }

    /// Confirm to the server that the local user read a message
    ///
    /// The local state only flips to read once the server accepted the call.
    /// Failures are logged and leave everything unchanged.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, message_id: &str, from_user: &str) -> bool {
        if let Err(e) = self.api.mark_read(message_id, from_user).await {
            warn!(error = %e, message_id = %message_id, "Failed to confirm read receipt");
            return false;
        }

        {
            let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
            messages
                .entry(message_id.to_string())
                .or_insert_with(|| Message::new(message_id, false))
                .mark_read(Utc::now());
        }
        self.view.render_receipt(message_id, ReceiptMark::Read);
        true
    }

    /// Apply an inbound `read_receipt` frame
    pub fn handle_frame(&self, frame: &Value) {
        let frame: ReadReceiptFrame = match serde_json::from_value(frame.clone()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Malformed read receipt frame");
                return;
            }
        };

        if !frame.is_read {
            // Read state never moves backwards, and unknown messages are not tracked
            debug!(message_id = %frame.message_id, "Ignoring unread notice");
            return;
        }

        let newly_read = self
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(frame.message_id.clone())
            .or_insert_with(|| Message::new(frame.message_id.as_str(), true))
            .mark_read(Utc::now());

        if newly_read {
            self.view.render_receipt(&frame.message_id, ReceiptMark::Read);
        }
    }

    /// Current marker of a tracked message
    pub fn mark(&self, message_id: &str) -> Option<ReceiptMark> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(message_id)
            .map(Message::mark)
    }

    /// Stop tracking a message that is no longer shown
    pub fn forget(&self, message_id: &str) -> bool {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(message_id)
            .is_some()
    }

    /// Number of tracked messages
    pub fn tracked(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot of a tracked message
    pub fn message(&self, message_id: &str) -> Option<Message> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(message_id)
            .cloned()
    }
}

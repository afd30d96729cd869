//! Single entry point for inbound push-channel frames
//!
//! Consumers register one handler per frame `type`. A frame is routed to the
//! handler registered for its type, or to the default handler when none is.
//! Registration only ever adds: a later consumer can never displace an
//! earlier one, and claiming a type twice is rejected at registration time.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{RealtimeError, RealtimeResult};
use crate::frames::{frame_type, ErrorFrame};

/// Consumer of inbound frames of one type
pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: &Value);
}

impl<F> FrameHandler for F
where
    F: Fn(&Value) + Send + Sync,
{
    fn handle(&self, frame: &Value) {
        self(frame)
    }
}

/// Ordered `(type, handler)` registry with a default fallthrough
pub struct MessageDispatchChain {
    handlers: RwLock<Vec<(String, Arc<dyn FrameHandler>)>>,
    fallback: Arc<dyn FrameHandler>,
}

impl fmt::Debug for MessageDispatchChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatchChain")
            .field("registered", &self.registered_types())
            .finish()
    }
}

impl Default for MessageDispatchChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatchChain {
    /// Create a chain whose default handler logs unclaimed frames
    pub fn new() -> Self {
        Self::with_fallback(log_unhandled)
    }

    /// Create a chain with a custom default handler
    pub fn with_fallback(fallback: impl FrameHandler + 'static) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            fallback: Arc::new(fallback),
        }
    }

    /// Claim a frame type
    ///
    /// # Errors
    /// - `RealtimeError::InvalidInput` if the type is empty
    /// - `RealtimeError::DuplicateHandler` if the type is already claimed
    pub fn register(
        &self,
        frame_type: impl Into<String>,
        handler: impl FrameHandler + 'static,
    ) -> RealtimeResult<()> {
        let frame_type = frame_type.into();
        if frame_type.trim().is_empty() {
            return Err(RealtimeError::InvalidInput(
                "frame type cannot be empty".to_string(),
            ));
        }

        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if handlers.iter().any(|(registered, _)| *registered == frame_type) {
            return Err(RealtimeError::DuplicateHandler(frame_type));
        }

        debug!(frame_type = %frame_type, position = handlers.len(), "Registered frame handler");
        handlers.push((frame_type, Arc::new(handler)));
        Ok(())
    }

    /// Frame types in registration order
    pub fn registered_types(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(frame_type, _)| frame_type.clone())
            .collect()
    }

    /// Check if a frame type is claimed
    pub fn is_registered(&self, frame_type: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|(registered, _)| registered == frame_type)
    }

    /// Route a parsed frame to exactly one handler
    pub fn dispatch(&self, frame: &Value) {
        let handler = frame_type(frame).and_then(|kind| {
            self.handlers
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|(registered, _)| registered == kind)
                .map(|(_, handler)| Arc::clone(handler))
        });

        // The lock is released before running the handler so a handler may
        // register further consumers.
        match handler {
            Some(handler) => handler.handle(frame),
            None => self.fallback.handle(frame),
        }
    }

    /// Parse and route a raw text frame
    pub fn dispatch_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                let preview: String = text.chars().take(100).collect();
                warn!(error = %e, preview = %preview, "Received non-JSON frame");
            }
        }
    }
}

/// Default handler: surface server errors, drop keepalive replies, log the rest
fn log_unhandled(frame: &Value) {
    match frame_type(frame) {
        Some("error") => {
            let message = serde_json::from_value::<ErrorFrame>(frame.clone())
                .map(|f| f.message)
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(message = %message, "Push channel error frame");
        }
        Some("pong") => {}
        Some(other) => debug!(frame_type = %other, "No handler for frame type"),
        None => debug!("Frame without type discriminator"),
    }
}

//! Outbound event routing
//!
//! [`TransportAdapter::send`] prefers the shared push channel and falls back
//! to a one-shot API call when the channel is absent or closed. Fire-and-forget
//! signals never fail their caller: a failed fallback is logged and dropped.

use std::sync::RwLock;

use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::channel::PushChannel;
use crate::frames::OutboundFrame;

/// Routes outbound frames over the push channel or the fallback API
#[derive(Debug)]
pub struct TransportAdapter {
    channel: RwLock<Option<PushChannel>>,
    api: ApiClient,
}

impl TransportAdapter {
    /// Create an adapter with no push channel attached yet
    pub fn new(api: ApiClient) -> Self {
        Self {
            channel: RwLock::new(None),
            api,
        }
    }

    /// Create an adapter already bound to a push channel
    pub fn with_channel(api: ApiClient, channel: PushChannel) -> Self {
        Self {
            channel: RwLock::new(Some(channel)),
            api,
        }
    }

    /// Attach (or replace) the push channel
    pub fn attach_channel(&self, channel: PushChannel) {
        *self.channel.write().unwrap_or_else(|e| e.into_inner()) = Some(channel);
    }

    /// Detach the push channel, returning it if one was attached
    pub fn detach_channel(&self) -> Option<PushChannel> {
        self.channel.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Check if the push channel is attached and open
    pub fn is_connected(&self) -> bool {
        self.open_channel().is_some()
    }

    /// Fallback API client, also used for request/response calls
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn open_channel(&self) -> Option<PushChannel> {
        self.channel
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|channel| channel.is_open())
            .cloned()
    }

    /// Emit a frame; never fails
    pub async fn send(&self, frame: OutboundFrame) {
        let frame = match self.open_channel() {
            Some(channel) => match channel.send(frame.clone()) {
                Ok(()) => {
                    debug!(kind = frame.kind(), "Frame pushed");
                    return;
                }
                // Closed between the check and the send
                Err(_) => frame,
            },
            None => frame,
        };

        if frame.requires_channel() {
            debug!(kind = frame.kind(), "Push channel closed, dropping frame");
            return;
        }

        if let Err(e) = self.api.send_frame(&frame).await {
            warn!(error = %e, kind = frame.kind(), "Fallback call failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_shared_config::ApiConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> ApiClient {
        ApiClient::new(&ApiConfig::with_url(server.uri()), "alice").unwrap()
    }

    #[tokio::test]
    async fn test_open_channel_is_preferred() {
        let server = MockServer::start().await;
        let (channel, mut rx) = PushChannel::bridged();
        let transport = TransportAdapter::with_channel(api(&server), channel);

        transport.send(OutboundFrame::typing("bob", true)).await;

        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::typing("bob", true));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_uses_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/typing.php"))
            .and(body_json(
                json!({"type": "typing", "conversationWith": "bob", "isTyping": false}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let (channel, _rx) = PushChannel::bridged();
        channel.close();
        let transport = TransportAdapter::with_channel(api(&server), channel);
        assert!(!transport.is_connected());

        transport.send(OutboundFrame::typing("bob", false)).await;
    }

    #[tokio::test]
    async fn test_fallback_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/typing.php"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let transport = TransportAdapter::new(api(&server));
        transport.send(OutboundFrame::typing("bob", true)).await;
    }

    #[tokio::test]
    async fn test_channel_only_frames_are_dropped_without_channel() {
        let server = MockServer::start().await;
        let transport = TransportAdapter::new(api(&server));

        transport.send(OutboundFrame::Ping).await;

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let server = MockServer::start().await;
        let transport = TransportAdapter::new(api(&server));
        assert!(!transport.is_connected());

        let (channel, _rx) = PushChannel::bridged();
        transport.attach_channel(channel);
        assert!(transport.is_connected());

        assert!(transport.detach_channel().is_some());
        assert!(!transport.is_connected());
    }
}

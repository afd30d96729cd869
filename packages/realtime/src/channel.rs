//! Shared persistent push connection
//!
//! One WebSocket carries every low-latency frame in both directions. The
//! connection owns three concerns:
//! - Writing queued [`OutboundFrame`]s
//! - Keepalive pings
//! - Handing every inbound text frame to the [`MessageDispatchChain`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use sentinel_shared_config::PushChannelConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::MessageDispatchChain;
use crate::error::{RealtimeError, RealtimeResult};
use crate::frames::OutboundFrame;

/// Handle for queueing frames onto the shared connection
///
/// Cheap to clone; all clones feed the same connection.
#[derive(Debug, Clone)]
pub struct PushChannel {
    sender: mpsc::UnboundedSender<OutboundFrame>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl PushChannel {
    /// Connect to the push server and start the session task
    ///
    /// Sends the `presence_update` frame as soon as the socket is up. The
    /// returned task ends when the socket closes or [`PushChannel::close`]
    /// is called.
    pub async fn connect(
        config: &PushChannelConfig,
        user_handle: &str,
        api_secret: Option<&str>,
        dispatch: Arc<MessageDispatchChain>,
    ) -> RealtimeResult<(Self, JoinHandle<()>)> {
        let url = config.connect_url(user_handle, api_secret)?;
        info!(url = %config.url, user = %user_handle, "Connecting push channel");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, stream) = ws_stream.split();

        let (channel, outbound) = Self::bridged();
        channel.send(OutboundFrame::online())?;

        let task = tokio::spawn(run_session(
            sink,
            stream,
            outbound,
            dispatch,
            Arc::clone(&channel.open),
            channel.shutdown.clone(),
            Duration::from_secs(config.keepalive_secs),
        ));

        info!("Push channel connected");
        Ok((channel, task))
    }

    /// Channel whose frames are delivered to the returned receiver
    ///
    /// Used when the socket itself is owned elsewhere.
    pub fn bridged() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Self {
            sender,
            open: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
        };
        (channel, receiver)
    }

    /// Check if frames can currently be pushed
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Queue a frame for the connection
    pub fn send(&self, frame: OutboundFrame) -> RealtimeResult<()> {
        if !self.is_open() {
            return Err(RealtimeError::ChannelClosed);
        }
        self.sender
            .send(frame)
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    /// Stop the session and mark the channel closed
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.shutdown.cancel();
    }
}

/// Drive one connected socket until it closes or is shut down
async fn run_session<W, R>(
    mut sink: W,
    mut stream: R,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    dispatch: Arc<MessageDispatchChain>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
    keepalive: Duration,
) where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    // interval() panics on a zero period
    let keepalive = keepalive.max(Duration::from_secs(1));
    let mut keepalive = interval_at(Instant::now() + keepalive, keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Push channel shutdown requested");
                let _ = sink.close().await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = write_frame(&mut sink, &frame).await {
                    warn!(error = %e, kind = frame.kind(), "Failed to write frame, closing push channel");
                    break;
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = write_frame(&mut sink, &OutboundFrame::Ping).await {
                    warn!(error = %e, "Keepalive failed, closing push channel");
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => dispatch.dispatch_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    info!(reason = ?frame, "Push channel closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel read failed");
                    break;
                }
                None => {
                    info!("Push channel stream ended");
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::Release);
}

async fn write_frame<W>(sink: &mut W, frame: &OutboundFrame) -> RealtimeResult<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}

//! Mock push server for testing the WebSocket channel
//!
//! Provides a [`MockPushServer`] that accepts one client connection on a
//! local port, records every text frame the client sends, and lets the test
//! push frames to the client.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

enum Command {
    Frame(String),
    Close,
}

/// Mock push server
///
/// # Example
///
/// ```rust,ignore
/// use sentinel_test_utils::MockPushServer;
///
/// #[tokio::test]
/// async fn test_presence() {
///     let server = MockPushServer::start().await;
///     // Connect a PushChannel to server.url()
///     let frames = server.wait_for_frames(1, Duration::from_secs(2)).await;
///     assert_eq!(frames[0]["type"], "presence_update");
/// }
/// ```
pub struct MockPushServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Value>>>,
    query: Arc<Mutex<Option<String>>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl MockPushServer {
    /// Bind to a free local port and start accepting a connection
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock push server");
        let addr = listener
            .local_addr()
            .expect("mock push server has no local address");

        let received = Arc::new(Mutex::new(Vec::new()));
        let query = Arc::new(Mutex::new(None));
        let (commands, mut command_rx) = mpsc::unbounded_channel::<Command>();

        let frames = Arc::clone(&received);
        let seen_query = Arc::clone(&query);
        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let capture = move |request: &Request, response: Response| {
                *seen_query.lock().unwrap() = request.uri().query().map(str::to_string);
                Ok::<_, ErrorResponse>(response)
            };
            let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, capture).await else {
                return;
            };
            let (mut sink, mut stream) = ws.split();

            loop {
                tokio::select! {
                    command = command_rx.recv() => match command {
                        Some(Command::Frame(text)) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(frame) = serde_json::from_str::<Value>(&text) {
                                frames.lock().unwrap().push(frame);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            addr,
            received,
            query,
            commands,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a frame to the connected client
    pub fn push(&self, frame: Value) {
        let _ = self.commands.send(Command::Frame(frame.to_string()));
    }

    /// Send raw text to the connected client
    pub fn push_text(&self, text: &str) {
        let _ = self.commands.send(Command::Frame(text.to_string()));
    }

    /// Close the connection from the server side
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Frames received so far
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Query string of the connection request
    pub fn connect_query(&self) -> Option<String> {
        self.query.lock().unwrap().clone()
    }

    /// Wait until at least `count` frames arrived, or `timeout` elapsed
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frames = self.received();
            if frames.len() >= count || tokio::time::Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

//! Wiring of every coordinator for one signed-in user

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sentinel_realtime::{
    ApiClient, FileKeyStore, IdentityKeys, InteractionView, KeyExchangeCoordinator, KeyStore, MemoryKeyStore,
    MessageDispatchChain, PushChannel, ReadReceiptTracker, TracingView, TransportAdapter,
    TypingCoordinator,
};
use sentinel_shared_config::ClientConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::{Command, USAGE};

/// Time allowed for background tasks to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct Session {
    transport: Arc<TransportAdapter>,
    typing: Arc<TypingCoordinator>,
    receipts: Arc<ReadReceiptTracker>,
    exchange: Arc<KeyExchangeCoordinator>,
    push_task: Option<JoinHandle<()>>,
    poll_task: JoinHandle<()>,
}

impl Session {
    /// Build the coordinators, connect the push channel and start polling
    pub async fn start(config: &ClientConfig) -> anyhow::Result<Self> {
        let api = ApiClient::new(&config.api, &config.user_handle)?;
        let view: Arc<dyn InteractionView> = Arc::new(TracingView);

        let dispatch = Arc::new(MessageDispatchChain::new());
        let transport = Arc::new(TransportAdapter::new(api.clone()));

        let typing = Arc::new(TypingCoordinator::new(
            Arc::clone(&transport),
            Arc::clone(&view),
            config.timing,
        ));
        typing.register(&dispatch)?;

        let receipts = Arc::new(ReadReceiptTracker::new(api.clone(), Arc::clone(&view)));
        receipts.register(&dispatch)?;

        let store: Arc<dyn KeyStore> = match &config.key_store_path {
            Some(path) => Arc::new(
                FileKeyStore::open(path)
                    .with_context(|| format!("failed to open key store at {}", path.display()))?,
            ),
            None => {
                info!("KEY_STORE_PATH not set, public keys are kept for this session only");
                Arc::new(MemoryKeyStore::new())
            }
        };
        let mut exchange = KeyExchangeCoordinator::new(
            api,
            store,
            view,
            config.timing.exchange_poll_interval(),
        );
        if let Some(path) = config.identity_key_path() {
            let identity = IdentityKeys::load_or_create(&path).with_context(|| {
                format!("failed to load local key material from {}", path.display())
            })?;
            exchange = exchange.with_identity(identity);
        }
        let exchange = Arc::new(exchange);

        let push_task = if config.push.enabled {
            match PushChannel::connect(
                &config.push,
                &config.user_handle,
                config.api.api_secret.as_deref(),
                Arc::clone(&dispatch),
            )
            .await
            {
                Ok((channel, task)) => {
                    transport.attach_channel(channel);
                    Some(task)
                }
                Err(e) => {
                    warn!(error = %e, "Push channel unavailable, using fallback calls");
                    None
                }
            }
        } else {
            info!("Push channel disabled, using fallback calls");
            None
        };

        let poll_task = exchange.start_polling();

        Ok(Self {
            transport,
            typing,
            receipts,
            exchange,
            push_task,
            poll_task,
        })
    }

    /// Run one command; returns `false` once the user asked to leave
    pub async fn execute(&self, command: Command) -> bool {
        debug!(?command, "Executing command");
        match command {
            Command::Type { peer } => self.typing.input(&peer).await,
            Command::Blur { peer } => self.typing.blur(&peer).await,
            Command::Sent { message_id, read } => {
                self.receipts.render(&message_id, read, true);
            }
            Command::Read {
                message_id,
                from_user,
            } => {
                self.receipts.mark_as_read(&message_id, &from_user).await;
            }
            // Handshake failures are already shown to the user
            Command::Exchange { peer } => {
                let _ = self.exchange.request_exchange(&peer).await;
            }
            Command::Pending => {
                if let Ok(pending) = self.exchange.poll_pending().await {
                    if pending.is_empty() {
                        info!("No pending key exchange requests");
                    }
                    for request in pending {
                        info!(
                            exchange_id = %request.id,
                            from = %request.from_handle,
                            "Pending key exchange from {}",
                            request.from_handle
                        );
                    }
                }
            }
            Command::Accept { id } => {
                let _ = self.exchange.accept(&id).await;
            }
            Command::Reject { id } => {
                let _ = self.exchange.reject(&id);
            }
            Command::Key { peer } => match self.exchange.get_public_key(&peer) {
                Some(key) => info!(peer = %peer, "Public key of {}: {}", peer, key),
                None => info!(peer = %peer, "No public key stored for {}", peer),
            },
            Command::Help => {
                for line in USAGE {
                    println!("{line}");
                }
            }
            Command::Quit => return false,
        }
        true
    }

    /// Stop typing everywhere, stop polling and close the push channel
    pub async fn shutdown(self) {
        self.typing.blur_all().await;
        self.exchange.stop_polling();
        if let Some(channel) = self.transport.detach_channel() {
            channel.close();
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.poll_task).await.is_err() {
            warn!("Key exchange poller did not stop in time");
        }
        if let Some(task) = self.push_task {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Push channel did not close in time");
            }
        }
        info!("Session closed");
    }
}

//! Typing presence
//!
//! Outbound, each conversation runs a small `Idle`/`Typing` machine: the
//! first keystroke announces `typing-start`, further keystrokes inside the
//! throttle window are absorbed, and a debounce timer announces
//! `typing-stop` once input goes quiet. Losing focus stops immediately.
//!
//! Inbound, `typing` frames from peers toggle their indicator on the view.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sentinel_shared_config::TimingConfig;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::dispatch::MessageDispatchChain;
use crate::error::RealtimeResult;
use crate::frames::{OutboundFrame, TypingFrame, TYPING_FRAME};
use crate::transport::TransportAdapter;
use crate::view::InteractionView;

/// Per-conversation outbound typing state
///
/// Exists only while the conversation is in `Typing`. `timer` is the single
/// live debounce timer; `generation` identifies it so a timer that lost a race
/// with a newer keystroke never emits.
#[derive(Debug)]
struct TypingState {
    last_sent_at: Instant,
    timer: JoinHandle<()>,
    generation: u64,
}

type StateMap = Arc<Mutex<HashMap<String, TypingState>>>;

/// Owns typing state for every conversation
pub struct TypingCoordinator {
    transport: Arc<TransportAdapter>,
    view: Arc<dyn InteractionView>,
    timing: TimingConfig,
    states: StateMap,
    visible: Mutex<HashSet<String>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for TypingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypingCoordinator")
            .field("timing", &self.timing)
            .field("active", &self.active_conversations())
            .finish()
    }
}

impl TypingCoordinator {
    pub fn new(
        transport: Arc<TransportAdapter>,
        view: Arc<dyn InteractionView>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            transport,
            view,
            timing,
            states: Arc::new(Mutex::new(HashMap::new())),
            visible: Mutex::new(HashSet::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Claim inbound `typing` frames on the dispatch chain
    pub fn register(self: &Arc<Self>, chain: &MessageDispatchChain) -> RealtimeResult<()> {
        let coordinator = Arc::clone(self);
        chain.register(TYPING_FRAME, move |frame: &Value| {
            coordinator.handle_frame(frame)
        })
    }

    /// A keystroke in the conversation with `conversation`
    pub async fn input(&self, conversation: &str) {
        let now = Instant::now();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let timer = self.spawn_debounce(conversation.to_string(), generation);

        let announce = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            match states.entry(conversation.to_string()) {
                Entry::Occupied(mut entry) => {
                    let state = entry.get_mut();
                    state.timer.abort();
                    state.timer = timer;
                    state.generation = generation;

                    if now.duration_since(state.last_sent_at) >= self.timing.typing_throttle() {
                        state.last_sent_at = now;
                        true
                    } else {
                        false
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(TypingState {
                        last_sent_at: now,
                        timer,
                        generation,
                    });
                    true
                }
            }
        };

        if announce {
            debug!(conversation = %conversation, "Typing started");
            self.transport
                .send(OutboundFrame::typing(conversation, true))
                .await;
        }
    }

    /// Input focus left the conversation
    pub async fn blur(&self, conversation: &str) {
        let removed = self
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation);

        if let Some(state) = removed {
            state.timer.abort();
            debug!(conversation = %conversation, "Typing stopped on blur");
            self.transport
                .send(OutboundFrame::typing(conversation, false))
                .await;
        }
    }

    /// Blur every conversation that is currently typing
    pub async fn blur_all(&self) {
        for conversation in self.active_conversations() {
            self.blur(&conversation).await;
        }
    }

    /// Check if the local user is typing in a conversation
    pub fn is_typing(&self, conversation: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(conversation)
    }

    /// Conversations currently in `Typing`
    pub fn active_conversations(&self) -> Vec<String> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Check if a peer's typing indicator is shown
    pub fn is_peer_typing(&self, peer: &str) -> bool {
        self.visible
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(peer)
    }

    /// Apply an inbound `typing` frame
    pub fn handle_frame(&self, frame: &Value) {
        let frame: TypingFrame = match serde_json::from_value(frame.clone()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Malformed typing frame");
                return;
            }
        };

        let mut visible = self.visible.lock().unwrap_or_else(|e| e.into_inner());
        if frame.is_typing {
            if visible.insert(frame.from_user.clone()) {
                self.view.show_typing(&frame.from_user);
            }
        } else if visible.remove(&frame.from_user) {
            self.view.hide_typing(&frame.from_user);
        }
    }

    fn spawn_debounce(&self, conversation: String, generation: u64) -> JoinHandle<()> {
        let states = Arc::clone(&self.states);
        let transport = Arc::clone(&self.transport);
        let debounce = self.timing.typing_debounce();

        tokio::spawn(async move {
            sleep(debounce).await;

            let expired = {
                let mut states = states.lock().unwrap_or_else(|e| e.into_inner());
                match states.get(&conversation) {
                    Some(state) if state.generation == generation => {
                        states.remove(&conversation);
                        true
                    }
                    _ => false,
                }
            };

            if expired {
                debug!(conversation = %conversation, "Typing stopped after idle");
                transport
                    .send(OutboundFrame::typing(conversation, false))
                    .await;
            }
        })
    }
}

impl Drop for TypingCoordinator {
    fn drop(&mut self) {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        for state in states.values() {
            state.timer.abort();
        }
    }
}

//! Message dispatch.
//!
//! The dispatcher is the only caller of the rate limiter and session store.
//! For each inbound text it checks quota, builds the context, calls the
//! generation backend and relays the reply. Messages from one user are
//! handled one at a time; different users proceed concurrently.

mod replies;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{build_messages, GenerationBackend};
use crate::clock::Clock;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::ratelimit::Admission;
use crate::state::RelayState;
use crate::transport::{split_message, InboundMessage, Transport};
use crate::user::{ChatId, UserId};

pub use replies::{clean_reply, parse_command, Command};

/// Dispatcher settings that are not part of the core limits.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// System instruction sent ahead of every context
    pub system_prompt: String,
    /// Upper bound on one backend call
    pub backend_timeout: Duration,
    /// Largest outbound segment, in characters
    pub max_message_chars: usize,
    /// Pause between segments of a long reply
    pub chunk_delay: Duration,
}

impl From<&RelayConfig> for DispatchSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            system_prompt: config.backend.system_prompt.clone(),
            backend_timeout: config.backend.timeout(),
            max_message_chars: config.telegram.max_message_chars,
            chunk_delay: config.telegram.chunk_delay(),
        }
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `/start` or `/help` answered
    Welcomed,
    /// `/reset` handled; `had_history` tells whether anything was cleared
    Reset { had_history: bool },
    /// Unrecognised command
    UnknownCommand,
    /// Dropped for exceeding the quota
    RateLimited,
    /// Reply delivered in `chunks` segments
    Replied { chunks: usize, was_auto_reset: bool },
    /// Backend failed; nothing was recorded
    BackendFailed,
}

/// Routes inbound messages through quota, memory and the backend.
pub struct Dispatcher<B: GenerationBackend, T: Transport> {
    state: Arc<RelayState>,
    backend: Arc<B>,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
    /// One lock per user, held for a whole exchange
    turns: DashMap<UserId, Arc<Mutex<()>>>,
}

impl<B: GenerationBackend + 'static, T: Transport + 'static> Dispatcher<B, T> {
    /// Create a new dispatcher.
    pub fn new(
        state: Arc<RelayState>,
        backend: Arc<B>,
        transport: Arc<T>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            state,
            backend,
            transport,
            clock,
            settings,
            turns: DashMap::new(),
        }
    }

    /// The shared relay state.
    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Consume messages until the channel closes, then wait for every
    /// in-flight message to finish.
    ///
    /// Each message is handled on its own task so users proceed concurrently.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<InboundMessage>) {
        info!("Dispatcher started");

        let mut tasks = JoinSet::new();
        while let Some(message) = rx.recv().await {
            while let Some(result) = tasks.try_join_next() {
                log_task_result(result);
            }

            let dispatcher = Arc::clone(&self);
            tasks.spawn(async move {
                dispatcher.handle(message).await;
            });
        }

        debug!(in_flight = tasks.len(), "Channel closed, draining");
        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }

        info!("Dispatcher stopped");
    }

    /// Handle one inbound message.
    #[instrument(
        skip(self, message),
        fields(
            request_id = %uuid::Uuid::new_v4(),
            user = %message.user,
            chat = %message.chat
        )
    )]
    pub async fn handle(&self, message: InboundMessage) -> Outcome {
        let turn = self.turn_lock(message.user);
        let _guard = turn.lock().await;

        match parse_command(&message.text) {
            Some(command) => self.handle_command(command, &message).await,
            None => self.handle_text(&message).await,
        }
    }

    fn turn_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        Arc::clone(self.turns.entry(user).or_default().value())
    }

    async fn handle_command(&self, command: Command, message: &InboundMessage) -> Outcome {
        debug!(command = ?command, "Handling command");

        match command {
            Command::Start | Command::Help => {
                let text = replies::welcome(
                    self.state.limiter.config(),
                    self.state.sessions.policy(),
                );
                self.notify(message.chat, &text).await;
                Outcome::Welcomed
            }
            Command::Reset => {
                let now = self.clock.now();
                let had_history = self.state.sessions.manual_reset(message.user, now);
                let text = if had_history {
                    replies::RESET_DONE
                } else {
                    replies::RESET_NOTHING
                };
                self.notify(message.chat, text).await;
                Outcome::Reset { had_history }
            }
            Command::Unknown => {
                self.notify(message.chat, replies::UNKNOWN_COMMAND).await;
                Outcome::UnknownCommand
            }
        }
    }

    async fn handle_text(&self, message: &InboundMessage) -> Outcome {
        let now = self.clock.now();

        if let Admission::Denied { retry_after } = self.state.limiter.admit(message.user, now) {
            info!(retry_after_secs = retry_after.as_secs(), "Message dropped by rate limit");
            self.notify(message.chat, &replies::rate_limited(retry_after)).await;
            return Outcome::RateLimited;
        }

        let prepared = self
            .state
            .sessions
            .prepare_turn(message.user, &message.text, now);
        if prepared.was_auto_reset {
            self.notify(message.chat, replies::AUTO_RESET).await;
        }

        self.notify(message.chat, replies::THINKING).await;

        let messages = build_messages(&self.settings.system_prompt, &prepared.context);
        let result = match tokio::time::timeout(
            self.settings.backend_timeout,
            self.backend.generate(&messages),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(self.settings.backend_timeout)),
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // Quota stays spent and the exchange is not remembered
                error!(error = %e, "Generation failed");
                self.notify(message.chat, replies::BACKEND_FAILED).await;
                return Outcome::BackendFailed;
            }
        };

        let cleaned = clean_reply(&reply);
        self.state.sessions.record_reply(message.user, &cleaned);

        let display = if cleaned.is_empty() {
            replies::EMPTY_REPLY
        } else {
            cleaned.as_str()
        };
        let chunks = split_message(display, self.settings.max_message_chars);
        let count = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
            self.notify(message.chat, chunk).await;
        }

        info!(
            context_turns = prepared.context.len(),
            chunks = count,
            "Reply relayed"
        );

        Outcome::Replied {
            chunks: count,
            was_auto_reset: prepared.was_auto_reset,
        }
    }

    async fn notify(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.transport.send_text(chat, text).await {
            warn!(chat = %chat, error = %e, "Failed to deliver message");
        }
    }
}

fn log_task_result(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Dispatch task failed");
    }
}

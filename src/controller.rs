//! # Stage: ChatController
//!
//! ## Responsibility
//! Own the live conversation: the ordered message history, the single
//! conversation status, the streaming placeholder and the latest optimization
//! result. Apply service events in the order they arrive and keep the local
//! cache in step with every change.
//!
//! ## Guarantees
//! - One status field: `Idle | Sending | AwaitingResponse | Streaming |
//!   Completed | Errored`; typing/thinking indicators are derived from it, so
//!   contradictory flag combinations cannot exist
//! - `messageUpdate` content replaces, never appends
//! - Messages are never reordered; updates happen in place by id
//! - Every change to history or the optimization result is persisted;
//!   persistence failures are swallowed
//! - Non-panicking: no `unwrap` in any production path
//!
//! ## NOT Responsible For
//! - Talking to the network (see [`crate::service`])
//! - Resending anything on its own; retry is always an explicit call

use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, ChatCache};
use crate::error::ChatError;
use crate::events::ServiceEvent;
use crate::history::MessageHistory;
use crate::message::{ChatMessage, MessageStatus, OptimizationResult, Role};
use crate::storage::Storage;

/// The in-progress assistant message, fed by `messageUpdate` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingMessage {
    pub id: String,
    pub content: String,
}

/// Where the conversation currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationStatus {
    #[default]
    Idle,
    /// A user turn was appended and is being handed to the service.
    Sending { message_id: String },
    /// The service accepted the turn; waiting for the reply to start.
    AwaitingResponse { message_id: String, typing: bool },
    /// Reply content is arriving.
    Streaming { message_id: Option<String>, partial: StreamingMessage },
    Completed,
    Errored { message_id: Option<String>, error: String },
}

impl ConversationStatus {
    /// Id of the user turn currently in flight, if any.
    pub fn in_flight(&self) -> Option<&str> {
        match self {
            ConversationStatus::Sending { message_id }
            | ConversationStatus::AwaitingResponse { message_id, .. } => Some(message_id),
            ConversationStatus::Streaming { message_id, .. } => message_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_thinking(&self) -> bool {
        matches!(
            self,
            ConversationStatus::Sending { .. } | ConversationStatus::AwaitingResponse { .. }
        )
    }

    pub fn is_ai_typing(&self) -> bool {
        matches!(
            self,
            ConversationStatus::AwaitingResponse { typing: true, .. } | ConversationStatus::Streaming { .. }
        )
    }
}

type Clock = Box<dyn Fn() -> u64 + Send>;

pub struct ChatController<S: Storage> {
    history: MessageHistory,
    status: ConversationStatus,
    optimization: Option<OptimizationResult>,
    connected: bool,
    last_error: Option<String>,
    cache: ChatCache<S>,
    clock: Clock,
}

impl<S: Storage> ChatController<S> {
    pub fn new(storage: S) -> Self {
        Self::with_cache_config(storage, CacheConfig::default())
    }

    pub fn with_cache_config(storage: S, config: CacheConfig) -> Self {
        ChatController {
            history: MessageHistory::new(),
            status: ConversationStatus::Idle,
            optimization: None,
            connected: false,
            last_error: None,
            cache: ChatCache::with_config(storage, config),
            clock: Box::new(crate::now_ms),
        }
    }

    /// Replace the epoch-millisecond clock used for cache timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.to_vec()
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.history.get(id)
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    pub fn status(&self) -> &ConversationStatus {
        &self.status
    }

    pub fn streaming_message(&self) -> Option<&StreamingMessage> {
        match &self.status {
            ConversationStatus::Streaming { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub fn optimization_result(&self) -> Option<&OptimizationResult> {
        self.optimization.as_ref()
    }

    pub fn is_thinking(&self) -> bool {
        self.status.is_thinking()
    }

    pub fn is_ai_typing(&self) -> bool {
        self.status.is_ai_typing()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Most recent connection or send error, for a transient notice.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn storage(&self) -> &S {
        self.cache.storage()
    }

    // -----------------------------------------------------------------------
    // Cache
    // -----------------------------------------------------------------------

    /// Hydrate from the cache. Returns whether anything was restored.
    pub fn restore(&mut self) -> bool {
        let now = (self.clock)();
        match self.cache.restore(now) {
            Some(envelope) => {
                info!(messages = envelope.messages.len(), "restored cached chat");
                self.history = MessageHistory::from_messages(envelope.messages);
                self.optimization = envelope.optimization_result;
                true
            }
            None => false,
        }
    }

    /// Wipe the persisted envelope and all in-memory conversation state.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.history.clear();
        self.optimization = None;
        self.last_error = None;
        self.status = ConversationStatus::Idle;
    }

    fn persist(&mut self) {
        let now = (self.clock)();
        let messages = self.history.to_vec();
        self.cache.persist(&messages, self.optimization.as_ref(), now);
    }

    // -----------------------------------------------------------------------
    // Outbound turn lifecycle
    // -----------------------------------------------------------------------

    /// Append an optimistic user turn at the tail and enter `Sending`.
    ///
    /// `id` should be a fresh UUID. An id already present is updated in place
    /// rather than duplicated.
    pub fn append_user_message(&mut self, id: impl Into<String>, content: impl Into<String>) -> ChatMessage {
        let message = ChatMessage::user(id, content);
        self.status = ConversationStatus::Sending { message_id: message.id.clone() };
        self.history.upsert(message.clone());
        self.persist();
        message
    }

    /// The service accepted turn `id`.
    pub fn mark_sent(&mut self, id: &str) {
        self.set_message_status(id, MessageStatus::Completed);
        // A reply may already be streaming; only Sending advances.
        if matches!(&self.status, ConversationStatus::Sending { message_id } if message_id == id) {
            self.status = ConversationStatus::AwaitingResponse { message_id: id.to_string(), typing: false };
        }
        self.persist();
    }

    /// The service rejected turn `id`.
    pub fn mark_failed(&mut self, id: &str, error: &ChatError) {
        warn!(message_id = id, error = %error, "message send failed");
        self.set_message_status(id, MessageStatus::Error);
        let text = error.to_string();
        self.last_error = Some(text.clone());
        self.status = ConversationStatus::Errored { message_id: Some(id.to_string()), error: text };
        self.persist();
    }

    /// Prepare failed user turn `id` for resending and return its content.
    pub fn begin_retry(&mut self, id: &str) -> Result<String, ChatError> {
        let message = self
            .history
            .get_mut(id)
            .ok_or_else(|| ChatError::UnknownMessage(id.to_string()))?;
        if message.role != Role::User || !message.is_failed() {
            return Err(ChatError::NotRetryable(id.to_string()));
        }
        message.status = Some(MessageStatus::Sending);
        let content = message.content.clone();
        self.status = ConversationStatus::Sending { message_id: id.to_string() };
        self.last_error = None;
        self.persist();
        Ok(content)
    }

    /// Most recent failed user turn, the natural `/retry` target.
    pub fn last_failed_user_message(&self) -> Option<&ChatMessage> {
        self.history
            .iter()
            .filter(|m| m.role == Role::User && m.is_failed())
            .last()
    }

    fn set_message_status(&mut self, id: &str, status: MessageStatus) {
        match self.history.get_mut(id) {
            Some(message) => message.status = Some(status),
            None => debug!(message_id = id, "status update for unknown message"),
        }
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    pub fn handle_event(&mut self, event: ServiceEvent) {
        debug!(event = event.name(), "applying service event");
        match event {
            ServiceEvent::Connected => self.handle_connected(),
            ServiceEvent::Disconnected => self.handle_disconnected(),
            ServiceEvent::MessageResponse { message } => self.handle_message_response(message),
            ServiceEvent::MessageUpdate { message_id, content } => {
                self.handle_message_update(&message_id, content)
            }
            ServiceEvent::Optimization { result } => self.handle_optimization_result(result),
            ServiceEvent::Typing { is_typing } => self.handle_typing(is_typing),
            ServiceEvent::Error { message } => self.handle_error(message),
        }
    }

    /// Replace the accumulated content of `message_id` with `content`.
    ///
    /// A message already in history is updated in place; otherwise the
    /// streaming placeholder is created or replaced.
    pub fn handle_message_update(&mut self, message_id: &str, content: String) {
        if let Some(message) = self.history.get_mut(message_id) {
            message.content = content;
            self.persist();
            return;
        }

        let in_flight = self.status.in_flight().map(str::to_string);
        self.status = ConversationStatus::Streaming {
            message_id: in_flight,
            partial: StreamingMessage { id: message_id.to_string(), content },
        };
    }

    /// Upsert a finished message, clear indicators and drop the placeholder.
    pub fn handle_message_response(&mut self, mut message: ChatMessage) {
        if message.status.is_none() || message.status == Some(MessageStatus::Processing) {
            message.status = Some(MessageStatus::Completed);
        }
        if let Some(result) = &message.optimization_data {
            self.optimization = Some(result.clone());
        }
        self.history.upsert(message);
        self.status = ConversationStatus::Completed;
        self.persist();
    }

    /// Surface `result` and attach it to the in-flight turn, if any.
    pub fn handle_optimization_result(&mut self, result: OptimizationResult) {
        if let Some(id) = self.status.in_flight().map(str::to_string) {
            if let Some(message) = self.history.get_mut(&id) {
                message.optimization_data = Some(result.clone());
            }
        }
        self.optimization = Some(result);
        self.persist();
    }

    pub fn handle_typing(&mut self, is_typing: bool) {
        if let ConversationStatus::AwaitingResponse { typing, .. } = &mut self.status {
            *typing = is_typing;
        }
    }

    pub fn handle_connected(&mut self) {
        self.connected = true;
    }

    /// Connection dropped: indicators off, placeholder gone, history untouched.
    pub fn handle_disconnected(&mut self) {
        self.connected = false;
        self.status = ConversationStatus::Idle;
    }

    /// Connection-level error: indicators off, history intact.
    pub fn handle_error(&mut self, message: String) {
        warn!(error = %message, "chat service error");
        let in_flight = self.status.in_flight().map(str::to_string);
        self.last_error = Some(message.clone());
        self.status = ConversationStatus::Errored { message_id: in_flight, error: message };
    }
}

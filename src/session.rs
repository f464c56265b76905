//! A chat session: one [`ChatService`] driving one [`ChatController`].
//!
//! The session subscribes to the service before connecting, so nothing the
//! transport publishes is missed. Events are applied strictly in arrival
//! order by [`ChatSession::next_event`].

use tracing::{debug, info};

use crate::controller::ChatController;
use crate::error::ChatError;
use crate::events::{ServiceEvent, Subscription};
use crate::service::ChatService;
use crate::storage::Storage;

pub struct ChatSession<C: ChatService, S: Storage> {
    service: C,
    controller: ChatController<S>,
    events: Subscription,
}

impl<C: ChatService, S: Storage> ChatSession<C, S> {
    pub fn new(service: C, controller: ChatController<S>) -> Self {
        let events = service.subscribe();
        ChatSession { service, controller, events }
    }

    pub fn controller(&self) -> &ChatController<S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChatController<S> {
        &mut self.controller
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    /// Restore cached history, then connect the service.
    ///
    /// A failed connect is applied to the controller as an `error` event and
    /// returned; the session stays usable and a later `send` may succeed.
    pub async fn start(&mut self) -> Result<(), ChatError> {
        let restored = self.controller.restore();
        debug!(restored, "session starting");
        if let Err(e) = self.service.connect().await {
            self.controller.handle_error(e.to_string());
            return Err(e);
        }
        self.drain_pending();
        Ok(())
    }

    /// Send a new user turn.
    ///
    /// # Returns
    /// The id of the optimistic user message. A rejected send is not an error
    /// here: the message is marked failed and can be retried by id.
    ///
    /// # Errors
    /// `ChatError::EmptyMessage` for blank input; nothing is appended.
    pub async fn send(&mut self, content: &str) -> Result<String, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let id = uuid::Uuid::new_v4().to_string();
        let prior = self.controller.messages();
        self.controller.append_user_message(id.clone(), content);
        self.dispatch(&id, content, &prior).await;
        Ok(id)
    }

    /// Resend failed user turn `id` under the same id.
    pub async fn retry(&mut self, id: &str) -> Result<(), ChatError> {
        let content = self.controller.begin_retry(id)?;
        let prior: Vec<_> = self
            .controller
            .history()
            .iter()
            .take_while(|m| m.id != id)
            .cloned()
            .collect();
        info!(message_id = id, "retrying message");
        self.dispatch(id, &content, &prior).await;
        Ok(())
    }

    /// Retry the most recent failed user turn, if there is one.
    pub async fn retry_last(&mut self) -> Result<Option<String>, ChatError> {
        let id = match self.controller.last_failed_user_message() {
            Some(message) => message.id.clone(),
            None => return Ok(None),
        };
        self.retry(&id).await?;
        Ok(Some(id))
    }

    async fn dispatch(&mut self, id: &str, content: &str, prior: &[crate::message::ChatMessage]) {
        match self.service.send_message(content, prior).await {
            Ok(reply_id) => {
                debug!(message_id = id, reply_id = %reply_id, "message accepted");
                self.controller.mark_sent(id);
            }
            Err(e) => self.controller.mark_failed(id, &e),
        }
    }

    /// Wait for the next service event, apply it and return it.
    ///
    /// Returns `None` once the service's bus is gone. Cancel-safe: an event is
    /// only consumed when it is also applied.
    pub async fn next_event(&mut self) -> Option<ServiceEvent> {
        let event = self.events.recv().await?;
        self.controller.handle_event(event.clone());
        Some(event)
    }

    /// Apply every event already queued, without waiting.
    pub fn drain_pending(&mut self) -> Vec<ServiceEvent> {
        let mut applied = Vec::new();
        while let Some(event) = self.events.try_recv() {
            self.controller.handle_event(event.clone());
            applied.push(event);
        }
        applied
    }

    pub fn clear_cache(&mut self) {
        self.controller.clear_cache();
    }
}

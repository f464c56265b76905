//! # Streaming chat service
//!
//! One realtime connection exposed as an event emitter. Two transports
//! implement [`ChatService`]:
//!
//! 1. **SSE** ([`SseChatService`]) — each turn is a POST whose response body
//!    is an event stream, pumped on a background task.
//! 2. **WebSocket** ([`WsChatService`]) — one long-lived socket with a reader
//!    task publishing events and a writer task draining an outbound queue.
//!
//! Both publish onto an [`EventBus`](crate::events::EventBus); consumers hold a
//! [`Subscription`]. Neither transport retries or reconnects on its own:
//! after `disconnected` the user decides what to resend.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = SseChatService::new(client, identity, EventBus::default());
//! let mut events = service.subscribe();
//! service.connect().await?;
//! let reply_id = service.send_message("hello", &history).await?;
//! while let Some(event) = events.recv().await { /* ... */ }
//! ```

use std::future::Future;

use crate::error::ChatError;
use crate::events::Subscription;
use crate::message::ChatMessage;

pub mod sse;
pub mod ws;

pub use sse::SseChatService;
pub use ws::WsChatService;

/// Contract between a realtime transport and its consumers.
pub trait ChatService: Send + Sync {
    /// Register a listener. Dropping the returned subscription unregisters it.
    fn subscribe(&self) -> Subscription;

    /// Establish the transport. Publishes `connected` on success.
    fn connect(&self) -> impl Future<Output = Result<(), ChatError>> + Send;

    /// Submit a user turn with the conversation so far.
    ///
    /// Resolves with the id the reply will carry. An error means the turn was
    /// not accepted and the caller should mark its optimistic message failed.
    fn send_message(
        &self,
        content: &str,
        history: &[ChatMessage],
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}

/// Abort every tracked background task. Used by the transports' `Drop`.
fn abort_all(tasks: &std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>) {
    if let Ok(mut guard) = tasks.lock() {
        for handle in guard.drain(..) {
            handle.abort();
        }
    }
}

/// Remember `handle`, pruning tasks that already finished.
fn track(tasks: &std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>, handle: tokio::task::JoinHandle<()>) {
    if let Ok(mut guard) = tasks.lock() {
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }
}

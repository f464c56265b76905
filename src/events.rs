//! Service events and their fan-out.
//!
//! ## Design
//! - `ServiceEvent` is the wire contract with the chat backend: a JSON object
//!   with a `type` discriminator and camelCase fields
//! - `EventBus` fans each event out to one unbounded queue per subscriber;
//!   transports publish, any number of listeners subscribe. A slow listener
//!   falls behind but never loses an event
//! - A `Subscription` unregisters itself when dropped, so tearing down a
//!   consumer can never leave a dangling listener behind

use std::sync::{Arc, Mutex};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

use crate::message::{ChatMessage, OptimizationResult};

/// Everything a streaming chat service can report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceEvent {
    Connected,
    Disconnected,
    /// A finished message; upserted by id.
    MessageResponse { message: ChatMessage },
    /// Cumulative content of the message being streamed. Replaces, never appends.
    #[serde(rename_all = "camelCase")]
    MessageUpdate { message_id: String, content: String },
    #[serde(rename = "optimizationResult")]
    Optimization { result: OptimizationResult },
    #[serde(rename_all = "camelCase")]
    Typing { is_typing: bool },
    Error { message: String },
}

impl ServiceEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServiceEvent::Connected => "connected",
            ServiceEvent::Disconnected => "disconnected",
            ServiceEvent::MessageResponse { .. } => "messageResponse",
            ServiceEvent::MessageUpdate { .. } => "messageUpdate",
            ServiceEvent::Optimization { .. } => "optimizationResult",
            ServiceEvent::Typing { .. } => "typing",
            ServiceEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServiceEvent::Error { message: message.into() }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fan-out of [`ServiceEvent`]s. Cheap to clone; clones share the same
/// subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ServiceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `event` for every live subscription, pruning dropped ones.
    /// Having none is not an error.
    pub fn publish(&self, event: ServiceEvent) {
        trace!(event = event.name(), "publish");
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Subscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

/// A registered listener. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ServiceEvent>,
}

impl Subscription {
    /// Wait for the next event in publish order. Returns `None` once every
    /// clone of the bus is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<ServiceEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ServiceEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = ServiceEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

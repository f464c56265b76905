//! SSE transport: one streaming POST per user turn.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{abort_all, track, ChatService};
use crate::client::{ApiClient, SseStream, StreamChatRequest};
use crate::error::ChatError;
use crate::events::{EventBus, ServiceEvent, Subscription};
use crate::identity::SessionIdentity;
use crate::message::{history_entries, ChatMessage, MessageMetadata};

/// A frame on the chat stream: either a typed service event, or a bare token
/// chunk from a backend that streams raw model output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StreamFrame {
    Event(ServiceEvent),
    Token {
        #[serde(alias = "delta", alias = "token")]
        content: String,
    },
}

pub struct SseChatService {
    client: ApiClient,
    identity: SessionIdentity,
    bus: EventBus,
    connected: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SseChatService {
    pub fn new(client: ApiClient, identity: SessionIdentity, bus: EventBus) -> Self {
        SseChatService {
            client,
            identity,
            bus,
            connected: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn mark_connected(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            self.bus.publish(ServiceEvent::Connected);
        }
    }
}

impl ChatService for SseChatService {
    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// SSE connections are opened per turn, so there is nothing to dial here.
    async fn connect(&self) -> Result<(), ChatError> {
        self.mark_connected();
        Ok(())
    }

    async fn send_message(&self, content: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let request = StreamChatRequest {
            message: content.to_string(),
            history: history_entries(history),
            message_id: message_id.clone(),
            session_id: self.identity.session_id.clone(),
            user_id: self.identity.user_id.clone(),
        };

        let events = match self.client.stream_chat::<serde_json::Value>(&request).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, session_id = %self.identity.session_id, "chat request rejected");
                return Err(e);
            }
        };

        self.mark_connected();
        let handle = tokio::spawn(pump_stream(
            events,
            message_id.clone(),
            self.bus.clone(),
            Arc::clone(&self.connected),
        ));
        track(&self.tasks, handle);
        Ok(message_id)
    }
}

impl Drop for SseChatService {
    fn drop(&mut self) {
        abort_all(&self.tasks);
    }
}

/// Forward one response stream onto the bus.
///
/// Token frames accumulate into cumulative content so subscribers only ever
/// see replace-style `messageUpdate`s. Every turn ends with a terminal event:
/// the backend's own `messageResponse`, a reply synthesized from the last
/// streamed content (token or typed `messageUpdate`), or an `error` when the
/// stream carried no reply at all.
async fn pump_stream(
    mut events: SseStream<serde_json::Value>,
    message_id: String,
    bus: EventBus,
    connected: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let mut accumulated = String::new();
    // Id and content of the most recent update, whichever frame kind it came from.
    let mut latest: Option<(String, String)> = None;
    let mut responded = false;

    while let Some(item) = events.next().await {
        let value = match item {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, message_id = %message_id, "chat stream failed");
                connected.store(false, Ordering::SeqCst);
                bus.publish(ServiceEvent::error(e.to_string()));
                bus.publish(ServiceEvent::Disconnected);
                return;
            }
        };

        match serde_json::from_value::<StreamFrame>(value) {
            Ok(StreamFrame::Event(event)) => {
                match &event {
                    ServiceEvent::MessageResponse { .. } => responded = true,
                    ServiceEvent::MessageUpdate { message_id, content } => {
                        latest = Some((message_id.clone(), content.clone()));
                    }
                    _ => {}
                }
                bus.publish(event);
            }
            Ok(StreamFrame::Token { content }) => {
                accumulated.push_str(&content);
                latest = Some((message_id.clone(), accumulated.clone()));
                bus.publish(ServiceEvent::MessageUpdate {
                    message_id: message_id.clone(),
                    content: accumulated.clone(),
                });
            }
            Err(e) => debug!(error = %e, "ignoring unrecognized stream frame"),
        }
    }

    if responded {
        return;
    }
    match latest {
        Some((id, content)) => {
            let mut message = ChatMessage::assistant(id, content);
            message.metadata = Some(MessageMetadata {
                processing_time: Some(started.elapsed().as_millis() as u64),
                ..MessageMetadata::default()
            });
            bus.publish(ServiceEvent::MessageResponse { message });
        }
        None => {
            warn!(message_id = %message_id, "chat stream ended without a reply");
            bus.publish(ServiceEvent::error("chat stream ended without a reply"));
        }
    }
}

//! WebSocket transport: one long-lived socket per service.

use std::sync::{Arc, Mutex};

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{abort_all, track, ChatService};
use crate::error::ChatError;
use crate::events::{EventBus, ServiceEvent, Subscription};
use crate::identity::SessionIdentity;
use crate::message::{history_entries, ChatMessage};

type Outbound = Arc<Mutex<Option<mpsc::UnboundedSender<WsMessage>>>>;

pub struct WsChatService {
    url: String,
    token: Option<String>,
    identity: SessionIdentity,
    bus: EventBus,
    /// Queue feeding the writer task. `None` until connected and again after
    /// the socket goes away.
    outbound: Outbound,
    /// Held for the whole dial so concurrent `connect` calls share one socket.
    dialing: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsChatService {
    pub fn new(url: impl Into<String>, token: Option<String>, identity: SessionIdentity, bus: EventBus) -> Self {
        WsChatService {
            url: url.into(),
            token,
            identity,
            bus,
            outbound: Arc::new(Mutex::new(None)),
            dialing: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn dial(&self) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ChatError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ChatError::Config(format!("invalid auth token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }
}

impl ChatService for WsChatService {
    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    async fn connect(&self) -> Result<(), ChatError> {
        let _dialing = self.dialing.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        let stream = match self.dial().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, url = %self.url, "websocket connect failed");
                self.bus.publish(ServiceEvent::error(e.to_string()));
                return Err(e);
            }
        };

        let (mut sink, source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        if let Ok(mut guard) = self.outbound.lock() {
            *guard = Some(tx);
        }
        let reader = tokio::spawn(read_loop(source, self.bus.clone(), Arc::clone(&self.outbound)));

        track(&self.tasks, writer);
        track(&self.tasks, reader);

        info!(url = %self.url, session_id = %self.identity.session_id, "websocket connected");
        self.bus.publish(ServiceEvent::Connected);
        Ok(())
    }

    async fn send_message(&self, content: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::json!({
            "type": "chat",
            "message_id": message_id,
            "content": content,
            "history": history_entries(history),
            "session_id": self.identity.session_id,
            "user_id": self.identity.user_id,
        });
        let text = serde_json::to_string(&frame)?;

        let sender = self
            .outbound
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(ChatError::Disconnected)?;
        sender.send(WsMessage::Text(text)).map_err(|_| ChatError::Disconnected)?;
        Ok(message_id)
    }
}

impl Drop for WsChatService {
    fn drop(&mut self) {
        abort_all(&self.tasks);
    }
}

/// Publish every text frame that parses as a [`ServiceEvent`]. On close,
/// error or end of stream, drop the outbound queue (which stops the writer)
/// and publish `disconnected`.
async fn read_loop(
    mut source: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    bus: EventBus,
    outbound: Outbound,
) {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServiceEvent>(&text) {
                Ok(event) => bus.publish(event),
                Err(e) => debug!(error = %e, "ignoring unrecognized websocket frame"),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(?frame, "websocket closed by peer");
                break;
            }
            Some(Ok(_)) => {} // binary / ping / pong
            Some(Err(e)) => {
                warn!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        }
    }

    if let Ok(mut guard) = outbound.lock() {
        guard.take();
    }
    bus.publish(ServiceEvent::Disconnected);
}

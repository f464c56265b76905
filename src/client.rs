//! Typed HTTP client for the chat API's streaming endpoint.

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::message::HistoryEntry;
use crate::sse::sse_json_stream;

/// Path of the streaming chat endpoint, relative to the API base URL.
pub const STREAM_CHAT_PATH: &str = "/chat/stream";

/// Body of a streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChatRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
    /// Id the assistant's reply will carry.
    pub message_id: String,
    pub session_id: String,
    pub user_id: String,
}

/// A parsed SSE event stream, boxed so it can be moved into a task.
pub type SseStream<T> = Pin<Box<dyn Stream<Item = Result<T, ChatError>> + Send>>;

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    request_timeout: Duration,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self::from_config(
            &ChatConfig { api_base_url: base_url.into(), ..ChatConfig::default() },
            token,
        )
    }

    pub fn from_config(config: &ChatConfig, token: Option<String>) -> Self {
        // No overall timeout on the client: it would cut long streams short.
        // The request timeout only bounds the wait for response headers.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .unwrap_or_default();

        ApiClient {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token,
            request_timeout: config.request_timeout(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST `request` to the streaming endpoint and return its events.
    ///
    /// # Returns
    /// - `Ok(stream)` once a 2xx response with headers has arrived; the body is
    ///   consumed lazily as the stream is polled.
    /// - `Err(ChatError::Request)` when the request could not be sent.
    /// - `Err(ChatError::Timeout)` when no headers arrive within the request timeout.
    /// - `Err(ChatError::Http)` on a non-2xx status, with the response body.
    pub async fn stream_chat<T>(&self, request: &StreamChatRequest) -> Result<SseStream<T>, ChatError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = self.endpoint(STREAM_CHAT_PATH);
        let mut builder = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = match tokio::time::timeout(self.request_timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(ChatError::Request { url, source }),
            Err(_) => return Err(ChatError::Timeout { url }),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Http { status: status.as_u16(), url, body });
        }

        debug!(url = %url, message_id = %request.message_id, "chat stream opened");
        Ok(Box::pin(sse_json_stream(response.bytes_stream())))
    }
}

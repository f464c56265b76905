//! Crate-level error types.
//!
//! [`ChatError`] covers everything a transport, the API client or the session
//! can fail with. [`StorageError`] is kept separate because the cache swallows
//! it: a failed cache write must never reach the user.

use thiserror::Error;

/// Errors returned by the chat transports, API client and session.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The server replied with a non-2xx status code.
    #[error("HTTP {status} from {url}: {body}")]
    Http { status: u16, url: String, body: String },

    /// The request could not be sent or its body could not be read.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No response headers arrived within the request timeout.
    #[error("timed out waiting for {url}")]
    Timeout { url: String },

    /// The SSE response body failed mid-stream.
    #[error("stream interrupted: {0}")]
    Stream(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The transport is not connected (never connected, or the peer went away).
    #[error("not connected to the chat service")]
    Disconnected,

    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("message '{0}' not found")]
    UnknownMessage(String),

    /// Retry was requested for a message that is not a failed user turn.
    #[error("message '{0}' is not in a retryable state")]
    NotRetryable(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised by a [`Storage`](crate::storage::Storage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing `key` would exceed the backend's byte quota.
    #[error("storage quota exceeded writing '{key}': {needed} bytes needed, limit {limit}")]
    QuotaExceeded { key: String, needed: usize, limit: usize },

    /// The backend refuses writes entirely (read-only / private mode).
    #[error("storage is read-only")]
    ReadOnly,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display_includes_status_and_url() {
        let err = ChatError::Http {
            status: 503,
            url: "http://localhost:8000/chat/stream".to_string(),
            body: "overloaded".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("/chat/stream"));
        assert!(text.contains("overloaded"));
    }

    #[test]
    fn storage_error_converts_into_chat_error() {
        let err: ChatError = StorageError::ReadOnly.into();
        assert!(matches!(err, ChatError::Storage(StorageError::ReadOnly)));
        assert_eq!(err.to_string(), "storage is read-only");
    }

    #[test]
    fn json_error_converts_into_chat_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChatError = parse.into();
        assert!(matches!(err, ChatError::Json(_)));
    }

    #[test]
    fn quota_error_reports_sizes() {
        let err = StorageError::QuotaExceeded { key: "k".into(), needed: 10, limit: 4 };
        assert_eq!(
            err.to_string(),
            "storage quota exceeded writing 'k': 10 bytes needed, limit 4"
        );
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Roles and status -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// Delivery status of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sending => write!(f, "sending"),
            MessageStatus::Processing => write!(f, "processing"),
            MessageStatus::Completed => write!(f, "completed"),
            MessageStatus::Error => write!(f, "error"),
        }
    }
}

// -- Message payloads -------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Server-side processing time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Result of a prompt-optimization pass. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub original_prompt: String,
    pub optimized_prompt: String,
    #[serde(default)]
    pub improvements: Vec<String>,
    pub confidence: f64,
    #[serde(default)]
    pub processing_time_ms: u64,
}

/// One chat turn as held in history, sent over the wire and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Older payloads name this field `type`.
    #[serde(alias = "type")]
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_data: Option<OptimizationResult>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status: None,
            metadata: None,
            optimization_data: None,
        }
    }

    /// An optimistic user turn, shown before the service confirms it.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage { status: Some(MessageStatus::Sending), ..Self::new(id, Role::User, content) }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage { status: Some(MessageStatus::Completed), ..Self::new(id, Role::Assistant, content) }
    }

    pub fn is_failed(&self) -> bool {
        self.status == Some(MessageStatus::Error)
    }
}

// -- Outbound history -------------------------------------------------------

/// Compact `{role, content}` pair sent to the backend as conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Build the context sent with a new turn. Failed turns are left out.
pub fn history_entries(messages: &[ChatMessage]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .filter(|m| !m.is_failed())
        .map(|m| HistoryEntry { role: m.role, content: m.content.clone() })
        .collect()
}

//! # livechat
//!
//! Client side of a realtime AI chat: a streaming chat service over SSE or
//! WebSocket, an event bus fanning service events out to listeners, and a
//! controller that keeps an ordered, locally cached message history in step
//! with those events.
//!
//! ## Pipeline
//!
//! ```text
//! ChatService (sse | ws) --publish--> EventBus --recv--> ChatSession
//!                                                          |
//!                                                   ChatController --persist--> ChatCache<Storage>
//! ```

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod history;
pub mod identity;
pub mod message;
pub mod render;
pub mod service;
pub mod session;
pub mod sse;
pub mod storage;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::{ChatConfig, Transport};
pub use controller::{ChatController, ConversationStatus};
pub use error::{ChatError, StorageError};
pub use events::{EventBus, ServiceEvent, Subscription};
pub use message::{ChatMessage, MessageStatus, OptimizationResult, Role};
pub use service::{ChatService, SseChatService, WsChatService};
pub use session::ChatSession;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Session behaviour driven by a scripted in-memory service: optimistic
//! sends, failure and retry, event application and cache lifecycle.

use std::sync::{Arc, Mutex};

use livechat::storage::{MemoryStorage, Storage};
use livechat::{
    ChatController, ChatError, ChatMessage, ChatService, ChatSession, ConversationStatus, EventBus,
    MessageStatus, OptimizationResult, ServiceEvent, Subscription,
};
use rstest::rstest;

const CACHE_KEY: &str = "chat_live_cache_v1";

/// Records every send; fails while `fail` is set.
#[derive(Clone, Default)]
struct ScriptedService {
    bus: EventBus,
    sent: Arc<Mutex<Vec<(String, usize)>>>,
    fail: Arc<Mutex<bool>>,
    refuse_connect: bool,
}

impl ScriptedService {
    fn set_failing(&self, fail: bool) {
        *self.fail.lock().expect("lock") = fail;
    }

    fn sent(&self) -> Vec<(String, usize)> {
        self.sent.lock().expect("lock").clone()
    }
}

impl ChatService for ScriptedService {
    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    async fn connect(&self) -> Result<(), ChatError> {
        if self.refuse_connect {
            self.bus.publish(ServiceEvent::error("connection refused"));
            return Err(ChatError::Disconnected);
        }
        self.bus.publish(ServiceEvent::Connected);
        Ok(())
    }

    async fn send_message(&self, content: &str, history: &[ChatMessage]) -> Result<String, ChatError> {
        self.sent.lock().expect("lock").push((content.to_string(), history.len()));
        if *self.fail.lock().expect("lock") {
            return Err(ChatError::Http { status: 503, url: "http://test/chat/stream".into(), body: String::new() });
        }
        Ok(format!("reply-{}", history.len()))
    }
}

fn session_with(service: ScriptedService, storage: MemoryStorage) -> ChatSession<ScriptedService, MemoryStorage> {
    ChatSession::new(service, ChatController::new(storage))
}

#[tokio::test]
async fn test_send_passes_prior_history() {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    session.start().await.expect("start");

    session.send("one").await.expect("send");
    service.bus.publish(ServiceEvent::MessageResponse { message: ChatMessage::assistant("a1", "first") });
    session.next_event().await.expect("event");
    session.send("two").await.expect("send");

    assert_eq!(service.sent(), vec![("one".to_string(), 0), ("two".to_string(), 2)]);
}

#[tokio::test]
async fn test_failed_send_keeps_message_and_retry_resends_same_id() {
    let service = ScriptedService::default();
    service.set_failing(true);
    let mut session = session_with(service.clone(), MemoryStorage::new());

    let id = session.send("hello").await.expect("send");
    let c = session.controller();
    assert_eq!(c.message(&id).and_then(|m| m.status), Some(MessageStatus::Error));
    assert!(matches!(c.status(), ConversationStatus::Errored { .. }));
    assert!(c.last_error().is_some_and(|e| e.contains("503")));

    service.set_failing(false);
    session.retry(&id).await.expect("retry");
    assert_eq!(session.controller().message(&id).and_then(|m| m.status), Some(MessageStatus::Completed));
    assert_eq!(session.controller().messages().len(), 1);
    assert_eq!(service.sent().len(), 2);
}

#[tokio::test]
async fn test_retry_rejected_for_completed_message() {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    let id = session.send("hello").await.expect("send");
    assert!(matches!(session.retry(&id).await, Err(ChatError::NotRetryable(_))));
    assert_eq!(service.sent().len(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_reported_not_fatal() {
    let service = ScriptedService { refuse_connect: true, ..ScriptedService::default() };
    let mut session = session_with(service.clone(), MemoryStorage::new());
    assert!(session.start().await.is_err());
    assert!(!session.controller().is_connected());
    assert!(session.controller().last_error().is_some());

    // Sending still works through the service.
    session.send("still here").await.expect("send");
    assert_eq!(service.sent().len(), 1);
}

#[tokio::test]
async fn test_restart_restores_cached_conversation() {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    session.send("remember me").await.expect("send");
    let storage = session.controller().storage().clone();
    drop(session);

    let mut restarted = session_with(ScriptedService::default(), storage);
    restarted.start().await.expect("start");
    let messages = restarted.controller().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "remember me");
}

#[tokio::test]
async fn test_clear_cache_removes_envelope() {
    let service = ScriptedService::default();
    let mut session = session_with(service, MemoryStorage::new());
    session.send("bye").await.expect("send");
    assert!(session.controller().storage().get(CACHE_KEY).expect("get").is_some());
    session.clear_cache();
    assert!(session.controller().messages().is_empty());
    assert!(session.controller().storage().get(CACHE_KEY).expect("get").is_none());
}

#[tokio::test]
async fn test_optimization_event_surfaces_result() {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    let id = session.send("write a haiku").await.expect("send");
    let result = OptimizationResult {
        original_prompt: "write a haiku".into(),
        optimized_prompt: "Write a haiku about rain.".into(),
        improvements: vec!["topic".into()],
        confidence: 0.9,
        processing_time_ms: 15,
    };
    service.bus.publish(ServiceEvent::Optimization { result: result.clone() });
    session.next_event().await.expect("event");
    assert_eq!(session.controller().optimization_result(), Some(&result));
    assert_eq!(session.controller().message(&id).and_then(|m| m.optimization_data.clone()), Some(result));
}

#[rstest]
#[case::disconnect(ServiceEvent::Disconnected)]
#[case::error(ServiceEvent::error("socket reset"))]
#[tokio::test]
async fn test_connection_loss_clears_indicators(#[case] event: ServiceEvent) {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    session.send("hi").await.expect("send");
    service.bus.publish(ServiceEvent::Typing { is_typing: true });
    service.bus.publish(ServiceEvent::MessageUpdate { message_id: "r".into(), content: "par".into() });
    service.bus.publish(event);
    for _ in 0..3 {
        session.next_event().await.expect("event");
    }

    let c = session.controller();
    assert!(!c.is_thinking());
    assert!(!c.is_ai_typing());
    assert!(c.streaming_message().is_none());
    assert_eq!(c.messages().len(), 1);
}

#[rstest]
#[case("", true)]
#[case("   \n\t", true)]
#[case("hi", false)]
#[tokio::test]
async fn test_blank_input_rejected(#[case] input: &str, #[case] rejected: bool) {
    let service = ScriptedService::default();
    let mut session = session_with(service.clone(), MemoryStorage::new());
    let result = session.send(input).await;
    assert_eq!(matches!(result, Err(ChatError::EmptyMessage)), rejected);
    assert_eq!(service.sent().len(), usize::from(!rejected));
}

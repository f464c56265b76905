//! Ordered message history addressed by id.
//!
//! Messages live in a map keyed by id; a separate vector records insertion
//! order. Reconciling a server response against an optimistic message is a
//! map lookup rather than a scan, and an update never moves a message.

use std::collections::HashMap;

use crate::message::ChatMessage;

#[derive(Debug, Default, Clone)]
pub struct MessageHistory {
    order: Vec<String>,
    by_id: HashMap<String, ChatMessage>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from an already ordered list (cache restore).
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let mut history = Self::new();
        for message in messages {
            history.upsert(message);
        }
        history
    }

    /// Insert `message` at the tail, or replace it in place when its id is
    /// already present. Position is fixed by the first insertion.
    pub fn upsert(&mut self, message: ChatMessage) {
        if !self.by_id.contains_key(&message.id) {
            self.order.push(message.id.clone());
        }
        self.by_id.insert(message.id.clone(), message);
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.by_id.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Messages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.order.last().and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_appends_in_order() {
        let mut h = MessageHistory::new();
        h.upsert(ChatMessage::user("a", "one"));
        h.upsert(ChatMessage::assistant("b", "two"));
        h.upsert(ChatMessage::user("c", "three"));
        let ids: Vec<&str> = h.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_upsert_existing_id_keeps_position() {
        let mut h = MessageHistory::new();
        h.upsert(ChatMessage::user("a", "one"));
        h.upsert(ChatMessage::assistant("b", "two"));
        h.upsert(ChatMessage::user("a", "one (edited)"));
        assert_eq!(h.len(), 2);
        let first = h.iter().next().expect("first");
        assert_eq!(first.id, "a");
        assert_eq!(first.content, "one (edited)");
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut h = MessageHistory::new();
        h.upsert(ChatMessage::assistant("b", "partial"));
        h.get_mut("b").expect("present").content = "full".to_string();
        assert_eq!(h.get("b").map(|m| m.content.as_str()), Some("full"));
    }

    #[test]
    fn test_clear_empties_history() {
        let mut h = MessageHistory::from_messages(vec![ChatMessage::user("a", "x")]);
        assert!(!h.is_empty());
        h.clear();
        assert!(h.is_empty());
        assert!(h.last().is_none());
        assert!(!h.contains("a"));
    }
}

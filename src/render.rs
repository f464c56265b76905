//! Terminal formatting for messages, streaming text and notices.

use colored::*;

use crate::controller::ConversationStatus;
use crate::events::ServiceEvent;
use crate::message::{ChatMessage, MessageStatus, OptimizationResult, Role};

/// One finished message as a single printable block.
pub fn format_message(message: &ChatMessage) -> String {
    let label = match message.role {
        Role::User => "you".bright_blue().bold(),
        Role::Assistant => "assistant".bright_green().bold(),
        Role::System => "system".bright_black().bold(),
    };
    let time = message.timestamp.format("%H:%M").to_string().dimmed();
    let marker = match message.status {
        Some(MessageStatus::Error) => format!(" {}", "[failed, /retry to resend]".red()),
        Some(MessageStatus::Sending) => format!(" {}", "[sending]".dimmed()),
        _ => String::new(),
    };
    format!("{} {}{}\n{}", label, time, marker, message.content)
}

pub fn format_optimization(result: &OptimizationResult) -> String {
    let mut out = format!(
        "{} {} ({:.0}% confidence, {}ms)",
        "optimized:".magenta().bold(),
        result.optimized_prompt,
        result.confidence * 100.0,
        result.processing_time_ms
    );
    for improvement in &result.improvements {
        out.push_str(&format!("\n  - {}", improvement));
    }
    out
}

/// Short status line for indicator-style events, `None` for events whose
/// effect is shown some other way.
pub fn format_notice(event: &ServiceEvent) -> Option<String> {
    match event {
        ServiceEvent::Connected => Some("connected".green().to_string()),
        ServiceEvent::Disconnected => Some("disconnected".yellow().to_string()),
        ServiceEvent::Error { message } => Some(format!("{} {}", "error:".red().bold(), message)),
        _ => None,
    }
}

pub fn format_status(status: &ConversationStatus) -> String {
    match status {
        ConversationStatus::Idle | ConversationStatus::Completed => String::new(),
        ConversationStatus::Sending { .. } => "sending...".dimmed().to_string(),
        ConversationStatus::AwaitingResponse { typing: false, .. } => "thinking...".dimmed().to_string(),
        ConversationStatus::AwaitingResponse { typing: true, .. } | ConversationStatus::Streaming { .. } => {
            "typing...".dimmed().to_string()
        }
        ConversationStatus::Errored { error, .. } => format!("{} {}", "error:".red(), error),
    }
}

/// Tracks the last status line shown so the CLI prints only transitions.
#[derive(Debug, Default)]
pub struct StatusLine {
    last: String,
}

impl StatusLine {
    /// Text to print for `status`, or `None` when it is blank or unchanged.
    pub fn update(&mut self, status: &ConversationStatus) -> Option<String> {
        let text = format_status(status);
        if text == self.last {
            return None;
        }
        self.last = text.clone();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_failed_user_message_shows_retry_hint() {
        plain();
        let mut m = ChatMessage::user("u1", "hello");
        m.status = Some(MessageStatus::Error);
        let out = format_message(&m);
        assert!(out.starts_with("you "));
        assert!(out.contains("/retry"));
        assert!(out.ends_with("\nhello"));
    }

    #[test]
    fn test_completed_assistant_has_no_marker() {
        plain();
        let out = format_message(&ChatMessage::assistant("a1", "hi"));
        assert!(out.starts_with("assistant "));
        assert!(!out.contains('['));
    }

    #[test]
    fn test_optimization_lists_improvements() {
        plain();
        let r = OptimizationResult {
            original_prompt: "a".into(),
            optimized_prompt: "b".into(),
            improvements: vec!["clarity".into(), "scope".into()],
            confidence: 0.75,
            processing_time_ms: 40,
        };
        let out = format_optimization(&r);
        assert!(out.contains("75% confidence"));
        assert!(out.contains("- clarity\n  - scope"));
    }

    #[test]
    fn test_notice_only_for_connection_events() {
        plain();
        assert_eq!(format_notice(&ServiceEvent::Connected).as_deref(), Some("connected"));
        assert_eq!(format_notice(&ServiceEvent::error("boom")).as_deref(), Some("error: boom"));
        assert!(format_notice(&ServiceEvent::Typing { is_typing: true }).is_none());
    }

    #[test]
    fn test_status_text() {
        plain();
        assert_eq!(format_status(&ConversationStatus::Idle), "");
        let waiting = ConversationStatus::AwaitingResponse { message_id: "u".into(), typing: true };
        assert_eq!(format_status(&waiting), "typing...");
    }

    #[test]
    fn test_status_line_prints_transitions_only() {
        plain();
        let mut line = StatusLine::default();
        let sending = ConversationStatus::Sending { message_id: "u".into() };
        let waiting = ConversationStatus::AwaitingResponse { message_id: "u".into(), typing: false };
        assert_eq!(line.update(&sending).as_deref(), Some("sending..."));
        assert_eq!(line.update(&sending), None);
        assert_eq!(line.update(&waiting).as_deref(), Some("thinking..."));
        assert_eq!(line.update(&ConversationStatus::Completed), None);
        assert_eq!(line.update(&waiting).as_deref(), Some("thinking..."));
    }
}

//! Token estimation and history-truncation helpers.
//!
//! `estimate_tokens` deliberately uses a crude characters-divided-by-four
//! heuristic rather than a real tokenizer — good enough to drive the
//! auto-compaction threshold check in [`crate::agent::Agent`], not accurate
//! enough to bill against. Telemetry always records the provider-reported
//! `usage` field instead (see [`crate::observability`]).

use crate::types::Message;

/// Estimate the token count of a message history.
///
/// Uses `total_characters / 4`, matching the simple heuristic the reference
/// session bookkeeping uses rather than the bureaucracy of a model-specific
/// tokenizer. There is no per-message or conversation-level overhead added.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let total_chars: usize = messages.iter().map(Message::char_len).sum();
    total_chars / 4
}

/// Whether the estimated token count of `messages` is within `margin` of
/// `limit` (e.g. `margin = 0.8` trips at 80% of the limit).
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let threshold = (limit as f32 * margin) as usize;
    estimate_tokens(messages) >= threshold
}

/// Keep the last `keep` messages, optionally preserving a leading system
/// message so the agent doesn't lose its instructions on truncation.
///
/// This is a blunt fallback for callers managing history manually; the
/// agent loop itself prefers [`crate::session::Session::replace_with_summary`]
/// which keeps a model-generated summary instead of discarding messages
/// outright.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.len() <= keep {
        return messages.to_vec();
    }

    let system_msg = if preserve_system {
        messages
            .first()
            .filter(|m| m.role == crate::types::MessageRole::System)
            .cloned()
    } else {
        None
    };

    let tail_start = messages.len() - keep;
    let mut result = Vec::with_capacity(keep + 1);
    if let Some(sys) = system_msg {
        result.push(sys);
    }
    result.extend_from_slice(&messages[tail_start..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, ToolCallRequest};

    #[test]
    fn test_estimate_tokens_empty() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn test_estimate_tokens_simple() {
        // "abcd" -> 4 chars -> 1 token.
        let messages = vec![Message::user("abcd")];
        assert_eq!(estimate_tokens(&messages), 1);
    }

    #[test]
    fn test_estimate_tokens_floor_division() {
        // 7 chars / 4 = 1 (floor, not ceiling).
        let messages = vec![Message::user("1234567")];
        assert_eq!(estimate_tokens(&messages), 1);
    }

    #[test]
    fn test_estimate_tokens_includes_tool_calls() {
        let call = ToolCallRequest::new("id", "bash", "{\"command\":\"ls -la\"}".to_string());
        let messages = vec![Message::assistant_tool_calls(None, vec![call])];
        assert!(estimate_tokens(&messages) > 0);
    }

    #[test]
    fn test_is_approaching_limit() {
        let long = "x".repeat(400);
        let messages = vec![Message::user(long)]; // ~100 tokens
        assert!(is_approaching_limit(&messages, 100, 0.8));
        assert!(!is_approaching_limit(&messages, 1000, 0.8));
    }

    #[test]
    fn test_truncate_messages_preserves_system() {
        let messages = vec![
            Message::system("be helpful"),
            Message::user("one"),
            Message::user("two"),
            Message::user("three"),
        ];
        let truncated = truncate_messages(&messages, 2, true);
        assert_eq!(truncated.len(), 3);
        assert_eq!(truncated[0].role, crate::types::MessageRole::System);
        assert_eq!(truncated[1].content.as_deref(), Some("two"));
        assert_eq!(truncated[2].content.as_deref(), Some("three"));
    }

    #[test]
    fn test_truncate_messages_no_system_preservation() {
        let messages = vec![
            Message::system("be helpful"),
            Message::user("one"),
            Message::user("two"),
        ];
        let truncated = truncate_messages(&messages, 1, false);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].content.as_deref(), Some("two"));
    }

    #[test]
    fn test_truncate_messages_shorter_than_keep() {
        let messages = vec![Message::user("one")];
        let truncated = truncate_messages(&messages, 5, true);
        assert_eq!(truncated.len(), 1);
    }
}

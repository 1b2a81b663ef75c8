//! Conversation state: message history and cumulative token usage.
//!
//! History is stored in the same shape the model client sends over the
//! wire ([`Message`]), so [`Session::get_messages`] needs no translation
//! step before being handed to [`crate::client::ModelClient`].

use crate::types::{Message, MessageRole, ToolCallRequest};

/// The result of one tool call, ready to be appended to history as a
/// `tool`-role message.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: tool_call_id.into(), content: content.into() }
    }
}

/// Manages conversation state and history across turns.
#[derive(Debug, Clone)]
pub struct Session {
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl Session {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), history: Vec::new(), total_input_tokens: 0, total_output_tokens: 0 }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.history.push(Message::assistant(content));
    }

    pub fn add_assistant_tool_calls(&mut self, content: Option<String>, tool_calls: Vec<ToolCallRequest>) {
        self.history.push(Message::assistant_tool_calls(content, tool_calls));
    }

    pub fn add_tool_results(&mut self, results: Vec<ToolResult>) {
        for result in results {
            self.history.push(Message::tool_result(result.tool_call_id, result.content));
        }
    }

    pub fn update_token_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.total_input_tokens += input_tokens;
        self.total_output_tokens += output_tokens;
    }

    /// Returns a copy of the history in wire-ready order.
    pub fn get_messages(&self) -> Vec<Message> {
        self.history.clone()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Replaces history with a compacted summary, optionally preserving a
    /// handful of recent user messages ahead of it (the Codex pattern: the
    /// summary reads as a fresh user turn, not a system directive).
    pub fn replace_with_summary(&mut self, summary: impl Into<String>, recent_user_messages: Option<Vec<String>>) {
        self.history.clear();
        if let Some(messages) = recent_user_messages {
            for msg in messages {
                self.history.push(Message::user(msg));
            }
        }
        self.history.push(Message::user(summary));
    }

    pub fn get_user_messages(&self) -> Vec<String> {
        self.history
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .filter_map(|m| m.content.clone())
            .collect()
    }

    /// Rough token estimate for the full session (4 chars ≈ 1 token).
    pub fn estimate_tokens(&self) -> u64 {
        let mut total_chars = self.system_prompt.len();
        for message in &self.history {
            total_chars += message.char_len();
        }
        (total_chars / 4) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_user_and_assistant_messages() {
        let mut session = Session::new("be helpful");
        session.add_user_message("hi");
        session.add_assistant_message("hello");
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].role, MessageRole::User);
        assert_eq!(session.history[1].role, MessageRole::Assistant);
    }

    #[test]
    fn test_add_tool_results_appends_tool_messages() {
        let mut session = Session::new("be helpful");
        session.add_tool_results(vec![ToolResult::new("call_1", "42")]);
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].role, MessageRole::Tool);
        assert_eq!(session.history[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_update_token_usage_accumulates() {
        let mut session = Session::new("x");
        session.update_token_usage(10, 20);
        session.update_token_usage(5, 5);
        assert_eq!(session.total_input_tokens, 15);
        assert_eq!(session.total_output_tokens, 25);
    }

    #[test]
    fn test_replace_with_summary_preserves_recent_messages() {
        let mut session = Session::new("x");
        session.add_user_message("first");
        session.add_assistant_message("reply");
        session.replace_with_summary("summary text", Some(vec!["recent question".to_string()]));
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].content.as_deref(), Some("recent question"));
        assert_eq!(session.history[1].content.as_deref(), Some("summary text"));
    }

    #[test]
    fn test_get_user_messages_filters_by_role() {
        let mut session = Session::new("x");
        session.add_user_message("one");
        session.add_assistant_message("two");
        session.add_user_message("three");
        assert_eq!(session.get_user_messages(), vec!["one".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_estimate_tokens_grows_with_history() {
        let mut session = Session::new("x");
        let empty_estimate = session.estimate_tokens();
        session.add_user_message("a somewhat longer message to estimate");
        assert!(session.estimate_tokens() > empty_estimate);
    }

    #[test]
    fn test_clear_empties_history() {
        let mut session = Session::new("x");
        session.add_user_message("hi");
        session.clear();
        assert!(session.history.is_empty());
    }
}

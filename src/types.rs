//! Core conversation types shared by the session, the model client, and the
//! agent loop: [`Message`], [`MessageRole`], and the OpenAI-compatible
//! tool-call wire shapes.
//!
//! These are deliberately close to the OpenAI chat-completion message format
//! rather than a richer internal representation, because messages round-trip
//! through [`crate::session::Session`] straight back onto the wire — there is
//! no intermediate content-block abstraction to keep in sync with it.

use serde::{Deserialize, Serialize};

/// Who sent a message in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Establishes agent behavior; always the first message sent to the model.
    System,
    /// Input from the human or calling application, or a tool result
    /// (tool results use `Role::Tool`, not `User`).
    User,
    /// The model's response, optionally carrying `tool_calls`.
    Assistant,
    /// A tool execution result, correlated to a call via `tool_call_id`.
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        write!(f, "{s}")
    }
}

/// A single function call within an OpenAI-style `tool_calls` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the wire format requires —
    /// *not* a parsed `Value`. This is what gets echoed back to the model
    /// verbatim when the assistant message is replayed in history.
    pub arguments: String,
}

/// An assistant-issued tool call as it appears in `Message::tool_calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments_json: String) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments_json,
            },
        }
    }
}

/// A message in the conversation, shaped to serialize directly onto the
/// OpenAI chat-completions wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Assistant text response with no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Assistant message carrying tool calls. `content` may be empty if the
    /// model produced no text alongside the calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// A tool result message correlated back to the call that produced it.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Character length of this message's content plus any tool-call
    /// payload, used by [`crate::session::Session::estimate_tokens`].
    pub fn char_len(&self) -> usize {
        let mut len = self.content.as_ref().map_or(0, |c| c.len());
        if let Some(calls) = &self.tool_calls {
            for call in calls {
                len += call.function.name.len() + call.function.arguments.len();
            }
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_display() {
        assert_eq!(MessageRole::System.to_string(), "system");
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }

    #[test]
    fn test_message_constructors() {
        let sys = Message::system("be helpful");
        assert_eq!(sys.role, MessageRole::System);
        assert_eq!(sys.content.as_deref(), Some("be helpful"));

        let user = Message::user("hi");
        assert_eq!(user.role, MessageRole::User);

        let tool_msg = Message::tool_result("call_1", "42");
        assert_eq!(tool_msg.role, MessageRole::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_assistant_tool_calls_message() {
        let call = ToolCallRequest::new("call_1", "bash", "{\"command\":\"ls\"}".to_string());
        let msg = Message::assistant_tool_calls(None, vec![call]);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.unwrap().len(), 1);
    }

    #[test]
    fn test_message_serializes_like_openai_wire_format() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_char_len_includes_tool_calls() {
        let call = ToolCallRequest::new("id", "name", "{}".to_string());
        let msg = Message::assistant_tool_calls(Some("hi".to_string()), vec![call]);
        assert_eq!(msg.char_len(), 2 + "name".len() + "{}".len());
    }
}

//! The core agent loop: streams a model turn, dispatches any tool calls,
//! and loops back with results until the model produces a final answer.
//!
//! Grounded on `ro_agent/core/agent.py::Agent`. Emitted as a stream of
//! [`AgentEvent`]s rather than Python's async generator, matching this
//! crate's streaming-first idiom elsewhere ([`crate::client::ModelClient`]).

use crate::client::{ModelClient, Prompt, StreamEvent};
use crate::session::{Session, ToolResult};
use crate::tools::{ToolInvocation, ToolRegistry};
use crate::types::ToolCallRequest;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Max characters stored in history per tool result (roughly 5-8k tokens).
pub const MAX_TOOL_OUTPUT_CHARS: usize = 20_000;

/// Default context window threshold for auto-compaction (80% of a typical
/// 128k window).
pub const DEFAULT_CONTEXT_LIMIT: u64 = 100_000;
pub const AUTO_COMPACT_THRESHOLD: f64 = 0.8;

pub const COMPACTION_SYSTEM_PROMPT: &str = "\
You are performing a CONTEXT CHECKPOINT COMPACTION. Create a handoff summary for another LLM that will resume the task.

Include:
- Current progress and key decisions made
- Important context, constraints, or user preferences discovered
- What remains to be done (clear next steps)
- Any critical data, file paths, or references needed to continue

Be concise, structured, and focused on helping the next LLM seamlessly continue the work.";

pub const SUMMARY_PREFIX: &str = "\
Another language model worked on this task and produced a summary of its progress. Use this to build on the work that has already been done and avoid duplicating effort. Here is the summary:

";

/// An approval callback: given a tool name and its arguments, resolves to
/// whether the call is approved.
pub type ApprovalCallback = Arc<dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// Why a compaction happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactTrigger {
    Manual,
    Auto,
}

impl CompactTrigger {
    fn as_str(self) -> &'static str {
        match self {
            CompactTrigger::Manual => "manual",
            CompactTrigger::Auto => "auto",
        }
    }
}

/// Result of a compaction operation.
#[derive(Debug, Clone)]
pub struct CompactResult {
    pub summary: String,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub trigger: CompactTrigger,
}

/// Cumulative token usage surfaced on `turn_complete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnUsage {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

/// An event emitted by the agent while it runs a turn.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Text { content: String },
    ToolStart { tool_name: String, tool_args: Value },
    ToolEnd { tool_name: String, tool_result: String, tool_metadata: std::collections::HashMap<String, Value> },
    ToolBlocked { tool_name: String, tool_args: Value },
    CompactStart { trigger: CompactTrigger },
    CompactEnd { content: String },
    TurnComplete { usage: TurnUsage },
    Cancelled { content: String },
    Error { content: String },
}

/// Truncates tool output to prevent context overflow. Keeps the first and
/// last half of the budget so error messages at the end of output survive.
pub fn truncate_output(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let half = max_chars / 2;
    let elided = content.len() - max_chars;

    let head = take_chars(content, half);
    let tail = take_chars_from_end(content, half);
    format!("{head}\n\n[... {elided} chars elided ...]\n\n{tail}")
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn take_chars_from_end(s: &str, n: usize) -> &str {
    let total = s.chars().count();
    if total <= n {
        return s;
    }
    match s.char_indices().nth(total - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Orchestrates the conversation loop: builds prompts from session state,
/// streams the model response, dispatches tool calls, and loops back with
/// results until the model produces a final answer with no tool calls.
pub struct Agent {
    session: Session,
    registry: ToolRegistry,
    client: ModelClient,
    approval_callback: Option<ApprovalCallback>,
    context_limit: u64,
    auto_compact: bool,
    cancel_requested: AtomicBool,
    cancel_check: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl Agent {
    pub fn new(session: Session, registry: ToolRegistry, client: ModelClient) -> Self {
        Self {
            session,
            registry,
            client,
            approval_callback: None,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            auto_compact: true,
            cancel_requested: AtomicBool::new(false),
            cancel_check: None,
        }
    }

    pub fn with_approval_callback(mut self, callback: ApprovalCallback) -> Self {
        self.approval_callback = Some(callback);
        self
    }

    pub fn with_context_limit(mut self, context_limit: u64) -> Self {
        self.context_limit = context_limit;
        self
    }

    pub fn with_auto_compact(mut self, auto_compact: bool) -> Self {
        self.auto_compact = auto_compact;
        self
    }

    pub fn with_cancel_check(mut self, cancel_check: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.cancel_check = Some(cancel_check);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn reset_cancel(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
    }

    /// Checks the in-process flag and the optional external predicate.
    /// Latches: once the external check fires, it's treated as requested
    /// from then on so later checks don't re-invoke it needlessly.
    pub fn is_cancelled(&self) -> bool {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(check) = &self.cancel_check {
            if check() {
                self.cancel_requested.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    pub fn should_auto_compact(&self) -> bool {
        if !self.auto_compact {
            return false;
        }
        let estimated = self.session.estimate_tokens();
        let threshold = (self.context_limit as f64 * AUTO_COMPACT_THRESHOLD) as u64;
        estimated > threshold
    }

    /// Summarizes conversation history into a handoff summary and replaces
    /// history with it, preserving the last few user messages for context.
    pub async fn compact(&mut self, custom_instructions: &str, trigger: CompactTrigger) -> crate::Result<CompactResult> {
        let tokens_before = self.session.estimate_tokens();

        let mut system = COMPACTION_SYSTEM_PROMPT.to_string();
        if !custom_instructions.is_empty() {
            system.push_str(&format!("\n\nUser guidance: {custom_instructions}"));
        }

        let conversation_text = format_history_for_summary(&self.session);
        let messages = vec![
            crate::types::Message::system(system),
            crate::types::Message::user(format!("Here is the conversation to summarize:\n\n{conversation_text}")),
        ];

        let (summary, usage) = self.client.complete(&messages).await?;
        self.session.update_token_usage(usage.input_tokens, usage.output_tokens);

        let formatted_summary = format!("{SUMMARY_PREFIX}{summary}");

        let user_messages = self.session.get_user_messages();
        let recent = if user_messages.len() > 3 { user_messages[user_messages.len() - 3..].to_vec() } else { Vec::new() };

        self.session.replace_with_summary(formatted_summary, Some(recent));

        let tokens_after = self.session.estimate_tokens();

        Ok(CompactResult { summary, tokens_before, tokens_after, trigger })
    }

    /// Runs a single conversation turn, which may involve multiple model
    /// calls if tools are invoked. Returns the events emitted, in order.
    pub async fn run_turn(&mut self, user_input: &str) -> Vec<AgentEvent> {
        self.reset_cancel();
        let mut events = Vec::new();

        if self.should_auto_compact() {
            events.push(AgentEvent::CompactStart { trigger: CompactTrigger::Auto });
            match self.compact("", CompactTrigger::Auto).await {
                Ok(result) => {
                    events.push(AgentEvent::CompactEnd {
                        content: format!("Compacted: {} -> {} tokens", result.tokens_before, result.tokens_after),
                    });
                }
                Err(e) => {
                    events.push(AgentEvent::Error { content: e.to_string() });
                    return events;
                }
            }
        }

        self.session.add_user_message(user_input);

        loop {
            if self.is_cancelled() {
                events.push(AgentEvent::Cancelled { content: "Cancelled before model call".to_string() });
                return events;
            }

            let prompt = Prompt {
                system: self.session.system_prompt.clone(),
                messages: self.session.get_messages(),
                tools: self.registry.get_specs(),
            };

            let mut text_content = String::new();
            let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
            let mut pending_tool_calls: Vec<(String, String, Value)> = Vec::new();
            let mut turn_usage = TurnUsage {
                total_input_tokens: self.session.total_input_tokens,
                total_output_tokens: self.session.total_output_tokens,
            };

            use futures::StreamExt;
            let mut stream = self.client.stream(prompt).await;
            let mut errored = false;
            while let Some(event) = stream.next().await {
                if self.is_cancelled() {
                    events.push(AgentEvent::Cancelled { content: "Cancelled during model response".to_string() });
                    return events;
                }

                match event {
                    StreamEvent::Text { content } => {
                        text_content.push_str(&content);
                        events.push(AgentEvent::Text { content });
                    }
                    StreamEvent::ToolCall { tool_call } => {
                        events.push(AgentEvent::ToolStart { tool_name: tool_call.name.clone(), tool_args: tool_call.arguments.clone() });
                        let arguments_json = serde_json::to_string(&tool_call.arguments).unwrap_or_else(|_| "{}".to_string());
                        tool_calls.push(ToolCallRequest::new(tool_call.id.clone(), tool_call.name.clone(), arguments_json));
                        pending_tool_calls.push((tool_call.id, tool_call.name, tool_call.arguments));
                    }
                    StreamEvent::Done { usage } => {
                        self.session.update_token_usage(usage.input_tokens, usage.output_tokens);
                        turn_usage = TurnUsage {
                            total_input_tokens: self.session.total_input_tokens,
                            total_output_tokens: self.session.total_output_tokens,
                        };
                    }
                    StreamEvent::Error { content } => {
                        events.push(AgentEvent::Error { content });
                        errored = true;
                        break;
                    }
                }
            }
            if errored {
                return events;
            }

            if !tool_calls.is_empty() {
                self.session.add_assistant_tool_calls(if text_content.is_empty() { None } else { Some(text_content) }, tool_calls);
            } else if !text_content.is_empty() {
                self.session.add_assistant_message(text_content);
            }

            if pending_tool_calls.is_empty() {
                events.push(AgentEvent::TurnComplete { usage: turn_usage });
                return events;
            }

            let mut tool_results = Vec::new();
            let mut rejected = false;

            for (index, (tool_id, tool_name, tool_args)) in pending_tool_calls.iter().enumerate() {
                if self.is_cancelled() {
                    events.push(AgentEvent::Cancelled { content: "Cancelled before tool execution".to_string() });
                    return events;
                }

                if let Some(callback) = &self.approval_callback {
                    if self.registry.requires_approval(tool_name) {
                        let approved = callback(tool_name.clone(), tool_args.clone()).await;
                        if !approved {
                            tool_results.push(ToolResult::new(tool_id.clone(), "Command rejected by user. Awaiting new instructions."));
                            events.push(AgentEvent::ToolBlocked { tool_name: tool_name.clone(), tool_args: tool_args.clone() });
                            rejected = true;
                            for (remaining_id, _, _) in &pending_tool_calls[index + 1..] {
                                tool_results.push(ToolResult::new(remaining_id.clone(), "Command skipped - user rejected previous command."));
                            }
                            break;
                        }
                    }
                }

                let invocation = ToolInvocation { call_id: tool_id.clone(), tool_name: tool_name.clone(), arguments: tool_args.clone() };
                let output = self.registry.dispatch(invocation).await;
                let truncated_content = truncate_output(&output.content, MAX_TOOL_OUTPUT_CHARS);
                tool_results.push(ToolResult::new(tool_id.clone(), truncated_content.clone()));
                events.push(AgentEvent::ToolEnd { tool_name: tool_name.clone(), tool_result: truncated_content, tool_metadata: output.metadata });
            }

            self.session.add_tool_results(tool_results);

            if rejected {
                events.push(AgentEvent::TurnComplete {
                    usage: TurnUsage {
                        total_input_tokens: self.session.total_input_tokens,
                        total_output_tokens: self.session.total_output_tokens,
                    },
                });
                return events;
            }
        }
    }
}

fn format_history_for_summary(session: &Session) -> String {
    let mut parts = Vec::new();
    for msg in session.get_messages() {
        match msg.role {
            crate::types::MessageRole::User => {
                if let Some(content) = &msg.content {
                    parts.push(format!("User: {content}"));
                }
            }
            crate::types::MessageRole::Assistant => {
                if let Some(content) = &msg.content {
                    if !content.is_empty() {
                        parts.push(format!("Assistant: {content}"));
                    }
                }
                if let Some(calls) = &msg.tool_calls {
                    for call in calls {
                        parts.push(format!("Assistant called tool: {}", call.function.name));
                    }
                }
            }
            crate::types::MessageRole::Tool => {
                let mut result = msg.content.clone().unwrap_or_default();
                if result.len() > 500 {
                    result = format!("{}...", take_chars(&result, 500));
                }
                parts.push(format!("Tool result: {result}"));
            }
            crate::types::MessageRole::System => {}
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_leaves_short_content_untouched() {
        assert_eq!(truncate_output("hello", 20), "hello");
    }

    #[test]
    fn test_truncate_output_keeps_head_and_tail() {
        let content = "a".repeat(50_000);
        let truncated = truncate_output(&content, MAX_TOOL_OUTPUT_CHARS);
        assert!(truncated.len() < content.len());
        assert!(truncated.contains("elided"));
        assert!(truncated.starts_with('a'));
        assert!(truncated.ends_with('a'));
    }

    #[test]
    fn test_should_auto_compact_respects_flag() {
        let session = Session::new("x");
        let client = ModelClient::new("m", "http://localhost:1234/v1", "", None).unwrap();
        let agent = Agent::new(session, ToolRegistry::new(), client).with_auto_compact(false);
        assert!(!agent.should_auto_compact());
    }

    #[test]
    fn test_cancel_request_latches() {
        let session = Session::new("x");
        let client = ModelClient::new("m", "http://localhost:1234/v1", "", None).unwrap();
        let agent = Agent::new(session, ToolRegistry::new(), client);
        assert!(!agent.is_cancelled());
        agent.request_cancel();
        assert!(agent.is_cancelled());
    }

    #[test]
    fn test_format_history_for_summary_truncates_long_tool_results() {
        let mut session = Session::new("x");
        session.add_user_message("question");
        session.add_tool_results(vec![ToolResult::new("call_1", "x".repeat(1000))]);
        let formatted = format_history_for_summary(&session);
        assert!(formatted.contains("Tool result:"));
        assert!(formatted.contains("..."));
    }
}

//! Wraps an [`crate::agent::Agent`] turn's event stream to populate
//! [`TelemetryContext`] and push records to an [`Exporter`], without
//! altering the events themselves.
//!
//! Grounded on `ro_agent/observability/processor.py::ObservabilityProcessor`.

use super::context::{TelemetryContext, ToolExecutionContext, TurnContext};
use super::exporter::Exporter;
use crate::agent::AgentEvent;
use std::sync::Arc;

/// Observes a turn's events and records session/turn/tool-execution
/// telemetry as a side effect. Holds the mutable [`TelemetryContext`]
/// across turns so cumulative totals (turns, tokens, tool calls) survive
/// between calls to [`Self::wrap_turn`].
pub struct ObservabilityProcessor {
    context: TelemetryContext,
    exporter: Arc<dyn Exporter>,
    capture_tool_arguments: bool,
    capture_tool_results: bool,
}

impl ObservabilityProcessor {
    pub fn new(context: TelemetryContext, exporter: Arc<dyn Exporter>) -> Self {
        Self { context, exporter, capture_tool_arguments: true, capture_tool_results: false }
    }

    pub fn with_capture(mut self, tool_arguments: bool, tool_results: bool) -> Self {
        self.capture_tool_arguments = tool_arguments;
        self.capture_tool_results = tool_results;
        self
    }

    pub fn context(&self) -> &TelemetryContext {
        &self.context
    }

    /// Called once per agent run, before any turn.
    pub async fn start_session(&self) {
        self.exporter.start_session(&self.context).await;
    }

    /// Called once per agent run, after the last turn.
    pub async fn end_session(&mut self, status: impl Into<String>) {
        self.context.end_session(status);
        self.exporter.end_session(&self.context).await;
    }

    /// Processes one turn's events in order, recording telemetry as each
    /// event passes through, and returns the same events unmodified so the
    /// caller can still render them to a UI.
    pub async fn wrap_turn(&mut self, user_input: &str, events: Vec<AgentEvent>) -> Vec<AgentEvent> {
        let turn_id = self.context.start_turn();
        let mut turn = TurnContext::new(turn_id, self.context.session_id.clone(), self.context.current_turn_index, user_input);
        self.exporter.start_turn(&self.context, &turn).await;

        let mut pending: Option<(ToolExecutionContext, String)> = None;

        for event in &events {
            match event {
                AgentEvent::ToolStart { tool_name, tool_args } => {
                    let args = if self.capture_tool_arguments {
                        tool_args.clone()
                    } else {
                        serde_json::Value::Null
                    };
                    pending = Some((ToolExecutionContext::new(turn.turn_id.clone(), tool_name.clone(), args), tool_name.clone()));
                }
                AgentEvent::ToolEnd { tool_name, tool_result, tool_metadata: _ } => {
                    if let Some((mut exec, pending_name)) = pending.take() {
                        if &pending_name == tool_name {
                            if self.capture_tool_results {
                                exec.result = Some(tool_result.clone());
                            }
                            exec.end(true, None);
                            self.exporter.record_tool_execution(&exec).await;
                            turn.tool_calls += 1;
                            self.context.record_tool_call();
                        }
                    }
                }
                AgentEvent::ToolBlocked { tool_name, tool_args: _ } => {
                    if let Some((mut exec, pending_name)) = pending.take() {
                        if &pending_name == tool_name {
                            exec.end(false, Some("Blocked by user".to_string()));
                            self.exporter.record_tool_execution(&exec).await;
                            turn.tool_calls += 1;
                            self.context.record_tool_call();
                        }
                    }
                }
                AgentEvent::Error { content } => {
                    if let Some((mut exec, _)) = pending.take() {
                        exec.end(false, Some(content.clone()));
                        self.exporter.record_tool_execution(&exec).await;
                        turn.tool_calls += 1;
                        self.context.record_tool_call();
                    }
                }
                AgentEvent::TurnComplete { usage } => {
                    let input_delta = usage.total_input_tokens.saturating_sub(self.context.total_input_tokens);
                    let output_delta = usage.total_output_tokens.saturating_sub(self.context.total_output_tokens);
                    turn.input_tokens = input_delta;
                    turn.output_tokens = output_delta;
                    self.context.record_tokens(input_delta, output_delta);
                    self.exporter.record_model_call(&turn, input_delta, output_delta).await;
                }
                _ => {}
            }
        }

        turn.end();
        self.exporter.end_turn(&self.context, &turn).await;
        self.context.end_turn();

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TurnUsage;
    use crate::observability::exporter::NoOpExporter;
    use serde_json::json;

    fn sample_events() -> Vec<AgentEvent> {
        vec![
            AgentEvent::Text { content: "Okay.".to_string() },
            AgentEvent::ToolStart { tool_name: "echo".to_string(), tool_args: json!({"text": "hi"}) },
            AgentEvent::ToolEnd { tool_name: "echo".to_string(), tool_result: "hi".to_string(), tool_metadata: Default::default() },
            AgentEvent::Text { content: "Done: hi".to_string() },
            AgentEvent::TurnComplete { usage: TurnUsage { total_input_tokens: 100, total_output_tokens: 50 } },
        ]
    }

    #[tokio::test]
    async fn test_wrap_turn_returns_events_unmodified() {
        let ctx = TelemetryContext::new("team", "proj");
        let mut processor = ObservabilityProcessor::new(ctx, Arc::new(NoOpExporter));
        let events = sample_events();
        let passed_through = processor.wrap_turn("hi", events.clone()).await;
        assert_eq!(passed_through.len(), events.len());
    }

    #[tokio::test]
    async fn test_wrap_turn_accumulates_tool_calls_and_tokens() {
        let ctx = TelemetryContext::new("team", "proj");
        let mut processor = ObservabilityProcessor::new(ctx, Arc::new(NoOpExporter));
        processor.wrap_turn("hi", sample_events()).await;
        assert_eq!(processor.context().total_tool_calls, 1);
        assert_eq!(processor.context().total_input_tokens, 100);
        assert_eq!(processor.context().total_output_tokens, 50);
        assert_eq!(processor.context().total_turns, 1);
    }

    #[tokio::test]
    async fn test_wrap_turn_records_blocked_tool_as_failure() {
        let ctx = TelemetryContext::new("team", "proj");
        let mut processor = ObservabilityProcessor::new(ctx, Arc::new(NoOpExporter));
        let events = vec![
            AgentEvent::ToolStart { tool_name: "bash".to_string(), tool_args: json!({"command": "rm -rf /"}) },
            AgentEvent::ToolBlocked { tool_name: "bash".to_string(), tool_args: json!({"command": "rm -rf /"}) },
            AgentEvent::TurnComplete { usage: TurnUsage::default() },
        ];
        processor.wrap_turn("do it", events).await;
        assert_eq!(processor.context().total_tool_calls, 1);
    }

    #[tokio::test]
    async fn test_second_turn_accumulates_independently() {
        let ctx = TelemetryContext::new("team", "proj");
        let mut processor = ObservabilityProcessor::new(ctx, Arc::new(NoOpExporter));
        processor.wrap_turn("first", sample_events()).await;
        let mut more = sample_events();
        if let AgentEvent::TurnComplete { usage } = more.last_mut().unwrap() {
            *usage = TurnUsage { total_input_tokens: 150, total_output_tokens: 80 };
        }
        processor.wrap_turn("second", more).await;
        assert_eq!(processor.context().total_turns, 2);
        assert_eq!(processor.context().total_tool_calls, 2);
        assert_eq!(processor.context().total_input_tokens, 150);
        assert_eq!(processor.context().total_output_tokens, 80);
    }
}

//! Hierarchical telemetry state: session → turn → tool execution.

use super::{Metadata, ObservabilityConfig};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Root telemetry context: one per agent invocation.
#[derive(Debug, Clone)]
pub struct TelemetryContext {
    pub team_id: String,
    pub project_id: String,

    pub session_id: String,
    pub agent_id: String,

    pub environment: String,
    pub profile: String,
    pub model: String,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: String,

    pub total_turns: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tool_calls: u64,

    pub current_turn_id: Option<String>,
    pub current_turn_index: u64,

    pub metadata: Metadata,
}

impl TelemetryContext {
    pub fn new(team_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            project_id: project_id.into(),
            session_id: generate_id(),
            agent_id: String::new(),
            environment: "development".to_string(),
            profile: "readonly".to_string(),
            model: String::new(),
            started_at: Utc::now(),
            ended_at: None,
            status: "active".to_string(),
            total_turns: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_tool_calls: 0,
            current_turn_id: None,
            current_turn_index: 0,
            metadata: HashMap::new(),
        }
    }

    /// Builds a context from config, failing if the config carries no
    /// tenant (telemetry must not run anonymously).
    pub fn from_config(config: &ObservabilityConfig, model: &str, profile: &str) -> crate::Result<Self> {
        let tenant = config
            .tenant
            .as_ref()
            .ok_or_else(|| crate::Error::config("ObservabilityConfig must have tenant information"))?;

        let mut ctx = Self::new(tenant.team_id.clone(), tenant.project_id.clone());
        ctx.model = model.to_string();
        ctx.profile = profile.to_string();
        ctx.environment = crate::config::get_environment();
        Ok(ctx)
    }

    pub fn start_turn(&mut self) -> String {
        self.current_turn_index += 1;
        let turn_id = generate_id();
        self.current_turn_id = Some(turn_id.clone());
        self.total_turns += 1;
        turn_id
    }

    pub fn end_turn(&mut self) {
        self.current_turn_id = None;
    }

    pub fn record_tokens(&mut self, input_tokens: u64, output_tokens: u64) {
        self.total_input_tokens += input_tokens;
        self.total_output_tokens += output_tokens;
    }

    pub fn record_tool_call(&mut self) {
        self.total_tool_calls += 1;
    }

    pub fn end_session(&mut self, status: impl Into<String>) {
        self.ended_at = Some(Utc::now());
        self.status = status.into();
    }
}

/// Context for a single turn within a session.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub turn_id: String,
    pub session_id: String,
    pub turn_index: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: u64,
    pub user_input: String,
}

impl TurnContext {
    pub fn new(turn_id: impl Into<String>, session_id: impl Into<String>, turn_index: u64, user_input: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            session_id: session_id.into(),
            turn_index,
            started_at: Utc::now(),
            ended_at: None,
            input_tokens: 0,
            output_tokens: 0,
            tool_calls: 0,
            user_input: user_input.into(),
        }
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }
}

/// Context for a single tool execution within a turn.
#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub execution_id: String,
    pub turn_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl ToolExecutionContext {
    pub fn new(turn_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            execution_id: generate_id(),
            turn_id: turn_id.into(),
            tool_name: tool_name.into(),
            arguments,
            result: None,
            success: true,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
        }
    }

    pub fn end(&mut self, success: bool, error: Option<String>) {
        let ended_at = Utc::now();
        self.success = success;
        self.error = error;
        self.duration_ms = (ended_at - self.started_at).num_milliseconds();
        self.ended_at = Some(ended_at);
    }
}

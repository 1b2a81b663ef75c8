//! Base types for the tool system: the result of a tool call
//! ([`ToolOutput`]), a dispatch request ([`ToolInvocation`]), and the
//! [`ToolHandler`] trait each concrete tool implements.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub success: bool,
    pub metadata: HashMap<String, Value>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            metadata: HashMap::new(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A request to invoke a tool, as dispatched by the agent loop.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// A tool a handler implements (shell execution, database query, file read,
/// etc.). Handlers are registered into a
/// [`crate::tools::registry::ToolRegistry`] and dispatched by name.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique identifier for this tool, used in the OpenAI function-calling
    /// spec and as the dispatch key.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;

    /// Whether this tool requires user approval before execution. Safe
    /// read-only tools should leave the default (`false`).
    fn requires_approval(&self) -> bool {
        false
    }

    /// Executes the tool and returns its result.
    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput;

    /// Converts this handler to the OpenAI function-calling tool spec.
    fn to_spec(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}

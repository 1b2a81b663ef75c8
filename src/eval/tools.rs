//! Extra tool handlers only registered during eval runs: capturing the
//! model's final answer instead of letting it fall out of the transcript,
//! and giving OS-interaction tasks a shell that runs inside the task's
//! Docker sandbox instead of on the host.
//!
//! Grounded on `ro_agent/eval/agentbench/tools/submit_answer.py`
//! (DBBench tasks), `ro_agent/eval/agentbench/tools/docker_shell.py`
//! (`DockerShellHandler`/`bash_action`), and the `finish`/`answer` actions
//! wired up for OS tasks in `ro_agent/eval/runner.py`.

use crate::eval::sandbox::EvalSandbox;
use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Mutex;

/// AgentBench truncates Docker-shell output at 800 chars, much tighter
/// than the agent loop's general `MAX_TOOL_OUTPUT_CHARS` history cap.
const MAX_OUTPUT_LENGTH: usize = 800;

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Executes shell commands inside an OS-interaction task's Docker sandbox
/// rather than on the host. Registered in place of the host [`crate::tools::handlers::bash::BashHandler`]
/// for eval OS tasks, since the agent must only ever touch the sandboxed
/// container.
pub struct ContainerBashHandler {
    sandbox: Arc<dyn EvalSandbox>,
}

impl ContainerBashHandler {
    pub fn new(sandbox: Arc<dyn EvalSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl ToolHandler for ContainerBashHandler {
    fn name(&self) -> &str {
        "bash_action"
    }

    fn requires_approval(&self) -> bool {
        false
    }

    fn description(&self) -> &str {
        "Execute a shell command in the Linux environment. You can run any command to \
         investigate the system, install packages, manipulate files, or perform any shell \
         operation needed to complete the task."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to execute"}
            },
            "required": ["command"]
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let command = invocation.arguments.get("command").and_then(Value::as_str).unwrap_or("");
        if command.is_empty() {
            return ToolOutput::error("No command provided");
        }

        match self.sandbox.exec(command).await {
            Ok((exit_code, stdout, stderr)) => {
                let mut parts = Vec::new();
                if !stdout.is_empty() {
                    parts.push(stdout);
                }
                if !stderr.is_empty() {
                    parts.push(format!("[stderr]\n{stderr}"));
                }
                let content = if parts.is_empty() { "(no output)".to_string() } else { parts.join("\n") };
                let content = if content.len() > MAX_OUTPUT_LENGTH {
                    format!("{}\n[truncated because the output is too long]", take_chars(&content, MAX_OUTPUT_LENGTH - 50))
                } else {
                    content
                };
                ToolOutput {
                    content,
                    success: exit_code == 0,
                    metadata: [("exit_code".to_string(), json!(exit_code)), ("command".to_string(), json!(command))]
                        .into_iter()
                        .collect(),
                }
            }
            Err(e) => ToolOutput::error(format!("Error executing command in container: {e}")),
        }
    }
}

/// Captures the agent's final answer into a shared slot the harness reads
/// back after the turn loop ends. `tool_name` is configurable because
/// DBBench tasks use `commit_final_answer` while OS tasks use `answer`.
pub struct SubmitAnswerHandler {
    tool_name: String,
    submitted: Mutex<Option<String>>,
}

impl SubmitAnswerHandler {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self { tool_name: tool_name.into(), submitted: Mutex::new(None) }
    }

    /// Whether the model has submitted an answer yet; the harness checks
    /// this after every turn to decide whether to stop early.
    pub fn is_submitted(&self) -> bool {
        self.submitted.lock().expect("submit answer lock poisoned").is_some()
    }

    /// Takes the submitted answer, if any, leaving the slot empty.
    pub fn take_answer(&self) -> Option<String> {
        self.submitted.lock().expect("submit answer lock poisoned").take()
    }
}

#[async_trait]
impl ToolHandler for SubmitAnswerHandler {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        "Submit your final answer to the task. Call this once you have determined the answer."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "The final answer to submit."
                }
            },
            "required": ["answer"]
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let Some(answer) = invocation.arguments.get("answer").and_then(Value::as_str) else {
            return ToolOutput::error("missing required 'answer' argument");
        };
        *self.submitted.lock().expect("submit answer lock poisoned") = Some(answer.to_string());
        ToolOutput::ok("Answer submitted.")
    }
}

/// Signals that an OS-interaction task considers itself finished without
/// submitting a text answer (the container's end state is what's graded).
pub struct FinishActionHandler {
    finished: Mutex<bool>,
}

impl FinishActionHandler {
    pub fn new() -> Self {
        Self { finished: Mutex::new(false) }
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().expect("finish handler lock poisoned")
    }
}

impl Default for FinishActionHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for FinishActionHandler {
    fn name(&self) -> &str {
        "finish_action"
    }

    fn description(&self) -> &str {
        "Call this when you believe the task is complete and no answer text is required."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn handle(&self, _invocation: ToolInvocation) -> ToolOutput {
        *self.finished.lock().expect("finish handler lock poisoned") = true;
        ToolOutput::ok("Marked task as finished.")
    }
}

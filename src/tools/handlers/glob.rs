//! Find files by name or path pattern, shelling out to `rg --files`.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

const DEFAULT_MAX_RESULTS: usize = 100;
const DEFAULT_TIMEOUT: u64 = 30;

const EXCLUDE_GLOBS: &[&str] = &["!.git/", "!node_modules/", "!__pycache__/", "!.venv/", "!venv/"];

/// Find files by name or path pattern using `rg --files`.
///
/// Standard agentic tool name: `glob`.
pub struct GlobHandler {
    timeout_secs: u64,
}

impl GlobHandler {
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self { timeout_secs: timeout_secs.unwrap_or(DEFAULT_TIMEOUT) }
    }
}

impl Default for GlobHandler {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ToolHandler for GlobHandler {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files by name or path pattern. Returns a list of matching file paths."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern to match file names (e.g., '*.rs', '*.log', 'config.*', '**/*.yaml')"},
                "path": {"type": "string", "description": "Directory to search in (absolute path)"},
                "max_results": {"type": "integer", "description": format!("Maximum files to return. Defaults to {DEFAULT_MAX_RESULTS}.")},
            },
            "required": ["pattern", "path"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let pattern = invocation.arguments.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let max_results = invocation.arguments.get("max_results").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        if pattern.is_empty() {
            return ToolOutput::error("No pattern provided");
        }
        if path_str.is_empty() {
            return ToolOutput::error("No path provided");
        }

        let path = match crate::tools::handlers::resolve_path(path_str) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };
        if !path.exists() {
            return ToolOutput::error(format!("Directory not found: {}", path.display()));
        }
        if !path.is_dir() {
            return ToolOutput::error(format!("Not a directory: {}", path.display()));
        }

        let mut cmd = Command::new("rg");
        cmd.arg("--files").arg("--glob").arg(pattern);
        for exclude in EXCLUDE_GLOBS {
            cmd.arg("--glob").arg(exclude);
        }
        cmd.arg(&path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::error(
                    "ripgrep (rg) is not installed. Install it with: brew install ripgrep (macOS) or apt install ripgrep (Linux)",
                )
            }
            Err(e) => return ToolOutput::error(format!("Error finding files: {e}")),
        };

        let output = match tokio_timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolOutput::error(format!("Error finding files: {e}")),
            Err(_) => return ToolOutput::error(format!("Search timed out after {} seconds", self.timeout_secs)),
        };

        if !matches!(output.status.code(), Some(0) | Some(1)) {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return ToolOutput::error(format!("Find failed: {error}"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return ToolOutput { content: "No files found matching pattern".to_string(), success: true, metadata: [("matches".to_string(), json!(0))].into_iter().collect() };
        }

        let lines: Vec<&str> = stdout.trim().lines().collect();
        let total_found = lines.len();
        let truncated = total_found > max_results;
        let shown = if truncated { &lines[..max_results] } else { &lines[..] };

        let results: Vec<String> = shown
            .iter()
            .map(|line| {
                std::path::Path::new(line)
                    .strip_prefix(&path)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| line.to_string())
            })
            .collect();

        let mut content = results.join("\n");
        if truncated {
            content.push_str(&format!("\n\n[Showing {max_results} of {total_found} files]"));
        } else {
            content.push_str(&format!("\n\n[{total_found} files found]"));
        }

        ToolOutput {
            content,
            success: true,
            metadata: [
                ("matches".to_string(), json!(results.len())),
                ("total".to_string(), json!(total_found)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

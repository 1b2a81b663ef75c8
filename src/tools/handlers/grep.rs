//! Search file contents, shelling out to `rg`.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

const DEFAULT_MAX_MATCHES: usize = 100;
const DEFAULT_TIMEOUT: u64 = 30;

const EXCLUDE_GLOBS: &[&str] = &["!.git/", "!node_modules/", "!__pycache__/", "!.venv/", "!venv/"];

/// Search for a pattern in file contents using `rg`.
///
/// Standard agentic tool name: `grep`.
pub struct GrepHandler {
    timeout_secs: u64,
}

impl GrepHandler {
    pub fn new(timeout_secs: Option<u64>) -> Self {
        Self { timeout_secs: timeout_secs.unwrap_or(DEFAULT_TIMEOUT) }
    }
}

impl Default for GrepHandler {
    fn default() -> Self {
        Self::new(None)
    }
}

/// rg match lines are `file:line:content`; context lines are `file-line-content`.
/// Distinguishes the two by which separator appears first after the line number.
fn is_context_line(line: &str) -> bool {
    let Some(first_colon) = line.find(':') else { return true };
    let rest = &line[first_colon + 1..];
    let dash_pos = rest.find('-');
    let colon_pos = rest.find(':');
    match (dash_pos, colon_pos) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => true,
        (Some(d), Some(c)) => d < c,
    }
}

#[async_trait]
impl ToolHandler for GrepHandler {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a pattern in file contents. Returns matching lines with file paths and line numbers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Text or regex pattern to search for in file contents (e.g., 'ERROR', 'connection failed', 'error|warning')"},
                "path": {"type": "string", "description": "File or directory to search in (absolute path)"},
                "glob": {"type": "string", "description": "Glob pattern to filter which files to search (e.g., '*.rs', '*.log')"},
                "ignore_case": {"type": "boolean", "description": "Case-insensitive search. Defaults to false."},
                "context_lines": {"type": "integer", "description": "Lines of context before and after each match. Defaults to 0."},
                "max_matches": {"type": "integer", "description": format!("Maximum total matches to return. Defaults to {DEFAULT_MAX_MATCHES}.")},
            },
            "required": ["pattern", "path"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let pattern = invocation.arguments.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let glob_pattern = invocation.arguments.get("glob").and_then(|v| v.as_str());
        let ignore_case = invocation.arguments.get("ignore_case").and_then(|v| v.as_bool()).unwrap_or(false);
        let context_lines = invocation.arguments.get("context_lines").and_then(|v| v.as_u64()).unwrap_or(0);
        let max_matches = invocation.arguments.get("max_matches").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_MATCHES as u64) as usize;

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
            return ToolOutput::error(format!("Path not found: {}", path.display()));
        }

        let mut cmd = Command::new("rg");
        cmd.args(["--line-number", "--with-filename", "--no-heading", "--color=never"]);
        if ignore_case {
            cmd.arg("--ignore-case");
        }
        if context_lines > 0 {
            cmd.arg("--context").arg(context_lines.to_string());
        }
        if let Some(glob) = glob_pattern {
            if path.is_dir() {
                cmd.arg("--glob").arg(glob);
            }
        }
        for exclude in EXCLUDE_GLOBS {
            cmd.arg("--glob").arg(exclude);
        }
        cmd.arg(pattern).arg(&path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolOutput::error(
                    "ripgrep (rg) is not installed. Install it with: brew install ripgrep (macOS) or apt install ripgrep (Linux)",
                )
            }
            Err(e) => return ToolOutput::error(format!("Search error: {e}")),
        };

        let output = match tokio_timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return ToolOutput::error(format!("Search error: {e}")),
            Err(_) => return ToolOutput::error(format!("Search timed out after {} seconds", self.timeout_secs)),
        };

        if !matches!(output.status.code(), Some(0) | Some(1)) {
            let error = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return ToolOutput::error(format!("Search failed: {error}"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return ToolOutput { content: "No matches found".to_string(), success: true, metadata: [("matches".to_string(), json!(0))].into_iter().collect() };
        }

        let mut match_count = 0usize;
        let mut truncated = false;
        let mut result_lines = Vec::new();

        for line in stdout.split('\n') {
            if line.is_empty() {
                result_lines.push(line.to_string());
                continue;
            }
            let is_match = line.contains(':') && !is_context_line(line);
            if is_match {
                match_count += 1;
                if match_count > max_matches {
                    truncated = true;
                    break;
                }
            }
            result_lines.push(line.to_string());
        }

        let mut content = result_lines.join("\n");
        if truncated {
            content.push_str(&format!("\n\n[Showing {max_matches} of {match_count}+ matches, truncated]"));
        } else {
            content.push_str(&format!("\n\n[{match_count} matches]"));
        }

        ToolOutput {
            content,
            success: true,
            metadata: [
                ("matches".to_string(), json!(match_count.min(max_matches))),
                ("truncated".to_string(), json!(truncated)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_context_line_match() {
        assert!(!is_context_line("file.txt:10:some match"));
    }

    #[test]
    fn test_is_context_line_context() {
        assert!(is_context_line("file.txt-10-context line"));
    }

    #[tokio::test]
    async fn test_grep_rejects_missing_path() {
        let handler = GrepHandler::default();
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "grep".to_string(),
            arguments: json!({"pattern": "foo", "path": "/nonexistent"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
    }
}

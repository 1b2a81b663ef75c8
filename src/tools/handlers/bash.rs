//! Bash execution handler with configurable restrictions.
//!
//! Two modes:
//! - **Restricted**: only allowlisted read-only commands (grep, cat, find, etc.)
//! - **Unrestricted**: any command allowed, for sandboxed container environments

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout as tokio_timeout;

pub const DEFAULT_TIMEOUT_RESTRICTED: u64 = 120;
pub const DEFAULT_TIMEOUT_UNRESTRICTED: u64 = 300;

static ALLOWED_COMMANDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "cat", "head", "tail", "less", "more", "grep", "rg", "ag", "ack", "find", "locate",
        "which", "whereis", "ls", "tree", "du", "df", "file", "stat", "wc", "md5", "sha256sum",
        "shasum", "awk", "sed", "cut", "sort", "uniq", "tr", "column", "fmt", "fold", "nl", "pr",
        "expand", "unexpand", "jq", "yq", "xmllint", "tar", "unzip", "zipinfo", "zcat", "zless",
        "zgrep", "gzip", "gunzip", "pwd", "whoami", "hostname", "uname", "env", "printenv",
        "date", "uptime", "ps", "top", "free", "ping", "curl", "wget", "dig", "nslookup", "host",
        "netstat", "ss", "git", "echo", "printf", "diff", "cmp", "comm", "hexdump", "xxd", "od",
        "strings",
    ]
    .into_iter()
    .collect()
});

const DANGEROUS_PATTERNS: &[&str] = &[
    ">", ">>", "rm ", "rm\t", "rmdir", "mv ", "mv\t", "cp ", "cp\t", "chmod", "chown", "chgrp",
    "mkdir", "touch", "truncate", "shred", "dd ", "dd\t", "mkfs", "mount", "umount", "kill",
    "pkill", "killall", "reboot", "shutdown", "halt", "poweroff", "systemctl", "service", "apt",
    "yum", "dnf", "brew ", "pip ", "npm ", "yarn ", "cargo ", "sudo", "su ", "su\t", "doas",
];

/// Extracts the base command from a shell command string, following
/// through pipes, chaining, and leading `VAR=value` assignments.
pub fn extract_base_command(command: &str) -> Option<String> {
    let mut command = command;
    if let Some(idx) = command.find('|') {
        command = &command[..idx];
    }
    for sep in ["&&", ";", "||"] {
        if let Some(idx) = command.find(sep) {
            command = &command[..idx];
        }
    }
    let command = command.trim();

    let parts: Vec<&str> = command.split_whitespace().collect();
    for part in &parts {
        if !part.contains('=') {
            return Some(part.to_string());
        }
    }
    parts.first().map(|s| s.to_string())
}

/// Checks if a command is allowed in restricted mode. Returns `(allowed, reason)`.
pub fn is_command_allowed(command: &str) -> (bool, String) {
    for pattern in DANGEROUS_PATTERNS {
        if command.contains(pattern) {
            return (
                false,
                format!("Command contains dangerous pattern: {}", pattern.trim()),
            );
        }
    }

    let Some(base_cmd) = extract_base_command(command) else {
        return (false, "Could not parse command".to_string());
    };

    if !ALLOWED_COMMANDS.contains(base_cmd.as_str()) {
        return (false, format!("Command '{base_cmd}' is not in the allowlist"));
    }

    (true, String::new())
}

/// Execute shell commands with configurable restrictions.
///
/// Standard agentic tool name: `bash`.
pub struct BashHandler {
    restricted: bool,
    working_dir: String,
    timeout_secs: u64,
    requires_approval: bool,
}

impl BashHandler {
    pub fn new(
        restricted: bool,
        working_dir: Option<String>,
        timeout_secs: Option<u64>,
        requires_approval: Option<bool>,
    ) -> Self {
        let working_dir = working_dir.unwrap_or_else(|| {
            std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string())
        });
        let timeout_secs = timeout_secs.unwrap_or(if restricted {
            DEFAULT_TIMEOUT_RESTRICTED
        } else {
            DEFAULT_TIMEOUT_UNRESTRICTED
        });
        // Restricted mode is protected by the allowlist; unrestricted mode
        // requires approval unless the caller (e.g. an eval profile) overrides it.
        let requires_approval = requires_approval.unwrap_or(!restricted);

        Self {
            restricted,
            working_dir,
            timeout_secs,
            requires_approval,
        }
    }
}

#[async_trait]
impl ToolHandler for BashHandler {
    fn name(&self) -> &str {
        "bash"
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    fn description(&self) -> &str {
        if self.restricted {
            "Execute a shell command to inspect files, logs, or system state. Use this for \
             text-based inspection with tools like grep, cat, head, tail, find, jq, yq, etc. \
             Commands are read-only."
        } else {
            "Execute a bash command. Use for running programs, installing packages, building \
             code, file operations, and any other shell tasks."
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute",
                },
                "working_dir": {
                    "type": "string",
                    "description": format!("Working directory for the command (default: {})", self.working_dir),
                },
                "timeout": {
                    "type": "integer",
                    "description": format!("Timeout in seconds (default: {})", self.timeout_secs),
                },
            },
            "required": ["command"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let command = invocation
            .arguments
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let working_dir = invocation
            .arguments
            .get("working_dir")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.working_dir);
        let timeout_secs = invocation
            .arguments
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        if command.is_empty() {
            return ToolOutput::error("No command provided");
        }

        if self.restricted {
            let (allowed, reason) = is_command_allowed(command);
            if !allowed {
                return ToolOutput::error(format!("Command blocked: {reason}"));
            }
        }

        if !std::path::Path::new(working_dir).exists() {
            return ToolOutput::error(format!("Working directory not found: {working_dir}"));
        }

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ToolOutput::error(format!("Error executing command: {e}")),
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wait_result = tokio_timeout(Duration::from_secs(timeout_secs), async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            if let Some(mut out) = stdout_pipe.take() {
                let _ = out.read_to_end(&mut stdout_buf).await;
            }
            if let Some(mut err) = stderr_pipe.take() {
                let _ = err.read_to_end(&mut stderr_buf).await;
            }
            let status = child.wait().await;
            (status, stdout_buf, stderr_buf)
        })
        .await;

        let (status, stdout_buf, stderr_buf) = match wait_result {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return ToolOutput::error(format!("Command timed out after {timeout_secs} seconds"))
                    .with_metadata("timed_out", json!(true))
                    .with_metadata("exit_code", json!(-1));
            }
        };

        let exit_code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
        let stdout_str = String::from_utf8_lossy(&stdout_buf).to_string();
        let stderr_str = String::from_utf8_lossy(&stderr_buf).to_string();

        let mut output_parts = Vec::new();
        if !stdout_str.is_empty() {
            output_parts.push(stdout_str);
        }
        if !stderr_str.is_empty() {
            output_parts.push(format!("[stderr]\n{stderr_str}"));
        }
        let content = if output_parts.is_empty() {
            "(no output)".to_string()
        } else {
            output_parts.join("\n")
        };

        ToolOutput {
            content,
            success: exit_code == 0,
            metadata: [
                ("exit_code".to_string(), json!(exit_code)),
                ("command".to_string(), json!(command)),
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
    fn test_extract_base_command_simple() {
        assert_eq!(extract_base_command("ls -la"), Some("ls".to_string()));
    }

    #[test]
    fn test_extract_base_command_with_pipe() {
        assert_eq!(
            extract_base_command("cat file.txt | grep foo"),
            Some("cat".to_string())
        );
    }

    #[test]
    fn test_extract_base_command_with_env_var() {
        assert_eq!(
            extract_base_command("FOO=bar ls -la"),
            Some("ls".to_string())
        );
    }

    #[test]
    fn test_extract_base_command_with_chaining() {
        assert_eq!(
            extract_base_command("find . -name '*.rs' && echo done"),
            Some("find".to_string())
        );
    }

    #[test]
    fn test_is_command_allowed_safe() {
        let (allowed, _) = is_command_allowed("grep -r foo .");
        assert!(allowed);
    }

    #[test]
    fn test_is_command_allowed_blocks_redirect() {
        let (allowed, reason) = is_command_allowed("echo hi > file.txt");
        assert!(!allowed);
        assert!(reason.contains("dangerous pattern"));
    }

    #[test]
    fn test_is_command_allowed_blocks_non_allowlisted() {
        let (allowed, reason) = is_command_allowed("python script.py");
        assert!(!allowed);
        assert!(reason.contains("not in the allowlist"));
    }

    #[tokio::test]
    async fn test_handle_runs_allowlisted_command() {
        let handler = BashHandler::new(true, None, Some(5), Some(false));
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "bash".to_string(),
            arguments: json!({"command": "echo hello"}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert!(out.content.contains("hello"));
    }

    #[tokio::test]
    async fn test_handle_blocks_restricted_command() {
        let handler = BashHandler::new(true, None, Some(5), Some(false));
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "bash".to_string(),
            arguments: json!({"command": "rm -rf /tmp/x"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("blocked"));
    }

    #[tokio::test]
    async fn test_handle_empty_command() {
        let handler = BashHandler::new(false, None, Some(5), Some(false));
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "bash".to_string(),
            arguments: json!({"command": ""}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
    }

    #[test]
    fn test_new_unrestricted_requires_approval_by_default() {
        let handler = BashHandler::new(false, None, None, None);
        assert!(handler.requires_approval());
        assert_eq!(handler.timeout_secs, DEFAULT_TIMEOUT_UNRESTRICTED);
    }

    #[test]
    fn test_new_restricted_no_approval_by_default() {
        let handler = BashHandler::new(true, None, None, None);
        assert!(!handler.requires_approval());
        assert_eq!(handler.timeout_secs, DEFAULT_TIMEOUT_RESTRICTED);
    }
}

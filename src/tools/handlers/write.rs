//! File writing handler with configurable restrictions.
//!
//! `create_only` mode can only create new files (blocks overwrites and
//! sensitive paths); full mode can create and overwrite anywhere, for
//! sandboxed container environments.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

const SENSITIVE_PATTERNS: &[&str] = &[
    ".bashrc", ".zshrc", ".profile", ".bash_profile", ".ssh/", ".gnupg/", ".aws/", ".config/",
    "/etc/", "/usr/", "/bin/", "/sbin/",
];

/// Write content to a file, with configurable create-only/full restrictions.
///
/// Standard agentic tool name: `write`.
pub struct WriteHandler {
    create_only: bool,
    requires_approval: bool,
}

impl WriteHandler {
    pub fn new(create_only: bool, requires_approval: Option<bool>) -> Self {
        Self {
            create_only,
            requires_approval: requires_approval.unwrap_or(create_only),
        }
    }
}

#[async_trait]
impl ToolHandler for WriteHandler {
    fn name(&self) -> &str {
        "write"
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    fn description(&self) -> &str {
        if self.create_only {
            "Write content to a new file. Use this when the user asks you to produce an \
             output file such as a summary, report, script, or document. Cannot overwrite \
             existing files."
        } else {
            "Write content to a file. Creates the file if it doesn't exist, or overwrites \
             it if it does. Creates parent directories as needed."
        }
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path where the file should be written"},
                "content": {"type": "string", "description": "Content to write to the file"},
            },
            "required": ["path", "content"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let content = invocation.arguments.get("content").and_then(|v| v.as_str()).unwrap_or("");

        if path_str.is_empty() {
            return ToolOutput::error("No path provided");
        }
        if content.is_empty() {
            return ToolOutput::error("No content provided");
        }

        let path = match crate::tools::handlers::resolve_path(path_str) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };

        if self.create_only {
            let lower = path.display().to_string().to_lowercase();
            if SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
                return ToolOutput::error(format!("Cannot write to sensitive location: {}", path.display()));
            }
            if path.exists() {
                return ToolOutput::error(format!(
                    "File already exists: {}. Use a different path or delete the existing file first.",
                    path.display()
                ));
            }
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutput::error(format!("Error writing file: {e}"));
            }
        }

        let existed = path.exists();
        if let Err(e) = std::fs::write(&path, content) {
            return match e.kind() {
                std::io::ErrorKind::PermissionDenied => ToolOutput::error(format!("Permission denied: {}", path.display())),
                _ => ToolOutput::error(format!("Error writing file: {e}")),
            };
        }

        let size = content.len();
        let lines = content.matches('\n').count() + usize::from(!content.is_empty() && !content.ends_with('\n'));
        let action = if self.create_only {
            "Created"
        } else if existed {
            "Overwrote"
        } else {
            "Created"
        };

        ToolOutput {
            content: format!("{action} {} ({size} bytes, {lines} lines)", path.display()),
            success: true,
            metadata: [
                ("path".to_string(), json!(path.display().to_string())),
                ("size_bytes".to_string(), json!(size)),
                ("lines".to_string(), json!(lines)),
                ("overwrote".to_string(), json!(existed && !self.create_only)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_only_blocks_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "existing").unwrap();

        let handler = WriteHandler::new(true, None);
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "write".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "content": "new"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("already exists"));
    }

    #[tokio::test]
    async fn test_create_only_creates_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.txt");

        let handler = WriteHandler::new(true, None);
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "write".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "content": "hello"}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_full_mode_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "old").unwrap();

        let handler = WriteHandler::new(false, Some(false));
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "write".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "content": "new"}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert!(out.content.contains("Overwrote"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_requires_approval_defaults() {
        assert!(WriteHandler::new(true, None).requires_approval());
        assert!(!WriteHandler::new(false, None).requires_approval());
    }
}

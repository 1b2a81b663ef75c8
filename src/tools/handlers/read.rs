//! Read file contents, with optional line range and binary-file rejection.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;

pub const DEFAULT_MAX_LINES: usize = 500;
pub const MAX_LINE_LENGTH: usize = 500;

const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff", "tif", "mp3", "mp4", "wav",
    "avi", "mov", "mkv", "flac", "ogg", "webm", "zip", "tar", "gz", "bz2", "xz", "7z", "rar",
    "exe", "dll", "so", "dylib", "o", "a", "pyc", "pyo", "class", "wasm", "pdf", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "ttf", "otf", "woff", "woff2", "eot", "bin", "dat", "db",
    "sqlite", "sqlite3",
];

/// Read contents of a file with an optional line range.
///
/// Standard agentic tool name: `read`.
pub struct ReadHandler;

#[async_trait]
impl ToolHandler for ReadHandler {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use this to inspect source code, logs, config files, \
         etc. Supports reading specific line ranges for large files."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path to the file to read"},
                "start_line": {"type": "integer", "description": "First line to read (1-indexed, inclusive). Defaults to 1."},
                "end_line": {"type": "integer", "description": "Last line to read (1-indexed, inclusive). Defaults to start_line + 500."},
            },
            "required": ["path"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let start_line = invocation
            .arguments
            .get("start_line")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1) as usize;
        let end_line = invocation
            .arguments
            .get("end_line")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(start_line + DEFAULT_MAX_LINES - 1);

        if path_str.is_empty() {
            return ToolOutput::error("No path provided");
        }

        let path = match crate::tools::handlers::resolve_path(path_str) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };

        if !path.exists() {
            return ToolOutput::error(format!("File not found: {}", path.display()));
        }
        if !path.is_file() {
            return ToolOutput::error(format!("Not a file: {}", path.display()));
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                return ToolOutput::error(format!(
                    "Cannot read binary file: {} (.{ext} files are not text-readable). Use \
                     shell commands like 'file', 'exiftool', or 'strings' for binary inspection.",
                    path.display()
                ));
            }
        }

        let content = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolOutput::error(format!("Permission denied: {}", path.display()))
            }
            Err(e) => return ToolOutput::error(format!("Error reading file: {e}")),
        };

        let mut output_lines = Vec::new();
        let mut total_lines = 0;
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            total_lines = line_no;
            if line_no < start_line {
                continue;
            }
            if line_no > end_line {
                break;
            }
            let mut formatted = line.trim_end().to_string();
            if formatted.len() > MAX_LINE_LENGTH {
                formatted.truncate(MAX_LINE_LENGTH);
                formatted.push_str("...");
            }
            output_lines.push(format!("{line_no:6}  {formatted}"));
        }

        if total_lines < start_line {
            return ToolOutput::error(format!(
                "Start line {start_line} exceeds file length ({total_lines} lines)"
            ));
        }

        let end_idx = end_line.min(total_lines);
        let mut content = output_lines.join("\n");
        if end_idx < total_lines {
            content.push_str(&format!("\n\n[Showing lines {start_line}-{end_idx} of {total_lines}]"));
        }

        ToolOutput {
            content,
            success: true,
            metadata: [
                ("path".to_string(), json!(path.display().to_string())),
                ("start_line".to_string(), json!(start_line)),
                ("end_line".to_string(), json!(end_idx)),
                ("total_lines".to_string(), json!(total_lines)),
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
    async fn test_read_full_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "line1\nline2\nline3\n").unwrap();

        let handler = ReadHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read".to_string(),
            arguments: json!({"path": path.to_str().unwrap()}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert!(out.content.contains("line1"));
        assert!(out.content.contains("line3"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let handler = ReadHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read".to_string(),
            arguments: json!({"path": "/nonexistent/path.txt"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_read_rejects_binary_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("img.png");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let handler = ReadHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read".to_string(),
            arguments: json!({"path": path.to_str().unwrap()}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("binary"));
    }

    #[tokio::test]
    async fn test_read_line_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();

        let handler = ReadHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "start_line": 2, "end_line": 3}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert!(out.content.contains("two"));
        assert!(out.content.contains("three"));
        assert!(!out.content.contains("four"));
    }
}

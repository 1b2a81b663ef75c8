//! Surgical file editing via search-and-replace, with fuzzy fallbacks.
//!
//! Three matching strategies, tried in order: exact match, whitespace-
//! normalized match (trailing whitespace ignored), and indentation-flexible
//! match (leading whitespace normalized, then reapplied to the replacement
//! on success). The edit is atomic: if `old_string` isn't found, or isn't
//! unique, under any strategy, the file is left untouched.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Make a surgical edit to a file via search-and-replace.
///
/// Standard agentic tool name: `edit`.
pub struct EditHandler {
    requires_approval: bool,
}

impl EditHandler {
    pub fn new(requires_approval: bool) -> Self {
        Self { requires_approval }
    }
}

impl Default for EditHandler {
    fn default() -> Self {
        Self::new(false)
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.lines().map(|l| l.trim_end()).collect::<Vec<_>>().join("\n")
}

fn normalize_indentation(s: &str) -> String {
    s.lines().map(|l| l.trim_start()).collect::<Vec<_>>().join("\n")
}

fn reindent(new_string: &str, matched: &str) -> String {
    let matched_lines: Vec<&str> = matched.split('\n').collect();
    let new_lines: Vec<&str> = new_string.split('\n').collect();
    if matched_lines.is_empty() || new_lines.is_empty() {
        return new_string.to_string();
    }

    let first = matched_lines[0];
    let first_indent_len = first.len() - first.trim_start().len();
    let base_indent = &first[..first_indent_len];

    let min_new_indent = new_lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    new_lines
        .iter()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                let line_indent = line.len() - line.trim_start().len();
                let relative = line_indent.saturating_sub(min_new_indent);
                format!("{base_indent}{}{}", " ".repeat(relative), line.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Returns `(new_content, description)` on success, or `Err(message)`.
fn apply_edit(content: &str, old_string: &str, new_string: &str) -> Result<(String, String), String> {
    let count = content.matches(old_string).count();
    if count == 1 {
        return Ok((content.replacen(old_string, new_string, 1), "exact match".to_string()));
    }
    if count > 1 {
        return Err(format!("old_string appears {count} times (must be unique). Add more context."));
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let old_lines: Vec<&str> = old_string.split('\n').collect();
    let normalized_old = normalize_whitespace(old_string);

    let mut matches = Vec::new();
    if old_lines.len() <= lines.len() {
        for i in 0..=(lines.len() - old_lines.len()) {
            let window = lines[i..i + old_lines.len()].join("\n");
            if normalize_whitespace(&window) == normalized_old {
                matches.push(window);
            }
        }
    }
    if matches.len() == 1 {
        let matched = &matches[0];
        return Ok((content.replacen(matched.as_str(), new_string, 1), "whitespace-normalized match".to_string()));
    }
    if matches.len() > 1 {
        return Err(format!("Found {} whitespace-normalized matches (must be unique)", matches.len()));
    }

    let indent_normalized_old = normalize_indentation(old_string);
    let mut matches = Vec::new();
    if old_lines.len() <= lines.len() {
        for i in 0..=(lines.len() - old_lines.len()) {
            let window = lines[i..i + old_lines.len()].join("\n");
            if normalize_indentation(&window) == indent_normalized_old {
                matches.push(window);
            }
        }
    }
    if matches.len() == 1 {
        let matched = &matches[0];
        let reindented = reindent(new_string, matched);
        return Ok((content.replacen(matched.as_str(), &reindented, 1), "indentation-flexible match".to_string()));
    }
    if matches.len() > 1 {
        return Err(format!("Found {} indentation-flexible matches (must be unique)", matches.len()));
    }

    Err("old_string not found in file. Check for typos or add more context.".to_string())
}

#[async_trait]
impl ToolHandler for EditHandler {
    fn name(&self) -> &str {
        "edit"
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    fn description(&self) -> &str {
        "Make a surgical edit to a file by replacing a specific string with new content. \
         The old_string must uniquely identify the location to edit. Include enough context \
         (surrounding lines) to make the match unique. For multiple edits to the same file, \
         call this tool multiple times."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to edit"},
                "old_string": {"type": "string", "description": "The exact string to find and replace. Must be unique in the file."},
                "new_string": {"type": "string", "description": "The string to replace old_string with"},
            },
            "required": ["path", "old_string", "new_string"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let old_string = invocation.arguments.get("old_string").and_then(|v| v.as_str()).unwrap_or("");
        let new_string = invocation.arguments.get("new_string").and_then(|v| v.as_str()).unwrap_or("");

        if path_str.is_empty() {
            return ToolOutput::error("No path provided");
        }
        if old_string.is_empty() {
            return ToolOutput::error("No old_string provided");
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

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("Error reading file: {e}")),
        };

        let (new_content, description) = match apply_edit(&content, old_string, new_string) {
            Ok(result) => result,
            Err(message) => return ToolOutput::error(message),
        };

        if let Err(e) = std::fs::write(&path, new_content) {
            return ToolOutput::error(format!("Error writing file: {e}"));
        }

        ToolOutput {
            content: format!("Edited {}: {description}", path.display()),
            success: true,
            metadata: [("path".to_string(), json!(path.display().to_string()))].into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_exact_match_edit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "fn foo() {}\n").unwrap();

        let handler = EditHandler::default();
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "edit".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "old_string": "foo", "new_string": "bar"}),
        };
        let out = handler.handle(invocation).await;
        assert!(out.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn bar() {}\n");
    }

    #[tokio::test]
    async fn test_ambiguous_match_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x\nx\n").unwrap();

        let handler = EditHandler::default();
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "edit".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "old_string": "x", "new_string": "y"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("must be unique"));
    }

    #[tokio::test]
    async fn test_not_found_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello\n").unwrap();

        let handler = EditHandler::default();
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "edit".to_string(),
            arguments: json!({"path": path.to_str().unwrap(), "old_string": "nope", "new_string": "y"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
        assert!(out.content.contains("not found"));
    }

    #[test]
    fn test_whitespace_normalized_match() {
        let content = "line1   \nline2\n";
        let old = "line1\nline2";
        let (new_content, desc) = apply_edit(content, old, "replaced").unwrap();
        assert_eq!(desc, "whitespace-normalized match");
        assert!(new_content.contains("replaced"));
    }
}

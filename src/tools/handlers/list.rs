//! List directory contents, flat or recursive (tree view).

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs::DirEntry;
use std::path::Path;

const DEFAULT_MAX_ENTRIES: usize = 200;

/// List the contents of a single directory.
///
/// Standard agentic tool name: `list`.
pub struct ListHandler;

#[async_trait]
impl ToolHandler for ListHandler {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List the contents of a single directory. Shows file names, sizes, and modification times."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path to the directory to list"},
                "show_hidden": {"type": "boolean", "description": "Include hidden files (starting with '.'). Defaults to false."},
                "recursive": {"type": "boolean", "description": "List recursively (tree view). Defaults to false."},
                "max_depth": {"type": "integer", "description": "Max depth for recursive listing. Defaults to 3."},
            },
            "required": ["path"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let show_hidden = invocation.arguments.get("show_hidden").and_then(|v| v.as_bool()).unwrap_or(false);
        let recursive = invocation.arguments.get("recursive").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_depth = invocation.arguments.get("max_depth").and_then(|v| v.as_u64()).unwrap_or(3) as usize;

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

        let (content, item_count) = if recursive {
            list_recursive(&path, show_hidden, max_depth, "", 0)
        } else {
            list_flat(&path, show_hidden)
        };

        ToolOutput {
            content,
            success: true,
            metadata: [
                ("path".to_string(), json!(path.display().to_string())),
                ("recursive".to_string(), json!(recursive)),
                ("item_count".to_string(), json!(item_count)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

fn sorted_entries(path: &Path) -> std::io::Result<Vec<DirEntry>> {
    let mut entries: Vec<DirEntry> = std::fs::read_dir(path)?.filter_map(Result::ok).collect();
    entries.sort_by_key(|e| {
        let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
        (!is_dir, e.file_name().to_string_lossy().to_lowercase())
    });
    Ok(entries)
}

fn format_size(mut size: f64) -> String {
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return if unit == "B" {
                format!("{size:.0}{unit}")
            } else {
                format!("{size:.1}{unit}")
            };
        }
        size /= 1024.0;
    }
    format!("{size:.1}TB")
}

fn list_flat(path: &Path, show_hidden: bool) -> (String, usize) {
    let entries = match sorted_entries(path) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return (format!("Permission denied: {}", path.display()), 0)
        }
        Err(e) => return (format!("Error listing directory: {e}"), 0),
    };

    let mut lines = Vec::new();
    let mut item_count = 0;

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if !show_hidden && name.starts_with('.') {
            continue;
        }
        item_count += 1;

        match entry.metadata() {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| format_timestamp(d.as_secs()))
                    .unwrap_or_else(|| "?".to_string());

                let (display_name, size_str) = if meta.is_dir() {
                    (format!("{name}/"), "-".to_string())
                } else if meta.is_symlink() {
                    let target = std::fs::read_link(entry.path())
                        .map(|t| t.display().to_string())
                        .unwrap_or_default();
                    (format!("{name} -> {target}"), "-".to_string())
                } else {
                    (name.clone(), format_size(meta.len() as f64))
                };

                lines.push(format!("{:>8}  {mtime}  {display_name}", size_str));
            }
            Err(_) => lines.push(format!("?         ?                 {name}")),
        }

        if lines.len() >= DEFAULT_MAX_ENTRIES {
            lines.push(format!("\n[Truncated at {DEFAULT_MAX_ENTRIES} entries]"));
            break;
        }
    }

    if lines.is_empty() {
        ("(empty directory)".to_string(), 0)
    } else {
        (lines.join("\n"), item_count)
    }
}

fn format_timestamp(epoch_secs: u64) -> String {
    let days_since_epoch = epoch_secs / 86400;
    let secs_of_day = epoch_secs % 86400;
    let (h, m) = (secs_of_day / 3600, (secs_of_day % 3600) / 60);
    // Not a full calendar implementation; good enough for a relative display.
    format!("day{days_since_epoch} {h:02}:{m:02}")
}

fn list_recursive(path: &Path, show_hidden: bool, max_depth: usize, prefix: &str, depth: usize) -> (String, usize) {
    if depth > max_depth {
        return (String::new(), 0);
    }

    let mut entries = match sorted_entries(path) {
        Ok(e) => e,
        Err(_) => return (format!("{prefix}[permission denied]\n"), 0),
    };

    if !show_hidden {
        entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));
    }

    let mut lines = Vec::new();
    let mut item_count = 0;
    let last_idx = entries.len().saturating_sub(1);

    for (i, entry) in entries.into_iter().enumerate() {
        let is_last = i == last_idx;
        let connector = if is_last { "└── " } else { "├── " };
        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        let name = entry.file_name().to_string_lossy().to_string();
        item_count += 1;

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            lines.push(format!("{prefix}{connector}{name}/"));
            if depth < max_depth {
                let (subtree, sub_count) = list_recursive(&entry.path(), show_hidden, max_depth, &child_prefix, depth + 1);
                item_count += sub_count;
                if !subtree.is_empty() {
                    lines.push(subtree.trim_end_matches('\n').to_string());
                }
            }
        } else {
            let size_str = entry.metadata().map(|m| format_size(m.len() as f64)).unwrap_or_else(|_| "?".to_string());
            lines.push(format!("{prefix}{connector}{name} ({size_str})"));
        }

        if lines.len() >= DEFAULT_MAX_ENTRIES {
            lines.push(format!("{prefix}[... truncated]"));
            break;
        }
    }

    (lines.join("\n"), item_count)
}

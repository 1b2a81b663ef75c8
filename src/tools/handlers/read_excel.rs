//! Read spreadsheet contents (`.xlsx`/`.xls`/`.xlsm`/`.ods`) as a table.
//!
//! Always registered by the capability factory alongside the text-file
//! handlers, since spreadsheets are common inputs for data-analysis tasks
//! and [`super::read::ReadHandler`] rejects them outright as binary.

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{json, Value};

const DEFAULT_MAX_ROWS: usize = 200;

/// Read a spreadsheet's contents as a table.
///
/// Standard agentic tool name: `read_excel`.
pub struct ReadExcelHandler;

fn format_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERROR({e:?})"),
    }
}

#[async_trait]
impl ToolHandler for ReadExcelHandler {
    fn name(&self) -> &str {
        "read_excel"
    }

    fn description(&self) -> &str {
        "Read the contents of a spreadsheet file (.xlsx, .xls, .xlsm, .ods) as a table. \
         Use this for data files that Read cannot open because they're binary formats."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path to the spreadsheet file"},
                "sheet": {"type": "string", "description": "Sheet name to read. Defaults to the first sheet."},
                "max_rows": {"type": "integer", "description": format!("Maximum rows to return. Defaults to {DEFAULT_MAX_ROWS}.")},
            },
            "required": ["path"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let path_str = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let sheet_name = invocation.arguments.get("sheet").and_then(|v| v.as_str());
        let max_rows = invocation.arguments.get("max_rows").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_ROWS as u64) as usize;

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

        let mut workbook = match open_workbook_auto(&path) {
            Ok(wb) => wb,
            Err(e) => return ToolOutput::error(format!("Error opening spreadsheet: {e}")),
        };

        let sheet_name = match sheet_name {
            Some(name) => name.to_string(),
            None => match workbook.sheet_names().first() {
                Some(name) => name.clone(),
                None => return ToolOutput::error("Spreadsheet contains no sheets"),
            },
        };

        let range = match workbook.worksheet_range(&sheet_name) {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("Error reading sheet '{sheet_name}': {e}")),
        };

        let total_rows = range.rows().count();
        if total_rows == 0 {
            return ToolOutput { content: "(empty sheet)".to_string(), success: true, metadata: [("rows".to_string(), json!(0))].into_iter().collect() };
        }

        let mut lines = Vec::new();
        for row in range.rows().take(max_rows) {
            let formatted: Vec<String> = row.iter().map(format_cell).collect();
            lines.push(formatted.join(" | "));
        }

        let mut content = lines.join("\n");
        if total_rows > max_rows {
            content.push_str(&format!("\n\n[Showing {max_rows} of {total_rows} rows]"));
        }

        ToolOutput {
            content,
            success: true,
            metadata: [
                ("path".to_string(), json!(path.display().to_string())),
                ("sheet".to_string(), json!(sheet_name)),
                ("rows".to_string(), json!(total_rows.min(max_rows))),
                ("total_rows".to_string(), json!(total_rows)),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_excel_missing_file() {
        let handler = ReadExcelHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read_excel".to_string(),
            arguments: json!({"path": "/nonexistent/file.xlsx"}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_read_excel_empty_path() {
        let handler = ReadExcelHandler;
        let invocation = ToolInvocation {
            call_id: "1".to_string(),
            tool_name: "read_excel".to_string(),
            arguments: json!({"path": ""}),
        };
        let out = handler.handle(invocation).await;
        assert!(!out.success);
    }
}

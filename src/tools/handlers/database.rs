//! Shared machinery for read-only (by default) database tool handlers:
//! mutation-keyword scanning, ASCII-table row rendering, and the
//! `query`/`list_tables`/`describe` operation dispatch that every SQL
//! dialect handler wires up the same way.
//!
//! Concrete dialects implement [`DatabaseDialect`]; [`DatabaseHandler`]
//! wraps a dialect into a full [`ToolHandler`].

use crate::tools::base::{ToolHandler, ToolInvocation, ToolOutput};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::LazyLock;

pub const DEFAULT_ROW_LIMIT: usize = 100;

const MUTATION_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "GRANT",
    "REVOKE", "EXEC", "EXECUTE", "CALL",
];

static MUTATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    let pattern = MUTATION_KEYWORDS
        .iter()
        .map(|k| format!(r"\b{k}\b"))
        .collect::<Vec<_>>()
        .join("|");
    regex::RegexBuilder::new(&pattern).case_insensitive(true).build().expect("static mutation regex")
});

/// Checks whether `sql` is read-only. Returns `(is_safe, reason)`, where
/// `reason` names the offending keyword on rejection.
pub fn is_read_only_sql(sql: &str) -> (bool, String) {
    let without_line_comments: String = sql
        .lines()
        .map(|line| line.split("--").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ");
    let without_block_comments = strip_block_comments(&without_line_comments);
    let cleaned = without_block_comments.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(m) = MUTATION_RE.find(&cleaned) {
        return (false, format!("Query contains mutation keyword: {}", m.as_str()));
    }
    (true, String::new())
}

fn strip_block_comments(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("/*") {
        result.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        if let Some(end) = rest.find("*/") {
            rest = &rest[end + 2..];
        } else {
            rest = "";
            break;
        }
    }
    result.push_str(rest);
    result
}

/// The column names and rows of a query result, in a dialect-agnostic shape.
#[derive(Debug, Clone, Default)]
pub struct DbRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Extra schema info surfaced by `describe`, beyond the column list itself.
#[derive(Debug, Clone, Default)]
pub struct TableExtraInfo {
    pub primary_key: Vec<String>,
    pub indexes: Vec<String>,
}

/// Formats query results as a readable, width-capped ASCII table.
pub fn format_rows(columns: &[String], rows: &[Vec<Option<String>>], max_rows: usize) -> String {
    if rows.is_empty() {
        return "(no rows returned)".to_string();
    }

    let cell = |v: &Option<String>| v.clone().unwrap_or_else(|| "NULL".to_string());
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows.iter().take(max_rows) {
        for (i, val) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell(val).len());
            }
        }
    }
    let widths: Vec<usize> = widths.into_iter().map(|w| w.min(50)).collect();

    let pad = |s: &str, w: usize| {
        let mut truncated = s.to_string();
        truncated.truncate(w);
        format!("{truncated:<w$}")
    };

    let header = columns.iter().enumerate().map(|(i, c)| pad(c, widths[i])).collect::<Vec<_>>().join(" | ");
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-");

    let mut lines = vec![header, separator];
    for row in rows.iter().take(max_rows) {
        let line = row.iter().enumerate().map(|(i, v)| pad(&cell(v), widths.get(i).copied().unwrap_or(4))).collect::<Vec<_>>().join(" | ");
        lines.push(line);
    }
    if rows.len() > max_rows {
        lines.push(format!("... ({} more rows)", rows.len() - max_rows));
    }
    lines.join("\n")
}

/// A SQL dialect backend: connection, catalog queries, and result fetching.
/// Everything operation-shaped (approval, mutation-scanning, formatting) is
/// shared by [`DatabaseHandler`]; dialects only know how to talk to their
/// specific database.
#[async_trait]
pub trait DatabaseDialect: Send + Sync {
    fn db_type(&self) -> &str;
    fn description(&self) -> String;

    async fn execute_query(&self, sql: &str) -> Result<DbRows>;
    fn list_tables_sql(&self, schema: Option<&str>, pattern: &str) -> String;
    fn describe_sql(&self, table_name: &str, schema: Option<&str>) -> String;

    async fn table_extra_info(&self, _table_name: &str, _schema: Option<&str>) -> Option<TableExtraInfo> {
        None
    }
}

fn format_describe_output(table_name: &str, rows: &DbRows, extra: Option<&TableExtraInfo>) -> String {
    let mut lines = vec![format!("Table: {}", table_name.to_uppercase()), String::new(), "Columns:".to_string(), "-".repeat(80)];
    for row in &rows.rows {
        let name = row.first().and_then(|v| v.clone()).unwrap_or_default();
        let dtype = row.get(1).and_then(|v| v.clone()).unwrap_or_else(|| "UNKNOWN".to_string());
        let nullable_raw = row.get(2).and_then(|v| v.clone()).unwrap_or_else(|| "Y".to_string());
        let null_str = if matches!(nullable_raw.to_uppercase().as_str(), "Y" | "YES" | "1" | "TRUE") {
            "NULL"
        } else {
            "NOT NULL"
        };
        lines.push(format!("  {name:30} {dtype:20} {null_str}"));
    }
    if let Some(extra) = extra {
        if !extra.primary_key.is_empty() {
            lines.push(String::new());
            lines.push(format!("Primary Key: ({})", extra.primary_key.join(", ")));
        }
        if !extra.indexes.is_empty() {
            lines.push(String::new());
            lines.push("Indexes:".to_string());
            for idx in &extra.indexes {
                lines.push(format!("  {idx}"));
            }
        }
    }
    lines.join("\n")
}

/// Wraps a [`DatabaseDialect`] into a [`ToolHandler`], implementing the
/// shared `query`/`list_tables`/`describe` operation contract.
pub struct DatabaseHandler<D: DatabaseDialect> {
    dialect: D,
    description: String,
    row_limit: usize,
    requires_approval: bool,
    read_only: bool,
}

impl<D: DatabaseDialect> DatabaseHandler<D> {
    /// `read_only` gates the mutation-keyword scan in `handle_query`: it is
    /// derived from `profile.database == DatabaseMode::Readonly` by the
    /// factory. The `mutations` capability bypasses the scan entirely.
    pub fn new(dialect: D, row_limit: Option<usize>, requires_approval: bool, read_only: bool) -> Self {
        let description = dialect.description();
        Self { dialect, description, row_limit: row_limit.unwrap_or(DEFAULT_ROW_LIMIT), requires_approval, read_only }
    }
}

#[async_trait]
impl<D: DatabaseDialect> ToolHandler for DatabaseHandler<D> {
    fn name(&self) -> &str {
        self.dialect.db_type()
    }

    fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {"type": "string", "enum": ["query", "list_tables", "describe"], "description": "Operation to perform"},
                "sql": {"type": "string", "description": "SQL query to execute (for 'query' operation)"},
                "table_pattern": {"type": "string", "description": "Table name pattern for filtering (for 'list_tables')"},
                "table_name": {"type": "string", "description": "Table name to describe (for 'describe')"},
                "schema": {"type": "string", "description": "Schema/owner name (optional)"},
                "row_limit": {"type": "integer", "description": format!("Max rows to return (default: {DEFAULT_ROW_LIMIT})")},
            },
            "required": ["operation"],
        })
    }

    async fn handle(&self, invocation: ToolInvocation) -> ToolOutput {
        let operation = invocation.arguments.get("operation").and_then(|v| v.as_str()).unwrap_or("");
        let row_limit = invocation.arguments.get("row_limit").and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(self.row_limit);

        let result = match operation {
            "query" => self.handle_query(&invocation, row_limit).await,
            "list_tables" => self.handle_list_tables(&invocation, row_limit).await,
            "describe" => self.handle_describe(&invocation).await,
            other => {
                return ToolOutput::error(format!("Unknown operation: {other}. Use: query, list_tables, describe"))
            }
        };

        result.unwrap_or_else(|e| ToolOutput::error(format!("{} error: {e}", title_case(self.dialect.db_type()))))
    }
}

fn title_case(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
        None => String::new(),
    }
}

impl<D: DatabaseDialect> DatabaseHandler<D> {
    async fn handle_query(&self, invocation: &ToolInvocation, row_limit: usize) -> Result<ToolOutput> {
        let sql = invocation.arguments.get("sql").and_then(|v| v.as_str()).unwrap_or("");
        if sql.is_empty() {
            return Ok(ToolOutput::error("No SQL query provided"));
        }

        if self.read_only {
            let (is_safe, reason) = is_read_only_sql(sql);
            if !is_safe {
                return Ok(ToolOutput::error(format!("Query blocked: {reason}")));
            }
        }

        let rows = self.dialect.execute_query(sql).await?;
        if rows.columns.is_empty() {
            return Ok(ToolOutput::ok("Query executed (no result set)"));
        }

        let truncated = rows.rows.len() > row_limit;
        let content = format_rows(&rows.columns, &rows.rows, row_limit);
        Ok(ToolOutput {
            content,
            success: true,
            metadata: [
                ("columns".to_string(), json!(rows.columns)),
                ("row_count".to_string(), json!(rows.rows.len().min(row_limit))),
                ("truncated".to_string(), json!(truncated)),
            ]
            .into_iter()
            .collect(),
        })
    }

    async fn handle_list_tables(&self, invocation: &ToolInvocation, row_limit: usize) -> Result<ToolOutput> {
        let pattern = invocation.arguments.get("table_pattern").and_then(|v| v.as_str()).unwrap_or("%");
        let schema = invocation.arguments.get("schema").and_then(|v| v.as_str());

        let sql = self.dialect.list_tables_sql(schema, pattern);
        let rows = self.dialect.execute_query(&sql).await?;

        if rows.rows.is_empty() {
            return Ok(ToolOutput::ok(format!("No tables found matching pattern: {pattern}")));
        }

        let content = format_rows(&rows.columns, &rows.rows, row_limit);
        Ok(ToolOutput {
            content,
            success: true,
            metadata: [("table_count".to_string(), json!(rows.rows.len().min(row_limit)))].into_iter().collect(),
        })
    }

    async fn handle_describe(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let table_name = invocation.arguments.get("table_name").and_then(|v| v.as_str()).unwrap_or("");
        let schema = invocation.arguments.get("schema").and_then(|v| v.as_str());

        if table_name.is_empty() {
            return Ok(ToolOutput::error("No table_name provided"));
        }

        let sql = self.dialect.describe_sql(table_name, schema);
        let rows = self.dialect.execute_query(&sql).await?;

        if rows.rows.is_empty() {
            return Ok(ToolOutput::error(format!("Table not found: {table_name}")));
        }

        let extra = self.dialect.table_extra_info(table_name, schema).await;
        let content = format_describe_output(table_name, &rows, extra.as_ref());

        Ok(ToolOutput {
            content,
            success: true,
            metadata: [
                ("table_name".to_string(), json!(table_name.to_uppercase())),
                ("column_count".to_string(), json!(rows.rows.len())),
            ]
            .into_iter()
            .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_read_only_sql_allows_select() {
        let (safe, _) = is_read_only_sql("SELECT * FROM users WHERE id = 1");
        assert!(safe);
    }

    #[test]
    fn test_is_read_only_sql_blocks_delete() {
        let (safe, reason) = is_read_only_sql("DELETE FROM users");
        assert!(!safe);
        assert!(reason.contains("DELETE"));
    }

    #[test]
    fn test_is_read_only_sql_ignores_keyword_in_comment() {
        let (safe, _) = is_read_only_sql("SELECT * FROM users -- DROP TABLE users\n");
        assert!(safe);
    }

    #[test]
    fn test_is_read_only_sql_blocks_keyword_in_block_comment_elsewhere() {
        let (safe, _) = is_read_only_sql("/* comment */ DROP TABLE users");
        assert!(!safe);
    }

    #[test]
    fn test_format_rows_empty() {
        assert_eq!(format_rows(&["a".to_string()], &[], 10), "(no rows returned)");
    }

    #[test]
    fn test_format_rows_basic() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![vec![Some("1".to_string()), Some("Alice".to_string())]];
        let output = format_rows(&columns, &rows, 10);
        assert!(output.contains("id"));
        assert!(output.contains("Alice"));
    }

    #[test]
    fn test_format_rows_truncates_extra_rows() {
        let columns = vec!["id".to_string()];
        let rows: Vec<Vec<Option<String>>> = (0..5).map(|i| vec![Some(i.to_string())]).collect();
        let output = format_rows(&columns, &rows, 2);
        assert!(output.contains("more rows"));
    }

    struct StubDialect;

    #[async_trait]
    impl DatabaseDialect for StubDialect {
        fn db_type(&self) -> &str {
            "stub"
        }
        fn description(&self) -> String {
            "stub dialect for tests".to_string()
        }
        async fn execute_query(&self, _sql: &str) -> Result<DbRows> {
            Ok(DbRows { columns: vec![], rows: vec![] })
        }
        fn list_tables_sql(&self, _schema: Option<&str>, _pattern: &str) -> String {
            String::new()
        }
        fn describe_sql(&self, _table_name: &str, _schema: Option<&str>) -> String {
            String::new()
        }
    }

    fn query_invocation(sql: &str) -> ToolInvocation {
        ToolInvocation { call_id: "1".to_string(), tool_name: "stub".to_string(), arguments: json!({"operation": "query", "sql": sql}) }
    }

    #[tokio::test]
    async fn test_read_only_handler_blocks_mutation() {
        let handler = DatabaseHandler::new(StubDialect, None, false, true);
        let out = handler.handle(query_invocation("DELETE FROM t WHERE x=1")).await;
        assert!(!out.success);
        assert!(out.content.contains("Query blocked"));
    }

    #[tokio::test]
    async fn test_mutations_mode_bypasses_scan() {
        let handler = DatabaseHandler::new(StubDialect, None, false, false);
        let out = handler.handle(query_invocation("DELETE FROM t WHERE x=1")).await;
        assert!(out.success);
    }
}

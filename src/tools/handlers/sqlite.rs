//! SQLite dialect: a local file opened read-only via a `file:` URI.

use super::database::{DatabaseDialect, DbRows, TableExtraInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::PathBuf;

/// SQLite database dialect, opened read-only.
///
/// Resolves its database path from an explicit argument or the `SQLITE_DB`
/// environment variable.
pub struct SqliteDialect {
    db_path: PathBuf,
}

impl SqliteDialect {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    pub fn from_env() -> Result<Self> {
        let path = std::env::var("SQLITE_DB").map_err(|_| Error::config("SQLITE_DB environment variable not set"))?;
        Ok(Self::new(path))
    }

    fn open(&self) -> Result<Connection> {
        let uri = format!("file:{}?mode=ro", self.db_path.display());
        Connection::open_with_flags(
            uri,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| Error::other(format!("Failed to open SQLite database: {e}")))
    }

    fn run(&self, sql: &str) -> Result<DbRows> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(sql).map_err(|e| Error::other(format!("SQL error: {e}")))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let col_count = columns.len();

        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(col_count);
                for i in 0..col_count {
                    let value = match row.get_ref(i)? {
                        ValueRef::Null => None,
                        ValueRef::Integer(n) => Some(n.to_string()),
                        ValueRef::Real(f) => Some(f.to_string()),
                        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_string()),
                        ValueRef::Blob(_) => Some("<blob>".to_string()),
                    };
                    values.push(value);
                }
                Ok(values)
            })
            .map_err(|e| Error::other(format!("SQL error: {e}")))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::other(format!("SQL error: {e}")))?;

        Ok(DbRows { columns, rows })
    }
}

#[async_trait]
impl DatabaseDialect for SqliteDialect {
    fn db_type(&self) -> &str {
        "sqlite"
    }

    fn description(&self) -> String {
        "Query a SQLite database (read-only). Supports listing tables, describing schema, \
         and running read-only SQL queries."
            .to_string()
    }

    async fn execute_query(&self, sql: &str) -> Result<DbRows> {
        let sql = sql.to_string();
        let dialect_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || SqliteDialect::new(dialect_path).run(&sql))
            .await
            .map_err(|e| Error::other(format!("SQLite task failed: {e}")))?
    }

    fn list_tables_sql(&self, _schema: Option<&str>, pattern: &str) -> String {
        let pattern = pattern.replace('\'', "''");
        format!(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' AND name LIKE '{pattern}' \
             ORDER BY name"
        )
    }

    fn describe_sql(&self, table_name: &str, _schema: Option<&str>) -> String {
        let safe_name = table_name.replace('\'', "''");
        format!(
            "SELECT name AS column_name, type AS data_type, \
             CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS nullable \
             FROM pragma_table_info('{safe_name}') ORDER BY cid"
        )
    }

    async fn table_extra_info(&self, table_name: &str, _schema: Option<&str>) -> Option<TableExtraInfo> {
        let safe_name = table_name.replace('\'', "''");
        let pk_sql = format!("SELECT name FROM pragma_table_info('{safe_name}') WHERE pk > 0 ORDER BY pk");
        let idx_sql = format!("SELECT name FROM pragma_index_list('{safe_name}')");

        let pk_rows = self.execute_query(&pk_sql).await.ok()?;
        let idx_rows = self.execute_query(&idx_sql).await.ok()?;

        Some(TableExtraInfo {
            primary_key: pk_rows.rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect(),
            indexes: idx_rows.rows.into_iter().filter_map(|r| r.into_iter().next().flatten()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables_sql_excludes_sqlite_internal() {
        let dialect = SqliteDialect::new("/tmp/nonexistent.db");
        let sql = dialect.list_tables_sql(None, "%");
        assert!(sql.contains("NOT LIKE 'sqlite_%'"));
    }

    #[test]
    fn test_describe_sql_escapes_quotes() {
        let dialect = SqliteDialect::new("/tmp/nonexistent.db");
        let sql = dialect.describe_sql("o'brien", None);
        assert!(sql.contains("o''brien"));
    }

    #[tokio::test]
    async fn test_query_against_real_sqlite_db() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", []).unwrap();
            conn.execute("INSERT INTO users (id, name) VALUES (1, 'Alice')", []).unwrap();
        }

        let dialect = SqliteDialect::new(db_path);
        let rows = dialect.execute_query("SELECT id, name FROM users").await.unwrap();
        assert_eq!(rows.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0][1], Some("Alice".to_string()));
    }
}

//! MySQL dialect, executed via the `mysql` CLI rather than a native driver.
//!
//! There's no MySQL client crate in the dependency stack, so queries are
//! shelled out to the `mysql` binary in batch mode (`-B`), the same way
//! [`super::bash::BashHandler`] and the eval harness's containerized MySQL
//! fixtures invoke it. When `MYSQL_DOCKER_CONTAINER` is set, the command
//! runs inside that container via `docker exec` instead of on the host.

use super::database::{DatabaseDialect, DbRows};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

pub const SYSTEM_SCHEMAS: &[&str] = &["mysql", "information_schema", "performance_schema", "sys"];

/// Connection parameters for a MySQL server, executed via CLI.
pub struct MysqlDialect {
    host: String,
    port: u16,
    database: String,
    user: String,
    password: String,
    docker_container: Option<String>,
}

impl MysqlDialect {
    pub fn from_env() -> Result<Self> {
        let database = std::env::var("MYSQL_DATABASE").map_err(|_| Error::config("MYSQL_DATABASE environment variable not set"))?;
        Ok(Self {
            host: std::env::var("MYSQL_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("MYSQL_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(3306),
            database,
            user: std::env::var("MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
            password: std::env::var("MYSQL_PASSWORD").unwrap_or_default(),
            docker_container: std::env::var("MYSQL_DOCKER_CONTAINER").ok(),
        })
    }

    fn build_command(&self, sql: &str) -> Command {
        let full_sql = format!("SET SESSION TRANSACTION READ ONLY; {sql}");

        if let Some(container) = &self.docker_container {
            let mut cmd = Command::new("docker");
            cmd.args(["exec", container, "mysql", "-B", "--raw"]);
            cmd.arg(format!("-u{}", self.user));
            if !self.password.is_empty() {
                cmd.arg(format!("-p{}", self.password));
            }
            cmd.arg(&self.database).arg("-e").arg(&full_sql);
            cmd
        } else {
            let mut cmd = Command::new("mysql");
            cmd.args(["-B", "--raw"]);
            cmd.arg("-h").arg(&self.host).arg("-P").arg(self.port.to_string()).arg(format!("-u{}", self.user));
            if !self.password.is_empty() {
                cmd.arg(format!("-p{}", self.password));
            }
            cmd.arg(&self.database).arg("-e").arg(&full_sql);
            cmd
        }
    }

    async fn run(&self, sql: &str) -> Result<DbRows> {
        let mut cmd = self.build_command(sql);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::config("mysql client is not installed"),
            _ => Error::other(format!("Failed to run mysql: {e}")),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::other(format!("mysql error: {stderr}")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_tab_separated(&stdout)
    }
}

/// `mysql -B --raw` prints a header row followed by tab-separated rows,
/// with `NULL` as the literal token for SQL NULL.
fn parse_tab_separated(output: &str) -> Result<DbRows> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        return Ok(DbRows::default());
    };
    if header.trim().is_empty() {
        return Ok(DbRows::default());
    }

    let columns: Vec<String> = header.split('\t').map(str::to_string).collect();
    let rows = lines
        .filter(|l| !l.is_empty())
        .map(|line| {
            line.split('\t')
                .map(|cell| if cell == "NULL" { None } else { Some(cell.to_string()) })
                .collect::<Vec<_>>()
        })
        .collect();

    Ok(DbRows { columns, rows })
}

#[async_trait]
impl DatabaseDialect for MysqlDialect {
    fn db_type(&self) -> &str {
        "mysql"
    }

    fn description(&self) -> String {
        "Query a MySQL database (read-only). Supports listing tables, describing schema, \
         and running read-only SQL queries."
            .to_string()
    }

    async fn execute_query(&self, sql: &str) -> Result<DbRows> {
        self.run(sql).await
    }

    fn list_tables_sql(&self, schema: Option<&str>, pattern: &str) -> String {
        let schema = schema.unwrap_or(&self.database).replace('\'', "''");
        let pattern = pattern.replace('\'', "''");
        format!(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_name LIKE '{pattern}' ORDER BY table_name"
        )
    }

    fn describe_sql(&self, table_name: &str, schema: Option<&str>) -> String {
        let schema = schema.unwrap_or(&self.database).replace('\'', "''");
        let table_name = table_name.replace('\'', "''");
        format!(
            "SELECT column_name, column_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = '{schema}' AND table_name = '{table_name}' ORDER BY ordinal_position"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tab_separated_basic() {
        let output = "id\tname\n1\tAlice\n2\tNULL\n";
        let rows = parse_tab_separated(output).unwrap();
        assert_eq!(rows.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[1][1], None);
    }

    #[test]
    fn test_parse_tab_separated_empty() {
        let rows = parse_tab_separated("").unwrap();
        assert!(rows.columns.is_empty());
    }

    #[test]
    fn test_list_tables_sql_filters_schema() {
        let dialect = MysqlDialect {
            host: "localhost".to_string(),
            port: 3306,
            database: "appdb".to_string(),
            user: "root".to_string(),
            password: String::new(),
            docker_container: None,
        };
        let sql = dialect.list_tables_sql(None, "%");
        assert!(sql.contains("appdb"));
    }
}

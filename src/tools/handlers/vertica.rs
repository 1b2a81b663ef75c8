//! Vertica dialect.
//!
//! Same structural-stub shape as [`super::postgres::PostgresDialect`] and
//! [`super::oracle::OracleDialect`]: no Vertica client crate is in the
//! stack, so queries report a configuration error rather than connecting.
//! Registration is gated on `VERTICA_HOST`. Vertica's catalog views are
//! close enough to Postgres's `information_schema` (Vertica is itself
//! Postgres-derived) that the catalog SQL mirrors the Postgres dialect.

use super::database::{DatabaseDialect, DbRows};
use crate::{Error, Result};
use async_trait::async_trait;

pub struct VerticaDialect {
    host: String,
}

impl VerticaDialect {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("VERTICA_HOST").map_err(|_| Error::config("VERTICA_HOST environment variable not set"))?;
        Ok(Self { host })
    }
}

#[async_trait]
impl DatabaseDialect for VerticaDialect {
    fn db_type(&self) -> &str {
        "vertica"
    }

    fn description(&self) -> String {
        format!(
            "Query a Vertica database (read-only) at {}. Supports listing tables, describing \
             schema, and running read-only SQL queries.",
            self.host
        )
    }

    async fn execute_query(&self, _sql: &str) -> Result<DbRows> {
        Err(Error::config("vertica dialect not compiled in: no driver crate is linked for this build"))
    }

    fn list_tables_sql(&self, schema: Option<&str>, pattern: &str) -> String {
        let schema = schema.unwrap_or("public").replace('\'', "''");
        let pattern = pattern.replace('\'', "''");
        format!(
            "SELECT table_name, 'TABLE' FROM v_catalog.tables \
             WHERE table_schema = '{schema}' AND table_name LIKE '{pattern}' ORDER BY table_name"
        )
    }

    fn describe_sql(&self, table_name: &str, schema: Option<&str>) -> String {
        let schema = schema.unwrap_or("public").replace('\'', "''");
        let table_name = table_name.replace('\'', "''");
        format!(
            "SELECT column_name, data_type, is_nullable FROM v_catalog.columns \
             WHERE table_schema = '{schema}' AND table_name = '{table_name}' ORDER BY ordinal_position"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_query_reports_unconfigured() {
        let dialect = VerticaDialect { host: "vertica.internal".to_string() };
        let err = dialect.execute_query("SELECT 1").await.unwrap_err();
        assert!(err.to_string().contains("not compiled in"));
    }

    #[test]
    fn test_list_tables_sql_uses_v_catalog() {
        let dialect = VerticaDialect { host: "vertica.internal".to_string() };
        let sql = dialect.list_tables_sql(None, "%");
        assert!(sql.contains("v_catalog.tables"));
    }
}

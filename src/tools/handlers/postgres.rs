//! PostgreSQL dialect.
//!
//! No PostgreSQL driver is in the dependency stack (the pack's example repos
//! never reach for `tokio-postgres`), so this dialect is a structural stub:
//! it builds the correct catalog SQL and registers like a real dialect, but
//! [`PostgresDialect::execute_query`] returns a configuration error rather
//! than connecting. Registration is still gated on `POSTGRES_HOST` so the
//! tool only appears, and fails loudly, when a Postgres target was intended.

use super::database::{DatabaseDialect, DbRows};
use crate::{Error, Result};
use async_trait::async_trait;

pub struct PostgresDialect {
    database: String,
}

impl PostgresDialect {
    pub fn from_env() -> Result<Self> {
        let database = std::env::var("POSTGRES_DATABASE").map_err(|_| Error::config("POSTGRES_DATABASE environment variable not set"))?;
        std::env::var("POSTGRES_HOST").map_err(|_| Error::config("POSTGRES_HOST environment variable not set"))?;
        Ok(Self { database })
    }
}

#[async_trait]
impl DatabaseDialect for PostgresDialect {
    fn db_type(&self) -> &str {
        "postgres"
    }

    fn description(&self) -> String {
        "Query a PostgreSQL database (read-only). Supports listing tables, describing schema, \
         and running read-only SQL queries."
            .to_string()
    }

    async fn execute_query(&self, _sql: &str) -> Result<DbRows> {
        Err(Error::config("postgres dialect not compiled in: no driver crate is linked for this build"))
    }

    fn list_tables_sql(&self, schema: Option<&str>, pattern: &str) -> String {
        let schema = schema.unwrap_or("public").replace('\'', "''");
        let pattern = pattern.replace('\'', "''");
        format!(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_name LIKE '{pattern}' ORDER BY table_name"
        )
    }

    fn describe_sql(&self, table_name: &str, schema: Option<&str>) -> String {
        let schema = schema.unwrap_or("public").replace('\'', "''");
        let table_name = table_name.replace('\'', "''");
        format!(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = '{schema}' AND table_name = '{table_name}' ORDER BY ordinal_position"
        )
    }
}

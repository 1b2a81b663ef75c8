//! Oracle dialect.
//!
//! Same structural-stub shape as [`super::postgres::PostgresDialect`]: no
//! Oracle driver crate is in the stack (linking one pulls in Oracle's
//! proprietary Instant Client libraries, which the rest of this dependency
//! tree has no equivalent of), so queries report a configuration error
//! rather than connecting. Registration is gated on `ORACLE_DSN`.

use super::database::{DatabaseDialect, DbRows};
use crate::{Error, Result};
use async_trait::async_trait;

pub struct OracleDialect {
    dsn: String,
}

impl OracleDialect {
    pub fn from_env() -> Result<Self> {
        let dsn = std::env::var("ORACLE_DSN").map_err(|_| Error::config("ORACLE_DSN environment variable not set"))?;
        Ok(Self { dsn })
    }
}

#[async_trait]
impl DatabaseDialect for OracleDialect {
    fn db_type(&self) -> &str {
        "oracle"
    }

    fn description(&self) -> String {
        format!(
            "Query an Oracle database (read-only) at {}. Supports listing tables, describing \
             schema, and running read-only SQL queries.",
            self.dsn
        )
    }

    async fn execute_query(&self, _sql: &str) -> Result<DbRows> {
        Err(Error::config("oracle dialect not compiled in: no driver crate is linked for this build"))
    }

    fn list_tables_sql(&self, schema: Option<&str>, pattern: &str) -> String {
        let pattern = pattern.replace('\'', "''").to_uppercase();
        match schema {
            Some(schema) => {
                let schema = schema.replace('\'', "''").to_uppercase();
                format!(
                    "SELECT table_name, 'TABLE' FROM all_tables \
                     WHERE owner = '{schema}' AND table_name LIKE '{pattern}' ORDER BY table_name"
                )
            }
            None => format!("SELECT table_name, 'TABLE' FROM user_tables WHERE table_name LIKE '{pattern}' ORDER BY table_name"),
        }
    }

    fn describe_sql(&self, table_name: &str, schema: Option<&str>) -> String {
        let table_name = table_name.replace('\'', "''").to_uppercase();
        match schema {
            Some(schema) => {
                let schema = schema.replace('\'', "''").to_uppercase();
                format!(
                    "SELECT column_name, data_type, nullable FROM all_tab_columns \
                     WHERE owner = '{schema}' AND table_name = '{table_name}' ORDER BY column_id"
                )
            }
            None => format!(
                "SELECT column_name, data_type, nullable FROM user_tab_columns \
                 WHERE table_name = '{table_name}' ORDER BY column_id"
            ),
        }
    }
}

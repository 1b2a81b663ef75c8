//! Per-task execution environments for the eval harness.
//!
//! Grounded on `ro_agent/eval/runner.py` (`_run_dbbench_task_sqlite` builds
//! an ephemeral SQLite file per task; `_run_dbbench_task_mysql` and the OS
//! tasks shell out to a long-lived docker container via
//! `eval/agentbench/docker/mysql_container.py`).

use crate::{Error, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Renders one cell as `CONCAT_WS` would: `None` for SQL NULL (dropped by
/// the caller), otherwise the value's text form. Reads via `ValueRef`
/// rather than `row.get::<_, Option<String>>` because rusqlite's `String`
/// `FromSql` only accepts the `Text` storage class -- an `INTEGER` or
/// `REAL` column would otherwise error and silently collapse to `None`,
/// dropping every numeric column (including typical `id INTEGER` primary
/// keys) from the hash.
fn render_cell(row: &rusqlite::Row<'_>, idx: usize) -> Option<String> {
    use rusqlite::types::ValueRef;
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => None,
        Ok(ValueRef::Integer(v)) => Some(v.to_string()),
        Ok(ValueRef::Real(v)) => Some(v.to_string()),
        Ok(ValueRef::Text(t)) => Some(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Some(format!("{b:02x?}")),
        Err(_) => None,
    }
}

/// Runs a shell command inside a task's sandbox, returning `(exit_code,
/// stdout, stderr)`.
#[async_trait]
pub trait EvalSandbox: Send + Sync {
    async fn exec(&self, command: &str) -> Result<(i32, String, String)>;

    /// Path to hand the agent's database tool handler, if this sandbox is
    /// file-backed (SQLite tasks). `None` for container-backed sandboxes.
    fn db_path(&self) -> Option<&Path> {
        None
    }
}

/// One SQLite file per task, built fresh from `CREATE TABLE`/`INSERT`
/// statements and discarded on drop (the `TempDir` cleans up the file when
/// the struct goes out of scope).
pub struct SqliteSandbox {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl SqliteSandbox {
    /// Creates the sandbox and applies `setup_sql` (typically `CREATE
    /// TABLE` + `INSERT` statements from the task's fixture) as a single
    /// batch.
    pub fn create(setup_sql: &str) -> Result<Self> {
        let dir = tempfile::tempdir().map_err(Error::Io)?;
        let path = dir.path().join("task.db");
        let conn = Connection::open(&path).map_err(|e| Error::other(format!("failed to create sandbox db: {e}")))?;
        conn.execute_batch(setup_sql).map_err(|e| Error::other(format!("failed to apply sandbox fixture: {e}")))?;
        Ok(Self { _dir: dir, path })
    }

    /// Computes a stable hash of the full database contents, matching the
    /// AgentBench table-hash algorithm so it can be compared against a
    /// dataset's precomputed `answer_md5`:
    /// `MD5(GROUP_CONCAT(SUBSTRING(MD5(CONCAT_WS(',', col1, col2, ...)), 1, 5) ORDER BY rowhash))`.
    /// Per-row: `CONCAT_WS` joins non-NULL column values with `,`, skipping
    /// NULLs entirely (no empty placeholder, no extra separator); MD5 that,
    /// keep the first 5 hex chars as the row hash. Then sort the row hashes
    /// lexicographically, join with `,` (`GROUP_CONCAT`'s default
    /// separator), and MD5 the result.
    pub fn table_state_hash(&self, table: &str) -> Result<String> {
        let conn = Connection::open(&self.path).map_err(|e| Error::other(format!("failed to reopen sandbox db: {e}")))?;
        let sql = format!("SELECT * FROM \"{}\"", table.replace('"', "\"\""));
        let mut stmt = conn.prepare(&sql).map_err(|e| Error::other(format!("SQL error: {e}")))?;
        let col_count = stmt.column_count();
        let mut row_hashes: Vec<String> = Vec::new();
        let mut rows = stmt.query([]).map_err(|e| Error::other(format!("SQL error: {e}")))?;
        while let Some(row) = rows.next().map_err(|e| Error::other(format!("SQL error: {e}")))? {
            let values: Vec<String> = (0..col_count).filter_map(|i| render_cell(row, i)).collect();
            let concat_ws = values.join(",");
            row_hashes.push(md5_hex(concat_ws.as_bytes())[..5].to_string());
        }
        row_hashes.sort();
        let group_concat = row_hashes.join(",");
        Ok(md5_hex(group_concat.as_bytes()))
    }
}

#[async_trait]
impl EvalSandbox for SqliteSandbox {
    async fn exec(&self, _command: &str) -> Result<(i32, String, String)> {
        Err(Error::config("SqliteSandbox does not support shell execution, only direct SQL via the sqlite tool"))
    }

    fn db_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// A long-lived Docker container reused across tasks (a MySQL instance for
/// DBBench mutation tasks, or an OS image for OS-interaction tasks).
/// Commands run via `docker exec`, matching the bash handler's
/// `tokio::process::Command` idiom rather than adding a Docker client
/// dependency.
pub struct DockerSandbox {
    container: String,
}

impl DockerSandbox {
    pub fn new(container: impl Into<String>) -> Self {
        Self { container: container.into() }
    }

    /// Copies `content` into the container at `dest_path` by piping it
    /// through `docker exec -i <container> sh -c 'cat > dest_path'`,
    /// avoiding a temporary file on the host-container boundary.
    pub async fn write_file(&self, dest_path: &str, content: &str) -> Result<()> {
        let mut child = Command::new("docker")
            .args(["exec", "-i", &self.container, "sh", "-c", &format!("cat > {dest_path}")])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::other(format!("failed to spawn docker exec: {e}")))?;

        use tokio::io::AsyncWriteExt;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await.map_err(Error::Io)?;
        }
        let output = child.wait_with_output().await.map_err(Error::Io)?;
        if !output.status.success() {
            return Err(Error::other(format!(
                "docker exec write failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EvalSandbox for DockerSandbox {
    async fn exec(&self, command: &str) -> Result<(i32, String, String)> {
        let output = Command::new("docker")
            .args(["exec", &self.container, "sh", "-c", command])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::other(format!("failed to spawn docker exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        stdout.push_str(&String::from_utf8_lossy(&output.stdout));
        stderr.push_str(&String::from_utf8_lossy(&output.stderr));
        let code = output.status.code().unwrap_or(-1);
        Ok((code, stdout, stderr))
    }
}

/// Reads stdout/stderr from a spawned child incrementally. Kept as a
/// helper so future sandbox variants (e.g. a streaming OS task runner) can
/// share the same drain logic as [`DockerSandbox::exec`] without
/// duplicating buffer handling.
#[allow(dead_code)]
async fn drain(mut reader: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut buf = String::new();
    let _ = reader.read_to_string(&mut buf).await;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_sandbox_applies_fixture_and_hashes_table() {
        let sandbox = SqliteSandbox::create(
            "CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();
        let hash1 = sandbox.table_state_hash("t").unwrap();
        let hash2 = sandbox.table_state_hash("t").unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_sqlite_sandbox_hash_changes_with_content() {
        let sandbox_a = SqliteSandbox::create("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);").unwrap();
        let sandbox_b = SqliteSandbox::create("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (2);").unwrap();
        assert_ne!(sandbox_a.table_state_hash("t").unwrap(), sandbox_b.table_state_hash("t").unwrap());
    }

    #[test]
    fn test_md5_hex_matches_known_vector() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_table_state_hash_independent_of_row_order() {
        let sandbox_a = SqliteSandbox::create(
            "CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (1, 'a'), (2, 'b'), (3, 'c');",
        )
        .unwrap();
        let sandbox_b = SqliteSandbox::create(
            "CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (3, 'c'), (1, 'a'), (2, 'b');",
        )
        .unwrap();
        assert_eq!(sandbox_a.table_state_hash("t").unwrap(), sandbox_b.table_state_hash("t").unwrap());
    }

    #[test]
    fn test_table_state_hash_treats_null_as_skipped_not_empty_string() {
        // CONCAT_WS drops NULL columns entirely rather than rendering them as
        // an empty string, so `(NULL, 'x')` concatenates to "x" while
        // `('', 'x')` concatenates to ",x" -- these must hash differently.
        let sandbox_null = SqliteSandbox::create("CREATE TABLE t (a TEXT, b TEXT); INSERT INTO t VALUES (NULL, 'x');").unwrap();
        let sandbox_empty = SqliteSandbox::create("CREATE TABLE t (a TEXT, b TEXT); INSERT INTO t VALUES ('', 'x');").unwrap();
        assert_ne!(sandbox_null.table_state_hash("t").unwrap(), sandbox_empty.table_state_hash("t").unwrap());
    }

    #[test]
    fn test_table_state_hash_includes_integer_columns() {
        // `row.get::<_, Option<String>>` would error (and get masked to
        // `None`) on an INTEGER column; confirm the hash actually reacts to
        // changes in an all-integer table instead of treating every row as
        // if it had no columns.
        let sandbox_a = SqliteSandbox::create("CREATE TABLE t (id INTEGER, qty INTEGER); INSERT INTO t VALUES (1, 10);").unwrap();
        let sandbox_b = SqliteSandbox::create("CREATE TABLE t (id INTEGER, qty INTEGER); INSERT INTO t VALUES (1, 11);").unwrap();
        assert_ne!(sandbox_a.table_state_hash("t").unwrap(), sandbox_b.table_state_hash("t").unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_sandbox_exec_is_unsupported() {
        let sandbox = SqliteSandbox::create("CREATE TABLE t (id INTEGER);").unwrap();
        assert!(sandbox.exec("echo hi").await.is_err());
    }

    #[test]
    fn test_sqlite_sandbox_exposes_db_path() {
        let sandbox = SqliteSandbox::create("CREATE TABLE t (id INTEGER);").unwrap();
        assert!(sandbox.db_path().unwrap().exists());
    }
}

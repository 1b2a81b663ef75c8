//! Telemetry sinks: the [`Exporter`] trait plus the backends this crate
//! ships ([`NoOpExporter`], [`CompositeExporter`], [`SqliteExporter`]).
//!
//! Grounded on `ro_agent/observability/exporters/{base,sqlite}.py`. The
//! dashboard-facing read queries (`list_sessions`, `get_tool_stats`,
//! `get_cost_summary`) from `observability/storage/sqlite.py` are not
//! reproduced here — the dashboard itself is out of scope (spec.md
//! out-of-scope list) and the `Exporter` contract only needs the write side.

use super::context::{TelemetryContext, ToolExecutionContext, TurnContext};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// Lifecycle sink for session/turn/tool-execution telemetry. Every method
/// is fire-and-forget from the caller's perspective: an exporter failure
/// must never affect agent behavior, so implementations should log and
/// swallow rather than propagate where practical.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn start_session(&self, context: &TelemetryContext);
    async fn end_session(&self, context: &TelemetryContext);
    async fn start_turn(&self, context: &TelemetryContext, turn: &TurnContext);
    async fn end_turn(&self, context: &TelemetryContext, turn: &TurnContext);
    async fn record_model_call(&self, turn: &TurnContext, input_tokens: u64, output_tokens: u64);
    async fn record_tool_execution(&self, execution: &ToolExecutionContext);
    async fn flush(&self);
    async fn close(&self);
}

/// Discards every event. Used when [`super::ObservabilityConfig::enabled`]
/// is false or no tenant is configured.
#[derive(Debug, Default)]
pub struct NoOpExporter;

#[async_trait]
impl Exporter for NoOpExporter {
    async fn start_session(&self, _context: &TelemetryContext) {}
    async fn end_session(&self, _context: &TelemetryContext) {}
    async fn start_turn(&self, _context: &TelemetryContext, _turn: &TurnContext) {}
    async fn end_turn(&self, _context: &TelemetryContext, _turn: &TurnContext) {}
    async fn record_model_call(&self, _turn: &TurnContext, _input_tokens: u64, _output_tokens: u64) {}
    async fn record_tool_execution(&self, _execution: &ToolExecutionContext) {}
    async fn flush(&self) {}
    async fn close(&self) {}
}

/// Fans every event out to a set of child exporters, in order. A child that
/// errors internally must already have handled it (see [`Exporter`]'s
/// contract); this wrapper never short-circuits based on one child's result.
#[derive(Default)]
pub struct CompositeExporter {
    exporters: Vec<Box<dyn Exporter>>,
}

impl CompositeExporter {
    pub fn new(exporters: Vec<Box<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    pub fn push(&mut self, exporter: Box<dyn Exporter>) {
        self.exporters.push(exporter);
    }
}

#[async_trait]
impl Exporter for CompositeExporter {
    async fn start_session(&self, context: &TelemetryContext) {
        for e in &self.exporters {
            e.start_session(context).await;
        }
    }

    async fn end_session(&self, context: &TelemetryContext) {
        for e in &self.exporters {
            e.end_session(context).await;
        }
    }

    async fn start_turn(&self, context: &TelemetryContext, turn: &TurnContext) {
        for e in &self.exporters {
            e.start_turn(context, turn).await;
        }
    }

    async fn end_turn(&self, context: &TelemetryContext, turn: &TurnContext) {
        for e in &self.exporters {
            e.end_turn(context, turn).await;
        }
    }

    async fn record_model_call(&self, turn: &TurnContext, input_tokens: u64, output_tokens: u64) {
        for e in &self.exporters {
            e.record_model_call(turn, input_tokens, output_tokens).await;
        }
    }

    async fn record_tool_execution(&self, execution: &ToolExecutionContext) {
        for e in &self.exporters {
            e.record_tool_execution(execution).await;
        }
    }

    async fn flush(&self) {
        for e in &self.exporters {
            e.flush().await;
        }
    }

    async fn close(&self) {
        for e in &self.exporters {
            e.close().await;
        }
    }
}

/// Persists sessions/turns/tool_executions to a SQLite database. Connection
/// access is serialized by a [`Mutex`] since `rusqlite::Connection` is not
/// `Sync`; writes here are small enough that this is not a bottleneck
/// compared to the network round trips the rest of the agent is doing.
pub struct SqliteExporter {
    conn: Mutex<Connection>,
}

impl SqliteExporter {
    pub fn new(path: impl AsRef<Path>) -> crate::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                agent_id TEXT,
                environment TEXT NOT NULL,
                profile TEXT NOT NULL,
                model TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL,
                total_turns INTEGER NOT NULL DEFAULT 0,
                total_input_tokens INTEGER NOT NULL DEFAULT 0,
                total_output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tool_calls INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS turns (
                turn_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                turn_index INTEGER NOT NULL,
                user_input TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                tool_calls INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id);
            CREATE TABLE IF NOT EXISTS tool_executions (
                execution_id TEXT PRIMARY KEY,
                turn_id TEXT NOT NULL REFERENCES turns(turn_id),
                tool_name TEXT NOT NULL,
                arguments TEXT,
                result TEXT,
                success INTEGER NOT NULL,
                error TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_tool_executions_turn ON tool_executions(turn_id);
            CREATE INDEX IF NOT EXISTS idx_tool_executions_name ON tool_executions(tool_name);
            ",
        )?;
        Ok(())
    }
}

#[async_trait]
impl Exporter for SqliteExporter {
    async fn start_session(&self, context: &TelemetryContext) {
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "INSERT OR REPLACE INTO sessions
             (session_id, team_id, project_id, agent_id, environment, profile, model, started_at, ended_at, status, total_turns, total_input_tokens, total_output_tokens, total_tool_calls)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, 0, 0, 0, 0)",
            rusqlite::params![
                context.session_id,
                context.team_id,
                context.project_id,
                context.agent_id,
                context.environment,
                context.profile,
                context.model,
                context.started_at.to_rfc3339(),
                context.status,
            ],
        );
    }

    async fn end_session(&self, context: &TelemetryContext) {
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "UPDATE sessions SET ended_at = ?1, status = ?2, total_turns = ?3, total_input_tokens = ?4, total_output_tokens = ?5, total_tool_calls = ?6 WHERE session_id = ?7",
            rusqlite::params![
                context.ended_at.map(|t| t.to_rfc3339()),
                context.status,
                context.total_turns,
                context.total_input_tokens,
                context.total_output_tokens,
                context.total_tool_calls,
                context.session_id,
            ],
        );
    }

    async fn start_turn(&self, context: &TelemetryContext, turn: &TurnContext) {
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "INSERT OR REPLACE INTO turns (turn_id, session_id, turn_index, user_input, started_at, ended_at, input_tokens, output_tokens, tool_calls)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, 0, 0)",
            rusqlite::params![turn.turn_id, context.session_id, turn.turn_index as i64, turn.user_input, turn.started_at.to_rfc3339()],
        );
    }

    async fn end_turn(&self, _context: &TelemetryContext, turn: &TurnContext) {
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "UPDATE turns SET ended_at = ?1, input_tokens = ?2, output_tokens = ?3, tool_calls = ?4 WHERE turn_id = ?5",
            rusqlite::params![
                turn.ended_at.map(|t| t.to_rfc3339()),
                turn.input_tokens,
                turn.output_tokens,
                turn.tool_calls,
                turn.turn_id,
            ],
        );
    }

    async fn record_model_call(&self, _turn: &TurnContext, _input_tokens: u64, _output_tokens: u64) {
        // Token deltas are already folded into `end_turn`'s row; a
        // dedicated per-call table has no reader in this build.
    }

    async fn record_tool_execution(&self, execution: &ToolExecutionContext) {
        let conn = self.conn.lock().unwrap();
        let arguments = serde_json::to_string(&execution.arguments).unwrap_or_default();
        let _ = conn.execute(
            "INSERT OR REPLACE INTO tool_executions
             (execution_id, turn_id, tool_name, arguments, result, success, error, started_at, ended_at, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                execution.execution_id,
                execution.turn_id,
                execution.tool_name,
                arguments,
                execution.result,
                execution.success,
                execution.error,
                execution.started_at.to_rfc3339(),
                execution.ended_at.map(|t| t.to_rfc3339()),
                execution.duration_ms,
            ],
        );
    }

    async fn flush(&self) {}

    async fn close(&self) {}
}

/// Builds the exporter configured by `config`: [`NoOpExporter`] when
/// disabled or tenant-less, otherwise the configured backend (`Otlp` falls
/// back to `Sqlite` — no OTLP exporter is implemented in this build).
pub fn create_exporter(config: &super::ObservabilityConfig) -> crate::Result<Box<dyn Exporter>> {
    if !config.enabled || config.tenant.is_none() {
        return Ok(Box::new(NoOpExporter));
    }
    match config.backend.backend_type {
        super::BackendType::Sqlite | super::BackendType::Otlp => {
            Ok(Box::new(SqliteExporter::new(&config.backend.sqlite.path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::TelemetryContext;

    #[tokio::test]
    async fn test_noop_exporter_accepts_everything() {
        let exporter = NoOpExporter;
        let ctx = TelemetryContext::new("t", "p");
        exporter.start_session(&ctx).await;
        exporter.end_session(&ctx).await;
        exporter.flush().await;
    }

    #[tokio::test]
    async fn test_sqlite_exporter_roundtrips_session_and_turn() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SqliteExporter::new(dir.path().join("telemetry.db")).unwrap();
        let mut ctx = TelemetryContext::new("team-1", "proj-1");
        ctx.model = "gpt-5-nano".to_string();
        exporter.start_session(&ctx).await;

        let turn_id = ctx.start_turn();
        let mut turn = TurnContext::new(turn_id, ctx.session_id.clone(), ctx.current_turn_index, "hello");
        exporter.start_turn(&ctx, &turn).await;
        turn.end();
        exporter.end_turn(&ctx, &turn).await;

        ctx.end_session("completed");
        exporter.end_session(&ctx).await;

        let conn = exporter.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions WHERE session_id = ?1", [&ctx.session_id], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let turn_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM turns WHERE session_id = ?1", [&ctx.session_id], |row| row.get(0))
            .unwrap();
        assert_eq!(turn_count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_exporter_records_tool_execution() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SqliteExporter::new(dir.path().join("telemetry.db")).unwrap();
        let ctx = TelemetryContext::new("team-1", "proj-1");
        exporter.start_session(&ctx).await;
        let turn = TurnContext::new("turn-1", ctx.session_id.clone(), 1, "hi");
        exporter.start_turn(&ctx, &turn).await;

        let mut exec = ToolExecutionContext::new("turn-1", "bash", serde_json::json!({"command": "ls"}));
        exec.end(true, None);
        exporter.record_tool_execution(&exec).await;

        let conn = exporter.conn.lock().unwrap();
        let name: String = conn
            .query_row("SELECT tool_name FROM tool_executions WHERE execution_id = ?1", [&exec.execution_id], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "bash");
    }

    #[tokio::test]
    async fn test_create_exporter_falls_back_to_noop_without_tenant() {
        let config = super::super::ObservabilityConfig { tenant: None, ..Default::default() };
        let exporter = create_exporter(&config).unwrap();
        let ctx = TelemetryContext::new("t", "p");
        exporter.start_session(&ctx).await; // does not panic
    }
}

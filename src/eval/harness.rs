//! Drives one or more tasks through an [`crate::agent::Agent`], persisting
//! results incrementally and supporting resume.
//!
//! Grounded on `ro_agent/eval/runner.py::EvalRunner` (per-task loop, turn
//! budget, consecutive-error abort) and `ro_agent/eval/output.py`
//! (`runs.jsonl` append, `get_completed_indices` resume).

use super::evaluator::{compare_hash, compare_results, OsEvalMode, OsEvaluator, QueryKind, ScriptRunner};
use super::sandbox::{DockerSandbox, EvalSandbox, SqliteSandbox};
use super::tools::{ContainerBashHandler, FinishActionHandler, SubmitAnswerHandler};
use super::{EvalConfig, EvalMetrics, TaskResult, TaskStatus};
use crate::agent::{Agent, AgentEvent};
use crate::client::ModelClient;
use crate::session::Session;
use crate::tools::handlers::sqlite::SqliteDialect;
use crate::tools::handlers::database::DatabaseHandler;
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use std::collections::HashSet;
use std::io::{BufRead, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single DBBench-style SQL task.
pub struct DbTask {
    pub index: usize,
    pub prompt: String,
    pub setup_sql: String,
    pub query_kind: QueryKind,
    pub ground_truth: Vec<String>,
    pub answer_md5: Option<String>,
    pub mutated_table: Option<String>,
}

/// A single OS-interaction task.
pub struct OsTask {
    pub index: usize,
    pub prompt: String,
    pub container: String,
    pub eval_mode: OsEvalMode,
}

/// Runs check scripts inside the task's Docker container.
struct ContainerScriptRunner<'a> {
    sandbox: &'a DockerSandbox,
}

#[async_trait::async_trait]
impl ScriptRunner for ContainerScriptRunner<'_> {
    async fn run_script(&self, script: &str, params: &[String]) -> (bool, String) {
        let joined = params.iter().map(|p| shell_quote(p)).collect::<Vec<_>>().join(" ");
        let command = format!("{script} {joined}");
        match self.sandbox.exec(&command).await {
            Ok((code, stdout, _)) => (code == 0, stdout.trim().to_string()),
            Err(_) => (false, String::new()),
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Orchestrates a full eval run: a sequence of tasks against the same
/// model/config, with incremental persistence to `runs.jsonl` under
/// `config.output_dir`.
pub struct EvalHarness {
    config: EvalConfig,
}

impl EvalHarness {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    fn runs_path(&self) -> PathBuf {
        self.config.output_dir.join("runs.jsonl")
    }

    /// Indices already present in `runs.jsonl`, so a resumed run skips
    /// tasks it already has a verdict for.
    pub fn completed_indices(&self) -> Result<HashSet<usize>> {
        let path = self.runs_path();
        if !path.exists() {
            return Ok(HashSet::new());
        }
        let file = std::fs::File::open(&path).map_err(Error::Io)?;
        let mut indices = HashSet::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(Error::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(result) = serde_json::from_str::<TaskResult>(&line) {
                indices.insert(result.index);
            }
        }
        Ok(indices)
    }

    fn append_result(&self, result: &TaskResult) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir).map_err(Error::Io)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(self.runs_path()).map_err(Error::Io)?;
        let line = serde_json::to_string(result).map_err(Error::Json)?;
        writeln!(file, "{line}").map_err(Error::Io)?;
        Ok(())
    }

    /// Rebuilds aggregate metrics from the full `runs.jsonl` file, so a
    /// resumed run's summary reflects every task ever recorded, not just
    /// the ones this process ran.
    pub fn rebuild_metrics(&self) -> Result<EvalMetrics> {
        let path = self.runs_path();
        if !path.exists() {
            return Ok(EvalMetrics::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let results: Vec<TaskResult> =
            contents.lines().filter(|l| !l.trim().is_empty()).filter_map(|l| serde_json::from_str(l).ok()).collect();
        Ok(EvalMetrics::from_results(&results))
    }

    /// Runs every task not already present in `runs.jsonl`, appending each
    /// result as it completes. Aborts the whole run early if
    /// `max_consecutive_errors` task-level errors happen in a row.
    pub async fn run_dbbench(&self, tasks: Vec<DbTask>, system_prompt: &str) -> Result<EvalMetrics> {
        let completed = self.completed_indices()?;
        let mut consecutive_errors = 0u32;

        for task in tasks {
            if completed.contains(&task.index) {
                continue;
            }

            let result = self.run_dbbench_task(&task, system_prompt).await;
            if result.status == TaskStatus::TaskError {
                consecutive_errors += 1;
            } else {
                consecutive_errors = 0;
            }
            self.append_result(&result)?;

            if consecutive_errors >= self.config.max_consecutive_errors {
                break;
            }
        }

        self.rebuild_metrics()
    }

    async fn run_dbbench_task(&self, task: &DbTask, system_prompt: &str) -> TaskResult {
        let started_at = chrono::Utc::now().to_rfc3339();

        let sandbox = match SqliteSandbox::create(&task.setup_sql) {
            Ok(s) => s,
            Err(e) => return self.error_result(task.index, &started_at, e.to_string()),
        };

        let submit_tool = Arc::new(SubmitAnswerHandler::new("commit_final_answer"));
        let mut registry = ToolRegistry::new();
        registry.register(submit_tool.clone());
        if let Some(db_path) = sandbox.db_path() {
            let read_only = task.query_kind == QueryKind::Select;
            registry.register(Arc::new(DatabaseHandler::new(SqliteDialect::new(db_path.to_path_buf()), None, false, read_only)));
        }

        let client = match ModelClient::new(self.config.model.clone(), self.config.base_url.clone(), self.config.api_key.clone(), self.config.service_tier.clone()) {
            Ok(c) => c,
            Err(e) => return self.error_result(task.index, &started_at, e.to_string()),
        };

        let session = Session::new(system_prompt);
        let mut agent = Agent::new(session, registry, client).with_auto_compact(false);

        let mut turns = 0u32;
        let mut status = TaskStatus::TurnLimitReached;
        let mut task_error: Option<String> = None;

        let mut prompt = task.prompt.clone();
        while turns < self.config.max_turns {
            turns += 1;
            let run = tokio::time::timeout(self.config.turn_timeout(), agent.run_turn(&prompt)).await;
            let events = match run {
                Ok(events) => events,
                Err(_) => {
                    status = TaskStatus::TaskError;
                    task_error = Some("turn timed out".to_string());
                    break;
                }
            };

            if let Some(err) = events.iter().find_map(|e| match e {
                AgentEvent::Error { content } => Some(content.clone()),
                _ => None,
            }) {
                status = if err.to_lowercase().contains("context") { TaskStatus::AgentContextLimit } else { TaskStatus::TaskError };
                task_error = Some(err);
                break;
            }

            if submit_tool.is_submitted() {
                status = TaskStatus::Completed;
                break;
            }

            prompt = "Continue working on the task.".to_string();
        }

        let submitted = submit_tool.take_answer();
        let passed = match (&status, &submitted) {
            (TaskStatus::Completed, Some(answer)) => self.grade_dbbench(task, &sandbox, answer),
            _ => false,
        };

        TaskResult {
            index: task.index,
            status,
            turns,
            submitted_answer: submitted,
            passed,
            error: task_error,
            started_at,
            ended_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn grade_dbbench(&self, task: &DbTask, sandbox: &SqliteSandbox, answer: &str) -> bool {
        if let (Some(expected_hash), Some(table)) = (&task.answer_md5, &task.mutated_table) {
            return match sandbox.table_state_hash(table) {
                Ok(actual_hash) => compare_hash(&actual_hash, expected_hash),
                Err(_) => false,
            };
        }
        let submitted: Vec<String> = answer.split(',').map(|s| s.trim().to_string()).collect();
        compare_results(&submitted, &task.ground_truth, task.query_kind)
    }

    /// Runs every OS-interaction task not already present in `runs.jsonl`.
    pub async fn run_os_tasks(&self, tasks: Vec<OsTask>, system_prompt: &str) -> Result<EvalMetrics> {
        let completed = self.completed_indices()?;
        let mut consecutive_errors = 0u32;

        for task in tasks {
            if completed.contains(&task.index) {
                continue;
            }
            let result = self.run_os_task(&task, system_prompt).await;
            if result.status == TaskStatus::TaskError {
                consecutive_errors += 1;
            } else {
                consecutive_errors = 0;
            }
            self.append_result(&result)?;
            if consecutive_errors >= self.config.max_consecutive_errors {
                break;
            }
        }

        self.rebuild_metrics()
    }

    async fn run_os_task(&self, task: &OsTask, system_prompt: &str) -> TaskResult {
        let started_at = chrono::Utc::now().to_rfc3339();
        let sandbox = Arc::new(DockerSandbox::new(task.container.clone()));

        let submit_tool = Arc::new(SubmitAnswerHandler::new("answer_action"));
        let finish_tool = Arc::new(FinishActionHandler::new());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ContainerBashHandler::new(sandbox.clone() as Arc<dyn EvalSandbox>)));
        registry.register(submit_tool.clone());
        registry.register(finish_tool.clone());

        let client = match ModelClient::new(self.config.model.clone(), self.config.base_url.clone(), self.config.api_key.clone(), self.config.service_tier.clone()) {
            Ok(c) => c,
            Err(e) => return self.error_result(task.index, &started_at, e.to_string()),
        };

        let session = Session::new(system_prompt);
        let mut agent = Agent::new(session, registry, client).with_auto_compact(false);

        let mut turns = 0u32;
        let mut status = TaskStatus::TurnLimitReached;
        let mut task_error: Option<String> = None;
        let mut prompt = task.prompt.clone();

        while turns < self.config.max_turns {
            turns += 1;
            let run = tokio::time::timeout(self.config.turn_timeout(), agent.run_turn(&prompt)).await;
            let events = match run {
                Ok(events) => events,
                Err(_) => {
                    status = TaskStatus::TaskError;
                    task_error = Some("turn timed out".to_string());
                    break;
                }
            };

            if let Some(err) = events.iter().find_map(|e| match e {
                AgentEvent::Error { content } => Some(content.clone()),
                _ => None,
            }) {
                status = if err.to_lowercase().contains("context") { TaskStatus::AgentContextLimit } else { TaskStatus::TaskError };
                task_error = Some(err);
                break;
            }

            if submit_tool.is_submitted() || finish_tool.is_finished() {
                status = TaskStatus::Completed;
                break;
            }
            prompt = "Continue working on the task.".to_string();
        }

        let submitted = submit_tool.take_answer();
        let passed = if status == TaskStatus::Completed {
            let runner = ContainerScriptRunner { sandbox: &sandbox };
            let evaluator = OsEvaluator::new(&runner);
            evaluator.evaluate(submitted.as_deref(), &task.eval_mode).await
        } else {
            false
        };

        TaskResult {
            index: task.index,
            status,
            turns,
            submitted_answer: submitted,
            passed,
            error: task_error,
            started_at,
            ended_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn error_result(&self, index: usize, started_at: &str, error: String) -> TaskResult {
        TaskResult {
            index,
            status: TaskStatus::TaskError,
            turns: 0,
            submitted_answer: None,
            passed: false,
            error: Some(error),
            started_at: started_at.to_string(),
            ended_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Writes `overall.json` and `summary.txt` alongside `runs.jsonl`.
    pub fn write_summary(&self, metrics: &EvalMetrics) -> Result<()> {
        std::fs::create_dir_all(&self.config.output_dir).map_err(Error::Io)?;
        let overall_path = self.config.output_dir.join("overall.json");
        let summary_path = self.config.output_dir.join("summary.txt");
        std::fs::write(&overall_path, serde_json::to_string_pretty(metrics).map_err(Error::Json)?).map_err(Error::Io)?;
        std::fs::write(&summary_path, metrics.summary()).map_err(Error::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> EvalConfig {
        EvalConfig {
            model: "m".to_string(),
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: String::new(),
            max_turns: 5,
            max_consecutive_errors: 3,
            service_tier: None,
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_completed_indices_empty_when_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        assert!(harness.completed_indices().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_resume_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        let result = TaskResult {
            index: 3,
            status: TaskStatus::Completed,
            turns: 2,
            submitted_answer: Some("42".to_string()),
            passed: true,
            error: None,
            started_at: "t0".to_string(),
            ended_at: "t1".to_string(),
        };
        harness.append_result(&result).unwrap();
        let indices = harness.completed_indices().unwrap();
        assert!(indices.contains(&3));
    }

    #[test]
    fn test_rebuild_metrics_counts_appended_results() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        for i in 0..3 {
            harness
                .append_result(&TaskResult {
                    index: i,
                    status: TaskStatus::Completed,
                    turns: 1,
                    submitted_answer: Some("x".to_string()),
                    passed: i != 1,
                    error: None,
                    started_at: "t0".to_string(),
                    ended_at: "t1".to_string(),
                })
                .unwrap();
        }
        let metrics = harness.rebuild_metrics().unwrap();
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.passed, 2);
    }

    #[test]
    fn test_write_summary_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        harness.write_summary(&EvalMetrics::default()).unwrap();
        assert!(dir.path().join("overall.json").exists());
        assert!(dir.path().join("summary.txt").exists());
    }

    #[test]
    fn test_grade_dbbench_uses_hash_comparison_for_mutation_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        let sandbox = SqliteSandbox::create("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);").unwrap();
        let expected = sandbox.table_state_hash("t").unwrap();
        let task = DbTask {
            index: 0,
            prompt: String::new(),
            setup_sql: String::new(),
            query_kind: QueryKind::Update,
            ground_truth: vec![],
            answer_md5: Some(expected),
            mutated_table: Some("t".to_string()),
        };
        assert!(harness.grade_dbbench(&task, &sandbox, "anything"));
    }

    #[test]
    fn test_grade_dbbench_falls_back_to_set_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let harness = EvalHarness::new(config(dir.path()));
        let sandbox = SqliteSandbox::create("CREATE TABLE t (id INTEGER);").unwrap();
        let task = DbTask {
            index: 0,
            prompt: String::new(),
            setup_sql: String::new(),
            query_kind: QueryKind::Select,
            ground_truth: vec!["1".to_string(), "2".to_string()],
            answer_md5: None,
            mutated_table: None,
        };
        assert!(harness.grade_dbbench(&task, &sandbox, "2, 1"));
    }
}

//! Evaluation harness: drives the same [`crate::agent::Agent`] against
//! benchmark tasks with per-task sandboxes, incremental JSONL persistence,
//! and resume support.
//!
//! Grounded on `ro_agent/eval/runner.py` (the AgentBench-style DBBench/OS
//! runner) and `ro_agent/eval/output.py` (run-directory layout, resume).
//! The original ships three overlapping CLIs (AgentBench, BIRD-Bench,
//! Harbor) with near-duplicate runners; this module collapses them to the
//! one task/sandbox/evaluator shape spec.md §4.11 describes.

pub mod evaluator;
pub mod harness;
pub mod sandbox;
pub mod tools;

use serde::{Deserialize, Serialize};

/// Outcome classification for a single task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Completed,
    AgentContextLimit,
    TurnLimitReached,
    TaskError,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::AgentContextLimit => "agent context limit",
            TaskStatus::TurnLimitReached => "task limit reached",
            TaskStatus::TaskError => "task error",
        }
    }
}

/// Configuration shared by every run of the harness.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub max_turns: u32,
    pub max_consecutive_errors: u32,
    pub service_tier: Option<String>,
    pub output_dir: std::path::PathBuf,
}

impl EvalConfig {
    /// Per-turn timeout: 120s normally, 600s under the "flex" service tier
    /// (spec §4.11 item 3 / §5).
    pub fn turn_timeout(&self) -> std::time::Duration {
        let secs = if self.service_tier.as_deref() == Some("flex") { 600 } else { 120 };
        std::time::Duration::from_secs(secs)
    }
}

/// Result of a single task execution, persisted as one JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub index: usize,
    pub status: TaskStatus,
    pub turns: u32,
    pub submitted_answer: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
    pub started_at: String,
    pub ended_at: String,
}

/// Aggregate metrics over a run, rebuildable from `runs.jsonl` alone so a
/// `--resume` run doesn't need the in-memory state of the process that
/// wrote the partial file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub completed: usize,
    pub context_limit: usize,
    pub turn_limit_reached: usize,
    pub task_error: usize,
}

impl EvalMetrics {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }

    pub fn record(&mut self, result: &TaskResult) {
        self.total += 1;
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        match result.status {
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::AgentContextLimit => self.context_limit += 1,
            TaskStatus::TurnLimitReached => self.turn_limit_reached += 1,
            TaskStatus::TaskError => self.task_error += 1,
        }
    }

    /// Rebuilds metrics from scratch over every result (used on resume, so
    /// aggregate totals reflect the whole file, not just this process's
    /// newly-run tasks).
    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut metrics = Self::default();
        for r in results {
            metrics.record(r);
        }
        metrics
    }

    pub fn summary(&self) -> String {
        format!(
            "{sep}\nEvaluation Results\n{sep}\nTotal tasks:     {total}\nPassed:          {passed}\nFailed:          {failed}\nAccuracy:        {acc:.2}%\n\nStatus Breakdown:\n  Completed:           {completed}\n  Context limit:       {context_limit}\n  Turn limit reached:  {turn_limit}\n  Task error:          {task_error}\n{sep}",
            sep = "=".repeat(50),
            total = self.total,
            passed = self.passed,
            failed = self.failed,
            acc = self.accuracy() * 100.0,
            completed = self.completed,
            context_limit = self.context_limit,
            turn_limit = self.turn_limit_reached,
            task_error = self.task_error,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize, passed: bool, status: TaskStatus) -> TaskResult {
        TaskResult {
            index,
            status,
            turns: 3,
            submitted_answer: Some("42".to_string()),
            passed,
            error: None,
            started_at: "t0".to_string(),
            ended_at: "t1".to_string(),
        }
    }

    #[test]
    fn test_metrics_record_accumulates() {
        let mut metrics = EvalMetrics::default();
        metrics.record(&sample(0, true, TaskStatus::Completed));
        metrics.record(&sample(1, false, TaskStatus::TurnLimitReached));
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.passed, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.turn_limit_reached, 1);
    }

    #[test]
    fn test_metrics_from_results_matches_incremental_record() {
        let results = vec![
            sample(0, true, TaskStatus::Completed),
            sample(1, true, TaskStatus::Completed),
            sample(2, false, TaskStatus::TaskError),
        ];
        let rebuilt = EvalMetrics::from_results(&results);
        assert_eq!(rebuilt.total, 3);
        assert_eq!(rebuilt.passed, 2);
        assert_eq!(rebuilt.task_error, 1);
        assert!((rebuilt.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_turn_timeout_respects_flex_tier() {
        let mut config = EvalConfig {
            model: "m".to_string(),
            base_url: "http://localhost".to_string(),
            api_key: String::new(),
            max_turns: 10,
            max_consecutive_errors: 5,
            service_tier: None,
            output_dir: std::path::PathBuf::from("/tmp"),
        };
        assert_eq!(config.turn_timeout().as_secs(), 120);
        config.service_tier = Some("flex".to_string());
        assert_eq!(config.turn_timeout().as_secs(), 600);
    }
}

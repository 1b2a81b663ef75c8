//! Answer comparison logic for DBBench-style SQL tasks and OS-interaction
//! tasks.
//!
//! Grounded on `ro_agent/eval/agentbench/evaluators/db_evaluator.py`
//! (`DBBenchEvaluator`) and `.../os_evaluator.py` (`OSEvaluator`).

use std::collections::HashSet;

/// What kind of query a DBBench task is. Mutation queries compare exactly
/// (e.g. a table-state hash); `Select` gets the flexible comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Normalizes a raw answer value: strips a trailing `%`, removes thousands
/// separators, and maps `none`/`null`/`nan`/`inf`-like tokens to `"0"`.
fn normalize_value(raw: &str) -> String {
    let mut value = raw.trim().to_string();
    if let Some(stripped) = value.strip_suffix('%') {
        value = stripped.trim().to_string();
    }
    if value.contains(',') && !value.starts_with('[') && !value.ends_with(']') {
        value = value.replace(',', "");
    }
    match value.to_lowercase().as_str() {
        "none" | "null" | "undefined" | "nan" | "inf" | "infinity" | "-inf" | "-infinity" | "" => "0".to_string(),
        _ => value,
    }
}

fn is_float(value: &str) -> bool {
    value.parse::<f64>().is_ok()
}

fn float_equal(a: &str, b: &str, tolerance: f64) -> bool {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => (x - y).abs() <= tolerance,
        _ => false,
    }
}

/// Splits a raw answer into normalized parts. The source data arrives as a
/// single string (sometimes comma-joined, sometimes a single scalar); this
/// keeps it simple by treating one comma-separated line as the row list,
/// rather than reproducing the Python literal-parsing of `[('x',)]`
/// MySQL-repr strings that has no equivalent when the driver already hands
/// back owned Rust values.
fn clean_answer(values: &[String]) -> Vec<String> {
    if values.is_empty() {
        return vec!["0".to_string()];
    }
    values.iter().map(|v| normalize_value(v)).collect()
}

/// Compares an agent's submitted answer to the ground truth for a DBBench
/// task, handling float tolerance, percentage/thousands normalization, and
/// order-insensitive multi-value comparison (spec §4.11 item 4 / §8).
pub fn compare_results(answer: &[String], ground_truth: &[String], kind: QueryKind) -> bool {
    let answer = clean_answer(answer);
    let ground_truth = clean_answer(ground_truth);

    if matches!(kind, QueryKind::Insert | QueryKind::Update | QueryKind::Delete) {
        return answer == ground_truth;
    }

    if answer.len() == 1 && ground_truth.len() == 1 {
        let (a, g) = (&answer[0], &ground_truth[0]);
        if a == "0" && g == "0" {
            return true;
        }
        if is_float(a) && is_float(g) {
            return float_equal(a, g, 0.01);
        }
        return a == g;
    }

    if answer.iter().all(|v| is_float(v)) && ground_truth.iter().all(|v| is_float(v)) {
        if answer.len() != ground_truth.len() {
            return false;
        }
        let mut matched = vec![false; ground_truth.len()];
        for a in &answer {
            let Some(slot) = matched.iter().position(|m| !m).filter(|&i| float_equal(a, &ground_truth[i], 0.01)) else {
                // Search for any unmatched slot that's within tolerance.
                let found = ground_truth.iter().enumerate().find(|(i, g)| !matched[*i] && float_equal(a, g, 0.01));
                match found {
                    Some((i, _)) => {
                        matched[i] = true;
                        continue;
                    }
                    None => return false,
                }
            };
            matched[slot] = true;
        }
        return matched.iter().all(|&m| m);
    }

    let answer_set: HashSet<&String> = answer.iter().collect();
    let ground_truth_set: HashSet<&String> = ground_truth.iter().collect();
    answer_set == ground_truth_set
}

/// Compares a table-state hash computed after a mutation query to the
/// dataset's precomputed `answer_md5` (spec §4.11 item 4).
pub fn compare_hash(calculated: &str, expected: &str) -> bool {
    calculated.trim().eq_ignore_ascii_case(expected.trim())
}

/// How an OS-interaction task's answer is checked.
#[derive(Debug, Clone)]
pub enum OsEvalMode {
    /// Direct (optionally regex, optionally stripped) comparison.
    Match { expected: Option<String>, regex: Option<String>, strip: bool },
    /// A chain of scripts; each receives the accumulated params as
    /// arguments and its stdout is appended for the next script. All must
    /// exit 0.
    Check { scripts: Vec<String> },
}

/// Runs one check script, given the accumulated chain params, returning
/// `(success, stdout)`. Abstracted behind a trait so the harness can run
/// scripts inside a container sandbox or, for builtin script names, without
/// one at all.
#[async_trait::async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run_script(&self, script: &str, params: &[String]) -> (bool, String);
}

/// Evaluates an OS-interaction task's submitted answer.
pub struct OsEvaluator<'a> {
    runner: &'a dyn ScriptRunner,
}

impl<'a> OsEvaluator<'a> {
    pub fn new(runner: &'a dyn ScriptRunner) -> Self {
        Self { runner }
    }

    pub async fn evaluate(&self, answer: Option<&str>, mode: &OsEvalMode) -> bool {
        let Some(answer) = answer else {
            return false;
        };
        match mode {
            OsEvalMode::Match { expected, regex, strip } => {
                let candidate = if *strip { answer.trim() } else { answer };
                if let Some(pattern) = regex {
                    return regex::Regex::new(pattern).map(|re| re.is_match(candidate)).unwrap_or(false);
                }
                if let Some(expected) = expected {
                    let expected = if *strip { expected.trim() } else { expected.as_str() };
                    return candidate == expected;
                }
                false
            }
            OsEvalMode::Check { scripts } => {
                if scripts.is_empty() {
                    return false;
                }
                let mut params = vec![answer.to_string()];
                for script in scripts {
                    let (success, stdout) = self.runner.run_script(script, &params).await;
                    if !success {
                        return false;
                    }
                    params.push(stdout);
                }
                true
            }
        }
    }
}

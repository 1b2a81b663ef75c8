//! Approval policy for tool execution: decides when a tool invocation needs
//! sign-off before it runs, including pattern-based detection of dangerous
//! commands embedded in arguments.

use super::{ApprovalMode, CapabilityProfile};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Determines when tool execution requires user approval.
///
/// Dangerous-pattern matching supports both literal (case-insensitive
/// substring) and `regex:`-prefixed patterns; a pattern cache avoids
/// recompiling the same regex on every call. An invalid regex falls back to
/// literal matching on the pattern text with the `regex:` prefix stripped.
pub struct ApprovalPolicy {
    profile: CapabilityProfile,
    pattern_cache: Mutex<HashMap<String, Option<Regex>>>,
}

impl ApprovalPolicy {
    pub fn new(profile: CapabilityProfile) -> Self {
        Self {
            profile,
            pattern_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    /// Checks if a tool invocation requires approval. Returns `(true, Some(reason))`
    /// if approval is needed, `(false, None)` otherwise.
    pub fn requires_approval(&self, tool_name: &str, arguments: Option<&Value>) -> (bool, Option<String>) {
        if self.profile.requires_tool_approval(tool_name) {
            return (true, Some(format!("Tool '{tool_name}' requires approval")));
        }

        if let Some(args) = arguments {
            if let Some(pattern) = self.check_dangerous_patterns(args) {
                return (
                    true,
                    Some(format!("Command contains dangerous pattern: {pattern}")),
                );
            }
        }

        (false, None)
    }

    fn check_dangerous_patterns(&self, arguments: &Value) -> Option<String> {
        let Some(obj) = arguments.as_object() else {
            return None;
        };
        let text_to_check = obj
            .values()
            .filter(|v| !v.is_null())
            .map(value_to_plain_string)
            .collect::<Vec<_>>()
            .join(" ");

        for pattern in &self.profile.dangerous_patterns {
            if self.matches_pattern(pattern, &text_to_check) {
                return Some(pattern.clone());
            }
        }
        None
    }

    fn matches_pattern(&self, pattern: &str, text: &str) -> bool {
        if let Some(regex_src) = pattern.strip_prefix("regex:") {
            let mut cache = self.pattern_cache.lock().unwrap();
            let compiled = cache.entry(regex_src.to_string()).or_insert_with(|| {
                regex::RegexBuilder::new(regex_src)
                    .case_insensitive(true)
                    .build()
                    .ok()
            });
            match compiled {
                Some(re) => re.is_match(text),
                None => text.to_lowercase().contains(&regex_src.to_lowercase()),
            }
        } else {
            text.to_lowercase().contains(&pattern.to_lowercase())
        }
    }
}

fn value_to_plain_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Creates an approval policy from a capability profile.
pub fn create_approval_policy(profile: CapabilityProfile) -> ApprovalPolicy {
    ApprovalPolicy::new(profile)
}

/// Factory for common approval policy configurations.
pub struct ApprovalPolicies;

impl ApprovalPolicies {
    /// No approval required (sandboxed containers).
    pub fn none() -> ApprovalPolicy {
        ApprovalPolicy::new(CapabilityProfile::eval("/app"))
    }

    /// Approve only the default dangerous tools.
    pub fn dangerous_only() -> ApprovalPolicy {
        ApprovalPolicy::new(CapabilityProfile::readonly())
    }

    /// Approve every tool invocation.
    pub fn all_tools() -> ApprovalPolicy {
        let base = CapabilityProfile::readonly();
        let profile = CapabilityProfile {
            name: "strict".to_string(),
            approval: ApprovalMode::All,
            ..base
        };
        ApprovalPolicy::new(profile)
    }

    /// Custom policy with a specific required-tool set and dangerous patterns.
    pub fn custom(required_tools: Vec<String>, dangerous_patterns: Option<Vec<String>>) -> ApprovalPolicy {
        let profile = CapabilityProfile {
            name: "custom".to_string(),
            description: String::new(),
            shell: super::ShellMode::Restricted,
            file_write: super::FileWriteMode::Off,
            database: super::DatabaseMode::Readonly,
            approval: ApprovalMode::Granular,
            approval_required_tools: required_tools.into_iter().collect(),
            dangerous_patterns: dangerous_patterns.unwrap_or_else(super::default_dangerous_patterns),
            shell_timeout: 120,
            shell_working_dir: None,
        };
        ApprovalPolicy::new(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dangerous_tool_requires_approval() {
        let policy = ApprovalPolicies::dangerous_only();
        let (needs, reason) = policy.requires_approval("bash", None);
        assert!(needs);
        assert!(reason.unwrap().contains("bash"));
    }

    #[test]
    fn test_safe_tool_no_approval() {
        let policy = ApprovalPolicies::dangerous_only();
        let (needs, _) = policy.requires_approval("read", None);
        assert!(!needs);
    }

    #[test]
    fn test_dangerous_pattern_in_arguments() {
        let policy = ApprovalPolicies::none();
        let args = json!({"command": "rm -rf /tmp/build"});
        let (needs, reason) = policy.requires_approval("bash", Some(&args));
        assert!(needs);
        assert!(reason.unwrap().contains("rm -rf"));
    }

    #[test]
    fn test_regex_pattern_matching() {
        let policy = ApprovalPolicies::custom(vec![], Some(vec!["regex:DROP\\s+TABLE".to_string()]));
        let args = json!({"query": "drop   table users"});
        // Single-space regex won't match multi-space unless using \s+, which it does.
        let (needs, _) = policy.requires_approval("sqlite", Some(&args));
        assert!(needs);
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let policy = ApprovalPolicies::custom(vec![], Some(vec!["regex:(unterminated".to_string()]));
        let args = json!({"command": "run (unterminated now"});
        let (needs, _) = policy.requires_approval("bash", Some(&args));
        assert!(needs);
    }

    #[test]
    fn test_none_mode_never_requires_approval() {
        let policy = ApprovalPolicies::none();
        let args = json!({"command": "rm -rf /"});
        let (needs, _) = policy.requires_approval("bash", Some(&args));
        // eval() profile uses ApprovalMode::None, but dangerous patterns
        // are still checked independently of tool-level approval.
        assert!(needs);
    }

    #[test]
    fn test_all_tools_mode_requires_everything() {
        let policy = ApprovalPolicies::all_tools();
        let (needs, _) = policy.requires_approval("read", None);
        assert!(needs);
    }
}

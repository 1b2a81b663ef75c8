//! Capability profiles: configurable tool-access presets.
//!
//! A [`CapabilityProfile`] bundles shell/file-write/database modes with an
//! approval policy into one object that can be loaded from YAML or
//! constructed via the `readonly()`/`developer()`/`eval()` presets. Built by
//! [`crate::capability::factory::ToolFactory`] into a
//! [`crate::tools::registry::ToolRegistry`].

pub mod approval;
pub mod factory;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Shell execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShellMode {
    /// Only allowlisted commands; dangerous patterns blocked.
    Restricted,
    /// Any command allowed (relies on container/sandbox for security).
    Unrestricted,
}

/// File-writing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileWriteMode {
    /// No file-writing capability.
    Off,
    /// Can create new files, cannot overwrite existing ones.
    CreateOnly,
    /// Full write/edit capability (create, overwrite, edit).
    Full,
}

/// Database access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseMode {
    /// SELECT-only; mutations blocked.
    Readonly,
    /// Full access including INSERT/UPDATE/DELETE.
    Mutations,
}

/// Tool approval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    /// All tools require approval.
    All,
    /// Only the default dangerous tools require approval.
    Dangerous,
    /// Per-tool approval configuration (`approval_required_tools`).
    Granular,
    /// No approval required (sandboxed environments).
    None,
}

/// Default tools that require approval under [`ApprovalMode::Dangerous`].
pub fn default_dangerous_tools() -> HashSet<String> {
    [
        "bash", "write", "edit", "oracle", "mysql", "sqlite", "vertica", "postgres",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Patterns that always trigger approval regardless of mode, unless
/// overridden by a custom profile.
pub fn default_dangerous_patterns() -> Vec<String> {
    [
        "rm -rf",
        "rm -r",
        "DROP TABLE",
        "DROP DATABASE",
        "TRUNCATE",
        "DELETE FROM",
        "> /dev/",
        ":(){ :|:& };:",
        "mkfs",
        "dd if=",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Configuration profile bundling shell/file-write/database modes and the
/// approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub shell: ShellMode,
    pub file_write: FileWriteMode,
    pub database: DatabaseMode,
    pub approval: ApprovalMode,
    #[serde(default = "default_dangerous_tools")]
    pub approval_required_tools: HashSet<String>,
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout: u64,
    #[serde(default)]
    pub shell_working_dir: Option<String>,
}

fn default_shell_timeout() -> u64 {
    120
}

impl CapabilityProfile {
    /// Read-only research profile with a restricted shell.
    pub fn readonly() -> Self {
        Self {
            name: "readonly".to_string(),
            description: "Read-only research profile with restricted shell".to_string(),
            shell: ShellMode::Restricted,
            file_write: FileWriteMode::Off,
            database: DatabaseMode::Readonly,
            approval: ApprovalMode::Dangerous,
            approval_required_tools: default_dangerous_tools(),
            dangerous_patterns: default_dangerous_patterns(),
            shell_timeout: 120,
            shell_working_dir: None,
        }
    }

    /// Development profile: unrestricted shell, full file editing, granular
    /// approval (database tools still gated).
    pub fn developer() -> Self {
        Self {
            name: "developer".to_string(),
            description: "Development profile with file editing".to_string(),
            shell: ShellMode::Unrestricted,
            file_write: FileWriteMode::Full,
            database: DatabaseMode::Readonly,
            approval: ApprovalMode::Granular,
            approval_required_tools: ["oracle", "mysql"].into_iter().map(String::from).collect(),
            dangerous_patterns: default_dangerous_patterns(),
            shell_timeout: 300,
            shell_working_dir: None,
        }
    }

    /// Evaluation profile for sandboxed containers: no restrictions.
    pub fn eval(working_dir: impl Into<String>) -> Self {
        Self {
            name: "eval".to_string(),
            description: "Evaluation profile for sandboxed environments".to_string(),
            shell: ShellMode::Unrestricted,
            file_write: FileWriteMode::Full,
            database: DatabaseMode::Mutations,
            approval: ApprovalMode::None,
            approval_required_tools: HashSet::new(),
            dangerous_patterns: default_dangerous_patterns(),
            shell_timeout: 300,
            shell_working_dir: Some(working_dir.into()),
        }
    }

    /// Loads a profile from a YAML file.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!(
                "Profile file not found: {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let profile: CapabilityProfile = serde_yaml::from_str(&data)?;
        Ok(profile)
    }

    /// Checks whether a tool requires approval under this profile.
    pub fn requires_tool_approval(&self, tool_name: &str) -> bool {
        match self.approval {
            ApprovalMode::None => false,
            ApprovalMode::All => true,
            ApprovalMode::Dangerous => default_dangerous_tools().contains(tool_name),
            ApprovalMode::Granular => self.approval_required_tools.contains(tool_name),
        }
    }

    /// Checks whether `text` contains any configured dangerous pattern
    /// (case-insensitive literal substring match).
    pub fn is_pattern_dangerous(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.dangerous_patterns
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
    }
}

//! File-based signal protocol for coordinating with running agent processes.
//!
//! Signal directory: `~/.config/ro-agent/signals/` (override via
//! `RO_AGENT_SIGNAL_DIR`, see [`crate::config::get_signal_dir`]).
//!
//! Protocol:
//! - Agent starts -> writes `<session_id>.running` (JSON: pid, model,
//!   instruction preview, started_at).
//! - Agent ends -> deletes `.running` and `.cancel`.
//! - A kill command writes `<session_id>.cancel`.
//! - The agent polls [`SignalManager::is_cancelled`] (a single `stat()`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Snapshot of a running agent, written to its `.running` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub session_id: String,
    pub pid: u32,
    pub model: String,
    pub instruction_preview: String,
    /// ISO-8601 / RFC 3339 timestamp.
    pub started_at: String,
}

impl AgentInfo {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Manages file-based signals for agent lifecycle coordination.
pub struct SignalManager {
    dir: PathBuf,
}

impl SignalManager {
    /// Opens the signal manager rooted at `dir`, creating it if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Opens the signal manager rooted at [`crate::config::get_signal_dir`].
    pub fn from_env() -> Result<Self> {
        Self::new(crate::config::get_signal_dir())
    }

    fn running_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.running"))
    }

    fn cancel_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.cancel"))
    }

    /// Writes a `.running` file for this agent session.
    pub fn register(&self, info: &AgentInfo) -> Result<()> {
        fs::write(self.running_path(&info.session_id), info.to_json()?)?;
        Ok(())
    }

    /// Removes `.running` and `.cancel` files for this session.
    pub fn deregister(&self, session_id: &str) {
        for path in [self.running_path(session_id), self.cancel_path(session_id)] {
            let _ = fs::remove_file(path);
        }
    }

    /// Checks if a `.cancel` file exists (a single `exists()` call).
    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.cancel_path(session_id).exists()
    }

    /// Writes a `.cancel` file for a specific session. Returns `true` if the
    /// session was found (has a `.running` file) and the signal was written.
    pub fn cancel(&self, session_id: &str) -> Result<bool> {
        if !self.running_path(session_id).exists() {
            return Ok(false);
        }
        fs::write(self.cancel_path(session_id), "")?;
        Ok(true)
    }

    /// Cancels all sessions whose ID starts with `prefix`. Returns the
    /// cancelled session IDs.
    pub fn cancel_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut cancelled = Vec::new();
        for info in self.list_running()? {
            if info.session_id.starts_with(prefix) {
                fs::write(self.cancel_path(&info.session_id), "")?;
                cancelled.push(info.session_id);
            }
        }
        Ok(cancelled)
    }

    /// Cancels every running session. Returns the cancelled session IDs.
    pub fn cancel_all(&self) -> Result<Vec<String>> {
        let mut cancelled = Vec::new();
        for info in self.list_running()? {
            fs::write(self.cancel_path(&info.session_id), "")?;
            cancelled.push(info.session_id);
        }
        Ok(cancelled)
    }

    /// Lists all agents with a `.running` file, most recently started first.
    /// Corrupt files are skipped rather than failing the whole listing.
    pub fn list_running(&self) -> Result<Vec<AgentInfo>> {
        let mut agents = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(agents),
            Err(e) => return Err(Error::from(e)),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("running") {
                continue;
            }
            if let Ok(data) = fs::read_to_string(&path) {
                if let Ok(info) = AgentInfo::from_json(&data) {
                    agents.push(info);
                }
            }
        }
        agents.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(agents)
    }

    /// Removes `.running` files whose PID is no longer alive. Returns the
    /// cleaned-up session IDs.
    pub fn cleanup_stale(&self) -> Result<Vec<String>> {
        let mut cleaned = Vec::new();
        for info in self.list_running()? {
            if !pid_alive(info.pid) {
                self.deregister(&info.session_id);
                cleaned.push(info.session_id);
            }
        }
        Ok(cleaned)
    }

    /// The directory this manager is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Checks whether a process with the given PID is alive.
///
/// On Unix, this inspects `/proc/<pid>` rather than sending a real signal
/// (`kill(pid, 0)`), avoiding a dependency on a libc binding for a single
/// liveness check. On non-Unix targets this conservatively reports the
/// process as alive, matching the original protocol's PermissionError
/// fallback (prefer a stale-looking entry over deregistering a live agent).
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

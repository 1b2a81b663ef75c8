//! Environment-variable resolution for model endpoint and runtime settings.
//!
//! Mirrors the precedence rules a local-server SDK would use for provider
//! defaults, but the variable names and defaults here are this runtime's own:
//! an OpenAI-compatible endpoint plus the `RO_AGENT_*` family that configures
//! profiles, telemetry, and signal directories (spec §6).

use std::env;
use std::path::PathBuf;

/// Default OpenAI-compatible base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Resolves the API base URL: `OPENAI_BASE_URL` env var, then `fallback`,
/// then [`DEFAULT_BASE_URL`].
pub fn get_base_url(fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("OPENAI_BASE_URL") {
        return url;
    }
    fallback.unwrap_or(DEFAULT_BASE_URL).to_string()
}

/// Resolves the model identifier: `OPENAI_MODEL` env var, then `fallback`,
/// then [`DEFAULT_MODEL`].
pub fn get_model(fallback: Option<&str>) -> String {
    if let Ok(model) = env::var("OPENAI_MODEL") {
        return model;
    }
    fallback.unwrap_or(DEFAULT_MODEL).to_string()
}

/// Resolves the API key from `OPENAI_API_KEY`. Empty string (not an error)
/// when unset — some local servers accept requests without one.
pub fn get_api_key() -> String {
    env::var("OPENAI_API_KEY").unwrap_or_default()
}

/// Resolves the capability profile name from `RO_AGENT_PROFILE`, defaulting
/// to `"readonly"` (the safest preset).
pub fn get_profile_name(fallback: Option<&str>) -> String {
    if let Ok(name) = env::var("RO_AGENT_PROFILE") {
        return name;
    }
    fallback.unwrap_or("readonly").to_string()
}

/// Number of lines a directory/file preview tool truncates to, from
/// `RO_AGENT_PREVIEW_LINES` (default 200).
pub fn get_preview_lines() -> usize {
    env::var("RO_AGENT_PREVIEW_LINES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(200)
}

/// Default directory used for config/state files rooted at the user's home.
fn config_dir() -> PathBuf {
    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("ro-agent")
}

/// Resolves the telemetry SQLite database path from `RO_AGENT_TELEMETRY_DB`,
/// defaulting to `~/.config/ro-agent/telemetry.db`.
pub fn get_telemetry_db_path() -> PathBuf {
    env::var("RO_AGENT_TELEMETRY_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("telemetry.db"))
}

/// Resolves the signal directory from `RO_AGENT_SIGNAL_DIR`, defaulting to
/// `~/.config/ro-agent/signals`.
pub fn get_signal_dir() -> PathBuf {
    env::var("RO_AGENT_SIGNAL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("signals"))
}

/// Resolves the conversation store directory, defaulting to
/// `~/.config/ro-agent/conversations`.
pub fn get_conversations_dir() -> PathBuf {
    config_dir().join("conversations")
}

/// Tenant identification read from `RO_AGENT_TEAM_ID`/`RO_AGENT_PROJECT_ID`.
/// Both must be present or observability stays disabled (matches
/// `ObservabilityConfig::from_env` precedent: no tenant, no telemetry).
pub fn get_tenant() -> Option<(String, String)> {
    let team = env::var("RO_AGENT_TEAM_ID").ok()?;
    let project = env::var("RO_AGENT_PROJECT_ID").ok()?;
    Some((team, project))
}

/// Deployment environment label from `RO_AGENT_ENVIRONMENT` (e.g. "prod",
/// "staging"), defaulting to `"development"`.
pub fn get_environment() -> String {
    env::var("RO_AGENT_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_get_base_url_fallback() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("OPENAI_BASE_URL");
        }
        assert_eq!(
            get_base_url(Some("http://localhost:1234/v1")),
            "http://localhost:1234/v1"
        );
    }

    #[test]
    fn test_get_base_url_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("OPENAI_BASE_URL");
        }
        assert_eq!(get_base_url(None), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_get_model_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("OPENAI_MODEL");
        }
        assert_eq!(get_model(None), DEFAULT_MODEL);
    }

    #[test]
    fn test_get_profile_name_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("RO_AGENT_PROFILE");
        }
        assert_eq!(get_profile_name(None), "readonly");
    }

    #[test]
    fn test_get_tenant_requires_both() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("RO_AGENT_TEAM_ID");
            env::remove_var("RO_AGENT_PROJECT_ID");
        }
        assert_eq!(get_tenant(), None);
    }
}

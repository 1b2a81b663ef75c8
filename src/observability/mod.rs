//! Telemetry: per-session/turn/tool-execution tracking, exported to a
//! pluggable backend.
//!
//! [`ObservabilityConfig`] decides whether telemetry runs at all — no
//! tenant, no telemetry, matching the upstream "multi-tenancy is mandatory
//! or telemetry stays off" rule. [`context`] holds the hierarchical
//! session/turn/tool-execution state, [`processor`] wraps an
//! [`crate::agent::Agent`] turn's events to populate that state without
//! touching the events themselves, and [`exporter`] persists it.

pub mod context;
pub mod exporter;
pub mod processor;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tenant identification, required before telemetry is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub team_id: String,
    pub project_id: String,
}

/// SQLite backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    pub path: PathBuf,
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self { path: crate::config::get_telemetry_db_path() }
    }
}

/// Which backend an [`exporter::Exporter`] should be built for. `Otlp` is
/// accepted in config for forward-compatibility but has no implementation
/// in this build, so [`exporter::create_exporter`] falls back to SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Sqlite,
    Otlp,
}

impl Default for BackendType {
    fn default() -> Self {
        Self::Sqlite
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type", default)]
    pub backend_type: BackendType,
    #[serde(default)]
    pub sqlite: SqliteBackendConfig,
}

/// Which pieces of a turn get captured. `tool_results` defaults to `false`
/// since tool output can be large and often contains data the operator may
/// not want duplicated into telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_true")]
    pub traces: bool,
    #[serde(default = "default_true")]
    pub metrics: bool,
    #[serde(default = "default_true")]
    pub tool_arguments: bool,
    #[serde(default)]
    pub tool_results: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { traces: true, metrics: true, tool_arguments: true, tool_results: false }
    }
}

/// Root observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub tenant: Option<TenantConfig>,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { enabled: true, tenant: None, backend: BackendConfig::default(), capture: CaptureConfig::default() }
    }
}

impl ObservabilityConfig {
    /// Parses a YAML document, tolerating either a top-level
    /// `observability:` key or the fields at the document root.
    pub fn from_yaml_str(raw: &str) -> crate::Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(raw)?;
        let value = value.get("observability").cloned().unwrap_or(value);
        Ok(serde_yaml::from_value(value)?)
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(crate::Error::config(format!("Config file not found: {}", path.display())));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Resolves tenant info from `RO_AGENT_TEAM_ID`/`RO_AGENT_PROJECT_ID`
    /// (via [`crate::config::get_tenant`]), then checks
    /// `RO_AGENT_OBSERVABILITY_CONFIG` and the default config path for the
    /// rest of the settings. No tenant means telemetry stays disabled.
    pub fn from_env() -> Self {
        let Some((team_id, project_id)) = crate::config::get_tenant() else {
            return Self { enabled: false, ..Self::default() };
        };
        let tenant = TenantConfig { team_id, project_id };

        if let Ok(path) = std::env::var("RO_AGENT_OBSERVABILITY_CONFIG") {
            if let Ok(mut config) = Self::from_yaml(&path) {
                config.tenant = Some(tenant);
                return config;
            }
        }

        let default_path = default_config_path();
        if default_path.exists() {
            if let Ok(mut config) = Self::from_yaml(&default_path) {
                config.tenant = Some(tenant);
                return config;
            }
        }

        Self { enabled: true, tenant: Some(tenant), ..Self::default() }
    }
}

fn default_config_path() -> PathBuf {
    crate::config::get_telemetry_db_path()
        .parent()
        .map(|p| p.join("observability.yaml"))
        .unwrap_or_else(|| PathBuf::from("observability.yaml"))
}

/// Free-form key/value metadata attached to a session.
pub type Metadata = HashMap<String, serde_json::Value>;

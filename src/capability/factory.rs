//! Builds a [`ToolRegistry`] from a [`CapabilityProfile`].
//!
//! Mirrors `ro_agent/capabilities/factory.py`'s registration order: core
//! read-only tools first, then shell, then file-writing, then
//! environment-gated database dialects.

use super::{CapabilityProfile, DatabaseMode, FileWriteMode, ShellMode};
use crate::tools::handlers::database::DatabaseHandler;
use crate::tools::handlers::{
    bash::BashHandler, edit::EditHandler, glob::GlobHandler, grep::GrepHandler, list::ListHandler,
    mysql::MysqlDialect, oracle::OracleDialect, postgres::PostgresDialect, read::ReadHandler,
    read_excel::ReadExcelHandler, sqlite::SqliteDialect, vertica::VerticaDialect, write::WriteHandler,
};
use crate::tools::ToolRegistry;
use std::path::Path;
use std::sync::Arc;

/// Builds a [`ToolRegistry`] from a [`CapabilityProfile`].
pub struct ToolFactory<'a> {
    profile: &'a CapabilityProfile,
}

impl<'a> ToolFactory<'a> {
    pub fn new(profile: &'a CapabilityProfile) -> Self {
        Self { profile }
    }

    /// Builds the registry for `working_dir`, reading environment variables
    /// to decide which database dialects to register.
    pub fn create_registry(&self, working_dir: &str) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        self.register_core_tools(&mut registry);
        self.register_bash_tool(&mut registry, working_dir);
        self.register_write_tools(&mut registry);
        self.register_database_tools(&mut registry);
        registry
    }

    fn register_core_tools(&self, registry: &mut ToolRegistry) {
        registry.register(Arc::new(ReadHandler));
        registry.register(Arc::new(GlobHandler::default()));
        registry.register(Arc::new(GrepHandler::default()));
        registry.register(Arc::new(ListHandler));
        registry.register(Arc::new(ReadExcelHandler));
    }

    fn register_bash_tool(&self, registry: &mut ToolRegistry, working_dir: &str) {
        let restricted = self.profile.shell == ShellMode::Restricted;
        let requires_approval = self.profile.requires_tool_approval("bash");
        let working_dir = self.profile.shell_working_dir.clone().unwrap_or_else(|| working_dir.to_string());
        registry.register(Arc::new(BashHandler::new(
            restricted,
            Some(working_dir),
            Some(self.profile.shell_timeout),
            Some(requires_approval),
        )));
    }

    fn register_write_tools(&self, registry: &mut ToolRegistry) {
        if self.profile.file_write == FileWriteMode::Off {
            return;
        }

        let create_only = self.profile.file_write == FileWriteMode::CreateOnly;
        let requires_approval = self.profile.requires_tool_approval("write");
        registry.register(Arc::new(WriteHandler::new(create_only, Some(requires_approval))));

        if self.profile.file_write == FileWriteMode::Full {
            let requires_approval = self.profile.requires_tool_approval("edit");
            registry.register(Arc::new(EditHandler::new(requires_approval)));
        }
    }

    fn register_database_tools(&self, registry: &mut ToolRegistry) {
        let row_limit = None;
        let mutations_allowed = self.profile.database == DatabaseMode::Mutations;
        let read_only = self.profile.database == DatabaseMode::Readonly;

        if std::env::var("SQLITE_DB").is_ok() {
            if let Ok(dialect) = SqliteDialect::from_env() {
                let requires_approval = mutations_allowed || self.profile.requires_tool_approval("sqlite");
                registry.register(Arc::new(DatabaseHandler::new(dialect, row_limit, requires_approval, read_only)));
            }
        }

        if std::env::var("MYSQL_HOST").is_ok() || std::env::var("MYSQL_DOCKER_CONTAINER").is_ok() {
            if let Ok(dialect) = MysqlDialect::from_env() {
                let requires_approval = mutations_allowed || self.profile.requires_tool_approval("mysql");
                registry.register(Arc::new(DatabaseHandler::new(dialect, row_limit, requires_approval, read_only)));
            }
        }

        if std::env::var("POSTGRES_HOST").is_ok() {
            if let Ok(dialect) = PostgresDialect::from_env() {
                let requires_approval = mutations_allowed || self.profile.requires_tool_approval("postgres");
                registry.register(Arc::new(DatabaseHandler::new(dialect, row_limit, requires_approval, read_only)));
            }
        }

        if std::env::var("ORACLE_DSN").is_ok() {
            if let Ok(dialect) = OracleDialect::from_env() {
                let requires_approval = mutations_allowed || self.profile.requires_tool_approval("oracle");
                registry.register(Arc::new(DatabaseHandler::new(dialect, row_limit, requires_approval, read_only)));
            }
        }

        if std::env::var("VERTICA_HOST").is_ok() {
            if let Ok(dialect) = VerticaDialect::from_env() {
                let requires_approval = mutations_allowed || self.profile.requires_tool_approval("vertica");
                registry.register(Arc::new(DatabaseHandler::new(dialect, row_limit, requires_approval, read_only)));
            }
        }
    }
}

/// Convenience wrapper around [`ToolFactory::create_registry`].
pub fn create_registry_from_profile(profile: &CapabilityProfile, working_dir: &str) -> ToolRegistry {
    ToolFactory::new(profile).create_registry(working_dir)
}

/// Resolves a profile by built-in preset name, a YAML file path, or a name
/// looked up under `~/.config/ro-agent/profiles/<name>.yaml`.
pub fn load_profile(name_or_path: &str) -> crate::Result<CapabilityProfile> {
    match name_or_path {
        "readonly" => return Ok(CapabilityProfile::readonly()),
        "developer" => return Ok(CapabilityProfile::developer()),
        "eval" => {
            let working_dir = std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| ".".to_string());
            return Ok(CapabilityProfile::eval(working_dir));
        }
        _ => {}
    }

    let path = Path::new(name_or_path);
    if path.exists() {
        return CapabilityProfile::from_yaml(path);
    }

    if let Some(home) = std::env::var_os("HOME") {
        let default_path = Path::new(&home).join(".config/ro-agent/profiles").join(format!("{name_or_path}.yaml"));
        if default_path.exists() {
            return CapabilityProfile::from_yaml(&default_path);
        }
    }

    Err(crate::Error::config(format!("Unknown capability profile: {name_or_path}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readonly_profile_registers_core_tools_only() {
        let profile = CapabilityProfile::readonly();
        let registry = ToolFactory::new(&profile).create_registry("/tmp");
        assert!(registry.contains("read"));
        assert!(registry.contains("glob"));
        assert!(registry.contains("grep"));
        assert!(registry.contains("list"));
        assert!(registry.contains("read_excel"));
        assert!(registry.contains("bash"));
        assert!(!registry.contains("write"));
        assert!(!registry.contains("edit"));
    }

    #[test]
    fn test_developer_profile_registers_write_and_edit() {
        let profile = CapabilityProfile::developer();
        let registry = ToolFactory::new(&profile).create_registry("/tmp");
        assert!(registry.contains("write"));
        assert!(registry.contains("edit"));
    }

    #[test]
    fn test_create_only_profile_registers_write_without_edit() {
        let mut profile = CapabilityProfile::developer();
        profile.file_write = FileWriteMode::CreateOnly;
        let registry = ToolFactory::new(&profile).create_registry("/tmp");
        assert!(registry.contains("write"));
        assert!(!registry.contains("edit"));
    }

    #[test]
    fn test_load_profile_builtin_names() {
        assert_eq!(load_profile("readonly").unwrap().name, "readonly");
        assert_eq!(load_profile("developer").unwrap().name, "developer");
    }

    #[test]
    fn test_load_profile_unknown_name_errors() {
        assert!(load_profile("does-not-exist").is_err());
    }
}

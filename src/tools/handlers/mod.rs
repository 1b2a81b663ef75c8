//! Concrete [`crate::tools::base::ToolHandler`] implementations.

pub mod bash;
pub mod database;
pub mod edit;
pub mod glob;
pub mod grep;
pub mod list;
pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod read;
pub mod read_excel;
pub mod sqlite;
pub mod vertica;
pub mod write;

use std::path::{Path, PathBuf};

/// Expands a leading `~` and resolves the path to an absolute, canonical
/// form when possible (falling back to a merely-absolute path if the target
/// doesn't exist yet, e.g. a file about to be created).
pub fn resolve_path(path_str: &str) -> Result<PathBuf, String> {
    if path_str.is_empty() {
        return Err("No path provided".to_string());
    }

    let expanded = if let Some(rest) = path_str.strip_prefix("~/") {
        dirs_home().map(|home| home.join(rest)).unwrap_or_else(|| PathBuf::from(path_str))
    } else if path_str == "~" {
        dirs_home().unwrap_or_else(|| PathBuf::from(path_str))
    } else {
        PathBuf::from(path_str)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().map(|cwd| cwd.join(&expanded)).unwrap_or(expanded)
    };

    Ok(std::fs::canonicalize(&absolute).unwrap_or(absolute))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Strips a resolved path down to its path relative to `base`, when possible.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path_rejects_empty() {
        assert!(resolve_path("").is_err());
    }

    #[test]
    fn test_resolve_path_expands_tilde() {
        if let Some(home) = dirs_home() {
            let resolved = resolve_path("~/foo").unwrap();
            assert!(resolved.starts_with(&home) || resolved.ends_with("foo"));
        }
    }

    #[test]
    fn test_resolve_path_absolute_passthrough() {
        let resolved = resolve_path("/tmp").unwrap();
        assert!(resolved.is_absolute());
    }
}

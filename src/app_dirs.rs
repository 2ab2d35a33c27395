//! Where digitboost keeps its run logs.
//!
//! The directory sits under the OS config root unless `DIGITBOOST_CONFIG_HOME`
//! points somewhere else.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;

/// Application folder created under the config root.
pub const APP_DIR_NAME: &str = ".digitboost";
/// Environment variable replacing the OS config root.
pub const CONFIG_HOME_ENV: &str = "DIGITBOOST_CONFIG_HOME";

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No config directory available for log files; set {}", CONFIG_HOME_ENV)]
    NoBaseDir,
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// `<config root>/.digitboost/logs`, created if missing.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    let base = std::env::var_os(CONFIG_HOME_ENV)
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf()))
        .ok_or(AppDirError::NoBaseDir)?;
    logs_dir_in(&base)
}

/// `<base>/.digitboost/logs`, created if missing.
pub fn logs_dir_in(base: &Path) -> Result<PathBuf, AppDirError> {
    let path = base.join(APP_DIR_NAME).join("logs");
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn logs_dir_is_created_under_base() {
        let base = tempdir().unwrap();
        let logs = logs_dir_in(base.path()).unwrap();
        assert_eq!(logs, base.path().join(".digitboost/logs"));
        assert!(logs.is_dir());
        assert_eq!(logs_dir_in(base.path()).unwrap(), logs);
    }

    #[test]
    fn blocked_base_reports_path() {
        let base = tempdir().unwrap();
        let file = base.path().join("plain");
        std::fs::write(&file, b"").unwrap();
        let err = logs_dir_in(&file).unwrap_err();
        assert!(matches!(err, AppDirError::CreateDir { .. }));
        assert!(err.to_string().contains("plain"));
    }
}

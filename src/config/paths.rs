//! Path management for cloud-backup
//!
//! Resolves where the tool keeps its own files: settings, the optional
//! rotation override and the run history.
//!
//! ## Path Resolution Order
//!
//! 1. `CLOUD_BACKUP_CONFIG_DIR` environment variable (if set)
//! 2. The platform configuration directory (`~/.config/cloud-backup` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::BackupError;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "CLOUD_BACKUP_CONFIG_DIR";

/// Manages all paths used by cloud-backup itself
#[derive(Debug, Clone)]
pub struct BackupPaths {
    /// Base directory for the tool's own files
    base_dir: PathBuf,
}

impl BackupPaths {
    /// Create a new BackupPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined and no
    /// override is set.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "cloud-backup")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| {
                    BackupError::Config("Could not determine configuration directory".into())
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create BackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the optional rotation scheme override
    pub fn rotation_file(&self) -> PathBuf {
        self.base_dir.join("rotation.yaml")
    }

    /// Get the path to the run history
    pub fn history_file(&self) -> PathBuf {
        self.base_dir.join("history.jsonl")
    }

    /// Ensure the base directory exists
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            BackupError::Io(format!("Failed to create config directory: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
        assert_eq!(paths.rotation_file(), temp_dir.path().join("rotation.yaml"));
        assert_eq!(paths.history_file(), temp_dir.path().join("history.jsonl"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = BackupPaths::with_base_dir(temp_dir.path().join("nested").join("cfg"));

        paths.ensure_directories().unwrap();

        assert!(paths.base_dir().exists());
    }
}

//! Custom error types for cloud-backup
//!
//! This module defines the error hierarchy for the orchestrators using
//! thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::exec::ExecutionContext;

/// The main error type for cloud-backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(String),

    /// A check run before any destructive step failed
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A written snapshot (or a restored tree) failed its sanity checks
    #[error("Verification failed: {0}")]
    Verification(String),

    /// A command that gates correctness failed
    #[error("Command `{command}` failed in {context} context: {reason}")]
    Command {
        context: ExecutionContext,
        command: String,
        reason: String,
    },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Rotation errors
    #[error("Retention error: {0}")]
    Retention(String),

    /// Mail delivery errors
    #[error("Notification error: {0}")]
    Notification(String),
}

impl BackupError {
    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Snapshot",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a precondition error
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Check if this is a verification error
    pub fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }

    /// Check if this is a command failure
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command { .. })
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for BackupError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

/// Result type alias for cloud-backup operations
pub type BackupResult<T> = Result<T, BackupError>;

//! Configuration module for cloud-backup
//!
//! This module provides configuration management including:
//! - Resolution of the tool's own config directory
//! - Settings persistence with environment overrides
//! - Redacted secrets for credentials

pub mod paths;
pub mod secret;
pub mod settings;

pub use paths::BackupPaths;
pub use secret::SecretString;
pub use settings::Settings;

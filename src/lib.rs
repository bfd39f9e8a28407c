//! cloud-backup - Backup and restore lifecycle controller for a
//! self-hosted cloud application
//!
//! Takes consistent snapshots of a MySQL database and one or more data
//! trees while the application is held in maintenance, verifies them,
//! restores them, and rotates old ones.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and environment overrides
//! - `error`: Custom error types
//! - `exec`: Typed commands and the executors that run them in a context
//! - `backup`: Maintenance gate, backup, restore and retention orchestrators
//! - `history`: Append-only record of orchestration runs
//! - `notify`: Mail notifications
//! - `cli`: Command handlers for the binary
//!
//! # Example
//!
//! ```rust,ignore
//! use cloud_backup::config::{BackupPaths, Settings};
//!
//! let paths = BackupPaths::new()?;
//! let settings = Settings::resolve(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod history;
pub mod notify;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{BackupError, BackupResult};

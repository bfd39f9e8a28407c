//! Backup system for cloud-backup
//!
//! Produces consistent snapshots of a database plus one or more file trees
//! while the application is prevented from writing, restores them, and
//! rotates old snapshots.
//!
//! # Architecture
//!
//! - `FsProbe`: existence/emptiness/size questions answered through the executor
//! - `MaintenanceGate`: suspends and restores write availability
//! - `BackupManager`: preconditions, dump, tree capture, `latest` update, verification
//! - `RestoreManager`: safety backup, destructive database and tree replacement
//! - `RetentionRunner`: applies a `RotationPolicy` and repairs `latest`
//!
//! # Snapshot Layout
//!
//! ```text
//! {backup_dir}/2024-02-15_10-30-00/backup.sql
//! {backup_dir}/2024-02-15_10-30-00/{tag}/...
//! {backup_dir}/latest -> {backup_dir}/2024-02-15_10-30-00
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cloud_backup::backup::{gate_from_settings, BackupManager};
//! use cloud_backup::exec::SystemExecutor;
//!
//! let executor = SystemExecutor::new(settings.contexts.backup.clone(), settings.contexts.application.clone());
//! let gate = gate_from_settings(&settings.maintenance, &executor)?;
//! let manager = BackupManager::new(&settings, &executor, gate.as_ref());
//! let report = manager.create_backup(true)?;
//! println!("{}", report.summary());
//! ```

pub mod commands;
mod gate;
mod manager;
mod probe;
mod restore;
mod retention;
mod snapshot;

pub use gate::{gate_from_settings, run_gated, Gated, HardGate, MaintenanceGate, SoftGate};
pub use manager::{BackupManager, BackupReport, SnapshotStats, TreeCapture};
pub use probe::FsProbe;
pub use restore::{RestoreManager, RestoreReport, RestoreWarning};
pub use retention::{
    BucketRotation, PointerState, RetentionReport, RetentionRunner, RotationPolicy,
    RotationScheme,
};
pub use snapshot::{list_snapshots, repoint_latest, SnapshotId, SnapshotLayout};

/// Database dump file inside a snapshot
pub const DUMP_FILE: &str = "backup.sql";
/// Name of the pointer to the newest snapshot
pub const LATEST_LINK: &str = "latest";

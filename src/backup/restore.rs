//! Restore manager for cloud-backup
//!
//! Replaces the live database and trees with the contents of a snapshot.
//! The database sequence (drop, create, load) is destructive and has no
//! rollback: a failure after the drop leaves the database absent.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use super::commands;
use super::gate::{run_gated, MaintenanceGate};
use super::manager::BackupManager;
use super::probe::FsProbe;
use super::snapshot::{SnapshotId, SnapshotLayout};
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};
use crate::exec::{run_checked, CommandExecutor, CommandSpec, ExecutionContext};

const CTX: ExecutionContext = ExecutionContext::Backup;

/// A tolerated failure during a restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreWarning {
    /// The live state failed the backup preconditions, so no safety backup was taken
    SafetyBackupSkipped(String),
    /// Leaving maintenance (or restarting the application) failed
    MaintenanceExit(String),
    /// A refresh command failed
    Refresh { command: String, reason: String },
}

impl fmt::Display for RestoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafetyBackupSkipped(reason) => {
                write!(f, "no safety backup of the live state: {}", reason)
            }
            Self::MaintenanceExit(reason) => {
                write!(f, "application may still be in maintenance: {}", reason)
            }
            Self::Refresh { command, reason } => {
                write!(f, "refresh `{}` failed: {}", command, reason)
            }
        }
    }
}

/// Result of a successful restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub snapshot: SnapshotId,
    /// Backup of the pre-restore state, when one was taken
    pub safety_snapshot: Option<SnapshotId>,
    pub warnings: Vec<RestoreWarning>,
}

pub struct RestoreManager<'a> {
    settings: &'a Settings,
    executor: &'a dyn CommandExecutor,
    gate: &'a dyn MaintenanceGate,
    backups: BackupManager<'a>,
    safety_backup: bool,
}

impl<'a> RestoreManager<'a> {
    pub fn new(
        settings: &'a Settings,
        executor: &'a dyn CommandExecutor,
        gate: &'a dyn MaintenanceGate,
    ) -> Self {
        Self {
            settings,
            executor,
            gate,
            backups: BackupManager::new(settings, executor, gate),
            safety_backup: settings.restore.safety_backup,
        }
    }

    /// Override the configured safety backup for this restore
    pub fn with_safety_backup(mut self, enabled: bool) -> Self {
        self.safety_backup = enabled;
        self
    }

    fn layout(&self) -> &SnapshotLayout {
        self.backups.layout()
    }

    /// Restore the database and every source tree from `id`
    pub fn restore(&self, id: &SnapshotId) -> BackupResult<RestoreReport> {
        let snapshot_dir = self.layout().snapshot_dir(id);
        if !FsProbe::new(self.executor).dir_exists(&snapshot_dir, CTX) {
            return Err(BackupError::snapshot_not_found(id.to_string()));
        }
        self.check_snapshot(id)?;

        let mut warnings = Vec::new();
        let safety_snapshot = if self.safety_backup {
            self.take_safety_backup(&mut warnings)?
        } else {
            None
        };

        info!("Restoring backup from {}", snapshot_dir.display());
        let soft = self.gate.keeps_application_running();

        let gated = run_gated(self.gate, || {
            self.check_snapshot(id)?;
            self.restore_database(id)?;
            self.restore_data(id)?;
            if soft {
                self.refresh(&mut warnings);
            }
            Ok(())
        });

        if let Err(e) = gated.release {
            warnings.push(RestoreWarning::MaintenanceExit(e.to_string()));
        }
        if let Err(e) = gated.outcome {
            error!(snapshot = %id, error = %e, "restore failed");
            return Err(e);
        }

        if !soft {
            self.refresh(&mut warnings);
        }

        info!("Verifying restored data");
        self.backups
            .verify_prior_backup()
            .map_err(|e| BackupError::Verification(format!("Restored state: {}", e)))?;

        for warning in &warnings {
            warn!("{}", warning);
        }
        info!("Finished restore of {}", id);
        Ok(RestoreReport {
            snapshot: *id,
            safety_snapshot,
            warnings,
        })
    }

    /// Back up the live state before it is replaced
    ///
    /// A live state that fails the backup preconditions (a tree emptied or
    /// lost) holds nothing worth keeping, and the restore goes ahead
    /// without a copy. Any other failure aborts the restore.
    fn take_safety_backup(
        &self,
        warnings: &mut Vec<RestoreWarning>,
    ) -> BackupResult<Option<SnapshotId>> {
        if let Err(e) = self.backups.verify_prior_backup() {
            warnings.push(RestoreWarning::SafetyBackupSkipped(e.to_string()));
            return Ok(None);
        }

        info!("Taking safety backup before restore");
        let report = self
            .backups
            .create_backup_as(self.fresh_id(), true)
            .map_err(|e| {
                error!(error = %e, "safety backup failed, restore aborted");
                e
            })?;
        Ok(Some(report.snapshot))
    }

    /// The current time as an id no snapshot uses yet
    ///
    /// Ids have one-second resolution, so a backup finished within the
    /// same second already owns `now`.
    fn fresh_id(&self) -> SnapshotId {
        let id = SnapshotId::now();
        if !FsProbe::new(self.executor).dir_exists(&self.layout().snapshot_dir(&id), CTX) {
            return id;
        }
        info!(snapshot = %id, "snapshot id in use, waiting for the next second");
        thread::sleep(Duration::from_secs(1));
        SnapshotId::now()
    }

    /// A snapshot that would fail backup verification is never restored
    fn check_snapshot(&self, id: &SnapshotId) -> BackupResult<()> {
        self.backups
            .inspect_snapshot(id)
            .map(|_| ())
            .map_err(|reason| {
                BackupError::Precondition(format!("Snapshot {} unusable: {}", id, reason))
            })
    }

    fn restore_database(&self, id: &SnapshotId) -> BackupResult<()> {
        let db = &self.settings.database;
        info!(database = %db.name, "replacing database");

        run_checked(self.executor, &commands::drop_database(db), CTX)?;
        run_checked(self.executor, &commands::create_database(db), CTX).map_err(|e| {
            error!(
                database = %db.name,
                "database was dropped but could not be recreated; it is now absent"
            );
            e
        })?;
        run_checked(
            self.executor,
            &commands::load_database(db, &self.layout().dump_file(id)),
            CTX,
        )?;
        Ok(())
    }

    fn restore_data(&self, id: &SnapshotId) -> BackupResult<()> {
        let sources = &self.settings.sources;
        for (index, source) in sources.iter().enumerate() {
            info!(tag = %source.tag, live = %source.path.display(), "mirroring tree");
            let command = commands::mirror_tree(
                &self.layout().tree_dir(id, &source.tag),
                &source.path,
                &commands::nested_excludes(sources, index),
            );
            run_checked(self.executor, &command, CTX)?;
        }
        Ok(())
    }

    fn refresh(&self, warnings: &mut Vec<RestoreWarning>) {
        for argv in &self.settings.restore.refresh {
            let Some(command) = CommandSpec::from_argv(argv) else {
                continue;
            };
            info!(%command, "refreshing application state");
            if let Err(e) = self
                .executor
                .execute(&command, ExecutionContext::Application)
            {
                warnings.push(RestoreWarning::Refresh {
                    command: command.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

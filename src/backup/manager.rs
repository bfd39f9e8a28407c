//! Backup manager for cloud-backup
//!
//! Runs one backup as a gated sequence: preconditions, database dump,
//! per-tree capture, `latest` update and verification. Maintenance is left
//! on every path out of the sequence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::commands;
use super::gate::{run_gated, MaintenanceGate};
use super::probe::FsProbe;
use super::snapshot::{list_snapshots, repoint_latest, SnapshotId, SnapshotLayout};
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};
use crate::exec::{run_checked, CommandExecutor, ExecutionContext};

const CTX: ExecutionContext = ExecutionContext::Backup;

/// How one source tree was captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeCapture {
    pub tag: String,
    /// Unchanged files were hard-linked against the previous snapshot
    pub incremental: bool,
}

/// Size of a verified snapshot's primary tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub size_bytes: u64,
    pub size_human: String,
}

/// Result of a successful backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    pub snapshot: SnapshotId,
    pub path: PathBuf,
    pub trees: Vec<TreeCapture>,
    pub stats: SnapshotStats,
    /// Tolerated failures (leaving maintenance)
    pub warnings: Vec<String>,
}

impl BackupReport {
    pub fn summary(&self) -> String {
        let modes: Vec<String> = self
            .trees
            .iter()
            .map(|t| {
                let mode = if t.incremental { "incremental" } else { "full" };
                format!("{} ({})", t.tag, mode)
            })
            .collect();
        format!(
            "Backup {} verified, {}: {}",
            self.snapshot,
            self.stats.size_human,
            modes.join(", ")
        )
    }
}

/// Creates, lists and verifies snapshots
pub struct BackupManager<'a> {
    settings: &'a Settings,
    executor: &'a dyn CommandExecutor,
    gate: &'a dyn MaintenanceGate,
    layout: SnapshotLayout,
}

impl<'a> BackupManager<'a> {
    pub fn new(
        settings: &'a Settings,
        executor: &'a dyn CommandExecutor,
        gate: &'a dyn MaintenanceGate,
    ) -> Self {
        Self {
            settings,
            executor,
            gate,
            layout: SnapshotLayout::new(settings.backup_dir.clone()),
        }
    }

    pub fn layout(&self) -> &SnapshotLayout {
        &self.layout
    }

    fn probe(&self) -> FsProbe<'a> {
        FsProbe::new(self.executor)
    }

    /// Create a backup named after the current time
    pub fn create_backup(&self, incremental: bool) -> BackupResult<BackupReport> {
        self.create_backup_as(SnapshotId::now(), incremental)
    }

    /// Create a backup under a given id
    pub fn create_backup_as(
        &self,
        id: SnapshotId,
        incremental: bool,
    ) -> BackupResult<BackupReport> {
        let snapshot_dir = self.layout.snapshot_dir(&id);
        info!("Starting backup to folder {}", snapshot_dir.display());

        let gated = run_gated(self.gate, || {
            self.verify_prior_backup()?;
            if self.probe().dir_exists(&snapshot_dir, CTX) {
                return Err(BackupError::Precondition(format!(
                    "Snapshot {} already exists",
                    id
                )));
            }
            self.backup_database(&id)?;
            let trees = self.backup_data(&id, incremental)?;
            let stats = self.verify_post_backup(&id)?;
            Ok((trees, stats))
        });

        let mut warnings = Vec::new();
        if let Err(e) = gated.release {
            warnings.push(format!("Leaving maintenance failed: {}", e));
        }

        match gated.outcome {
            Ok((trees, stats)) => {
                info!("Finished backup to folder {}", snapshot_dir.display());
                Ok(BackupReport {
                    snapshot: id,
                    path: snapshot_dir,
                    trees,
                    stats,
                    warnings,
                })
            }
            Err(e) => {
                error!(snapshot = %id, error = %e, "backup failed");
                Err(e)
            }
        }
    }

    /// Every source tree must exist and hold data; the backup root must
    /// exist and be non-empty (an empty root means the volume is not mounted)
    pub fn verify_prior_backup(&self) -> BackupResult<()> {
        let probe = self.probe();

        for source in &self.settings.sources {
            if !probe.dir_exists(&source.path, CTX) {
                return Err(BackupError::Precondition(format!(
                    "Source dir '{}' not present: {}",
                    source.tag,
                    source.path.display()
                )));
            }
            if probe.dir_empty(&source.path, CTX) {
                return Err(BackupError::Precondition(format!(
                    "Source dir '{}' empty: {}",
                    source.tag,
                    source.path.display()
                )));
            }
        }

        let root = self.layout.root();
        if !probe.dir_exists(root, CTX) {
            return Err(BackupError::Precondition(format!(
                "Backup dir not present: {}",
                root.display()
            )));
        }
        if probe.dir_empty(root, CTX) {
            return Err(BackupError::Precondition(format!(
                "Backup dir empty, check mount: {}",
                root.display()
            )));
        }

        Ok(())
    }

    fn backup_database(&self, id: &SnapshotId) -> BackupResult<()> {
        run_checked(
            self.executor,
            &commands::make_dir(&self.layout.snapshot_dir(id)),
            CTX,
        )?;

        info!(database = %self.settings.database.name, "dumping database");
        run_checked(
            self.executor,
            &commands::dump_database(&self.settings.database, &self.layout.dump_file(id)),
            CTX,
        )?;
        Ok(())
    }

    fn backup_data(&self, id: &SnapshotId, incremental: bool) -> BackupResult<Vec<TreeCapture>> {
        let probe = self.probe();
        let latest = self.layout.latest();

        let incremental = if incremental && !probe.dir_exists(&latest, CTX) {
            warn!(
                "Cannot perform incremental backup, missing {}; falling back to full copy",
                latest.display()
            );
            false
        } else {
            incremental
        };

        let sources = &self.settings.sources;
        let mut trees = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let base = commands::link_base(&latest, &source.tag);
            let linked = incremental && probe.dir_exists(&base, CTX);
            if incremental && !linked {
                warn!(tag = %source.tag, "no previous capture of this tree; copying in full");
            }

            info!(
                tag = %source.tag,
                mode = if linked { "incremental" } else { "full" },
                "capturing tree"
            );
            let command = commands::capture_tree(
                &source.path,
                &self.layout.tree_dir(id, &source.tag),
                linked.then_some(base.as_path()),
                &commands::nested_excludes(sources, index),
            );
            run_checked(self.executor, &command, CTX)?;

            trees.push(TreeCapture {
                tag: source.tag.clone(),
                incremental: linked,
            });
        }

        repoint_latest(self.executor, &self.layout, id)?;
        Ok(trees)
    }

    /// Post-condition check of a written snapshot
    pub fn verify_post_backup(&self, id: &SnapshotId) -> BackupResult<SnapshotStats> {
        info!(
            "Verifying backup sanity from {}",
            self.layout.snapshot_dir(id).display()
        );
        let stats = self.inspect_snapshot(id).map_err(BackupError::Verification)?;
        info!("Backup successfully verified in {}", stats.size_human);
        Ok(stats)
    }

    /// Check an existing snapshot without a gate (used before restores and
    /// by the `verify` command)
    pub fn verify_snapshot(&self, id: &SnapshotId) -> BackupResult<SnapshotStats> {
        if !self.probe().dir_exists(&self.layout.snapshot_dir(id), CTX) {
            return Err(BackupError::snapshot_not_found(id.to_string()));
        }
        self.verify_post_backup(id)
    }

    /// Shared snapshot sanity check; the message describes the first defect
    pub(crate) fn inspect_snapshot(&self, id: &SnapshotId) -> Result<SnapshotStats, String> {
        let probe = self.probe();

        let dump = self.layout.dump_file(id);
        if !probe.file_exists(&dump, CTX) {
            return Err(format!(
                "Database backup file {} not present",
                dump.display()
            ));
        }

        for source in &self.settings.sources {
            let tree = self.layout.tree_dir(id, &source.tag);
            if !probe.dir_exists(&tree, CTX) {
                return Err(format!(
                    "Data backup directory {} non-existent",
                    tree.display()
                ));
            }
            if probe.dir_empty(&tree, CTX) {
                return Err(format!("Data backup directory {} empty", tree.display()));
            }
        }

        let primary = self
            .settings
            .primary_source()
            .map(|s| self.layout.tree_dir(id, &s.tag))
            .ok_or_else(|| "No source directories configured".to_string())?;
        let size_bytes = probe.size_bytes(&primary, CTX);
        if size_bytes == 0 {
            return Err(format!("Backup size of {}: 0 bytes", primary.display()));
        }

        Ok(SnapshotStats {
            size_bytes,
            size_human: probe.size_human(&primary, CTX),
        })
    }

    /// All snapshots under the backup root, oldest first
    pub fn list_backups(&self) -> BackupResult<Vec<SnapshotId>> {
        list_snapshots(self.executor, &self.layout)
    }

    /// Resolve a user-supplied snapshot name
    pub fn find_backup(&self, name: &str) -> BackupResult<SnapshotId> {
        let backups = self.list_backups()?;
        if name.eq_ignore_ascii_case("latest") {
            return backups
                .last()
                .copied()
                .ok_or_else(|| BackupError::snapshot_not_found("latest"));
        }
        let wanted = name.trim_end_matches('/');
        let wanted = wanted.rsplit('/').next().unwrap_or(wanted);
        backups
            .into_iter()
            .find(|id| id.to_string() == wanted)
            .ok_or_else(|| BackupError::snapshot_not_found(name))
    }
}

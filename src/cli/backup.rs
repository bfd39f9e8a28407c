//! Backup, restore and rotation commands

use std::io::{self, BufRead, Write};

use chrono::{Local, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{format_duration, prompt, Runtime};
use crate::backup::{
    gate_from_settings, list_snapshots, BackupManager, PointerState, RestoreManager,
    RetentionRunner, SnapshotId, SnapshotLayout,
};
use crate::error::{BackupError, BackupResult};
use crate::history::{RunKind, RunRecord};

/// Create a backup
pub fn handle_backup(rt: &Runtime<'_>, incremental: bool) -> BackupResult<()> {
    let gate = gate_from_settings(&rt.settings.maintenance, rt.executor)?;
    let manager = BackupManager::new(rt.settings, rt.executor, gate.as_ref());
    let started = Utc::now();

    match manager.create_backup(incremental) {
        Ok(report) => {
            let summary = report.summary();
            println!("{}", summary);
            println!("Location: {}", report.path.display());

            let mut warnings = report.warnings;
            warnings.extend(rt.notify("Backup succeeded", &summary));
            for warning in &warnings {
                println!("Warning: {}", warning);
            }
            rt.record(RunRecord::success(
                RunKind::Backup,
                started,
                Some(report.snapshot),
                warnings,
            ));
            Ok(())
        }
        Err(e) => rt.fail(RunKind::Backup, started, None, e),
    }
}

/// How `restore` was invoked
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreFlags {
    /// Skip the confirmation prompt
    pub force: bool,
    /// Skip the safety backup even when it is configured
    pub no_safety_backup: bool,
}

/// Restore a snapshot, prompting on the terminal where needed
pub fn handle_restore(
    rt: &Runtime<'_>,
    snapshot: Option<&str>,
    flags: RestoreFlags,
) -> BackupResult<()> {
    let stdin = io::stdin();
    restore_with(rt, snapshot, flags, stdin.lock(), io::stdout())
}

fn restore_with(
    rt: &Runtime<'_>,
    snapshot: Option<&str>,
    flags: RestoreFlags,
    mut input: impl BufRead,
    mut output: impl Write,
) -> BackupResult<()> {
    let gate = gate_from_settings(&rt.settings.maintenance, rt.executor)?;
    let manager = BackupManager::new(rt.settings, rt.executor, gate.as_ref());

    let id = match snapshot {
        Some(name) => manager.find_backup(name)?,
        None => prompt::select_snapshot(&manager.list_backups()?, &mut input, &mut output)?,
    };

    if !flags.force {
        writeln!(
            output,
            "WARNING: This will overwrite the live database and every data directory!"
        )?;
        if !prompt::confirm(&format!("Restore backup {}?", id), &mut input, &mut output)? {
            writeln!(output, "Restore cancelled.")?;
            return Ok(());
        }
    }

    let started = Utc::now();
    let restorer = RestoreManager::new(rt.settings, rt.executor, gate.as_ref())
        .with_safety_backup(rt.settings.restore.safety_backup && !flags.no_safety_backup);
    match restorer.restore(&id) {
        Ok(report) => {
            writeln!(output, "Restore of {} complete.", report.snapshot)?;
            if let Some(safety) = report.safety_snapshot {
                writeln!(output, "Pre-restore backup saved: {}", safety)?;
            }

            let mut warnings: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
            warnings.extend(rt.notify("Restore succeeded", &format!("Restored backup {}", id)));
            for warning in &warnings {
                writeln!(output, "Warning: {}", warning)?;
            }
            rt.record(RunRecord::success(RunKind::Restore, started, Some(id), warnings));
            Ok(())
        }
        Err(e) => rt.fail(RunKind::Restore, started, Some(id), e),
    }
}

/// Rotate old snapshots and repair `latest`
///
/// A `latest` pointer that could not be repaired fails the command.
pub fn handle_clean(rt: &Runtime<'_>) -> BackupResult<()> {
    let runner = RetentionRunner::with_scheme(
        rt.executor,
        SnapshotLayout::new(rt.settings.backup_dir.clone()),
        &rt.settings.rotation,
    );
    let started = Utc::now();

    let report = match runner.run() {
        Ok(report) => report,
        Err(e) => return rt.fail(RunKind::Clean, started, None, e),
    };

    println!(
        "Removed {} backup(s), {} kept.",
        report.removed.len(),
        report.kept.len()
    );
    for id in &report.removed {
        println!("  removed {}", id);
    }
    println!("{}", report.latest);

    let snapshot = match &report.latest {
        PointerState::RepairFailed(reason) => {
            return rt.fail(
                RunKind::Clean,
                started,
                None,
                BackupError::Retention(format!("latest not repaired: {}", reason)),
            )
        }
        PointerState::Linked(id) => Some(*id),
        PointerState::Absent => None,
    };

    let summary = format!(
        "Removed {} backup(s), {} kept. {}",
        report.removed.len(),
        report.kept.len(),
        report.latest
    );
    let warnings: Vec<String> = rt.notify("Clean succeeded", &summary).into_iter().collect();
    for warning in &warnings {
        println!("Warning: {}", warning);
    }
    rt.record(RunRecord::success(RunKind::Clean, started, snapshot, warnings));
    Ok(())
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Snapshot")]
    snapshot: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "")]
    marker: &'static str,
}

fn snapshot_rows(backups: &[SnapshotId]) -> Vec<SnapshotRow> {
    let now = Local::now().naive_local();
    let newest = backups.last().copied();
    backups
        .iter()
        .enumerate()
        .map(|(index, id)| SnapshotRow {
            index,
            snapshot: id.to_string(),
            age: format_duration(now - id.timestamp()),
            marker: if Some(*id) == newest { "latest" } else { "" },
        })
        .collect()
}

/// List snapshots, oldest first
pub fn handle_list(rt: &Runtime<'_>) -> BackupResult<()> {
    let layout = SnapshotLayout::new(rt.settings.backup_dir.clone());
    let backups = list_snapshots(rt.executor, &layout)?;

    if backups.is_empty() {
        println!("No backups found in {}.", layout.root().display());
        println!("Create one with: cloud-backup backup");
        return Ok(());
    }

    let mut table = Table::new(snapshot_rows(&backups));
    table.with(Style::rounded());
    println!("{}", table);
    println!("Total: {} backup(s)", backups.len());
    Ok(())
}

/// Run the post-backup checks against an existing snapshot
pub fn handle_verify(rt: &Runtime<'_>, snapshot: &str) -> BackupResult<()> {
    let gate = gate_from_settings(&rt.settings.maintenance, rt.executor)?;
    let manager = BackupManager::new(rt.settings, rt.executor, gate.as_ref());

    let id = manager.find_backup(snapshot)?;
    let stats = manager.verify_snapshot(&id)?;
    println!(
        "Backup {} is valid ({}, {} bytes)",
        id, stats.size_human, stats.size_bytes
    );
    Ok(())
}

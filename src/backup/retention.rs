//! Snapshot rotation and `latest` repair

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::commands;
use super::snapshot::{list_snapshots, repoint_latest, SnapshotId, SnapshotLayout};
use crate::error::{BackupError, BackupResult};
use crate::exec::{run_checked, CommandExecutor, ExecutionContext};

const CTX: ExecutionContext = ExecutionContext::Backup;

/// How many period buckets to keep per frequency
///
/// Missing fields in a configuration file count as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationScheme {
    #[serde(default)]
    pub hourly: u32,
    #[serde(default)]
    pub daily: u32,
    #[serde(default)]
    pub weekly: u32,
    #[serde(default)]
    pub monthly: u32,
    #[serde(default)]
    pub yearly: u32,
    /// Keep the newest snapshot of a bucket instead of the oldest
    #[serde(default = "default_prefer_recent")]
    pub prefer_recent: bool,
}

fn default_prefer_recent() -> bool {
    true
}

impl Default for RotationScheme {
    fn default() -> Self {
        Self {
            hourly: 0,
            daily: 7,
            weekly: 4,
            monthly: 6,
            yearly: 1,
            prefer_recent: true,
        }
    }
}

/// Decides which snapshots are deleted
pub trait RotationPolicy {
    fn select_for_removal(&self, snapshots: &[SnapshotId]) -> Vec<SnapshotId>;
}

#[derive(Debug, Clone, Copy)]
enum Period {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Period {
    fn bucket(self, at: NaiveDateTime) -> (i32, u32, u32, u32) {
        match self {
            Self::Hour => (at.year(), at.month(), at.day(), at.hour()),
            Self::Day => (at.year(), at.month(), at.day(), 0),
            Self::Week => {
                let week = at.iso_week();
                (week.year(), week.week(), 0, 0)
            }
            Self::Month => (at.year(), at.month(), 0, 0),
            Self::Year => (at.year(), 0, 0, 0),
        }
    }
}

/// Time-bucketed rotation: the newest N hours, days, ISO weeks, months and
/// years each keep one snapshot
#[derive(Debug, Clone)]
pub struct BucketRotation {
    scheme: RotationScheme,
}

impl BucketRotation {
    pub fn new(scheme: RotationScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &RotationScheme {
        &self.scheme
    }

    fn frequencies(&self) -> [(Period, u32); 5] {
        [
            (Period::Hour, self.scheme.hourly),
            (Period::Day, self.scheme.daily),
            (Period::Week, self.scheme.weekly),
            (Period::Month, self.scheme.monthly),
            (Period::Year, self.scheme.yearly),
        ]
    }
}

impl RotationPolicy for BucketRotation {
    fn select_for_removal(&self, snapshots: &[SnapshotId]) -> Vec<SnapshotId> {
        let mut sorted = snapshots.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut keep = BTreeSet::new();
        if let Some(newest) = sorted.last() {
            keep.insert(*newest);
        }

        for (period, count) in self.frequencies() {
            if count == 0 {
                continue;
            }
            let mut buckets: BTreeMap<_, Vec<SnapshotId>> = BTreeMap::new();
            for id in &sorted {
                buckets
                    .entry(period.bucket(id.timestamp()))
                    .or_default()
                    .push(*id);
            }
            for members in buckets.values().rev().take(count as usize) {
                let pick = if self.scheme.prefer_recent {
                    members.last()
                } else {
                    members.first()
                };
                keep.extend(pick.copied());
            }
        }

        sorted.into_iter().filter(|id| !keep.contains(id)).collect()
    }
}

/// State of the `latest` pointer after a repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerState {
    Linked(SnapshotId),
    /// No snapshot is left, so there is no pointer
    Absent,
    RepairFailed(String),
}

impl fmt::Display for PointerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linked(id) => write!(f, "latest -> {}", id),
            Self::Absent => f.write_str("latest absent (no snapshots)"),
            Self::RepairFailed(reason) => write!(f, "latest not repaired: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionReport {
    pub removed: Vec<SnapshotId>,
    pub kept: Vec<SnapshotId>,
    pub latest: PointerState,
}

/// Applies a rotation policy to the backup root
pub struct RetentionRunner<'a> {
    executor: &'a dyn CommandExecutor,
    layout: SnapshotLayout,
    policy: Box<dyn RotationPolicy + 'a>,
}

impl<'a> RetentionRunner<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        layout: SnapshotLayout,
        policy: Box<dyn RotationPolicy + 'a>,
    ) -> Self {
        Self {
            executor,
            layout,
            policy,
        }
    }

    /// Runner over a [`BucketRotation`]; ties always favour recent snapshots
    pub fn with_scheme(
        executor: &'a dyn CommandExecutor,
        layout: SnapshotLayout,
        scheme: &RotationScheme,
    ) -> Self {
        let scheme = RotationScheme {
            prefer_recent: true,
            ..scheme.clone()
        };
        Self::new(executor, layout, Box::new(BucketRotation::new(scheme)))
    }

    /// Delete the snapshots the policy selects, then repair `latest`
    ///
    /// `latest` is repaired even when a deletion fails; the deletion error
    /// is returned afterwards.
    pub fn run(&self) -> BackupResult<RetentionReport> {
        info!("Rotating backups in {}", self.layout.root().display());
        let snapshots = list_snapshots(self.executor, &self.layout)
            .map_err(|e| BackupError::Retention(format!("Cannot list backups: {}", e)))?;
        let selected = self.policy.select_for_removal(&snapshots);

        let mut removed = Vec::with_capacity(selected.len());
        let mut failure = None;
        for id in selected {
            let dir = self.layout.snapshot_dir(&id);
            info!("Removing backup {}", dir.display());
            match run_checked(self.executor, &commands::remove_tree(&dir), CTX) {
                Ok(_) => removed.push(id),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let latest = self.repair_latest();
        if let Some(e) = failure {
            return Err(BackupError::Retention(e.to_string()));
        }

        let kept = snapshots
            .into_iter()
            .filter(|id| !removed.contains(id))
            .collect();
        Ok(RetentionReport {
            removed,
            kept,
            latest,
        })
    }

    /// Point `latest` at the newest snapshot present, or remove it if there
    /// is none
    ///
    /// Idempotent. Failures are reported in the returned state, never raised.
    pub fn repair_latest(&self) -> PointerState {
        let state = match list_snapshots(self.executor, &self.layout) {
            Err(e) => PointerState::RepairFailed(e.to_string()),
            Ok(snapshots) => match snapshots.last() {
                Some(newest) => match repoint_latest(self.executor, &self.layout, newest) {
                    Ok(()) => PointerState::Linked(*newest),
                    Err(e) => PointerState::RepairFailed(e.to_string()),
                },
                None => {
                    match run_checked(
                        self.executor,
                        &commands::remove_tree(&self.layout.latest()),
                        CTX,
                    ) {
                        Ok(_) => PointerState::Absent,
                        Err(e) => PointerState::RepairFailed(e.to_string()),
                    }
                }
            },
        };

        match &state {
            PointerState::RepairFailed(reason) => warn!("Could not repair latest: {}", reason),
            other => info!("{}", other),
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{snapshot, FakeHost};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn ids(names: &[&str]) -> Vec<SnapshotId> {
        names.iter().map(|n| snapshot(n)).collect()
    }

    fn only(scheme: RotationScheme) -> BucketRotation {
        BucketRotation::new(scheme)
    }

    fn make_snapshots(root: &Path, names: &[&str]) {
        for name in names {
            fs::create_dir_all(root.join(name).join("data")).unwrap();
        }
    }

    #[test]
    fn test_daily_keeps_one_per_day() {
        let snapshots = ids(&[
            "2024-01-01_01-00-00",
            "2024-01-01_13-00-00",
            "2024-01-02_01-00-00",
            "2024-01-03_01-00-00",
            "2024-01-03_23-00-00",
        ]);
        let scheme = RotationScheme {
            hourly: 0,
            daily: 2,
            weekly: 0,
            monthly: 0,
            yearly: 0,
            prefer_recent: true,
        };
        let removed = only(scheme.clone()).select_for_removal(&snapshots);
        assert_eq!(
            removed,
            ids(&["2024-01-01_01-00-00", "2024-01-01_13-00-00", "2024-01-03_01-00-00"])
        );

        let oldest_first = RotationScheme {
            prefer_recent: false,
            ..scheme
        };
        let removed = only(oldest_first).select_for_removal(&snapshots);
        assert_eq!(
            removed,
            ids(&["2024-01-01_01-00-00", "2024-01-01_13-00-00"])
        );
    }

    #[test]
    fn test_frequencies_combine() {
        let snapshots = ids(&[
            "2023-06-01_00-00-00",
            "2024-01-15_00-00-00",
            "2024-02-10_00-00-00",
            "2024-02-11_00-00-00",
        ]);
        let scheme = RotationScheme {
            hourly: 0,
            daily: 1,
            weekly: 0,
            monthly: 2,
            yearly: 2,
            prefer_recent: true,
        };
        let removed = only(scheme).select_for_removal(&snapshots);
        assert_eq!(removed, ids(&["2024-02-10_00-00-00"]));
    }

    #[test]
    fn test_iso_weeks_span_years() {
        // 2024-12-30 and 2025-01-02 share ISO week 1 of 2025
        let snapshots = ids(&["2024-12-30_00-00-00", "2025-01-02_00-00-00"]);
        let scheme = RotationScheme {
            hourly: 0,
            daily: 0,
            weekly: 5,
            monthly: 0,
            yearly: 0,
            prefer_recent: true,
        };
        let removed = only(scheme).select_for_removal(&snapshots);
        assert_eq!(removed, ids(&["2024-12-30_00-00-00"]));
    }

    #[test]
    fn test_newest_always_kept() {
        let snapshots = ids(&["2024-01-01_00-00-00", "2024-01-02_00-00-00"]);
        let nothing = RotationScheme {
            hourly: 0,
            daily: 0,
            weekly: 0,
            monthly: 0,
            yearly: 0,
            prefer_recent: true,
        };
        assert_eq!(
            only(nothing).select_for_removal(&snapshots),
            ids(&["2024-01-01_00-00-00"])
        );
        assert!(only(RotationScheme::default())
            .select_for_removal(&[])
            .is_empty());
    }

    #[test]
    fn test_repair_points_at_greatest_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        make_snapshots(&root, &["2024-01-01_00-00-00", "2024-02-15_10-30-00"]);
        fs::create_dir(root.join("lost+found")).unwrap();

        let host = FakeHost::new();
        let runner = RetentionRunner::with_scheme(
            &host,
            SnapshotLayout::new(&root),
            &RotationScheme::default(),
        );

        let first = runner.repair_latest();
        assert_eq!(first, PointerState::Linked(snapshot("2024-02-15_10-30-00")));
        let second = runner.repair_latest();
        assert_eq!(first, second);
        assert_eq!(
            fs::read_link(root.join("latest")).unwrap(),
            root.join("2024-02-15_10-30-00")
        );
    }

    #[test]
    fn test_repair_without_snapshots_leaves_latest_absent() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        fs::create_dir(root.join("not-a-snapshot")).unwrap();
        std::os::unix::fs::symlink(root.join("gone"), root.join("latest")).unwrap();

        let host = FakeHost::new();
        let runner = RetentionRunner::with_scheme(
            &host,
            SnapshotLayout::new(&root),
            &RotationScheme::default(),
        );

        assert_eq!(runner.repair_latest(), PointerState::Absent);
        assert!(fs::symlink_metadata(root.join("latest")).is_err());
        assert_eq!(runner.repair_latest(), PointerState::Absent);
    }

    #[test]
    fn test_repair_reports_unreadable_root() {
        let temp = TempDir::new().unwrap();
        let host = FakeHost::new();
        let runner = RetentionRunner::with_scheme(
            &host,
            SnapshotLayout::new(temp.path().join("unmounted")),
            &RotationScheme::default(),
        );
        assert!(matches!(
            runner.repair_latest(),
            PointerState::RepairFailed(_)
        ));
    }

    #[test]
    fn test_run_removes_and_relinks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        make_snapshots(
            &root,
            &[
                "2024-01-01_00-00-00",
                "2024-01-01_12-00-00",
                "2024-01-02_00-00-00",
            ],
        );

        let host = FakeHost::new();
        let scheme = RotationScheme {
            hourly: 0,
            daily: 5,
            weekly: 0,
            monthly: 0,
            yearly: 0,
            prefer_recent: false,
        };
        let runner = RetentionRunner::with_scheme(&host, SnapshotLayout::new(&root), &scheme);
        let report = runner.run().unwrap();

        // Ties favour the most recent snapshot of the day
        assert_eq!(report.removed, ids(&["2024-01-01_00-00-00"]));
        assert_eq!(
            report.kept,
            ids(&["2024-01-01_12-00-00", "2024-01-02_00-00-00"])
        );
        assert_eq!(
            report.latest,
            PointerState::Linked(snapshot("2024-01-02_00-00-00"))
        );
        assert!(!root.join("2024-01-01_00-00-00").exists());
    }

    #[test]
    fn test_run_repairs_latest_even_if_removal_fails() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        make_snapshots(&root, &["2024-01-01_00-00-00", "2024-01-02_00-00-00"]);

        let host = FakeHost::new();
        host.fail_when("2024-01-01_00-00-00");
        let nothing = RotationScheme {
            hourly: 0,
            daily: 0,
            weekly: 0,
            monthly: 0,
            yearly: 0,
            prefer_recent: true,
        };
        let runner = RetentionRunner::with_scheme(&host, SnapshotLayout::new(&root), &nothing);

        let err = runner.run().unwrap_err();
        assert!(matches!(err, BackupError::Retention(_)));
        assert_eq!(
            fs::read_link(root.join("latest")).unwrap(),
            root.join("2024-01-02_00-00-00")
        );
    }
}

//! Snapshot identifiers and on-disk layout

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use super::commands;
use super::{DUMP_FILE, LATEST_LINK};
use crate::error::{BackupError, BackupResult};
use crate::exec::{run_checked, CommandExecutor, ExecutionContext};

/// `strftime` pattern of a snapshot id
pub const SNAPSHOT_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Identifier of one snapshot: `YYYY-MM-DD_HH-MM-SS`
///
/// Ordering is chronological, which is also the lexicographic order of the
/// rendered ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(NaiveDateTime);

impl SnapshotId {
    /// Id for the current local wall-clock second
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Id for a given time, truncated to whole seconds
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// Parse an id; anything but an exact, valid `YYYY-MM-DD_HH-MM-SS` is rejected
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 19 || !s.is_ascii() {
            return None;
        }
        let at = NaiveDateTime::parse_from_str(s, SNAPSHOT_FORMAT).ok()?;
        let id = Self(at);
        // Reject non-padded forms chrono would otherwise accept
        (id.to_string() == s).then_some(id)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(SNAPSHOT_FORMAT))
    }
}

impl FromStr for SnapshotId {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| BackupError::snapshot_not_found(s))
    }
}

impl Serialize for SnapshotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SnapshotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid snapshot id: {}", s)))
    }
}

/// Paths under the backup root
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    root: PathBuf,
}

impl SnapshotLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn latest(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    pub fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn dump_file(&self, id: &SnapshotId) -> PathBuf {
        self.snapshot_dir(id).join(DUMP_FILE)
    }

    pub fn tree_dir(&self, id: &SnapshotId, tag: &str) -> PathBuf {
        self.snapshot_dir(id).join(tag)
    }
}

/// Snapshot ids among the directories of a `ls -1Ap` listing, ascending
///
/// Only directory entries (trailing `/`) count, so the `latest` symlink and
/// stray files are ignored.
pub fn parse_listing(output: &[u8]) -> Vec<SnapshotId> {
    let text = String::from_utf8_lossy(output);
    let mut ids: Vec<SnapshotId> = text
        .lines()
        .filter_map(|line| line.trim().strip_suffix('/'))
        .filter_map(SnapshotId::parse)
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// List the snapshots present under the backup root
pub fn list_snapshots(
    executor: &dyn CommandExecutor,
    layout: &SnapshotLayout,
) -> BackupResult<Vec<SnapshotId>> {
    let output = run_checked(
        executor,
        &commands::list_entries(layout.root()),
        ExecutionContext::Backup,
    )?;
    Ok(parse_listing(&output))
}

/// Point `latest` at `id`, replacing whatever was there
pub fn repoint_latest(
    executor: &dyn CommandExecutor,
    layout: &SnapshotLayout,
    id: &SnapshotId,
) -> BackupResult<()> {
    let latest = layout.latest();
    run_checked(executor, &commands::remove_tree(&latest), ExecutionContext::Backup)?;
    run_checked(
        executor,
        &commands::symlink(&layout.snapshot_dir(id), &latest),
        ExecutionContext::Backup,
    )?;
    info!(latest = %latest.display(), snapshot = %id, "latest pointer updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_format_and_parse() {
        let id = SnapshotId::from_datetime(at(2024, 2, 15, 10, 30, 0));
        assert_eq!(id.to_string(), "2024-02-15_10-30-00");
        assert_eq!(SnapshotId::parse("2024-02-15_10-30-00"), Some(id));
        assert_eq!(id.timestamp(), at(2024, 2, 15, 10, 30, 0));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "latest",
            "2024-02-15",
            "2024-02-15 10-30-00",
            "2024-2-15_10-30-00",
            "2024-02-30_10-30-00",
            "2024-02-15_10-30-00x",
            "x2024-02-15_10-30-0",
        ] {
            assert!(SnapshotId::parse(bad).is_none(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_now_has_whole_seconds() {
        let id = SnapshotId::now();
        assert_eq!(id.timestamp().nanosecond(), 0);
        assert_eq!(SnapshotId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_order_is_lexicographic() {
        let a = SnapshotId::parse("2024-01-01_00-00-00").unwrap();
        let b = SnapshotId::parse("2024-02-15_10-30-00").unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn test_parse_listing_filters_and_sorts() {
        let listing = b"2024-02-15_10-30-00/\nlatest\nlost+found/\n2024-01-01_00-00-00/\nnotes.txt\n2023-12-31_23-59-59\n";
        let ids = parse_listing(listing);
        let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(rendered, vec!["2024-01-01_00-00-00", "2024-02-15_10-30-00"]);
    }

    #[test]
    fn test_parse_listing_empty() {
        assert!(parse_listing(b"").is_empty());
        assert!(parse_listing(b"lost+found/\n.mounted\n").is_empty());
    }

    #[test]
    fn test_layout() {
        let layout = SnapshotLayout::new("/backup");
        let id = SnapshotId::parse("2024-01-01_00-00-00").unwrap();
        assert_eq!(layout.latest(), PathBuf::from("/backup/latest"));
        assert_eq!(
            layout.dump_file(&id),
            PathBuf::from("/backup/2024-01-01_00-00-00/backup.sql")
        );
        assert_eq!(
            layout.tree_dir(&id, "user_data"),
            PathBuf::from("/backup/2024-01-01_00-00-00/user_data")
        );
    }

    #[test]
    fn test_serde_as_string() {
        let id = SnapshotId::parse("2024-01-01_00-00-00").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"2024-01-01_00-00-00\"");
        let back: SnapshotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<SnapshotId>("\"latest\"").is_err());
    }
}

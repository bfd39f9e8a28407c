//! History record data structures

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backup::SnapshotId;

/// Kind of orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Backup,
    Restore,
    Clean,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Backup => write!(f, "backup"),
            RunKind::Restore => write!(f, "restore"),
            RunKind::Clean => write!(f, "clean"),
        }
    }
}

/// How a run ended; there is no partial success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Failure { message: String },
}

/// A single history entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,

    pub kind: RunKind,

    /// Snapshot created, restored from, or pointed to by `latest`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotId>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    pub outcome: RunOutcome,

    /// Tolerated failures (maintenance exit, refresh, notification)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RunRecord {
    /// A run that completed, finishing now
    pub fn success(
        kind: RunKind,
        started_at: DateTime<Utc>,
        snapshot: Option<SnapshotId>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            snapshot,
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Success,
            warnings,
        }
    }

    /// A run that failed, finishing now
    pub fn failure(
        kind: RunKind,
        started_at: DateTime<Utc>,
        snapshot: Option<SnapshotId>,
        error: &dyn fmt::Display,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            snapshot,
            started_at,
            finished_at: Utc::now(),
            outcome: RunOutcome::Failure {
                message: error.to_string(),
            },
            warnings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }
}

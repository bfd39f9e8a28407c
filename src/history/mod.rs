//! Run history for cloud-backup
//!
//! Every backup, restore and rotation run is recorded in an append-only
//! log so operators can see what ran, when, and how it ended.
//!
//! - `RunRecord`: one orchestration run with its outcome and warnings
//! - `HistoryLog`: line-delimited JSON (JSONL) file of records
//!
//! # Example
//!
//! ```rust,ignore
//! use cloud_backup::history::{HistoryLog, RunKind, RunRecord};
//!
//! let log = HistoryLog::new(paths.history_file());
//! let started = chrono::Utc::now();
//! let report = manager.create_backup(true)?;
//! log.record(&RunRecord::success(RunKind::Backup, started, Some(report.snapshot), report.warnings))?;
//! ```

mod log;
mod record;

pub use log::HistoryLog;
pub use record::{RunKind, RunOutcome, RunRecord};

//! CLI command handlers
//!
//! This module contains the implementation of CLI commands, bridging the
//! clap argument parsing with the orchestrators. Every orchestration run is
//! recorded in the history log and, when mail is enabled, reported by mail.

pub mod backup;
pub mod config;
pub mod history;
pub mod logging;
pub mod prompt;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::backup::SnapshotId;
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};
use crate::exec::CommandExecutor;
use crate::history::{HistoryLog, RunKind, RunRecord};
use crate::notify::{notifier_from_settings, notify_best_effort, Notifier};

pub use backup::{
    handle_backup, handle_clean, handle_list, handle_restore, handle_verify, RestoreFlags,
};
pub use config::handle_config;
pub use history::handle_history;
pub use logging::init_tracing;

/// What every handler needs for one invocation
pub struct Runtime<'a> {
    pub settings: &'a Settings,
    pub executor: &'a dyn CommandExecutor,
    pub history: &'a HistoryLog,
}

impl Runtime<'_> {
    /// Mail `subject`/`body` if enabled; a delivery failure comes back as a warning
    fn notify(&self, subject: &str, body: &str) -> Option<String> {
        let notifier = notifier_from_settings(&self.settings.mail, self.executor);
        notify_best_effort(
            notifier.as_ref().map(|n| n as &dyn Notifier),
            subject,
            body,
        )
    }

    fn record(&self, record: RunRecord) {
        if let Err(e) = self.history.record(&record) {
            warn!(error = %e, "run not recorded in history");
        }
    }

    /// Report and record a failed run, then hand the error back
    fn fail(
        &self,
        kind: RunKind,
        started: DateTime<Utc>,
        snapshot: Option<SnapshotId>,
        error: BackupError,
    ) -> BackupResult<()> {
        let subject = format!("{} failed", capitalize(&kind.to_string()));
        self.notify(&subject, &error.to_string());
        self.record(RunRecord::failure(kind, started, snapshot, &error));
        Err(error)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds();

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

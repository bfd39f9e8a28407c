//! Run history command

use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::format_duration;
use crate::error::BackupResult;
use crate::history::{HistoryLog, RunOutcome, RunRecord};

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "Started (UTC)")]
    started: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Snapshot")]
    snapshot: String,
    #[tabled(rename = "Took")]
    took: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
}

impl From<&RunRecord> for RunRow {
    fn from(record: &RunRecord) -> Self {
        let outcome = match &record.outcome {
            RunOutcome::Success if record.warnings.is_empty() => "ok".to_string(),
            RunOutcome::Success => format!("ok ({} warning(s))", record.warnings.len()),
            RunOutcome::Failure { message } => format!("FAILED: {}", message),
        };
        Self {
            started: record.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: record.kind.to_string(),
            snapshot: record
                .snapshot
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            took: format_duration(record.duration()),
            outcome,
        }
    }
}

/// Show the most recent runs
pub fn handle_history(log: &HistoryLog, limit: usize) -> BackupResult<()> {
    let records = log.read_recent(limit)?;
    if records.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    let rows: Vec<RunRow> = records.iter().map(RunRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    for record in records.iter().filter(|r| !r.warnings.is_empty()) {
        println!("{} {}:", record.kind, record.id);
        for warning in &record.warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

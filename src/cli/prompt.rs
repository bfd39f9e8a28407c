//! Interactive prompts
//!
//! Readers and writers are parameters so the prompts work on any stream.

use std::io::{BufRead, Write};

use crate::backup::SnapshotId;
use crate::error::{BackupError, BackupResult};

fn read_answer(input: &mut impl BufRead) -> BackupResult<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Print the numbered snapshots and read the chosen index
pub fn select_snapshot(
    backups: &[SnapshotId],
    mut input: impl BufRead,
    mut output: impl Write,
) -> BackupResult<SnapshotId> {
    if backups.is_empty() {
        return Err(BackupError::snapshot_not_found("any"));
    }
    for (i, id) in backups.iter().enumerate() {
        writeln!(output, "   #{}:    {}", i, id)?;
    }
    write!(output, "Enter backup to restore: ")?;
    output.flush()?;

    let answer = read_answer(&mut input)?;
    answer
        .parse::<usize>()
        .ok()
        .and_then(|index| backups.get(index))
        .copied()
        .ok_or_else(|| BackupError::Config(format!("Invalid selection: '{}'", answer)))
}

/// Ask a yes/no question; anything but `y`/`yes` is a no
pub fn confirm(question: &str, mut input: impl BufRead, mut output: impl Write) -> BackupResult<bool> {
    write!(output, "{} [y/N] ", question)?;
    output.flush()?;
    let answer = read_answer(&mut input)?.to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

//! Append-only run history file
//!
//! Each record is written as a single JSON line and flushed immediately.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

use super::record::RunRecord;

pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one record
    pub fn record(&self, record: &RunRecord) -> BackupResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BackupError::Io(format!("Failed to open history: {}", e)))?;

        let json = serde_json::to_string(record)
            .map_err(|e| BackupError::Json(format!("Failed to serialize run record: {}", e)))?;

        writeln!(file, "{}", json)
            .map_err(|e| BackupError::Io(format!("Failed to write run record: {}", e)))?;

        file.flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush history: {}", e)))?;

        Ok(())
    }

    /// All records, oldest first
    pub fn read_all(&self) -> BackupResult<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .map_err(|e| BackupError::Io(format!("Failed to open history: {}", e)))?;

        let mut records = Vec::new();
        for (line_num, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                BackupError::Io(format!("Failed to read history line {}: {}", line_num + 1, e))
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record: RunRecord = serde_json::from_str(&line).map_err(|e| {
                BackupError::Json(format!(
                    "Failed to parse run record at line {}: {}",
                    line_num + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// The most recent `count` records, oldest first
    pub fn read_recent(&self, count: usize) -> BackupResult<Vec<RunRecord>> {
        let mut records = self.read_all()?;
        let start = records.len().saturating_sub(count);
        Ok(records.split_off(start))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

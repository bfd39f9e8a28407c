//! Filesystem questions answered through the executor
//!
//! Probes never fail: an unreachable target is reported the same way as an
//! absent one, and an uncertain directory is reported as empty so callers
//! halt instead of proceeding.

use std::path::Path;

use tracing::debug;

use super::commands;
use crate::exec::{CommandExecutor, CommandSpec, ExecutionContext};

#[derive(Clone, Copy)]
pub struct FsProbe<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> FsProbe<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// True if `path` can be listed as a directory
    pub fn dir_exists(&self, path: &Path, context: ExecutionContext) -> bool {
        self.quiet(&commands::list_all(path), context).is_some()
    }

    /// True unless a listing proves at least one entry
    pub fn dir_empty(&self, path: &Path, context: ExecutionContext) -> bool {
        match self.quiet(&commands::list_all(path), context) {
            Some(listing) => listing.iter().all(u8::is_ascii_whitespace),
            None => true,
        }
    }

    /// True only if `path` is confirmed to be a regular file
    pub fn file_exists(&self, path: &Path, context: ExecutionContext) -> bool {
        self.quiet(&commands::is_regular_file(path), context).is_some()
    }

    /// Disk usage of a tree in bytes; 0 when it cannot be determined
    pub fn size_bytes(&self, path: &Path, context: ExecutionContext) -> u64 {
        self.quiet(&commands::disk_usage_bytes(path), context)
            .and_then(|out| first_token(&out))
            .and_then(|token| token.parse().ok())
            .unwrap_or(0)
    }

    /// Disk usage in `du -h` notation (e.g. `2.1G`)
    pub fn size_human(&self, path: &Path, context: ExecutionContext) -> String {
        self.quiet(&commands::disk_usage_human(path), context)
            .and_then(|out| first_token(&out))
            .unwrap_or_else(|| "unknown size".to_string())
    }

    fn quiet(&self, command: &CommandSpec, context: ExecutionContext) -> Option<Vec<u8>> {
        match self.executor.execute(command, context) {
            Ok(output) => Some(output),
            Err(e) => {
                debug!(%context, %command, error = %e, "probe negative");
                None
            }
        }
    }
}

fn first_token(output: &[u8]) -> Option<String> {
    String::from_utf8_lossy(output)
        .split_whitespace()
        .next()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use std::fs;
    use tempfile::TempDir;

    const CTX: ExecutionContext = ExecutionContext::Backup;

    #[test]
    fn test_dir_probes() {
        let temp = TempDir::new().unwrap();
        let host = FakeHost::new();
        let probe = FsProbe::new(&host);

        let empty = temp.path().join("empty");
        let full = temp.path().join("full");
        fs::create_dir(&empty).unwrap();
        fs::create_dir(&full).unwrap();
        fs::write(full.join(".hidden"), "x").unwrap();

        assert!(probe.dir_exists(&empty, CTX));
        assert!(probe.dir_empty(&empty, CTX));
        assert!(probe.dir_exists(&full, CTX));
        assert!(!probe.dir_empty(&full, CTX));

        let missing = temp.path().join("missing");
        assert!(!probe.dir_exists(&missing, CTX));
        assert!(probe.dir_empty(&missing, CTX));
    }

    #[test]
    fn test_unreachable_target_degrades() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("f"), "x").unwrap();
        let host = FakeHost::new();
        host.fail_when("ls");
        host.fail_when("test");
        host.fail_when("du");
        let probe = FsProbe::new(&host);

        assert!(!probe.dir_exists(temp.path(), CTX));
        assert!(probe.dir_empty(temp.path(), CTX));
        assert!(!probe.file_exists(&temp.path().join("f"), CTX));
        assert_eq!(probe.size_bytes(temp.path(), CTX), 0);
        assert_eq!(probe.size_human(temp.path(), CTX), "unknown size");
    }

    #[test]
    fn test_file_exists_requires_regular_file() {
        let temp = TempDir::new().unwrap();
        let host = FakeHost::new();
        let probe = FsProbe::new(&host);
        fs::write(temp.path().join("backup.sql"), "--").unwrap();

        assert!(probe.file_exists(&temp.path().join("backup.sql"), CTX));
        assert!(!probe.file_exists(temp.path(), CTX));
        assert!(!probe.file_exists(&temp.path().join("nope"), CTX));
    }

    #[test]
    fn test_sizes() {
        let temp = TempDir::new().unwrap();
        let host = FakeHost::new();
        let probe = FsProbe::new(&host);
        fs::write(temp.path().join("a"), vec![0u8; 1500]).unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub").join("b"), vec![0u8; 500]).unwrap();

        assert_eq!(probe.size_bytes(temp.path(), CTX), 2000);
        assert_eq!(probe.size_human(temp.path(), CTX), "2K");
    }

    #[test]
    fn test_first_token() {
        assert_eq!(first_token(b"4096\t/backup/x\n"), Some("4096".to_string()));
        assert_eq!(first_token(b"  \n"), None);
    }
}

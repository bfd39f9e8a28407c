//! Test doubles
//!
//! `FakeHost` plays every execution context at once: it interprets the
//! small tool vocabulary the orchestrators use against the real filesystem
//! (normally a `TempDir`), records each call, and fails any command whose
//! rendered form contains a registered needle.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::backup::SnapshotId;
use crate::config::settings::{Settings, SourceDir};
use crate::exec::{CommandExecutor, CommandSpec, ExecutionContext, ExecutionError, Input};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub context: ExecutionContext,
    pub rendered: String,
}

#[derive(Default)]
pub(crate) struct FakeHost {
    calls: RefCell<Vec<Call>>,
    failures: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Number of recorded calls whose rendered form contains `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.rendered.contains(needle))
            .count()
    }

    pub fn fail_when(&self, needle: &str) {
        self.failures.borrow_mut().push(needle.to_string());
    }
}

impl CommandExecutor for FakeHost {
    fn execute(
        &self,
        command: &CommandSpec,
        context: ExecutionContext,
    ) -> Result<Vec<u8>, ExecutionError> {
        let rendered = command.to_string();
        self.calls.borrow_mut().push(Call {
            context,
            rendered: rendered.clone(),
        });

        if let Some(needle) = self
            .failures
            .borrow()
            .iter()
            .find(|n| rendered.contains(n.as_str()))
        {
            return Err(exit(1, &format!("induced failure ({})", needle)));
        }

        let args = command.get_args();
        let output = match command.program() {
            "ls" => ls(args)?,
            "test" => test_file(args)?,
            "du" => du(args)?,
            "mkdir" => {
                fs::create_dir_all(last(args))?;
                Vec::new()
            }
            "rm" => {
                remove(Path::new(last(args)))?;
                Vec::new()
            }
            "ln" => link(args)?,
            "rsync" => rsync(args)?,
            "mysqldump" => {
                format!("-- dump of {}\nCREATE TABLE t (id INT);\n", last(args)).into_bytes()
            }
            "mysql" => mysql(command)?,
            _ => Vec::new(),
        };

        match command.get_stdout_file() {
            Some(path) => {
                fs::write(path, &output)?;
                Ok(Vec::new())
            }
            None => Ok(output),
        }
    }
}

fn exit(code: i32, stderr: &str) -> ExecutionError {
    ExecutionError::NonZeroExit {
        code: Some(code),
        stderr: stderr.to_string(),
    }
}

fn last(args: &[String]) -> &str {
    args.last().map(String::as_str).unwrap_or("")
}

fn ls(args: &[String]) -> Result<Vec<u8>, ExecutionError> {
    let mark_dirs = args.first().is_some_and(|flags| flags.contains('p'));
    let dir = Path::new(last(args));
    let entries = fs::read_dir(dir).map_err(|e| exit(2, &e.to_string()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().to_string();
        if mark_dirs && entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut out = names.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Ok(out.into_bytes())
}

fn test_file(args: &[String]) -> Result<Vec<u8>, ExecutionError> {
    if fs::metadata(last(args)).map(|m| m.is_file()).unwrap_or(false) {
        Ok(Vec::new())
    } else {
        Err(exit(1, ""))
    }
}

fn tree_size(path: &Path) -> io::Result<u64> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_dir() {
        return Ok(if meta.is_file() { meta.len() } else { 0 });
    }
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        total += tree_size(&entry?.path())?;
    }
    Ok(total)
}

fn du(args: &[String]) -> Result<Vec<u8>, ExecutionError> {
    let path = last(args);
    let bytes = fs::metadata(path)
        .and_then(|_| tree_size(Path::new(path)))
        .map_err(|e| exit(1, &e.to_string()))?;
    let size = if args.iter().any(|a| a == "--bytes") {
        bytes.to_string()
    } else {
        format!("{}K", bytes.div_ceil(1024))
    };
    Ok(format!("{}\t{}\n", size, path).into_bytes())
}

fn remove(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn link(args: &[String]) -> Result<Vec<u8>, ExecutionError> {
    let [_, target, link] = args else {
        return Err(exit(1, "usage: ln -s target link"));
    };
    if fs::symlink_metadata(link).is_ok() {
        return Err(exit(1, "File exists"));
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(Vec::new())
}

struct Transfer {
    delete: bool,
    excludes: Vec<String>,
    link_dest: Option<PathBuf>,
}

fn rsync(args: &[String]) -> Result<Vec<u8>, ExecutionError> {
    let mut transfer = Transfer {
        delete: false,
        excludes: Vec::new(),
        link_dest: None,
    };
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-az" => {}
            "--delete" => transfer.delete = true,
            "--exclude" => transfer.excludes.extend(iter.next().cloned()),
            "--link-dest" => transfer.link_dest = iter.next().map(PathBuf::from),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let [source, target] = positional.as_slice() else {
        return Err(exit(1, "usage: rsync [options] source target"));
    };
    if !source.is_dir() {
        return Err(exit(23, "change_dir failed: No such file or directory"));
    }
    copy_tree(source, target, Path::new(""), &transfer)?;
    Ok(Vec::new())
}

fn copy_tree(source: &Path, target: &Path, rel: &Path, transfer: &Transfer) -> io::Result<()> {
    let excluded = |rel: &Path| {
        let anchored = format!("/{}", rel.to_string_lossy());
        transfer.excludes.contains(&anchored)
    };

    fs::create_dir_all(target.join(rel))?;
    let mut seen = Vec::new();
    for entry in fs::read_dir(source.join(rel))? {
        let entry = entry?;
        let rel = rel.join(entry.file_name());
        seen.push(entry.file_name());
        if excluded(&rel) {
            continue;
        }

        let file_type = entry.file_type()?;
        let destination = target.join(&rel);
        if file_type.is_dir() {
            copy_tree(source, target, &rel, transfer)?;
        } else if file_type.is_file() {
            remove(&destination)?;
            let content = fs::read(entry.path())?;
            let base = transfer.link_dest.as_ref().map(|b| b.join(&rel));
            match base {
                Some(base) if fs::read(&base).ok().as_deref() == Some(content.as_slice()) => {
                    fs::hard_link(&base, &destination)?;
                }
                _ => fs::write(&destination, &content)?,
            }
        }
    }

    if transfer.delete {
        for entry in fs::read_dir(target.join(rel))? {
            let entry = entry?;
            if !seen.contains(&entry.file_name()) && !excluded(&rel.join(entry.file_name())) {
                remove(&entry.path())?;
            }
        }
    }
    Ok(())
}

fn mysql(command: &CommandSpec) -> Result<Vec<u8>, ExecutionError> {
    match command.get_stdin() {
        Some(Input::File(path)) if !path.is_file() => {
            Err(exit(1, &format!("{}: No such file or directory", path.display())))
        }
        _ => Ok(Vec::new()),
    }
}

/// Parse a snapshot id known to be valid
pub(crate) fn snapshot(name: &str) -> SnapshotId {
    SnapshotId::parse(name).expect("valid snapshot id")
}

/// A live `data` tree and a mounted backup root inside one temporary dir
pub(crate) struct Scenario {
    _temp: TempDir,
    root: PathBuf,
    pub settings: Settings,
}

impl Scenario {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path().to_path_buf();

        let data = root.join("live").join("data");
        fs::create_dir_all(&data).expect("data dir");
        fs::write(data.join("file.txt"), "hello").expect("data file");

        let backup = root.join("backup");
        fs::create_dir_all(&backup).expect("backup dir");
        fs::write(backup.join(".mounted"), "").expect("mount marker");

        let mut settings = Settings::default();
        settings.sources = vec![SourceDir::new("data", &data)];
        settings.backup_dir = backup;
        settings.restore.safety_backup = false;

        Self {
            _temp: temp,
            root,
            settings,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("live").join("data")
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join("backup")
    }

    /// Target of the `latest` symlink, if there is one
    pub fn latest_target(&self) -> Option<PathBuf> {
        fs::read_link(self.backup_root().join("latest")).ok()
    }
}

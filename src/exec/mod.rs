//! Command execution
//!
//! Every domain action (dump, mirror, listing, maintenance toggle) is a
//! [`CommandSpec`] handed to a [`CommandExecutor`] together with the
//! [`ExecutionContext`] it must run in. Commands are argument vectors, so
//! paths and credentials are never spliced into a shell string.

mod system;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::secret::SecretString;
use crate::error::{BackupError, BackupResult};

pub use system::{redirect_script, ContextTarget, SystemExecutor};

/// Where a command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// The host running this tool
    Local,
    /// The host (or container) that sees both the live trees and the backup volume
    Backup,
    /// The host (or container) running the application
    Application,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Backup => "backup",
            Self::Application => "application",
        };
        f.write_str(name)
    }
}

/// Standard input for a command
#[derive(Debug, Clone)]
pub enum Input {
    /// Read from a file in the executing context
    File(PathBuf),
    /// Feed in-memory bytes
    Bytes(Vec<u8>),
}

/// A command as an argument vector plus its redirections
#[derive(Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    /// Indices into `args` that are masked when printed
    redacted: Vec<usize>,
    env: Vec<(String, SecretString)>,
    stdin: Option<Input>,
    stdout_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redacted: Vec::new(),
            env: Vec::new(),
            stdin: None,
            stdout_file: None,
        }
    }

    /// Build a command from a configured argument vector (`["occ", "--on"]`)
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args))
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().to_string();
        self.arg(arg)
    }

    /// An argument that must never be printed
    pub fn secret_arg(mut self, value: &SecretString) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(value.expose().to_string());
        self
    }

    /// Pass a value through the environment; it is redacted when printed
    pub fn env(mut self, name: impl Into<String>, value: SecretString) -> Self {
        self.env.push((name.into(), value));
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(Input::File(path.into()));
        self
    }

    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(Input::Bytes(bytes.into()));
        self
    }

    pub fn stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &[(String, SecretString)] {
        &self.env
    }

    pub fn get_stdin(&self) -> Option<&Input> {
        self.stdin.as_ref()
    }

    pub fn get_stdout_file(&self) -> Option<&Path> {
        self.stdout_file.as_deref()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, _) in &self.env {
            write!(f, "{}=*** ", name)?;
        }
        f.write_str(&self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&i) {
                f.write_str(" ***")?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if let Some(Input::File(path)) = &self.stdin {
            write!(f, " < {}", path.display())?;
        }
        if let Some(path) = &self.stdout_file {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandSpec({})", self)
    }
}

/// Failure reported by an executor
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The program could not be started (missing tool, bad container)
    #[error("failed to start `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    /// The program ran and exited unsuccessfully
    #[error("{}", exit_message(.code, .stderr))]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Redirection or pipe handling failed
    #[error("I/O error: {0}")]
    Io(String),
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        format!("{}: {}", status, stderr)
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl ExecutionError {
    /// Attach the command and its context, producing a fatal orchestration error
    pub fn into_command_error(self, context: ExecutionContext, spec: &CommandSpec) -> BackupError {
        BackupError::Command {
            context,
            command: spec.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Runs commands inside an execution context
///
/// Returns captured standard output. Output redirected to a file yields an
/// empty buffer.
pub trait CommandExecutor {
    fn execute(
        &self,
        command: &CommandSpec,
        context: ExecutionContext,
    ) -> Result<Vec<u8>, ExecutionError>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &T {
    fn execute(
        &self,
        command: &CommandSpec,
        context: ExecutionContext,
    ) -> Result<Vec<u8>, ExecutionError> {
        (**self).execute(command, context)
    }
}

/// Run a command whose failure must abort the current orchestration
pub fn run_checked(
    executor: &dyn CommandExecutor,
    command: &CommandSpec,
    context: ExecutionContext,
) -> BackupResult<Vec<u8>> {
    debug!(%context, %command, "running");
    executor
        .execute(command, context)
        .map_err(|e| e.into_command_error(context, command))
}

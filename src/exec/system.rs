//! Process-backed executor
//!
//! Runs commands on this host, or inside a docker container through
//! `docker exec` when a context is mapped to one.

use std::fs::File;
use std::io::Write;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use super::{CommandExecutor, CommandSpec, ExecutionContext, ExecutionError, Input};

/// Where an execution context is realised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContextTarget {
    /// Run directly on this host
    #[default]
    Local,
    /// Run inside a running docker container
    Container { name: String },
}

/// Executor that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    backup: ContextTarget,
    application: ContextTarget,
}

impl SystemExecutor {
    pub fn new(backup: ContextTarget, application: ContextTarget) -> Self {
        Self {
            backup,
            application,
        }
    }

    fn target_for(&self, context: ExecutionContext) -> &ContextTarget {
        const LOCAL: &ContextTarget = &ContextTarget::Local;
        match context {
            ExecutionContext::Local => LOCAL,
            ExecutionContext::Backup => &self.backup,
            ExecutionContext::Application => &self.application,
        }
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(
        &self,
        spec: &CommandSpec,
        context: ExecutionContext,
    ) -> Result<Vec<u8>, ExecutionError> {
        let mut command = match self.target_for(context) {
            ContextTarget::Local => local_command(spec)?,
            ContextTarget::Container { name } => container_command(spec, name),
        };

        let feed = match spec.get_stdin() {
            Some(Input::Bytes(bytes)) => {
                command.stdin(Stdio::piped());
                Some(bytes.as_slice())
            }
            _ => None,
        };
        command.stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| ExecutionError::Spawn {
            program: spec.program().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(bytes) = feed {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes)?;
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

fn local_command(spec: &CommandSpec) -> Result<Command, ExecutionError> {
    let mut command = Command::new(spec.program());
    command.args(spec.get_args());
    for (name, value) in spec.get_env() {
        command.env(name, value.expose());
    }

    match spec.get_stdin() {
        Some(Input::File(path)) => {
            let file = File::open(path).map_err(|e| {
                ExecutionError::Io(format!("cannot open {}: {}", path.display(), e))
            })?;
            command.stdin(Stdio::from(file));
        }
        Some(Input::Bytes(_)) => {}
        None => {
            command.stdin(Stdio::null());
        }
    }

    match spec.get_stdout_file() {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                ExecutionError::Io(format!("cannot create {}: {}", path.display(), e))
            })?;
            command.stdout(Stdio::from(file));
        }
        None => {
            command.stdout(Stdio::piped());
        }
    }

    Ok(command)
}

fn container_command(spec: &CommandSpec, container: &str) -> Command {
    let mut command = Command::new("docker");
    command.arg("exec");
    if matches!(spec.get_stdin(), Some(Input::Bytes(_))) {
        command.arg("-i");
    } else {
        command.stdin(Stdio::null());
    }

    // Values travel through the docker client's environment, not argv.
    for (name, value) in spec.get_env() {
        command.arg("-e").arg(name);
        command.env(name, value.expose());
    }
    command.arg(container);

    let (script, positional) = redirect_script(spec);
    if let Some(script) = script {
        command.arg("sh").arg("-c").arg(script).arg("sh");
        command.args(positional);
    }

    command.arg(spec.program()).args(spec.get_args());
    command.stdout(Stdio::piped());
    command
}

/// Shell wrapper for redirections performed inside a container
///
/// The script text is fixed; file names arrive as positional parameters
/// ahead of the command words. Returns `None` when no redirection is needed.
pub fn redirect_script(spec: &CommandSpec) -> (Option<String>, Vec<String>) {
    let stdout = spec.get_stdout_file();
    let stdin = match spec.get_stdin() {
        Some(Input::File(path)) => Some(path.as_path()),
        _ => None,
    };
    if stdout.is_none() && stdin.is_none() {
        return (None, Vec::new());
    }

    let mut script = String::new();
    let mut positional = Vec::new();
    if let Some(path) = stdout {
        script.push_str("out=\"$1\"; shift; ");
        positional.push(path.to_string_lossy().to_string());
    }
    if let Some(path) = stdin {
        script.push_str("in=\"$1\"; shift; ");
        positional.push(path.to_string_lossy().to_string());
    }
    script.push_str("exec \"$@\"");
    if stdout.is_some() {
        script.push_str(" > \"$out\"");
    }
    if stdin.is_some() {
        script.push_str(" < \"$in\"");
    }

    (Some(script), positional)
}

//! Maintenance gate
//!
//! Suspends write availability of the application around a critical
//! section and restores it afterwards, whatever happened inside.

use std::time::Duration;

use tracing::{error, info};

use crate::config::settings::GateSettings;
use crate::error::{BackupError, BackupResult};
use crate::exec::{run_checked, CommandExecutor, CommandSpec, ExecutionContext};

/// Toggles write availability of the application
pub trait MaintenanceGate {
    /// Stop accepting writes
    fn enter(&self) -> BackupResult<()>;

    /// Accept writes again
    fn exit(&self) -> BackupResult<()>;

    /// Whether the application keeps serving while the gate is held
    fn keeps_application_running(&self) -> bool;
}

/// Maintenance mode on/off; the application stays up and rejects writes
pub struct SoftGate<'a> {
    executor: &'a dyn CommandExecutor,
    enter: CommandSpec,
    exit: CommandSpec,
}

impl<'a> SoftGate<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, enter: CommandSpec, exit: CommandSpec) -> Self {
        Self {
            executor,
            enter,
            exit,
        }
    }
}

impl MaintenanceGate for SoftGate<'_> {
    fn enter(&self) -> BackupResult<()> {
        info!("activating maintenance mode");
        run_checked(self.executor, &self.enter, ExecutionContext::Application).map(|_| ())
    }

    fn exit(&self) -> BackupResult<()> {
        info!("deactivating maintenance mode");
        run_checked(self.executor, &self.exit, ExecutionContext::Application).map(|_| ())
    }

    fn keeps_application_running(&self) -> bool {
        true
    }
}

/// Full stop and restart of the application
pub struct HardGate<'a> {
    executor: &'a dyn CommandExecutor,
    stop: CommandSpec,
    start: CommandSpec,
    settle: Duration,
}

impl<'a> HardGate<'a> {
    pub fn new(
        executor: &'a dyn CommandExecutor,
        stop: CommandSpec,
        start: CommandSpec,
        settle: Duration,
    ) -> Self {
        Self {
            executor,
            stop,
            start,
            settle,
        }
    }
}

impl MaintenanceGate for HardGate<'_> {
    fn enter(&self) -> BackupResult<()> {
        info!("stopping application");
        run_checked(self.executor, &self.stop, ExecutionContext::Local).map(|_| ())
    }

    fn exit(&self) -> BackupResult<()> {
        info!("starting application");
        run_checked(self.executor, &self.start, ExecutionContext::Local)?;
        if !self.settle.is_zero() {
            info!(seconds = self.settle.as_secs(), "waiting for application to settle");
            std::thread::sleep(self.settle);
        }
        Ok(())
    }

    fn keeps_application_running(&self) -> bool {
        false
    }
}

/// Build the configured gate
pub fn gate_from_settings<'a>(
    settings: &GateSettings,
    executor: &'a dyn CommandExecutor,
) -> BackupResult<Box<dyn MaintenanceGate + 'a>> {
    let command = |argv: &[String], what: &str| {
        CommandSpec::from_argv(argv)
            .ok_or_else(|| BackupError::Config(format!("{} command not set", what)))
    };

    let gate: Box<dyn MaintenanceGate + 'a> = match settings {
        GateSettings::Soft { enter, exit } => Box::new(SoftGate::new(
            executor,
            command(enter, "Maintenance enter")?,
            command(exit, "Maintenance exit")?,
        )),
        GateSettings::Hard {
            stop,
            start,
            settle_secs,
        } => Box::new(HardGate::new(
            executor,
            command(stop, "Application stop")?,
            command(start, "Application start")?,
            Duration::from_secs(*settle_secs),
        )),
    };
    Ok(gate)
}

/// Outcome of a gated critical section
///
/// `outcome` is the result of the section itself; `release` is the result
/// of leaving maintenance and never replaces `outcome`.
#[must_use]
pub struct Gated<T> {
    pub outcome: BackupResult<T>,
    pub release: BackupResult<()>,
}

/// Leaves maintenance if the section unwinds before the normal release
struct ReleaseOnDrop<'g> {
    gate: &'g dyn MaintenanceGate,
    armed: bool,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.gate.exit() {
                error!(error = %e, "failed to leave maintenance while unwinding");
            }
        }
    }
}

/// Run `body` with the gate held
///
/// The gate is released exactly once for every entry attempt, including
/// when entering itself fails and when `body` fails or panics.
pub fn run_gated<T, F>(gate: &dyn MaintenanceGate, body: F) -> Gated<T>
where
    F: FnOnce() -> BackupResult<T>,
{
    let mut guard = ReleaseOnDrop { gate, armed: true };

    let outcome = match gate.enter() {
        Ok(()) => body(),
        Err(e) => {
            error!(error = %e, "failed to enter maintenance");
            Err(e)
        }
    };

    guard.armed = false;
    let release = gate.exit();
    if let Err(e) = &release {
        error!(error = %e, "failed to leave maintenance");
    }

    Gated { outcome, release }
}

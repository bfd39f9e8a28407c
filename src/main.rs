use anyhow::Result;
use clap::{Parser, Subcommand};

use cloud_backup::cli::{
    handle_backup, handle_clean, handle_config, handle_history, handle_list, handle_restore,
    handle_verify, init_tracing, RestoreFlags, Runtime,
};
use cloud_backup::config::{BackupPaths, SecretString, Settings};
use cloud_backup::exec::SystemExecutor;
use cloud_backup::history::HistoryLog;

#[derive(Parser)]
#[command(
    name = "cloud-backup",
    version,
    about = "Consistent backups of a self-hosted cloud: database dump plus data trees",
    long_about = "cloud-backup puts the application into maintenance, dumps its MySQL \
                  database, captures its data directories with rsync (optionally \
                  hard-linked against the previous snapshot), verifies the result and \
                  always leaves maintenance again. It also restores snapshots and \
                  rotates old ones."
)]
struct Cli {
    /// Log every issued command
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Prompt for the database password instead of reading MYSQL_PASSWORD
    #[arg(long, global = true)]
    ask_password: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new backup
    Backup {
        /// Hard-link files unchanged since the latest backup
        #[arg(short, long)]
        incremental: bool,
    },

    /// Restore a backup (asks which one if none is given)
    Restore {
        /// Snapshot id, path, or 'latest'
        snapshot: Option<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,

        /// Do not back up the live state first, even if configured
        #[arg(long)]
        no_safety_backup: bool,
    },

    /// Delete old backups according to the rotation scheme and repair 'latest'
    Clean,

    /// List all available backups
    List,

    /// Check that a backup is complete
    Verify {
        /// Snapshot id, path, or 'latest'
        snapshot: String,
    },

    /// Show recent backup, restore and clean runs
    History {
        /// Number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let paths = BackupPaths::new()?;
    paths.ensure_directories()?;
    let mut settings = Settings::resolve(&paths)?;
    if cli.ask_password {
        settings.database.password =
            SecretString::new(rpassword::prompt_password("Database password: ")?);
    }

    let Some(command) = cli.command else {
        println!("cloud-backup - consistent backups of a self-hosted cloud");
        println!();
        println!("Run 'cloud-backup --help' for usage information.");
        return Ok(());
    };

    if let Commands::Config = command {
        handle_config(&paths, &settings);
        return Ok(());
    }
    let history = HistoryLog::new(paths.history_file());
    if let Commands::History { limit } = command {
        handle_history(&history, limit)?;
        return Ok(());
    }

    settings.log_effective();
    let executor = SystemExecutor::new(
        settings.contexts.backup.clone(),
        settings.contexts.application.clone(),
    );
    let rt = Runtime {
        settings: &settings,
        executor: &executor,
        history: &history,
    };

    match command {
        Commands::Backup { incremental } => handle_backup(&rt, incremental)?,
        Commands::Restore {
            snapshot,
            force,
            no_safety_backup,
        } => handle_restore(
            &rt,
            snapshot.as_deref(),
            RestoreFlags {
                force,
                no_safety_backup,
            },
        )?,
        Commands::Clean => handle_clean(&rt)?,
        Commands::List => handle_list(&rt)?,
        Commands::Verify { snapshot } => handle_verify(&rt, &snapshot)?,
        Commands::History { .. } | Commands::Config => {}
    }

    Ok(())
}

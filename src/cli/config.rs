//! Configuration display command

use crate::config::paths::BackupPaths;
use crate::config::settings::{GateSettings, Settings};
use crate::exec::ContextTarget;

fn describe_target(target: &ContextTarget) -> String {
    match target {
        ContextTarget::Local => "local".to_string(),
        ContextTarget::Container { name } => format!("container '{}'", name),
    }
}

fn describe_gate(gate: &GateSettings) -> String {
    match gate {
        GateSettings::Soft { enter, exit } => {
            format!("soft (on: `{}`, off: `{}`)", enter.join(" "), exit.join(" "))
        }
        GateSettings::Hard {
            stop,
            start,
            settle_secs,
        } => format!(
            "hard (stop: `{}`, start: `{}`, settle {}s)",
            stop.join(" "),
            start.join(" "),
            settle_secs
        ),
    }
}

/// Show effective configuration; secrets are only reported as set or unset
pub fn handle_config(paths: &BackupPaths, settings: &Settings) {
    let set = |empty: bool| if empty { "unset" } else { "set" };

    println!("Cloud Backup Configuration");
    println!("==========================");
    println!("Config directory: {}", paths.base_dir().display());
    println!("Settings file:    {}", paths.settings_file().display());
    println!("Rotation file:    {}", paths.rotation_file().display());
    println!("History file:     {}", paths.history_file().display());
    println!();
    println!("Backup directory: {}", settings.backup_dir.display());
    println!("Sources:");
    for source in &settings.sources {
        println!("  {:<10} {}", source.tag, source.path.display());
    }
    println!();
    println!("Database:");
    println!("  Host:     {}", settings.database.host);
    println!("  User:     {}", settings.database.user);
    println!("  Name:     {}", settings.database.name);
    println!("  Password: {}", set(settings.database.password.is_empty()));
    println!();
    println!("Backup context:      {}", describe_target(&settings.contexts.backup));
    println!("Application context: {}", describe_target(&settings.contexts.application));
    println!("Maintenance:         {}", describe_gate(&settings.maintenance));
    println!(
        "Safety backup:       {}",
        if settings.restore.safety_backup { "yes" } else { "no" }
    );
    let rotation = &settings.rotation;
    println!(
        "Rotation:            {} hourly, {} daily, {} weekly, {} monthly, {} yearly",
        rotation.hourly, rotation.daily, rotation.weekly, rotation.monthly, rotation.yearly
    );
    if settings.mail.enabled {
        println!(
            "Mail:                {}:{} -> {} (password {})",
            settings.mail.host,
            settings.mail.port,
            settings.mail.to.join(", "),
            set(settings.mail.password.is_empty())
        );
    } else {
        println!("Mail:                disabled");
    }
}

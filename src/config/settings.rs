//! Settings for cloud-backup
//!
//! One immutable structure describing what to back up, where to put it,
//! how to reach the database and how to quiesce the application. Loaded
//! from `config.json`, then overridden by `rotation.yaml` and by the
//! environment variables the deployment exports.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::paths::BackupPaths;
use super::secret::SecretString;
use crate::backup::RotationScheme;
use crate::error::{BackupError, BackupResult};
use crate::exec::ContextTarget;

/// Tag of the primary data tree
pub const PRIMARY_TAG: &str = "data";
/// Tag of the optional user data tree
pub const USER_DATA_TAG: &str = "user_data";

/// A directory tree that is captured into `{snapshot}/{tag}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDir {
    /// Subdirectory name inside a snapshot
    pub tag: String,
    /// Live location in the backup context
    pub path: PathBuf,
}

impl SourceDir {
    pub fn new(tag: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            tag: tag.into(),
            path: path.into(),
        }
    }
}

/// Database connection credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: SecretString,
    #[serde(default = "default_db_name")]
    pub name: String,
}

fn default_db_host() -> String {
    "db".to_string()
}

fn default_db_user() -> String {
    "nextcloud".to_string()
}

fn default_db_name() -> String {
    "nextcloud".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            user: default_db_user(),
            password: SecretString::default(),
            name: default_db_name(),
        }
    }
}

/// Where the backup and application contexts run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub backup: ContextTarget,
    #[serde(default = "default_application_target")]
    pub application: ContextTarget,
}

fn default_application_target() -> ContextTarget {
    ContextTarget::Container {
        name: "nextcloud".to_string(),
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            backup: ContextTarget::Local,
            application: default_application_target(),
        }
    }
}

/// How write availability is suspended around a critical section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GateSettings {
    /// Toggle maintenance mode; commands run in the application context
    Soft {
        enter: Vec<String>,
        exit: Vec<String>,
    },
    /// Stop and start the application; commands run locally
    Hard {
        stop: Vec<String>,
        start: Vec<String>,
        #[serde(default = "default_settle_secs")]
        settle_secs: u64,
    },
}

fn default_settle_secs() -> u64 {
    10
}

fn occ(args: &[&str]) -> Vec<String> {
    ["sudo", "-u", "www-data", "php", "./occ"]
        .iter()
        .chain(args)
        .map(|s| s.to_string())
        .collect()
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::Soft {
            enter: occ(&["maintenance:mode", "--on"]),
            exit: occ(&["maintenance:mode", "--off"]),
        }
    }
}

/// Restore behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSettings {
    /// Take a backup of the current state before restoring
    #[serde(default = "default_true")]
    pub safety_backup: bool,
    /// Commands that make the application pick up replaced state
    #[serde(default = "default_refresh")]
    pub refresh: Vec<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_refresh() -> Vec<Vec<String>> {
    vec![occ(&["maintenance:data-fingerprint"])]
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            safety_backup: true,
            refresh: default_refresh(),
        }
    }
}

/// Mail notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub password: SecretString,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Cloud Backup".to_string()
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_smtp_port(),
            from: String::new(),
            password: SecretString::default(),
            to: Vec::new(),
            subject: default_subject(),
        }
    }
}

/// Settings for cloud-backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Ordered source trees; the first one is the primary tree
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDir>,

    /// Root of the backup volume
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub contexts: ContextSettings,

    #[serde(default)]
    pub maintenance: GateSettings,

    #[serde(default)]
    pub restore: RestoreSettings,

    #[serde(default)]
    pub rotation: RotationScheme,

    #[serde(default)]
    pub mail: MailSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_sources() -> Vec<SourceDir> {
    vec![SourceDir::new(PRIMARY_TAG, "/mnt/data")]
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/mnt/backup")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            sources: default_sources(),
            backup_dir: default_backup_dir(),
            database: DatabaseSettings::default(),
            contexts: ContextSettings::default(),
            maintenance: GateSettings::default(),
            restore: RestoreSettings::default(),
            rotation: RotationScheme::default(),
            mail: MailSettings::default(),
        }
    }
}

impl Settings {
    /// Load, apply every override layer, and validate
    pub fn resolve(paths: &BackupPaths) -> BackupResult<Self> {
        let mut settings = Self::load_or_init(paths)?;
        settings.apply_rotation_file(&paths.rotation_file())?;
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &BackupPaths) -> BackupResult<Self> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                BackupError::Io(format!("Failed to read settings file: {}", e))
            })?;

            serde_json::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse settings file: {}", e))
            })
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Like `load_or_create`, but writes the defaults on first run so the
    /// operator has a file to edit
    ///
    /// Runs before the environment overrides, so nothing from the
    /// environment (passwords included) is persisted.
    pub fn load_or_init(paths: &BackupPaths) -> BackupResult<Self> {
        let settings = Self::load_or_create(paths)?;
        if !paths.settings_file().exists() {
            settings.save(paths)?;
            info!(path = %paths.settings_file().display(), "wrote default settings");
        }
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &BackupPaths) -> BackupResult<()> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            BackupError::Config(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents).map_err(|e| {
            BackupError::Io(format!("Failed to write settings file: {}", e))
        })
    }

    /// Replace the rotation scheme with the YAML file at `path`, if present
    pub fn apply_rotation_file(&mut self, path: &Path) -> BackupResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Io(format!("Failed to read rotation file: {}", e))
        })?;
        self.rotation = serde_yaml::from_str(&contents)?;
        Ok(())
    }

    /// Override values from environment variables
    ///
    /// `lookup` returns the value of a variable if it is set.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> BackupResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DATA_DIR") {
            self.set_source(PRIMARY_TAG, path);
        }
        if let Some(path) = lookup("USER_DATA_DIR") {
            self.set_source(USER_DATA_TAG, path);
        }
        if let Some(path) = lookup("BACKUP_DIR") {
            self.backup_dir = PathBuf::from(path);
        }

        if let Some(host) = lookup("MYSQL_HOST") {
            self.database.host = host;
        }
        if let Some(user) = lookup("MYSQL_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("MYSQL_PASSWORD") {
            self.database.password = SecretString::new(password);
        }
        if let Some(name) = lookup("MYSQL_DATABASE") {
            self.database.name = name;
        }

        if let Some(name) = lookup("BACKUP_CONTAINER") {
            self.contexts.backup = container_or_local(name);
        }
        if let Some(name) = lookup("APP_CONTAINER") {
            self.contexts.application = container_or_local(name);
        }

        if let Some(value) = lookup("SEND_MAIL") {
            self.mail.enabled = parse_bool("SEND_MAIL", &value)?;
        }
        if let Some(host) = lookup("SMTP_HOST") {
            self.mail.host = host;
        }
        if let Some(port) = lookup("SMTP_PORT") {
            self.mail.port = port.trim().parse().map_err(|_| {
                BackupError::Config(format!("SMTP_PORT is not a port number: {}", port))
            })?;
        }
        if let Some(from) = lookup("SMTP_FROM") {
            self.mail.from = from;
        }
        if let Some(password) = lookup("SMTP_PWD") {
            self.mail.password = SecretString::new(password);
        }
        if let Some(to) = lookup("SMTP_TO") {
            self.mail.to = to
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(())
    }

    fn set_source(&mut self, tag: &str, path: String) {
        match self.sources.iter_mut().find(|s| s.tag == tag) {
            Some(source) => source.path = PathBuf::from(path),
            None => self.sources.push(SourceDir::new(tag, path)),
        }
    }

    /// Reject configurations the orchestrators cannot work with
    ///
    /// Unset credentials only produce warnings; the tools will report them.
    pub fn validate(&self) -> BackupResult<()> {
        if self.sources.is_empty() {
            return Err(BackupError::Config("No source directories configured".into()));
        }

        let mut seen = Vec::new();
        for source in &self.sources {
            let tag = source.tag.as_str();
            if tag.is_empty() || tag.contains('/') || tag == "." || tag == ".." {
                return Err(BackupError::Config(format!("Invalid source tag: '{}'", tag)));
            }
            if tag == crate::backup::DUMP_FILE || tag == crate::backup::LATEST_LINK {
                return Err(BackupError::Config(format!("Reserved source tag: '{}'", tag)));
            }
            if seen.contains(&tag) {
                return Err(BackupError::Config(format!("Duplicate source tag: '{}'", tag)));
            }
            if source.path.as_os_str().is_empty() {
                return Err(BackupError::Config(format!("Source '{}' has no path", tag)));
            }
            seen.push(tag);
        }

        if self.backup_dir.as_os_str().is_empty() {
            return Err(BackupError::Config("Backup directory not set".into()));
        }

        match &self.maintenance {
            GateSettings::Soft { enter, exit } if enter.is_empty() || exit.is_empty() => {
                return Err(BackupError::Config("Maintenance commands not set".into()));
            }
            GateSettings::Hard { stop, start, .. } if stop.is_empty() || start.is_empty() => {
                return Err(BackupError::Config("Application stop/start commands not set".into()));
            }
            _ => {}
        }

        if self.mail.enabled && (self.mail.host.is_empty() || self.mail.to.is_empty()) {
            return Err(BackupError::Config(
                "Mail enabled but SMTP host or recipients missing".into(),
            ));
        }

        for (key, value) in [
            ("MYSQL_HOST", &self.database.host),
            ("MYSQL_USER", &self.database.user),
            ("MYSQL_DATABASE", &self.database.name),
        ] {
            if value.is_empty() {
                warn!("Key: {} not set.", key);
            }
        }
        if self.database.password.is_empty() {
            warn!("Key: MYSQL_PASSWORD not set.");
        }

        Ok(())
    }

    /// Log the effective configuration; secrets print redacted
    pub fn log_effective(&self) {
        for source in &self.sources {
            info!(tag = %source.tag, path = %source.path.display(), "source directory");
        }
        info!(path = %self.backup_dir.display(), "backup directory");
        info!(
            host = %self.database.host,
            user = %self.database.user,
            database = %self.database.name,
            password = %self.database.password,
            "database"
        );
        info!(mode = self.gate_mode(), "maintenance gate");
        info!(enabled = self.mail.enabled, host = %self.mail.host, "mail");
    }

    /// Short name of the configured gate
    pub fn gate_mode(&self) -> &'static str {
        match self.maintenance {
            GateSettings::Soft { .. } => "soft",
            GateSettings::Hard { .. } => "hard",
        }
    }

    /// The primary (first) source directory
    pub fn primary_source(&self) -> Option<&SourceDir> {
        self.sources.first()
    }
}

fn container_or_local(name: String) -> ContextTarget {
    if name.is_empty() || name.eq_ignore_ascii_case("local") {
        ContextTarget::Local
    } else {
        ContextTarget::Container { name }
    }
}

/// Parse a boolean the way the deployment scripts spell it
pub fn parse_bool(key: &str, value: &str) -> BackupResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        _ => Err(BackupError::Config(format!(
            "{}: boolean value expected, got '{}'",
            key, value
        ))),
    }
}

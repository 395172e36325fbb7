use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::retention::RetentionQuota;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub destinations: BTreeMap<String, Destination>,
    #[serde(default)]
    pub records: BTreeMap<String, RecordConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,

    /// Directory holding the per-destination lock files
    #[serde(default = "default_lock_directory")]
    pub lock_directory: PathBuf,

    /// Where the last result of every scheduled run is persisted
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Stamp artifact names in UTC instead of local time
    #[serde(default)]
    pub utc_timestamps: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
            lock_directory: default_lock_directory(),
            state_file: default_state_file(),
            utc_timestamps: false,
        }
    }
}

/// PostgreSQL connection and tooling used by the dump producer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// pg_dump binary (name looked up in PATH, or absolute path)
    #[serde(default = "default_pg_dump")]
    pub pg_dump: String,
    /// psql binary (name looked up in PATH, or absolute path)
    #[serde(default = "default_psql")]
    pub psql: String,

    /// Root directory containing one filestore folder per database
    #[serde(default = "default_filestore_root")]
    pub filestore_root: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            user: None,
            password: None,
            pg_dump: default_pg_dump(),
            psql: default_psql(),
            filestore_root: default_filestore_root(),
        }
    }
}

/// Company-wide switches for destination kinds and notifications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default = "default_true")]
    pub enable_local: bool,
    #[serde(default = "default_true")]
    pub enable_sftp: bool,
    #[serde(default = "default_true")]
    pub enable_drive: bool,
    #[serde(default = "default_true")]
    pub enable_dropbox: bool,

    #[serde(default)]
    pub enable_success_notifications: bool,
    #[serde(default = "default_true")]
    pub enable_failure_notifications: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enable_local: true,
            enable_sftp: true,
            enable_drive: true,
            enable_dropbox: true,
            enable_success_notifications: false,
            enable_failure_notifications: true,
        }
    }
}

impl PolicyConfig {
    /// Whether the company policy allows using this kind of destination
    pub fn allows(&self, kind: DestinationKind) -> bool {
        match kind {
            DestinationKind::Local => self.enable_local,
            DestinationKind::Sftp => self.enable_sftp,
            DestinationKind::Drive => self.enable_drive,
            DestinationKind::Dropbox => self.enable_dropbox,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub discord_webhook_url: String,

    /// Minimum minutes between two identical notifications (0 disables rate limiting)
    #[serde(default)]
    pub rate_limit_minutes: u64,

    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: String::new(),
            rate_limit_minutes: 0,
            cache_file: default_cache_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Success,
    Failure,
}

/// A configured storage target: kind, root path and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Destination {
    #[serde(default)]
    pub description: String,

    /// Local directory, remote directory, Dropbox folder, or Drive parent-folder id
    #[serde(default)]
    pub path: String,

    #[serde(flatten)]
    pub credentials: Credentials,
}

/// Credentials, tagged by the destination `type`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    Local,
    Sftp {
        #[serde(default)]
        host: Option<String>,
        #[serde(default, deserialize_with = "string_or_number")]
        port: Option<String>,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    Drive {
        #[serde(default)]
        credentials_type: Option<DriveCredentialsType>,
        /// Service account key file (raw JSON or base64 encoded JSON)
        #[serde(default)]
        credentials_file: Option<PathBuf>,
        /// Service account key typed inline as JSON
        #[serde(default)]
        credentials_input: Option<String>,
    },
    Dropbox {
        #[serde(default)]
        app_key: Option<String>,
        #[serde(default)]
        app_secret: Option<String>,
        /// Long-lived refresh token obtained with `autobackup dropbox-auth`
        #[serde(default)]
        app_token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DriveCredentialsType {
    File,
    Text,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Local,
    Sftp,
    Drive,
    Dropbox,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DestinationKind::Local => "Local",
            DestinationKind::Sftp => "SFTP",
            DestinationKind::Drive => "Google Drive",
            DestinationKind::Dropbox => "Dropbox",
        };
        f.write_str(label)
    }
}

impl Destination {
    pub fn kind(&self) -> DestinationKind {
        match self.credentials {
            Credentials::Local => DestinationKind::Local,
            Credentials::Sftp { .. } => DestinationKind::Sftp,
            Credentials::Drive { .. } => DestinationKind::Drive,
            Credentials::Dropbox { .. } => DestinationKind::Dropbox,
        }
    }

    /// Root path with exactly one trailing slash
    pub fn normalized_path(&self) -> String {
        if self.path.ends_with('/') {
            self.path.clone()
        } else {
            format!("{}/", self.path)
        }
    }

    /// Where the destination writes, independent of its configured name
    ///
    /// Two destinations with the same identity share a run lock. Secrets and the SFTP
    /// user are left out; Dropbox paths compare case-insensitively.
    pub fn identity(&self) -> String {
        let path = self.path.trim().trim_end_matches('/');
        match &self.credentials {
            Credentials::Local => {
                format!("local:{}", super::expand_tilde(Path::new(path)).display())
            }
            Credentials::Sftp { host, port, .. } => format!(
                "sftp:{}:{}{}",
                host.as_deref().unwrap_or_default().trim().to_lowercase(),
                port.as_deref().map(str::trim).unwrap_or("22"),
                path
            ),
            Credentials::Drive { .. } => format!("drive:{}", path),
            Credentials::Dropbox { .. } => format!("dropbox:{}", path.to_lowercase()),
        }
    }
}

/// What part of the instance a record backs up
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupScope {
    /// Database and filestore
    #[default]
    Full,
    /// Database only
    Db,
    /// Filestore only
    Fs,
}

impl fmt::Display for BackupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackupScope::Full => "DB & Filestore",
            BackupScope::Db => "DB",
            BackupScope::Fs => "Filestore",
        };
        f.write_str(label)
    }
}

/// Backup record configuration (raw, before resolution)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub description: String,

    /// Name of the database (and of its filestore folder)
    pub database: String,

    /// Destination name
    pub destination: String,

    #[serde(default)]
    pub scope: BackupScope,

    /// Number of backups to keep at the destination, -1 disables pruning
    #[serde(default = "default_keep")]
    pub keep: i64,

    /// Upload chunk size in MiB for cloud destinations, 0 uploads in one request
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,

    #[serde(default)]
    pub notify_on_success: bool,
    #[serde(default)]
    pub notify_on_failure: bool,
}

/// Resolved record (destination looked up, quota validated)
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub database: String,
    pub destination_name: String,
    pub destination: Destination,
    pub scope: BackupScope,
    pub quota: RetentionQuota,
    pub chunk_size_bytes: usize,
    pub notify_on: Vec<NotifyEvent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(i64),
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<StringOrNumber> = Option::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    }))
}

// Default value functions

fn default_true() -> bool { true }
fn default_keep() -> i64 { -1 }
fn default_chunk_size_mb() -> u64 { 10 }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_lock_directory() -> PathBuf { std::env::temp_dir() }
fn default_state_file() -> PathBuf {
    PathBuf::from("~/.cache/autobackup-last-results.json")
}
fn default_pg_dump() -> String { "pg_dump".to_string() }
fn default_psql() -> String { "psql".to_string() }
fn default_filestore_root() -> PathBuf {
    PathBuf::from("~/.local/share/Odoo/filestore")
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("~/.cache/autobackup-notifications.json")
}

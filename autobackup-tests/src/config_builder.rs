//! Fluent API for building test configurations
//!
//! Every path the configuration touches (logs, locks, last results, local
//! destinations) lives inside the builder's temporary directory.

use autobackup::config::{
    BackupScope, Config, Credentials, DatabaseConfig, Destination, GlobalConfig,
    NotificationConfig, PolicyConfig, RecordConfig,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    database: DatabaseConfig,
    policy: PolicyConfig,
    notifications: NotificationConfig,
    destinations: BTreeMap<String, Destination>,
    records: BTreeMap<String, RecordConfig>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with no destinations
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let global = GlobalConfig {
            log_directory,
            log_level: "debug".to_string(),
            log_max_files: 5,
            lock_directory: temp_dir.path().join("locks"),
            state_file: temp_dir.path().join("state/last-results.json"),
            utc_timestamps: true,
        };
        let database = DatabaseConfig {
            filestore_root: temp_dir.path().join("filestore"),
            ..DatabaseConfig::default()
        };
        let notifications = NotificationConfig {
            cache_file: temp_dir.path().join("notifications.json"),
            ..NotificationConfig::default()
        };

        Self {
            temp_dir,
            global,
            database,
            policy: PolicyConfig::default(),
            notifications,
            destinations: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    /// A local destination named `local` under `<temp>/backups`
    pub fn minimal() -> Self {
        let builder = Self::new();
        let backup_path = builder.temp_dir.path().join("backups");
        builder.add_local_destination("local", &backup_path)
    }

    pub fn add_local_destination(mut self, name: &str, path: &Path) -> Self {
        self.destinations.insert(
            name.to_string(),
            Destination {
                description: format!("Local destination: {}", name),
                path: path.display().to_string(),
                credentials: Credentials::Local,
            },
        );
        self
    }

    /// SFTP destination; `password: None` leaves it not ready
    pub fn add_sftp_destination(
        mut self,
        name: &str,
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Self {
        self.destinations.insert(
            name.to_string(),
            Destination {
                description: format!("SFTP destination: {}", name),
                path: "/backups".to_string(),
                credentials: Credentials::Sftp {
                    host: Some(host.to_string()),
                    port: Some(port.to_string()),
                    user: Some("backup".to_string()),
                    password: password.map(String::from),
                },
            },
        );
        self
    }

    pub fn add_dropbox_destination(mut self, name: &str) -> Self {
        self.destinations.insert(
            name.to_string(),
            Destination {
                description: format!("Dropbox destination: {}", name),
                path: "/Backups".to_string(),
                credentials: Credentials::Dropbox {
                    app_key: Some("app-key".to_string()),
                    app_secret: Some("app-secret".to_string()),
                    app_token: Some("refresh-token".to_string()),
                },
            },
        );
        self
    }

    pub fn add_destination(mut self, name: &str, destination: Destination) -> Self {
        self.destinations.insert(name.to_string(), destination);
        self
    }

    /// Enabled full backup of `database`, retention disabled
    pub fn add_record(self, name: &str, database: &str, destination: &str) -> Self {
        self.add_record_config(name, record(database, destination))
    }

    pub fn add_record_with_keep(
        self,
        name: &str,
        database: &str,
        destination: &str,
        keep: i64,
    ) -> Self {
        self.add_record_config(
            name,
            RecordConfig {
                keep,
                ..record(database, destination)
            },
        )
    }

    pub fn add_disabled_record(self, name: &str, database: &str, destination: &str) -> Self {
        self.add_record_config(
            name,
            RecordConfig {
                enabled: false,
                ..record(database, destination)
            },
        )
    }

    pub fn add_record_config(mut self, name: &str, config: RecordConfig) -> Self {
        self.records.insert(name.to_string(), config);
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_notifications(mut self, config: NotificationConfig) -> Self {
        self.notifications = config;
        self
    }

    pub fn with_lock_dir(mut self, path: &Path) -> Self {
        self.global.lock_directory = path.to_path_buf();
        self
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Root path of a configured destination
    pub fn destination_path(&self, name: &str) -> Option<PathBuf> {
        self.destinations.get(name).map(|d| PathBuf::from(&d.path))
    }

    fn into_config(self) -> (Config, TempDir) {
        let config = Config {
            global: self.global,
            database: self.database,
            policy: self.policy,
            notifications: self.notifications,
            destinations: self.destinations,
            records: self.records,
        };
        (config, self.temp_dir)
    }

    /// Build the Config; the temporary directory is removed
    pub fn build(self) -> Config {
        self.into_config().0
    }

    /// Build the Config and keep the temporary directory alive
    pub fn persist(self) -> (Config, TempDir) {
        self.into_config()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn record(database: &str, destination: &str) -> RecordConfig {
    RecordConfig {
        enabled: true,
        description: format!("Backup of {}", database),
        database: database.to_string(),
        destination: destination.to_string(),
        scope: BackupScope::Full,
        keep: -1,
        chunk_size_mb: 10,
        notify_on_success: false,
        notify_on_failure: true,
    }
}

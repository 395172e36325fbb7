use super::types::*;
use crate::utils::retention::{PolicyError, RetentionQuota};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Destination '{0}' not found")]
    DestinationNotFound(String),

    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Credentials are incomplete for the destination kind
    #[error("The destination is not ready, check the {0} credentials")]
    NotReady(DestinationKind),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Largest accepted `chunk_size_mb`; Dropbox rejects upload requests above 150 MiB
pub const MAX_CHUNK_SIZE_MB: u64 = 150;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate the configuration
///
/// Credential completeness is checked per run with [`Destination::check_ready`].
pub fn validate_config(config: &Config) -> Result<()> {
    if config.destinations.is_empty() {
        return Err(ConfigError::ValidationError(
            "No destinations defined".to_string(),
        ));
    }

    for (name, record) in &config.records {
        validate_record(name, record, config)?;
    }

    Ok(())
}

fn validate_record(name: &str, record: &RecordConfig, config: &Config) -> Result<()> {
    if record.database.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Record '{}': database name is empty",
            name
        )));
    }

    if !config.destinations.contains_key(&record.destination) {
        return Err(ConfigError::DestinationNotFound(record.destination.clone()));
    }

    if record.chunk_size_mb > MAX_CHUNK_SIZE_MB {
        return Err(ConfigError::ValidationError(format!(
            "Record '{}': chunk size {} MiB exceeds the {} MiB limit",
            name, record.chunk_size_mb, MAX_CHUNK_SIZE_MB
        )));
    }

    RetentionQuota::keep(record.keep)?;

    Ok(())
}

impl Destination {
    /// Whether the credentials needed by this destination kind are all present
    pub fn check_ready(&self) -> Result<()> {
        let set = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

        let ready = match &self.credentials {
            Credentials::Local => !self.path.trim().is_empty(),
            Credentials::Sftp {
                host,
                port,
                user,
                password,
            } => set(host) && set(port) && set(user) && set(password),
            Credentials::Drive {
                credentials_type,
                credentials_file,
                credentials_input,
            } => {
                let source_ok = match credentials_type {
                    Some(DriveCredentialsType::File) => credentials_file.is_some(),
                    Some(DriveCredentialsType::Text) => set(credentials_input),
                    None => false,
                };
                !self.path.trim().is_empty() && source_ok
            }
            Credentials::Dropbox {
                app_key,
                app_secret,
                app_token,
            } => set(app_key) && set(app_secret) && set(app_token),
        };

        if ready {
            Ok(())
        } else {
            Err(ConfigError::NotReady(self.kind()))
        }
    }
}

/// Look up a destination by name
pub fn find_destination<'a>(config: &'a Config, name: &str) -> Result<&'a Destination> {
    config
        .destinations
        .get(name)
        .ok_or_else(|| ConfigError::DestinationNotFound(name.to_string()))
}

/// Resolve a record against its destination
pub fn resolve_record(name: &str, record: &RecordConfig, config: &Config) -> Result<ResolvedRecord> {
    let destination = find_destination(config, &record.destination)?.clone();
    let quota = RetentionQuota::keep(record.keep)?;

    let chunk_size_bytes = usize::try_from(record.chunk_size_mb.saturating_mul(1024 * 1024))
        .map_err(|_| {
            ConfigError::ValidationError(format!("Record '{}': chunk size is too large", name))
        })?;

    let mut notify_on = Vec::new();
    if record.notify_on_success {
        notify_on.push(NotifyEvent::Success);
    }
    if record.notify_on_failure {
        notify_on.push(NotifyEvent::Failure);
    }

    Ok(ResolvedRecord {
        name: name.to_string(),
        enabled: record.enabled,
        description: record.description.clone(),
        database: record.database.clone(),
        destination_name: record.destination.clone(),
        destination,
        scope: record.scope,
        quota,
        chunk_size_bytes,
        notify_on,
    })
}

/// Resolve every record in the configuration
pub fn resolve_all_records(config: &Config) -> Result<BTreeMap<String, ResolvedRecord>> {
    let mut resolved = BTreeMap::new();

    for (name, record) in &config.records {
        let resolved_record = resolve_record(name, record, config)?;
        resolved.insert(name.clone(), resolved_record);
    }

    Ok(resolved)
}

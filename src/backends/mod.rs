//! Storage backends
//!
//! Every destination kind implements [`StorageBackend`]. The transfer engine only
//! talks to the trait; [`BackendFactory`] is the single place where a configured
//! destination is turned into a concrete backend.

pub mod dropbox;
pub mod drive;
pub mod local;
pub mod mock;
pub mod sftp;

use crate::config::{ConfigError, Credentials, Destination, DestinationKind};
use crate::utils::naming::ArtifactName;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

pub use dropbox::DropboxBackend;
pub use drive::DriveBackend;
pub use local::LocalBackend;
pub use sftp::SftpBackend;

/// Errors raised by storage backends
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Credentials were rejected by the remote side
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Any other I/O, protocol or remote API failure
    #[error("{0}")]
    Transfer(String),

    /// The destination cannot be used as configured
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        BackendError::Transfer(err.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 => BackendError::Auth(err.to_string()),
            _ => BackendError::Transfer(err.to_string()),
        }
    }
}

impl From<ConfigError> for BackendError {
    fn from(err: ConfigError) -> Self {
        BackendError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Identity of a stored artifact as reported by the backend
///
/// A full path for Local/SFTP, the server object id for Drive and Dropbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a fresh destination listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListedArtifact {
    pub id: ArtifactId,
    /// Path or handle used to delete the entry
    pub location: String,
    pub name: String,
    /// Backend-specific ordering key (ctime, mtime, createdTime, server_modified)
    pub timestamp: DateTime<Utc>,
}

/// Capability set shared by every destination kind
pub trait StorageBackend {
    fn kind(&self) -> DestinationKind;

    /// Establish the session. Credential rejection must map to [`BackendError::Auth`].
    fn connect(&mut self) -> Result<()>;

    /// Stream `content` to the destination under `name` and return its identity
    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId>;

    /// Backup archives currently at the destination, in backend order
    fn list(&mut self) -> Result<Vec<ListedArtifact>>;

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()>;

    /// Release the session. Must be safe to call more than once.
    fn disconnect(&mut self);

    /// Short description of the account or host, used by connection tests
    fn probe(&mut self) -> Result<String>;
}

/// Per-run transfer settings handed to the backend on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    /// Upload chunk size in bytes, 0 uploads in a single request
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: 10 * 1024 * 1024,
        }
    }
}

/// Creates backends from configured destinations
pub trait BackendFactory {
    fn create(
        &self,
        destination: &Destination,
        options: TransferOptions,
    ) -> Result<Box<dyn StorageBackend>>;
}

/// Factory producing the real network and filesystem backends
#[derive(Debug, Clone, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create(
        &self,
        destination: &Destination,
        options: TransferOptions,
    ) -> Result<Box<dyn StorageBackend>> {
        create_backend(destination, options)
    }
}

/// Dispatch a destination to its backend implementation
pub fn create_backend(
    destination: &Destination,
    options: TransferOptions,
) -> Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match &destination.credentials {
        Credentials::Local => Box::new(LocalBackend::new(&destination.path)),
        Credentials::Sftp { .. } => Box::new(SftpBackend::from_destination(destination)?),
        Credentials::Drive { .. } => Box::new(DriveBackend::from_destination(destination, options)?),
        Credentials::Dropbox { .. } => {
            Box::new(DropboxBackend::from_destination(destination, options)?)
        }
    };
    Ok(backend)
}

/// Blocking HTTP client shared by the cloud backends
pub(crate) fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| BackendError::Transfer(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into a backend error carrying the response body
pub(crate) fn check_response(
    response: reqwest::blocking::Response,
    context: &str,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = format!("{} (HTTP {}): {}", context, status.as_u16(), body);
    if status.as_u16() == 401 {
        Err(BackendError::Auth(message))
    } else {
        Err(BackendError::Transfer(message))
    }
}

/// Read from `reader` until `size` bytes are collected or the stream ends
///
/// A short (or empty) chunk means the stream is exhausted.
pub fn fill_chunk(reader: &mut dyn Read, size: usize) -> io::Result<Vec<u8>> {
    let mut chunk = Vec::new();
    reader.take(size as u64).read_to_end(&mut chunk)?;
    Ok(chunk)
}

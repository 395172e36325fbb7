//! SFTP backend (password authentication over ssh2)

use super::{ArtifactId, BackendError, ListedArtifact, Result, StorageBackend};
use crate::config::{Credentials, Destination, DestinationKind};
use crate::utils::naming::{is_backup_archive, ArtifactName};
use chrono::{DateTime, Utc};
use ssh2::{ErrorCode, Session, Sftp};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use tracing::{debug, info, warn};

/// libssh2 `LIBSSH2_ERROR_AUTHENTICATION_FAILED`
const AUTHENTICATION_FAILED: i32 = -18;

/// Blocking call timeout applied to the session
const SESSION_TIMEOUT_MS: u32 = 60_000;

pub struct SftpBackend {
    host: String,
    port: u16,
    user: String,
    password: String,
    root: String,
    session: Option<(Session, Sftp)>,
}

impl SftpBackend {
    pub fn new(host: &str, port: u16, user: &str, password: &str, root: &str) -> Self {
        let root = if root.ends_with('/') {
            root.to_string()
        } else {
            format!("{}/", root)
        };
        Self {
            host: host.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            root,
            session: None,
        }
    }

    pub fn from_destination(destination: &Destination) -> Result<Self> {
        let Credentials::Sftp {
            host,
            port,
            user,
            password,
        } = &destination.credentials
        else {
            return Err(BackendError::Config(
                "Destination is not an SFTP server".to_string(),
            ));
        };

        let host = required(host, "host")?;
        let user = required(user, "user")?;
        let password = required(password, "password")?;
        let port = required(port, "port")?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| BackendError::Config(format!("Invalid SFTP port: {}", port)))?;

        Ok(Self::new(
            host,
            port,
            user,
            password,
            &destination.normalized_path(),
        ))
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.session
            .as_ref()
            .map(|(_, sftp)| sftp)
            .ok_or_else(|| BackendError::Transfer("SFTP session is not connected".to_string()))
    }

    /// Create each component of the remote root, ignoring the ones that exist
    ///
    /// Individual `mkdir` failures are expected for existing components; the root must
    /// be reachable afterwards.
    fn ensure_remote_dir(&self) -> Result<()> {
        let sftp = self.sftp()?;
        let components = remote_dir_components(&self.root);
        for dir in &components {
            if let Err(e) = sftp.mkdir(Path::new(dir), 0o755) {
                debug!("mkdir {} skipped: {}", dir, e);
            }
        }
        if let Some(root) = components.last() {
            sftp.stat(Path::new(root)).map_err(|e| {
                transfer_error(&format!("Remote directory {} is not available", root), e)
            })?;
        }
        Ok(())
    }
}

/// Every directory leading to `root`, shortest first
fn remote_dir_components(root: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    for part in root.split('/').filter(|s| !s.is_empty()) {
        if root.starts_with('/') || !current.is_empty() {
            current.push('/');
        }
        current.push_str(part);
        components.push(current.clone());
    }
    components
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BackendError::Config(format!("SFTP {} is not set", field)))
}

fn transfer_error(context: &str, err: ssh2::Error) -> BackendError {
    BackendError::Transfer(format!("{}: {}", context, err))
}

/// Credential rejections become `Auth`, everything else stays a transfer failure
fn auth_error(err: ssh2::Error) -> BackendError {
    match err.code() {
        ErrorCode::Session(AUTHENTICATION_FAILED) => BackendError::Auth(err.message().to_string()),
        _ => transfer_error("SFTP authentication error", err),
    }
}

impl StorageBackend for SftpBackend {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Sftp
    }

    fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        debug!("Connecting to SFTP server {}:{}", self.host, self.port);
        let tcp = TcpStream::connect((self.host.as_str(), self.port)).map_err(|e| {
            BackendError::Transfer(format!(
                "Failed to connect to {}:{}: {}",
                self.host, self.port, e
            ))
        })?;

        let mut session = Session::new().map_err(|e| transfer_error("SSH session error", e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(SESSION_TIMEOUT_MS);
        session
            .handshake()
            .map_err(|e| transfer_error("SSH handshake failed", e))?;

        session
            .userauth_password(&self.user, &self.password)
            .map_err(auth_error)?;
        if !session.authenticated() {
            return Err(BackendError::Auth(format!(
                "Server rejected credentials for user '{}'",
                self.user
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| transfer_error("Failed to open SFTP channel", e))?;

        info!("Connected to SFTP server {}:{}", self.host, self.port);
        self.session = Some((session, sftp));
        Ok(())
    }

    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId> {
        self.ensure_remote_dir()?;

        let target = format!("{}{}", self.root, name.file_name());
        let sftp = self.sftp()?;

        let mut remote = sftp
            .create(Path::new(&target))
            .map_err(|e| transfer_error(&format!("Failed to create {}", target), e))?;
        let written = io::copy(content, &mut remote)
            .map_err(|e| BackendError::Transfer(format!("Failed to write {}: {}", target, e)))?;
        remote.flush()?;

        info!("Uploaded {} bytes to sftp://{}{}", written, self.host, target);
        Ok(ArtifactId::new(target))
    }

    fn list(&mut self) -> Result<Vec<ListedArtifact>> {
        let sftp = self.sftp()?;
        let entries = sftp
            .readdir(Path::new(&self.root))
            .map_err(|e| transfer_error(&format!("Failed to list {}", self.root), e))?;

        let listing = entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(path, stat)| {
                let name = path.file_name()?.to_string_lossy().to_string();
                if !is_backup_archive(&name) {
                    return None;
                }
                let mtime = stat.mtime.unwrap_or(0);
                let timestamp = DateTime::<Utc>::from_timestamp(mtime as i64, 0)?;
                let location = format!("{}{}", self.root, name);
                Some(ListedArtifact {
                    id: ArtifactId::new(location.clone()),
                    location,
                    name,
                    timestamp,
                })
            })
            .collect::<Vec<_>>();

        debug!("Found {} backups in sftp://{}{}", listing.len(), self.host, self.root);
        Ok(listing)
    }

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()> {
        self.sftp()?
            .unlink(Path::new(&entry.location))
            .map_err(|e| transfer_error(&format!("Failed to delete {}", entry.location), e))?;
        info!("Deleted old backup: {}", entry.name);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some((session, sftp)) = self.session.take() {
            drop(sftp);
            if let Err(e) = session.disconnect(None, "autobackup done", None) {
                warn!("SFTP disconnect failed: {}", e);
            }
            debug!("Disconnected from {}", self.host);
        }
    }

    fn probe(&mut self) -> Result<String> {
        let sftp = self.sftp()?;
        sftp.stat(Path::new(&self.root)).map_err(|e| {
            transfer_error(&format!("Remote directory {} is not accessible", self.root), e)
        })?;
        Ok(format!("{}@{}:{}{}", self.user, self.host, self.port, self.root))
    }
}

impl Drop for SftpBackend {
    fn drop(&mut self) {
        self.disconnect();
    }
}

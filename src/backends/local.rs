//! Local filesystem backend

use super::{ArtifactId, BackendError, ListedArtifact, Result, StorageBackend};
use crate::config::{expand_tilde, DestinationKind};
use crate::utils::naming::{is_backup_archive, ArtifactName};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Writes artifacts into a directory on the local machine (or a mounted share)
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: &str) -> Self {
        Self {
            root: expand_tilde(Path::new(root)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageBackend for LocalBackend {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Local
    }

    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// A failed write leaves the partial file in place; it is not a valid archive
    /// and is picked up by the next listing like any other file with a backup name.
    fn upload(&mut self, content: &mut dyn Read, name: &ArtifactName) -> Result<ArtifactId> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BackendError::Transfer(format!(
                "Failed to create backup directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let target = self.root.join(name.file_name());
        debug!("Writing local backup to {}", target.display());

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| {
                BackendError::Transfer(format!("Failed to create {}: {}", target.display(), e))
            })?;

        let written = io::copy(content, &mut file).map_err(|e| {
            warn!("Local write interrupted, partial file left at {}", target.display());
            BackendError::Transfer(format!("Failed to write {}: {}", target.display(), e))
        })?;
        file.flush()?;

        info!("Wrote {} bytes to {}", written, target.display());
        Ok(ArtifactId::new(target.to_string_lossy()))
    }

    fn list(&mut self) -> Result<Vec<ListedArtifact>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackendError::Transfer(format!(
                    "Failed to read {}: {}",
                    self.root.display(),
                    e
                )))
            }
        };

        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_backup_archive(&name) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            // Not every filesystem records a birth time
            let stamp = metadata.created().or_else(|_| metadata.modified())?;
            let path = entry.path().to_string_lossy().to_string();

            listing.push(ListedArtifact {
                id: ArtifactId::new(path.clone()),
                location: path,
                name,
                timestamp: DateTime::<Utc>::from(stamp),
            });
        }

        debug!("Found {} backups in {}", listing.len(), self.root.display());
        Ok(listing)
    }

    fn delete(&mut self, entry: &ListedArtifact) -> Result<()> {
        fs::remove_file(&entry.location).map_err(|e| {
            BackendError::Transfer(format!("Failed to delete {}: {}", entry.location, e))
        })?;
        info!("Deleted old backup: {}", entry.name);
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn probe(&mut self) -> Result<String> {
        fs::create_dir_all(&self.root)?;
        let metadata = fs::metadata(&self.root)?;
        if metadata.permissions().readonly() {
            return Err(BackendError::Transfer(format!(
                "Directory {} is read-only",
                self.root.display()
            )));
        }
        Ok(format!("Local directory {}", self.root.display()))
    }
}

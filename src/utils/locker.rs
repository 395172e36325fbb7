//! File-based locking so two runs never write to the same destination at once

use fd_lock::RwLock;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Destination '{0}' is already in use by another backup run")]
    Busy(String),

    #[error("Failed to open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Lock file path for a destination identity
pub fn lock_path(lock_directory: &Path, destination: &str) -> PathBuf {
    let safe: String = destination
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    lock_directory.join(format!("autobackup-{}.lock", safe))
}

/// Run `f` while holding the exclusive lock of `destination`
///
/// `destination` is a destination identity (see `Destination::identity`), so two
/// configured names pointing at the same place share one lock.
///
/// Fails fast with [`LockError::Busy`] when another run holds the lock. The lock file
/// is left in place after release so every run locks the same inode.
pub fn with_destination_lock<T>(
    lock_directory: &Path,
    destination: &str,
    f: impl FnOnce() -> T,
) -> Result<T, LockError> {
    let path = lock_path(lock_directory, destination);
    let io_error = |source| LockError::Io {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(lock_directory).map_err(io_error)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(io_error)?;

    debug!("Attempting to acquire lock: {:?}", path);
    let mut lock = RwLock::new(file);
    let guard = lock
        .try_write()
        .map_err(|_| LockError::Busy(destination.to_string()))?;
    info!("Acquired lock for destination: {}", destination);

    let result = f();

    drop(guard);
    info!("Released lock for destination: {}", destination);
    Ok(result)
}

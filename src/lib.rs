//! Autobackup Library
//!
//! Dumps a database and its filestore, delivers the archive to a local directory,
//! an SFTP server, Google Drive or Dropbox, and keeps only the newest copies there.

pub mod backends;
pub mod config;
pub mod managers;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use backends::{BackendError, BackendFactory, StorageBackend};
pub use config::{load_config, resolve_all_records, Config, ResolvedRecord};
pub use managers::backup::{BackupManager, RunMode};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::NotificationManager;
pub use managers::outcome::{ErrorKind, Outcome, ResultType, RunReport};
pub use strategies::{ArtifactProducer, DumpFormat};

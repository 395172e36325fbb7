//! Transfer engine: connect, upload, prune, disconnect
//!
//! A run moves through `Idle -> Connecting -> Uploading -> Pruning -> Disconnecting
//! -> Done` and always ends in an [`Outcome`]. Backend errors never escape; they are
//! classified at this boundary with their original text.

use super::outcome::{ErrorKind, Outcome, ResultType, RunPhase, RunReport};
use crate::backends::{
    ArtifactId, BackendError, BackendFactory, DefaultBackendFactory, StorageBackend,
    TransferOptions,
};
use crate::config::{Destination, DestinationKind};
use crate::strategies::Artifact;
use crate::utils::naming::{ArtifactExtension, ArtifactName};
use crate::utils::retention::{self, RetentionQuota};
use std::io::Cursor;
use tracing::{debug, error, info, warn};

const TEST_FILE_SOURCE: &str = "test";
const TEST_FILE_CONTENT: &str =
    "This is a test file uploaded by autobackup to check that the destination accepts backups.";

/// One artifact delivery to one destination
#[derive(Debug, Clone)]
pub struct TransferJob<'a> {
    /// Source identifier used in the artifact name (the database name)
    pub source: &'a str,
    pub destination: &'a Destination,
    pub quota: RetentionQuota,
    pub options: TransferOptions,
    /// Stamp the artifact name in UTC instead of local time
    pub utc_timestamps: bool,
}

/// Backend session released on drop, whatever path the run took
struct Connection {
    backend: Box<dyn StorageBackend>,
}

impl Connection {
    fn backend(&mut self) -> &mut dyn StorageBackend {
        self.backend.as_mut()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!("Disconnecting from {} destination", self.backend.kind());
        self.backend.disconnect();
    }
}

pub struct TransferEngine {
    factory: Box<dyn BackendFactory>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::with_factory(Box::new(DefaultBackendFactory))
    }

    /// Create engine with a specific backend factory
    pub fn with_factory(factory: Box<dyn BackendFactory>) -> Self {
        Self { factory }
    }

    /// Check readiness, build the backend and connect
    fn open(
        &self,
        destination: &Destination,
        options: TransferOptions,
    ) -> Result<Connection, Outcome> {
        if let Err(e) = destination.check_ready() {
            warn!("Destination is not ready: {}", e);
            return Err(Outcome::failure(ErrorKind::Config, RunPhase::Idle, e.to_string()));
        }

        let backend = self
            .factory
            .create(destination, options)
            .map_err(|e| classify(&e, RunPhase::Idle))?;
        let mut connection = Connection { backend };

        info!("Connecting to {} destination", destination.kind());
        connection
            .backend()
            .connect()
            .map_err(|e| classify(&e, RunPhase::Connecting))?;
        Ok(connection)
    }

    /// Connect, then produce the artifact, deliver it and enforce the retention quota
    ///
    /// `produce` is only called once the destination accepted the connection.
    pub fn run<P>(&self, job: &TransferJob<'_>, produce: P) -> Outcome
    where
        P: FnOnce() -> anyhow::Result<Artifact>,
    {
        let kind = job.destination.kind();
        let mut connection = match self.open(job.destination, job.options) {
            Ok(connection) => connection,
            Err(outcome) => return outcome,
        };

        let mut artifact = match produce() {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Producing the artifact failed: {:#}", e);
                return Outcome::failure(
                    ErrorKind::Artifact,
                    RunPhase::Connecting,
                    format!("{:#}", e),
                );
            }
        };

        let name = ArtifactName::capture(job.source, ArtifactExtension::Zip, job.utc_timestamps);
        info!("Uploading {} to {} destination", name, kind);
        let id = match connection.backend().upload(&mut artifact, &name) {
            Ok(id) => id,
            Err(e) => {
                error!("Upload of {} failed: {}", name, e);
                if let Err(dump) = artifact.finish() {
                    warn!("Dump also failed: {:#}", dump);
                }
                return classify(&e, RunPhase::Uploading);
            }
        };
        info!("Uploaded {} as {}", name, id);

        // A dump that exits non-zero produced a truncated artifact; keep older copies
        if let Err(e) = artifact.finish() {
            error!("Dump behind {} failed: {:#}", id, e);
            return Outcome::failure(
                ErrorKind::Artifact,
                RunPhase::Uploading,
                format!("uploaded {} but the dump failed: {:#}", id, e),
            );
        }

        if job.quota.is_active() {
            if let Err(e) = prune_destination(connection.backend(), &id, job.quota) {
                error!("Retention failed after uploading {}: {}", id, e);
                return Outcome::failure(
                    ErrorKind::from(&e),
                    RunPhase::Pruning,
                    format!("upload succeeded, pruning failed (uploaded {}): {}", id, e),
                );
            }
        } else {
            debug!("Retention disabled, nothing to prune");
        }

        drop(connection);
        Outcome::success(success_message(kind, &id))
    }

    /// Connect and describe the destination without writing anything
    pub fn test_connection(&self, destination: &Destination) -> RunReport {
        let kind = destination.kind();
        let mut connection = match self.open(destination, TransferOptions::default()) {
            Ok(connection) => connection,
            Err(outcome) => return connection_failure(kind, &outcome),
        };

        match connection.backend().probe() {
            Ok(description) => {
                info!("Connection test succeeded: {}", description);
                RunReport::new(ResultType::Success, connection_message(kind, &description))
            }
            Err(e) => connection_failure(kind, &classify(&e, RunPhase::Connecting)),
        }
    }

    /// Upload a small text file; retention is never applied to it
    pub fn send_test_file(&self, destination: &Destination, utc_timestamps: bool) -> Outcome {
        let kind = destination.kind();
        let mut connection = match self.open(destination, TransferOptions::default()) {
            Ok(connection) => connection,
            Err(outcome) => return outcome,
        };

        let name = ArtifactName::capture(TEST_FILE_SOURCE, ArtifactExtension::Txt, utc_timestamps);
        let mut content = Cursor::new(TEST_FILE_CONTENT.as_bytes());
        match connection.backend().upload(&mut content, &name) {
            Ok(id) => {
                info!("Test file uploaded as {}", id);
                Outcome::success(format!(
                    "The test file {} was uploaded to the {} destination.\nThe file ID is: {}",
                    name, kind, id
                ))
            }
            Err(e) => classify(&e, RunPhase::Uploading),
        }
    }
}

/// List fresh, select the excess and delete it in order
///
/// Deletions that already happened are kept when a later one fails.
fn prune_destination(
    backend: &mut dyn StorageBackend,
    uploaded: &ArtifactId,
    quota: RetentionQuota,
) -> Result<(), BackendError> {
    let listing = backend.list()?;
    let excess = retention::prune(&listing, uploaded, quota);
    info!(
        "Retention ({}): {} listed, {} to delete",
        quota,
        listing.len(),
        excess.len()
    );

    for entry in &excess {
        info!("Deleting old backup {}", entry.name);
        backend.delete(entry)?;
    }
    Ok(())
}

fn classify(err: &BackendError, phase: RunPhase) -> Outcome {
    let detail = match err {
        BackendError::Auth(msg) | BackendError::Transfer(msg) | BackendError::Config(msg) => {
            msg.clone()
        }
    };
    Outcome::failure(ErrorKind::from(err), phase, detail)
}

fn success_message(kind: DestinationKind, id: &ArtifactId) -> String {
    match kind {
        DestinationKind::Local => "Local Backup process executed successfully.".to_string(),
        DestinationKind::Sftp => {
            "SFTP Backup transference process executed successfully.".to_string()
        }
        DestinationKind::Drive | DestinationKind::Dropbox => format!(
            "{} Backup process executed successfully.\nThe file ID is: {}",
            kind, id
        ),
    }
}

fn connection_message(kind: DestinationKind, description: &str) -> String {
    match kind {
        DestinationKind::Sftp => format!("The SFTP connection was successful.\n{}", description),
        _ => format!("{} Connection Successful!\n{}", kind, description),
    }
}

// Rejected credentials are reported as a warning: the destination itself answered
fn connection_failure(kind: DestinationKind, outcome: &Outcome) -> RunReport {
    match outcome.kind() {
        Some(ErrorKind::Auth) => RunReport::new(
            ResultType::Warning,
            format!(
                "The {} connection failed due to authentication error.\nError: {}",
                kind,
                outcome.detail()
            ),
        ),
        _ => RunReport::new(
            ResultType::Danger,
            format!("The {} connection failed.\nError: {}", kind, outcome.detail()),
        ),
    }
}

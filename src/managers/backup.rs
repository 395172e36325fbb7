//! Backup manager - orchestrates record runs
//!
//! A run checks the company policy and takes the destination lock, then the transfer
//! engine connects and only then asks the producer for an artifact. Scheduled runs
//! also persist their last result and send notifications.

use super::history::LastResultStore;
use super::notification::{Notification, NotificationManager};
use super::outcome::{ErrorKind, Outcome, ResultType, RunPhase, RunReport};
use super::transfer::{TransferEngine, TransferJob};
use crate::backends::{BackendFactory, TransferOptions};
use crate::config::{expand_tilde, find_destination, Config, NotifyEvent, ResolvedRecord};
use crate::strategies::{ArtifactProducer, DumpFormat, PgDumpProducer};
use crate::utils::locker::with_destination_lock;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a run was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Started by an operator; the result is only printed
    Manual,
    /// Started by the scheduler; the result is persisted and notified
    Scheduled,
}

pub struct BackupManager {
    config: Config,
    records: BTreeMap<String, ResolvedRecord>,
    engine: TransferEngine,
    producer: Box<dyn ArtifactProducer>,
    notification_manager: Option<NotificationManager>,
    history: LastResultStore,
}

impl BackupManager {
    pub fn new(config: Config, records: BTreeMap<String, ResolvedRecord>) -> Self {
        let notification_manager = if !config.notifications.discord_webhook_url.is_empty() {
            Some(NotificationManager::new(
                config.notifications.clone(),
                config.policy.clone(),
            ))
        } else {
            None
        };
        let producer = Box::new(PgDumpProducer::new(config.database.clone()));
        let history = LastResultStore::new(&config.global.state_file);

        Self {
            config,
            records,
            engine: TransferEngine::new(),
            producer,
            notification_manager,
            history,
        }
    }

    /// Replace the backend factory (tests use the mock backend)
    pub fn with_backend_factory(mut self, factory: Box<dyn BackendFactory>) -> Self {
        self.engine = TransferEngine::with_factory(factory);
        self
    }

    pub fn with_producer(mut self, producer: Box<dyn ArtifactProducer>) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_notification_manager(mut self, manager: NotificationManager) -> Self {
        self.notification_manager = Some(manager);
        self
    }

    pub fn history(&self) -> &LastResultStore {
        &self.history
    }

    pub fn producer(&self) -> &dyn ArtifactProducer {
        self.producer.as_ref()
    }

    pub fn records(&self) -> &BTreeMap<String, ResolvedRecord> {
        &self.records
    }

    /// Run one record, whatever its `enabled` flag
    pub fn run_record(&self, name: &str, mode: RunMode) -> Outcome {
        let Some(record) = self.records.get(name) else {
            return Outcome::failure(
                ErrorKind::Config,
                RunPhase::Idle,
                format!("Record '{}' not found", name),
            );
        };

        let start_time = Instant::now();
        info!(
            "Starting backup of record '{}' ({} of '{}' to '{}')",
            name, record.scope, record.database, record.destination_name
        );

        let outcome = self.execute(record);
        let duration_secs = start_time.elapsed().as_secs();

        if outcome.is_success() {
            info!("Record '{}' finished in {}s: {}", name, duration_secs, outcome);
        } else {
            error!("Record '{}' failed after {}s: {}", name, duration_secs, outcome);
        }

        if mode == RunMode::Scheduled {
            self.report(record, &outcome, duration_secs);
        }
        outcome
    }

    /// Run every enabled record in name order
    pub fn run_all(&self, mode: RunMode) -> Vec<(String, Outcome)> {
        let enabled: Vec<&String> = self
            .records
            .iter()
            .filter(|(_, record)| record.enabled)
            .map(|(name, _)| name)
            .collect();

        if enabled.is_empty() {
            warn!("No enabled records to back up");
            return Vec::new();
        }
        info!("Found {} enabled records", enabled.len());

        let results: Vec<(String, Outcome)> = enabled
            .into_iter()
            .map(|name| (name.clone(), self.run_record(name, mode)))
            .collect();

        let failures = results.iter().filter(|(_, o)| !o.is_success()).count();
        info!(
            "Backup summary: {} succeeded, {} failed",
            results.len() - failures,
            failures
        );
        results
    }

    fn execute(&self, record: &ResolvedRecord) -> Outcome {
        let kind = record.destination.kind();
        if !self.config.policy.allows(kind) {
            return Outcome::policy_denied(kind);
        }

        // Readiness is checked before anything is dumped
        if let Err(e) = record.destination.check_ready() {
            return Outcome::failure(ErrorKind::Config, RunPhase::Idle, e.to_string());
        }

        let lock_directory = expand_tilde(&self.config.global.lock_directory);
        match with_destination_lock(&lock_directory, &record.destination.identity(), || {
            self.produce_and_transfer(record)
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}", e);
                Outcome::failure(ErrorKind::Transfer, RunPhase::Idle, e.to_string())
            }
        }
    }

    fn produce_and_transfer(&self, record: &ResolvedRecord) -> Outcome {
        let job = TransferJob {
            source: &record.database,
            destination: &record.destination,
            quota: record.quota,
            options: TransferOptions {
                chunk_size: record.chunk_size_bytes,
            },
            utc_timestamps: self.config.global.utc_timestamps,
        };

        self.engine.run(&job, || {
            info!(
                "Producing artifact for '{}' with {}",
                record.database,
                self.producer.name()
            );
            self.producer
                .produce(&record.database, record.scope, DumpFormat::Zip)
        })
    }

    /// Persist the last result and notify, for scheduled runs
    fn report(&self, record: &ResolvedRecord, outcome: &Outcome, duration_secs: u64) {
        if let Err(e) = self
            .history
            .record(&record.name, &RunReport::from_outcome(outcome))
        {
            warn!("Failed to store last result of '{}': {:#}", record.name, e);
        }

        let Some(ref manager) = self.notification_manager else {
            return;
        };

        let (event_type, message, error) = match outcome {
            Outcome::Success { detail } => (NotifyEvent::Success, detail.clone(), None),
            Outcome::Failure { .. } => (
                NotifyEvent::Failure,
                format!("Backup of record '{}' failed", record.name),
                Some(outcome.to_string()),
            ),
        };
        let notification = Notification {
            event_type,
            record_name: record.name.clone(),
            database: record.database.clone(),
            destination: record.destination_name.clone(),
            message,
            error,
            duration_secs: Some(duration_secs),
        };
        if let Err(e) = manager.send(notification, &record.notify_on) {
            warn!("Failed to send notification: {:#}", e);
        }
    }

    /// Connect to a destination and describe it
    pub fn test_connection(&self, destination_name: &str) -> RunReport {
        let destination = match find_destination(&self.config, destination_name) {
            Ok(destination) => destination,
            Err(e) => return RunReport::new(ResultType::Danger, e.to_string()),
        };
        let kind = destination.kind();
        if !self.config.policy.allows(kind) {
            return RunReport::from_outcome(&Outcome::policy_denied(kind));
        }

        info!("Testing connection to '{}'", destination_name);
        self.engine.test_connection(destination)
    }

    /// Upload a small text file to a destination
    pub fn send_test_file(&self, destination_name: &str) -> Outcome {
        let destination = match find_destination(&self.config, destination_name) {
            Ok(destination) => destination,
            Err(e) => return Outcome::failure(ErrorKind::from(&e), RunPhase::Idle, e.to_string()),
        };
        let kind = destination.kind();
        if !self.config.policy.allows(kind) {
            return Outcome::policy_denied(kind);
        }

        info!("Sending test file to '{}'", destination_name);
        let lock_directory = expand_tilde(&self.config.global.lock_directory);
        with_destination_lock(&lock_directory, &destination.identity(), || {
            self.engine
                .send_test_file(destination, self.config.global.utc_timestamps)
        })
        .unwrap_or_else(|e| Outcome::failure(ErrorKind::Transfer, RunPhase::Idle, e.to_string()))
    }
}

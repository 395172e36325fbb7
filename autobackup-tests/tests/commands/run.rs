//! Tests for the 'run' command
//!
//! The run command backs up one record or every enabled record.

use super::manager_with;
use autobackup::backends::BackendError;
use autobackup::utils::locker::with_destination_lock;
use test_utils::{
    listing, BackendCall, BackupScope, ConfigBuilder, DestinationKind, ErrorKind, MockBackend,
    MockProducer, PolicyConfig, RunMode, RunPhase,
};

#[test]
fn test_run_single_record() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new().with_content("archive bytes");
    let manager = manager_with(config, &backend, &producer);

    let outcome = manager.run_record("nightly", RunMode::Manual);

    assert!(outcome.is_success(), "{}", outcome);
    assert_eq!(outcome.detail(), "Local Backup process executed successfully.");
    assert_eq!(backend.upload_count(), 1);

    let stored = backend.stored_names();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("Backup_prod_"));
    assert!(stored[0].ends_with(".zip"));
    assert_eq!(backend.content_of(&stored[0]), Some(b"archive bytes".to_vec()));
    assert!(!backend.is_connected());
}

#[test]
fn test_run_passes_scope_and_zip_format() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record_config(
            "dbonly",
            autobackup::config::RecordConfig {
                enabled: true,
                description: String::new(),
                database: "prod".to_string(),
                destination: "local".to_string(),
                scope: BackupScope::Db,
                keep: -1,
                chunk_size_mb: 1,
                notify_on_success: false,
                notify_on_failure: false,
            },
        )
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    assert!(manager.run_record("dbonly", RunMode::Manual).is_success());

    let calls = producer.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source, "prod");
    assert_eq!(calls[0].scope, BackupScope::Db);
    assert_eq!(calls[0].format, autobackup::DumpFormat::Zip);
    assert_eq!(backend.chunk_size(), Some(1024 * 1024));
}

#[test]
fn test_run_prunes_to_quota() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record_with_keep("nightly", "prod", "local", 3)
        .persist();
    let backend = MockBackend::new().with_existing(listing("prod", 5));
    let manager = manager_with(config, &backend, &MockProducer::new());

    let outcome = manager.run_record("nightly", RunMode::Manual);

    assert!(outcome.is_success(), "{}", outcome);
    let mut deleted = backend.deleted();
    deleted.sort();
    assert_eq!(
        deleted,
        vec![
            "Backup_prod_2024-01-01_02.00.00.zip",
            "Backup_prod_2024-01-02_02.00.00.zip",
            "Backup_prod_2024-01-03_02.00.00.zip",
        ]
    );
    assert_eq!(backend.stored_names().len(), 3);
}

#[test]
fn test_run_skips_disabled_records() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("enabled", "prod", "local")
        .add_disabled_record("disabled", "staging", "local")
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    let results = manager.run_all(RunMode::Manual);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "enabled");
    assert_eq!(producer.call_count(), 1);
}

#[test]
fn test_run_disabled_record_by_name() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_disabled_record("weekly", "prod", "local")
        .persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    assert!(manager.run_record("weekly", RunMode::Manual).is_success());
    assert_eq!(backend.upload_count(), 1);
}

#[test]
fn test_run_unknown_record() {
    let (config, _temp) = ConfigBuilder::minimal().persist();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    let outcome = manager.run_record("missing", RunMode::Manual);

    assert_eq!(outcome.kind(), Some(ErrorKind::Config));
    assert!(outcome.detail().contains("missing"));
}

#[test]
fn test_run_policy_denied() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .add_record("offsite", "prod", "box")
        .with_policy(PolicyConfig {
            enable_dropbox: false,
            ..PolicyConfig::default()
        })
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    let outcome = manager.run_record("offsite", RunMode::Manual);

    assert_eq!(outcome.kind(), Some(ErrorKind::Policy));
    assert_eq!(
        outcome.detail(),
        format!(
            "You cannot use this functionality without the {} policy enabled.",
            DestinationKind::Dropbox
        )
    );
    assert_eq!(producer.call_count(), 0);
    assert!(backend.calls().is_empty());
}

#[test]
fn test_run_destination_not_ready() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "127.0.0.1", 22, None)
        .add_record("offsite", "prod", "nas")
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    let outcome = manager.run_record("offsite", RunMode::Manual);

    assert_eq!(outcome.kind(), Some(ErrorKind::Config));
    assert_eq!(producer.call_count(), 0);
    assert!(backend.calls().is_empty());
}

#[test]
fn test_run_producer_failure() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let backend = MockBackend::new();
    let producer = MockProducer::new().failing("pg_dump: connection refused");
    let manager = manager_with(config, &backend, &producer);

    let outcome = manager.run_record("nightly", RunMode::Manual);

    assert_eq!(outcome.kind(), Some(ErrorKind::Artifact));
    assert!(outcome.detail().contains("connection refused"));
    assert_eq!(backend.upload_count(), 0);
    assert_eq!(backend.calls().last(), Some(&BackendCall::Disconnect));
}

#[test]
fn test_run_auth_failure() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .add_record_with_keep("offsite", "prod", "box", 3)
        .persist();
    let backend = MockBackend::new()
        .with_existing(listing("prod", 5))
        .fail_connect(BackendError::Auth("invalid_grant".to_string()));
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    let outcome = manager.run_record("offsite", RunMode::Manual);

    assert_eq!(outcome.kind(), Some(ErrorKind::Auth));
    assert_eq!(producer.call_count(), 0);
    assert!(matches!(
        outcome,
        test_utils::Outcome::Failure {
            phase: RunPhase::Connecting,
            ..
        }
    ));
    assert_eq!(backend.upload_count(), 0);
    assert!(backend.deleted().is_empty());
    assert_eq!(backend.calls().last(), Some(&BackendCall::Disconnect));
}

#[test]
fn test_run_busy_destination() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let lock_directory = config.global.lock_directory.clone();
    let identity = config.destinations["local"].identity();
    let backend = MockBackend::new();
    let producer = MockProducer::new();
    let manager = manager_with(config, &backend, &producer);

    let outcome = with_destination_lock(&lock_directory, &identity, || {
        manager.run_record("nightly", RunMode::Manual)
    })
    .unwrap();

    assert_eq!(outcome.kind(), Some(ErrorKind::Transfer));
    assert!(outcome.detail().contains("already in use"));
    assert_eq!(producer.call_count(), 0);

    // Released afterwards
    assert!(manager.run_record("nightly", RunMode::Manual).is_success());
}

//! Tests for the 'status' command
//!
//! Status shows the last result of scheduled runs, one per record.

use super::manager_with;
use autobackup::backends::BackendError;
use autobackup::managers::history::LastResultStore;
use test_utils::{ConfigBuilder, MockBackend, MockProducer, ResultType, RunMode};

#[test]
fn test_status_empty_before_any_run() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    assert!(manager.history().load().is_empty());
    assert!(manager.history().get("nightly").is_none());
}

#[test]
fn test_status_manual_run_not_recorded() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    assert!(manager.run_record("nightly", RunMode::Manual).is_success());
    assert!(manager.history().get("nightly").is_none());
}

#[test]
fn test_status_scheduled_success() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let state_file = config.global.state_file.clone();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    manager.run_record("nightly", RunMode::Scheduled);

    let report = manager.history().get("nightly").expect("result recorded");
    assert_eq!(report.result_type, ResultType::Success);
    assert_eq!(report.details, "Local Backup process executed successfully.");

    // Another process reading the same state file sees it
    let reread = LastResultStore::new(&state_file).get("nightly").unwrap();
    assert_eq!(reread.details, report.details);
    assert!(report.to_string().starts_with("RESULT TYPE: SUCCESS\nDATE: "));
}

#[test]
fn test_status_scheduled_failure_overwrites() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .persist();
    let manager = manager_with(config.clone(), &MockBackend::new(), &MockProducer::new());
    manager.run_record("nightly", RunMode::Scheduled);

    let failing = MockBackend::new().fail_upload(BackendError::Transfer("disk full".to_string()));
    let manager = manager_with(config, &failing, &MockProducer::new());
    manager.run_record("nightly", RunMode::Scheduled);

    let report = manager.history().get("nightly").unwrap();
    assert_eq!(report.result_type, ResultType::Danger);
    assert!(report.details.contains("disk full"));
    assert_eq!(manager.history().load().len(), 1);
}

#[test]
fn test_status_one_entry_per_record() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .add_record("staging", "staging", "local")
        .persist();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    let results = manager.run_all(RunMode::Scheduled);

    assert_eq!(results.len(), 2);
    let history = manager.history().load();
    assert!(history.contains_key("nightly"));
    assert!(history.contains_key("staging"));
}

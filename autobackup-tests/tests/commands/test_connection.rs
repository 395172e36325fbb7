//! Tests for the 'test-connection' and 'send-test-file' commands

use super::manager_with;
use autobackup::backends::BackendError;
use test_utils::{
    BackendCall, ConfigBuilder, ErrorKind, MockBackend, MockProducer, PolicyConfig, ResultType,
};

#[test]
fn test_connection_success() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    let report = manager.test_connection("box");

    assert_eq!(report.result_type, ResultType::Success);
    assert_eq!(report.details, "Dropbox Connection Successful!\nmock destination");
    assert!(backend.was_called(&BackendCall::Probe));
    assert_eq!(backend.upload_count(), 0);
}

#[test]
fn test_connection_sftp_message() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "127.0.0.1", 22, Some("secret"))
        .persist();
    let manager = manager_with(config, &MockBackend::new(), &MockProducer::new());

    let report = manager.test_connection("nas");

    assert_eq!(report.result_type, ResultType::Success);
    assert!(report.details.starts_with("The SFTP connection was successful."));
}

#[test]
fn test_connection_auth_failure_is_warning() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "127.0.0.1", 22, Some("wrong"))
        .persist();
    let backend =
        MockBackend::new().fail_connect(BackendError::Auth("password rejected".to_string()));
    let manager = manager_with(config, &backend, &MockProducer::new());

    let report = manager.test_connection("nas");

    assert_eq!(report.result_type, ResultType::Warning);
    assert!(report
        .details
        .starts_with("The SFTP connection failed due to authentication error."));
    assert!(report.details.contains("password rejected"));
}

#[test]
fn test_connection_transfer_failure_is_danger() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .persist();
    let backend = MockBackend::new().fail_connect(BackendError::Transfer("timed out".to_string()));
    let manager = manager_with(config, &backend, &MockProducer::new());

    let report = manager.test_connection("box");

    assert_eq!(report.result_type, ResultType::Danger);
    assert!(report.details.starts_with("The Dropbox connection failed."));
}

#[test]
fn test_connection_unknown_destination() {
    let (config, _temp) = ConfigBuilder::minimal().persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    let report = manager.test_connection("nowhere");

    assert_eq!(report.result_type, ResultType::Danger);
    assert!(report.details.contains("nowhere"));
    assert!(backend.calls().is_empty());
}

#[test]
fn test_connection_policy_denied() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .with_policy(PolicyConfig {
            enable_dropbox: false,
            ..PolicyConfig::default()
        })
        .persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    let report = manager.test_connection("box");

    assert_eq!(report.result_type, ResultType::Danger);
    assert!(report.details.contains("Dropbox policy enabled"));
    assert!(backend.calls().is_empty());
}

#[test]
fn test_send_test_file() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_record_with_keep("nightly", "prod", "local", 2)
        .persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    let outcome = manager.send_test_file("local");

    assert!(outcome.is_success(), "{}", outcome);
    let stored = backend.stored_names();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].starts_with("Backup_test_"));
    assert!(stored[0].ends_with(".txt"));
    assert!(!backend.was_called(&BackendCall::List));
}

#[test]
fn test_send_test_file_not_ready() {
    let (config, _temp) = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "127.0.0.1", 22, None)
        .persist();
    let backend = MockBackend::new();
    let manager = manager_with(config, &backend, &MockProducer::new());

    let outcome = manager.send_test_file("nas");

    assert_eq!(outcome.kind(), Some(ErrorKind::Config));
    assert!(backend.calls().is_empty());
}

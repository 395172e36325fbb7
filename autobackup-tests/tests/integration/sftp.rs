//! SFTP scenarios that need no server

use autobackup::backends::{BackendError, SftpBackend, StorageBackend, TransferOptions};
use autobackup::strategies::{ArtifactProducer, DumpFormat};
use autobackup::utils::retention::RetentionQuota;
use test_utils::{
    listing, BackendCall, BackupScope, ConfigBuilder, ErrorKind, MockBackend, MockProducer,
    Outcome, RunPhase, TransferEngine, TransferJob,
};

#[test]
fn test_sftp_auth_failure_touches_nothing() {
    let config = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "nas.internal", 22, Some("wrong"))
        .build();
    let backend = MockBackend::new()
        .with_existing(listing("prod", 4))
        .fail_connect(BackendError::Auth("Authentication failed".to_string()));
    let engine = TransferEngine::with_factory(Box::new(backend.clone()));
    let job = TransferJob {
        source: "prod",
        destination: &config.destinations["nas"],
        quota: RetentionQuota::keep(2).unwrap(),
        options: TransferOptions::default(),
        utc_timestamps: true,
    };

    let producer = MockProducer::new().with_content("archive");

    let outcome = engine.run(&job, || {
        producer.produce("prod", BackupScope::Full, DumpFormat::Zip)
    });

    assert!(matches!(
        outcome,
        Outcome::Failure {
            kind: ErrorKind::Auth,
            phase: RunPhase::Connecting,
            ..
        }
    ));
    assert_eq!(backend.upload_count(), 0);
    assert_eq!(producer.call_count(), 0);
    assert!(!backend.was_called(&BackendCall::List));
    assert_eq!(backend.stored_names().len(), 4);
}

#[test]
fn test_sftp_unreachable_host_is_transfer_error() {
    // Nothing listens on port 1
    let mut backend = SftpBackend::new("127.0.0.1", 1, "backup", "secret", "/backups/");

    let err = backend.connect().unwrap_err();

    assert!(matches!(err, BackendError::Transfer(_)), "{:?}", err);
    assert!(err.to_string().contains("127.0.0.1:1"));
    backend.disconnect();
}

#[test]
fn test_sftp_invalid_port_is_config_error() {
    let config = ConfigBuilder::minimal()
        .add_destination(
            "nas",
            autobackup::config::Destination {
                description: String::new(),
                path: "/backups".to_string(),
                credentials: autobackup::config::Credentials::Sftp {
                    host: Some("nas.internal".to_string()),
                    port: Some("ssh".to_string()),
                    user: Some("backup".to_string()),
                    password: Some("secret".to_string()),
                },
            },
        )
        .build();

    let err = SftpBackend::from_destination(&config.destinations["nas"])
        .err()
        .expect("port must be numeric");

    assert!(matches!(err, BackendError::Config(_)));
    assert!(err.to_string().contains("Invalid SFTP port"));
}

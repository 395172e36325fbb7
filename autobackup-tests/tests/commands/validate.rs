//! Tests for the 'validate' command
//!
//! Validation covers record references and quotas at load time, and per
//! destination readiness and policy at report time.

use autobackup::config::{validate_config, ConfigError, Credentials, Destination, DriveCredentialsType};
use test_utils::{ConfigBuilder, DestinationKind, PolicyConfig, RecordConfig};

#[test]
fn test_validate_minimal_config() {
    let config = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "local")
        .build();

    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_validate_no_destinations() {
    let config = ConfigBuilder::new().build();

    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("No destinations defined"));
}

#[test]
fn test_validate_record_with_unknown_destination() {
    let config = ConfigBuilder::minimal()
        .add_record("nightly", "prod", "nowhere")
        .build();

    assert!(matches!(
        validate_config(&config),
        Err(ConfigError::DestinationNotFound(_))
    ));
}

#[test]
fn test_validate_record_with_empty_database() {
    let config = ConfigBuilder::minimal()
        .add_record("nightly", "  ", "local")
        .build();

    let err = validate_config(&config).unwrap_err();
    assert!(err.to_string().contains("database name is empty"));
}

#[test]
fn test_validate_keep_quota() {
    for (keep, valid) in [(-1, true), (0, false), (1, false), (2, true), (14, true)] {
        let config = ConfigBuilder::minimal()
            .add_record_with_keep("nightly", "prod", "local", keep)
            .build();
        assert_eq!(validate_config(&config).is_ok(), valid, "keep = {}", keep);
    }
}

#[test]
fn test_validate_readiness_per_kind() {
    let drive = |credentials_type, input: Option<&str>| Destination {
        description: String::new(),
        path: "1AbCdEf".to_string(),
        credentials: Credentials::Drive {
            credentials_type,
            credentials_file: None,
            credentials_input: input.map(String::from),
        },
    };

    assert!(drive(Some(DriveCredentialsType::Text), Some("{}")).check_ready().is_ok());
    assert!(drive(Some(DriveCredentialsType::Text), None).check_ready().is_err());
    assert!(drive(Some(DriveCredentialsType::File), Some("{}")).check_ready().is_err());
    assert!(drive(None, Some("{}")).check_ready().is_err());

    let no_folder = Destination {
        path: String::new(),
        ..drive(Some(DriveCredentialsType::Text), Some("{}"))
    };
    assert!(no_folder.check_ready().is_err());

    let dropbox_without_token = Destination {
        description: String::new(),
        path: "/Backups".to_string(),
        credentials: Credentials::Dropbox {
            app_key: Some("key".to_string()),
            app_secret: Some("secret".to_string()),
            app_token: Some("   ".to_string()),
        },
    };
    assert!(matches!(
        dropbox_without_token.check_ready(),
        Err(ConfigError::NotReady(DestinationKind::Dropbox))
    ));
}

#[test]
fn test_validate_policy_does_not_reject_config() {
    let config = ConfigBuilder::minimal()
        .add_record_config(
            "nightly",
            RecordConfig {
                enabled: true,
                description: String::new(),
                database: "prod".to_string(),
                destination: "local".to_string(),
                scope: Default::default(),
                keep: -1,
                chunk_size_mb: 10,
                notify_on_success: true,
                notify_on_failure: true,
            },
        )
        .with_policy(PolicyConfig {
            enable_local: false,
            ..PolicyConfig::default()
        })
        .build();

    assert!(validate_config(&config).is_ok());
    assert!(!config.policy.allows(DestinationKind::Local));
}

//! Unit tests for configuration loading and validation
//!
//! These tests verify config parsing, validation, and record resolution.

use autobackup::config::{
    load_config, resolve_all_records, BackupScope, ConfigError, Credentials, DestinationKind,
};
use test_utils::{
    invalid_keep_config_toml, missing_destination_config_toml, multi_destination_config_toml,
    ConfigBuilder, ResultAssertions, TestContext,
};

#[test]
fn test_config_loading_valid() {
    let ctx = TestContext::new();
    let path = ctx.write_config(multi_destination_config_toml());

    let config = load_config(&path).assert_ok();
    assert_eq!(config.destinations.len(), 4);
    assert_eq!(config.records.len(), 3);
    assert!(!config.policy.enable_drive);
    assert!(config.policy.enable_dropbox);
}

#[test]
fn test_destination_types_parse() {
    let ctx = TestContext::new();
    let config = load_config(ctx.write_config(multi_destination_config_toml())).assert_ok();

    assert_eq!(config.destinations["local"].kind(), DestinationKind::Local);
    assert_eq!(config.destinations["nas"].kind(), DestinationKind::Sftp);
    assert_eq!(config.destinations["drive"].kind(), DestinationKind::Drive);
    assert_eq!(config.destinations["box"].kind(), DestinationKind::Dropbox);

    // Port accepts a bare number
    match &config.destinations["nas"].credentials {
        Credentials::Sftp { port, .. } => assert_eq!(port.as_deref(), Some("2222")),
        other => panic!("Expected SFTP credentials, got {:?}", other),
    }
}

#[test]
fn test_config_with_invalid_keep() {
    let ctx = TestContext::new();
    let result = load_config(ctx.write_config(invalid_keep_config_toml()));

    assert!(matches!(result, Err(ConfigError::Policy(_))));
    result.assert_err_contains("either -1 or greater than 1");
}

#[test]
fn test_config_with_missing_destination() {
    let ctx = TestContext::new();
    let result = load_config(ctx.write_config(missing_destination_config_toml()));

    assert!(matches!(result, Err(ConfigError::DestinationNotFound(ref name)) if name == "nowhere"));
}

#[test]
fn test_config_with_unknown_destination_type() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.toml",
        "[destinations.tape]\ntype = \"tape\"\npath = \"/dev/st0\"\n",
    );

    assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
}

#[test]
fn test_config_missing_file() {
    let ctx = TestContext::new();
    let result = load_config(ctx.temp_dir().join("absent.toml"));

    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
fn test_record_defaults() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.toml",
        r#"
[destinations.local]
type = "local"
path = "/tmp/backups"

[records.nightly]
database = "prod"
destination = "local"
"#,
    );

    let config = load_config(&path).assert_ok();
    let resolved = resolve_all_records(&config).assert_ok();
    let record = &resolved["nightly"];

    assert!(record.enabled);
    assert_eq!(record.scope, BackupScope::Full);
    assert!(!record.quota.is_active());
    assert!(record.chunk_size_bytes > 0);
    assert!(record.notify_on.is_empty());
}

#[test]
fn test_record_resolution_from_template() {
    let ctx = TestContext::new();
    let config = load_config(ctx.write_config(multi_destination_config_toml())).assert_ok();
    let resolved = resolve_all_records(&config).assert_ok();

    let offsite = &resolved["offsite"];
    assert_eq!(offsite.destination_name, "box");
    assert_eq!(offsite.scope, BackupScope::Db);

    let archive = &resolved["archive"];
    assert!(!archive.enabled);
    assert_eq!(archive.scope, BackupScope::Fs);

    assert_eq!(resolved["nightly"].quota.keep_count(), 7);
}

#[test]
fn test_readiness_is_not_a_load_error() {
    // Incomplete credentials only fail when the destination is used
    let config = ConfigBuilder::minimal()
        .add_sftp_destination("nas", "nas.internal", 22, None)
        .add_record("offsite", "prod", "nas")
        .build();

    assert!(resolve_all_records(&config).is_ok());
    config.destinations["nas"]
        .check_ready()
        .assert_err_contains("check the SFTP credentials");
}

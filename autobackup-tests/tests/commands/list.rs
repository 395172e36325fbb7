//! Tests for the 'list' command

use autobackup::config::resolve_all_records;
use test_utils::{BackupScope, ConfigBuilder, DestinationKind};

#[test]
fn test_list_resolved_records() {
    let config = ConfigBuilder::minimal()
        .add_dropbox_destination("box")
        .add_record_with_keep("nightly", "prod", "local", 5)
        .add_record("offsite", "prod", "box")
        .build();

    let resolved = resolve_all_records(&config).unwrap();
    let names: Vec<&String> = resolved.keys().collect();
    assert_eq!(names, vec!["nightly", "offsite"]);

    let nightly = &resolved["nightly"];
    assert_eq!(nightly.quota.to_string(), "keep 5");
    assert_eq!(nightly.scope.to_string(), "DB & Filestore");
    assert_eq!(nightly.destination.kind(), DestinationKind::Local);

    let offsite = &resolved["offsite"];
    assert_eq!(offsite.quota.to_string(), "disabled");
    assert_eq!(offsite.destination.kind().to_string(), "Dropbox");
}

#[test]
fn test_list_scope_labels() {
    assert_eq!(BackupScope::Db.to_string(), "DB");
    assert_eq!(BackupScope::Fs.to_string(), "Filestore");
}

#[test]
fn test_list_destination_paths() {
    let builder = ConfigBuilder::minimal();
    let expected = builder.temp_dir().join("backups");

    assert_eq!(builder.destination_path("local"), Some(expected));
    assert_eq!(builder.destination_path("missing"), None);
}

//! Unit tests for backup artifact names

use autobackup::utils::naming::{is_backup_archive, ArtifactExtension, ArtifactName, NamingError};
use chrono::{NaiveDate, TimeZone, Utc};
use rstest::rstest;

#[test]
fn test_name_format() {
    let stamp = NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(4, 5, 6)
        .unwrap();
    let name = ArtifactName::at("prod", stamp, stamp.and_utc(), ArtifactExtension::Zip);

    assert_eq!(name.file_name(), "Backup_prod_2024-03-09_04.05.06.zip");
}

#[test]
fn test_parse_keeps_source_with_underscores() {
    let name = ArtifactName::parse("Backup_odoo_prod_2024-01-02_02.00.00.zip").unwrap();

    assert_eq!(name.source(), "odoo_prod");
    assert_eq!(name.extension(), ArtifactExtension::Zip);
    assert_eq!(
        name.captured_at(),
        Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap()
    );
}

#[test]
fn test_capture_utc_round_trips_file_name() {
    let name = ArtifactName::capture("prod", ArtifactExtension::Txt, true);
    let parsed = ArtifactName::parse(&name.file_name()).unwrap();

    assert_eq!(parsed.file_name(), name.file_name());
    assert_eq!(parsed.extension(), ArtifactExtension::Txt);
}

#[test]
fn test_unsupported_extension() {
    let err = "tar".parse::<ArtifactExtension>().unwrap_err();
    assert_eq!(err, NamingError::UnsupportedExtension("tar".to_string()));
    assert!(err.to_string().contains("supported formats: txt, zip"));
}

#[rstest]
#[case("Backup_prod_2024-01-02_02.00.00.zip", true)]
#[case("Backup_prod_2024-01-02_02.00.00.txt", false)]
#[case("Backup_prod_2024-01-02.zip", false)]
#[case("notes.zip", false)]
#[case("Backup_prod_2024-01-02_02.00.00.zip.part", false)]
fn test_is_backup_archive(#[case] file_name: &str, #[case] expected: bool) {
    assert_eq!(is_backup_archive(file_name), expected);
}

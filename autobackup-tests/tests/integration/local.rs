//! Local destination scenarios against a real directory

use super::common::{file_names, manager_with_real_backends};
use autobackup::backends::TransferOptions;
use autobackup::strategies::Artifact;
use autobackup::utils::retention::RetentionQuota;
use test_utils::{
    ConfigBuilder, ErrorKind, FailingReader, MockProducer, Outcome, RunMode, RunPhase,
    TestContext, TransferEngine, TransferJob,
};

#[test]
fn test_local_run_keeps_newest() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().add_record_with_keep("nightly", "prod", "local", 3),
    );
    let config = ctx.config().unwrap().clone();
    let backups = ctx.temp_dir().join("backups");
    let seeded = ctx.seed_backups(&backups, "prod", 5);

    let manager = manager_with_real_backends(config, &MockProducer::new());
    let outcome = manager.run_record("nightly", RunMode::Manual);

    assert!(outcome.is_success(), "{}", outcome);
    assert_eq!(outcome.detail(), "Local Backup process executed successfully.");

    let remaining = file_names(&backups);
    assert_eq!(remaining.len(), 3, "{:?}", remaining);
    for old in &seeded[..3] {
        assert!(!remaining.contains(old), "{} should have been pruned", old);
    }
    assert!(remaining.contains(&seeded[3]));
    assert!(remaining.contains(&seeded[4]));
}

#[test]
fn test_local_run_on_empty_directory() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().add_record_with_keep("nightly", "prod", "local", 2),
    );
    let config = ctx.config().unwrap().clone();
    let producer = MockProducer::new().with_content("zip bytes");

    let manager = manager_with_real_backends(config, &producer);
    let outcome = manager.run_record("nightly", RunMode::Manual);

    assert!(outcome.is_success(), "{}", outcome);
    let backups = ctx.temp_dir().join("backups");
    let remaining = file_names(&backups);
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        std::fs::read(backups.join(&remaining[0])).unwrap(),
        b"zip bytes"
    );
}

#[test]
fn test_local_retention_ignores_foreign_files() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal().add_record_with_keep("nightly", "prod", "local", 2),
    );
    let config = ctx.config().unwrap().clone();
    let backups = ctx.temp_dir().join("backups");
    ctx.seed_backups(&backups, "prod", 3);
    ctx.create_file("backups/notes.txt", "keep me");
    ctx.create_file("backups/Backup_test_2024-01-01_00.00.00.txt", "probe");

    let manager = manager_with_real_backends(config, &MockProducer::new());
    assert!(manager.run_record("nightly", RunMode::Manual).is_success());

    let remaining = file_names(&backups);
    assert!(remaining.contains(&"notes.txt".to_string()));
    assert!(remaining.contains(&"Backup_test_2024-01-01_00.00.00.txt".to_string()));
    let archives = remaining.iter().filter(|n| n.ends_with(".zip")).count();
    assert_eq!(archives, 2);
}

#[test]
fn test_local_write_failure_skips_retention() {
    let ctx = TestContext::with_minimal_config();
    let config = ctx.config().unwrap().clone();
    let backups = ctx.temp_dir().join("backups");
    let seeded = ctx.seed_backups(&backups, "prod", 4);

    let engine = TransferEngine::new();
    let job = TransferJob {
        source: "prod",
        destination: &config.destinations["local"],
        quota: RetentionQuota::keep(2).unwrap(),
        options: TransferOptions::default(),
        utc_timestamps: true,
    };
    let outcome = engine.run(&job, || {
        Ok(Artifact::from_reader(Box::new(FailingReader::new(64 * 1024))))
    });

    assert!(matches!(
        outcome,
        Outcome::Failure {
            kind: ErrorKind::Transfer,
            phase: RunPhase::Uploading,
            ..
        }
    ));
    assert!(outcome.detail().contains("No space left on device"));

    // Every seeded archive survives, next to the partial file
    let remaining = file_names(&backups);
    for name in &seeded {
        assert!(remaining.contains(name));
    }
    assert_eq!(remaining.len(), seeded.len() + 1);
}

#[test]
fn test_local_send_test_file() {
    let ctx = TestContext::with_minimal_config();
    let config = ctx.config().unwrap().clone();

    let manager = manager_with_real_backends(config, &MockProducer::new());
    let outcome = manager.send_test_file("local");

    assert!(outcome.is_success(), "{}", outcome);
    let remaining = file_names(&ctx.temp_dir().join("backups"));
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].starts_with("Backup_test_"));
    assert!(remaining[0].ends_with(".txt"));
}

#[test]
fn test_local_connection_report() {
    let ctx = TestContext::with_minimal_config();
    let config = ctx.config().unwrap().clone();

    let manager = manager_with_real_backends(config, &MockProducer::new());
    let report = manager.test_connection("local");

    assert_eq!(report.result_type, test_utils::ResultType::Success, "{}", report);
    assert!(report.details.starts_with("Local Connection Successful!"));
}

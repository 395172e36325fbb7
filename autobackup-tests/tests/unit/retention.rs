//! Unit tests for count-based retention

use autobackup::backends::ArtifactId;
use autobackup::utils::retention::{prune, PolicyError, RetentionQuota};
use rstest::rstest;
use test_utils::{listed, listing};

fn names(entries: &[autobackup::backends::ListedArtifact]) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(-2)]
fn test_invalid_quota(#[case] keep: i64) {
    assert_eq!(RetentionQuota::keep(keep), Err(PolicyError(keep)));
}

#[rstest]
#[case(6, 3, 3)]
#[case(3, 3, 0)]
#[case(2, 3, 0)]
#[case(10, 2, 8)]
fn test_prune_count(#[case] existing: u32, #[case] keep: i64, #[case] deleted: usize) {
    // The newest entry is the just-uploaded one
    let entries = listing("prod", existing);
    let uploaded = entries[entries.len() - 1].id.clone();
    let quota = RetentionQuota::keep(keep).unwrap();

    assert_eq!(prune(&entries, &uploaded, quota).len(), deleted);
}

#[test]
fn test_prune_deletes_oldest() {
    let entries = listing("prod", 5);
    let uploaded = entries[4].id.clone();

    let doomed = prune(&entries, &uploaded, RetentionQuota::keep(3).unwrap());
    let mut doomed = names(&doomed);
    doomed.sort();

    assert_eq!(
        doomed,
        vec![
            "Backup_prod_2024-01-01_02.00.00.zip",
            "Backup_prod_2024-01-02_02.00.00.zip"
        ]
    );
}

#[test]
fn test_prune_ignores_listing_order() {
    let mut entries = listing("prod", 4);
    entries.reverse();
    let uploaded = listed("prod", 4).id;

    let doomed = prune(&entries, &uploaded, RetentionQuota::keep(2).unwrap());
    let mut doomed = names(&doomed);
    doomed.sort();

    assert_eq!(
        doomed,
        vec![
            "Backup_prod_2024-01-01_02.00.00.zip",
            "Backup_prod_2024-01-02_02.00.00.zip"
        ]
    );
}

#[test]
fn test_prune_reserves_slot_for_invisible_upload() {
    let entries = listing("prod", 3);
    let uploaded = ArtifactId::new("mock://not-yet-listed");

    let doomed = prune(&entries, &uploaded, RetentionQuota::keep(3).unwrap());

    assert_eq!(names(&doomed), vec!["Backup_prod_2024-01-01_02.00.00.zip"]);
}

#[test]
fn test_prune_is_idempotent() {
    let entries = listing("prod", 6);
    let uploaded = entries[5].id.clone();
    let quota = RetentionQuota::keep(3).unwrap();

    let doomed = prune(&entries, &uploaded, quota);
    let remaining: Vec<_> = entries
        .iter()
        .filter(|e| !doomed.iter().any(|d| d.id == e.id))
        .cloned()
        .collect();

    assert_eq!(remaining.len(), 3);
    assert!(prune(&remaining, &uploaded, quota).is_empty());
}

#[test]
fn test_disabled_quota_never_prunes() {
    let entries = listing("prod", 20);
    let uploaded = entries[19].id.clone();

    assert!(prune(&entries, &uploaded, RetentionQuota::disabled()).is_empty());
}

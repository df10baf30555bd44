//! Tests for the deduplicating BackupStore

use pbx_fs::{BackupStore, Error, NormalizedPath};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

fn setup(content: &str) -> (TempDir, NormalizedPath) {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("pjsip.conf");
    fs::write(&file, content).unwrap();
    (temp, NormalizedPath::new(file))
}

#[test]
fn backup_of_missing_file_is_none() {
    let temp = TempDir::new().unwrap();
    let store = BackupStore::new();
    let path = NormalizedPath::new(temp.path().join("absent.conf"));

    assert_eq!(store.backup(&path).unwrap(), None);
    assert!(store.list(&path).unwrap().is_empty());
}

#[test]
fn repeated_backup_without_changes_is_idempotent() {
    let (_temp, path) = setup("[1001]\ntype=endpoint\n");
    let store = BackupStore::new();

    let first = store.backup(&path).unwrap().unwrap();
    let second = store.backup(&path).unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(store.list(&path).unwrap().len(), 1);
}

#[test]
fn changed_content_produces_new_backup() {
    let (_temp, path) = setup("A");
    let store = BackupStore::new();

    let first = store.backup(&path).unwrap().unwrap();
    fs::write(path.to_native(), "B").unwrap();
    let second = store.backup(&path).unwrap().unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.content_hash, second.content_hash);
    assert_eq!(store.list(&path).unwrap().len(), 2);
    assert_eq!(store.latest(&path).unwrap(), Some(second));
}

#[test]
fn latest_of_unbacked_file_is_none() {
    let (_temp, path) = setup("A");

    assert_eq!(BackupStore::new().latest(&path).unwrap(), None);
}

#[test]
fn rapid_distinct_backups_get_distinct_names() {
    let (_temp, path) = setup("v0");
    let store = BackupStore::new();

    let mut ids = Vec::new();
    for i in 1..=5 {
        fs::write(path.to_native(), format!("v{}", i)).unwrap();
        ids.push(store.backup(&path).unwrap().unwrap().id);
    }

    let listed: Vec<String> = store.list(&path).unwrap().into_iter().map(|e| e.id).collect();
    ids.reverse();
    assert_eq!(listed, ids, "list must be newest first");
}

#[test]
fn list_is_newest_first_and_reports_content_hash() {
    let (_temp, path) = setup("one");
    let store = BackupStore::new();
    store.backup(&path).unwrap();
    fs::write(path.to_native(), "two").unwrap();
    store.backup(&path).unwrap();

    let entries = store.list(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].content_hash,
        pbx_fs::checksum::compute_content_checksum("two")
    );
    assert!(entries[0].created_at >= entries[1].created_at);
}

#[test]
fn backups_are_named_after_source_and_tag() {
    let (_temp, path) = setup("x");
    let store = BackupStore::new().with_tag("pjsip").unwrap();

    let entry = store.backup(&path).unwrap().unwrap();

    assert!(entry.id.starts_with("pjsip.conf.pjsip."), "got {}", entry.id);
    assert_eq!(fs::read_to_string(entry.backup_path.to_native()).unwrap(), "x");
}

#[test]
fn dedicated_backup_directory() {
    let (temp, path) = setup("x");
    let backup_dir = NormalizedPath::new(temp.path().join("backups"));
    let store = BackupStore::new().with_backup_dir(backup_dir.clone());

    let entry = store.backup(&path).unwrap().unwrap();

    assert_eq!(entry.backup_path.dir(), backup_dir);
    assert_eq!(store.list(&path).unwrap().len(), 1);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(10)]
fn cleanup_keeps_most_recent(#[case] keep: usize) {
    let (_temp, path) = setup("v0");
    let store = BackupStore::new();
    for i in 0..4 {
        fs::write(path.to_native(), format!("v{}", i)).unwrap();
        store.backup(&path).unwrap();
    }
    let before = store.list(&path).unwrap();

    store.cleanup(&path, keep).unwrap();

    let after = store.list(&path).unwrap();
    let expected: Vec<_> = before.into_iter().take(keep).collect();
    assert_eq!(after, expected);
    assert!(path.exists(), "source file must survive cleanup");
}

#[test]
fn cleanup_is_idempotent() {
    let (_temp, path) = setup("a");
    let store = BackupStore::new();
    store.backup(&path).unwrap();
    fs::write(path.to_native(), "b").unwrap();
    store.backup(&path).unwrap();

    let removed_first = store.cleanup(&path, 1).unwrap();
    let removed_second = store.cleanup(&path, 1).unwrap();

    assert_eq!(removed_first.len(), 1);
    assert!(removed_second.is_empty());
}

#[test]
fn example_scenario_a_a_a_b_keep_one() {
    let (_temp, path) = setup("A");
    let store = BackupStore::new();

    for _ in 0..3 {
        store.backup(&path).unwrap();
    }
    assert_eq!(store.list(&path).unwrap().len(), 1);

    fs::write(path.to_native(), "B").unwrap();
    store.backup(&path).unwrap();
    assert_eq!(store.list(&path).unwrap().len(), 2);

    store.cleanup(&path, 1).unwrap();
    let remaining = store.list(&path).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        fs::read_to_string(remaining[0].backup_path.to_native()).unwrap(),
        "B"
    );
}

#[test]
fn restore_copies_backup_content() {
    let (_temp, path) = setup("good");
    let store = BackupStore::new();
    let good = store.backup(&path).unwrap().unwrap();

    fs::write(path.to_native(), "broken").unwrap();
    let restored = store.restore(&good.id, &path).unwrap();

    assert_eq!(restored.id, good.id);
    assert_eq!(fs::read_to_string(path.to_native()).unwrap(), "good");
    // The broken state was captured before being overwritten
    let hashes: Vec<_> = store.list(&path).unwrap().into_iter().map(|e| e.content_hash).collect();
    assert!(hashes.contains(&pbx_fs::checksum::compute_content_checksum("broken")));
}

#[test]
fn restore_unknown_backup_is_not_found() {
    let (_temp, path) = setup("x");
    let store = BackupStore::new();

    let result = store.restore("pjsip.conf.bak.20000101000000", &path);

    assert!(matches!(result, Err(Error::BackupNotFound { .. })));
    assert_eq!(fs::read_to_string(path.to_native()).unwrap(), "x");
}

#[test]
fn restore_rejects_path_traversal() {
    let (_temp, path) = setup("x");
    let store = BackupStore::new();

    let result = store.restore("../../etc/passwd", &path);

    assert!(matches!(result, Err(Error::InvalidIdentifier(_))));
}

#[test]
fn backups_of_other_files_are_not_listed() {
    let (temp, path) = setup("x");
    let other = NormalizedPath::new(temp.path().join("extensions.conf"));
    fs::write(other.to_native(), "y").unwrap();
    let store = BackupStore::new();

    store.backup(&path).unwrap();
    store.backup(&other).unwrap();

    assert_eq!(store.list(&path).unwrap().len(), 1);
    assert_eq!(store.list(&other).unwrap().len(), 1);
}

#[test]
fn backups_visible_through_assert_fs() {
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    let dir = assert_fs::TempDir::new().unwrap();
    let conf = dir.child("pjsip.conf");
    conf.write_str("[1001]\n").unwrap();
    let store = BackupStore::new();

    let entry = store
        .backup(&NormalizedPath::new(conf.path()))
        .unwrap()
        .unwrap();

    dir.child(&entry.id).assert(predicate::str::diff("[1001]\n"));
    conf.assert(predicate::path::exists());
}

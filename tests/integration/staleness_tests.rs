use std::path::PathBuf;
use std::sync::Arc;

use dupfinder::config::ScanConfig;
use dupfinder::duplicates::Classification;
use dupfinder::scanner::{DigestAlgorithm, DiscoveredFile, DiscoveryError};
use dupfinder::store::{DiscoveryUpdate, HashState, HashUpdate, MemoryStore, RecordStore};
use filetime::{set_file_mtime, FileTime};
use tempfile::tempdir;

use super::support::{scanner, write_file, CountingHasher};

/// Store `file` as fully hashed with the given watermark.
fn seed(store: &MemoryStore, file: &DiscoveredFile, watermark: f64) {
    store
        .upsert_discovered(&[DiscoveryUpdate::new(file.clone(), Classification::New)], 400.0)
        .unwrap();
    let digest = DigestAlgorithm::Blake3.digest(b"stored");
    store
        .commit_hash_results(&[HashUpdate::complete(file.path.clone(), digest.clone(), digest)])
        .unwrap();
    store.set_hash_algorithm(DigestAlgorithm::Blake3).unwrap();
    store
        .set_fingerprint_prefix(ScanConfig::default().prefix_size)
        .unwrap();
    store.set_watermark(watermark).unwrap();
}

fn feed(files: Vec<DiscoveredFile>) -> Vec<Result<DiscoveredFile, DiscoveryError>> {
    files.into_iter().map(Ok).collect()
}

#[test]
fn test_file_older_than_watermark_is_not_read() {
    let store = Arc::new(MemoryStore::new());
    let path = PathBuf::from("/virtual/e.bin");
    seed(&store, &DiscoveredFile::new(path.clone(), 64, 500.0), 1000.0);
    let stored = store.get_record(&path).unwrap().unwrap();

    let hasher = Arc::new(CountingHasher::default());
    let summary = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan_entries(feed(vec![DiscoveredFile::new(path.clone(), 64, 500.0)]))
        .unwrap();

    assert_eq!(summary.classification.reused, 1);
    assert_eq!(hasher.reads_of(&path), 0);

    let after = store.get_record(&path).unwrap().unwrap();
    assert_eq!(after.full_hash, stored.full_hash);
    assert_eq!(after.quick_fingerprint, stored.quick_fingerprint);
    assert!(after.seen_at > stored.seen_at);
}

#[test]
fn test_reuse_even_when_stored_mtime_is_stale() {
    let store = Arc::new(MemoryStore::new());
    let path = PathBuf::from("/virtual/old.bin");
    seed(&store, &DiscoveredFile::new(path.clone(), 64, 300.0), 1000.0);

    // The stored mtime differs numerically, but the file predates the watermark.
    let summary = scanner(store.clone())
        .scan_entries(feed(vec![DiscoveredFile::new(path.clone(), 64, 700.0)]))
        .unwrap();

    assert_eq!(summary.classification.reused, 1);
    assert!(store.get_record(&path).unwrap().unwrap().full_hash.is_computed());
}

#[test]
fn test_file_modified_after_watermark_is_rehashed() {
    let store = Arc::new(MemoryStore::new());
    let path = PathBuf::from("/virtual/f.bin");
    seed(&store, &DiscoveredFile::new(path.clone(), 64, 500.0), 1000.0);

    let hasher = Arc::new(CountingHasher::default());
    let summary = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan_entries(feed(vec![DiscoveredFile::new(path.clone(), 64, 1500.0)]))
        .unwrap();

    assert_eq!(summary.classification.rehashed, 1);
    // Unique size in this pass: pruned before any read.
    assert_eq!(hasher.reads_of(&path), 0);

    let record = store.get_record(&path).unwrap().unwrap();
    assert_eq!(record.modified, 1500.0);
    assert_eq!(record.quick_fingerprint, HashState::Pending);
    assert_eq!(record.full_hash, HashState::Pending);
    assert_eq!(store.query_pending().unwrap(), vec![path]);
}

#[test]
fn test_size_change_forces_rehash() {
    let store = Arc::new(MemoryStore::new());
    let path = PathBuf::from("/virtual/grown.bin");
    seed(&store, &DiscoveredFile::new(path.clone(), 64, 500.0), 1000.0);

    let summary = scanner(store.clone())
        .scan_entries(feed(vec![DiscoveredFile::new(path.clone(), 65, 500.0)]))
        .unwrap();

    assert_eq!(summary.classification.rehashed, 1);
    assert_eq!(store.get_record(&path).unwrap().unwrap().size, 65);
}

#[test]
fn test_discovery_errors_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let entries = vec![
        Err(DiscoveryError::PermissionDenied(PathBuf::from("/virtual/locked"))),
        Ok(DiscoveredFile::new(PathBuf::from("/virtual/ok"), 10, 1.0)),
    ];

    let summary = scanner(store.clone()).scan_entries(entries).unwrap();

    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.discovery_failures.len(), 1);
    assert!(summary.has_failures());
    assert!(summary.watermark_advanced);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_edited_file_on_disk_rejoins_funnel() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", b"original");
    let b = write_file(dir.path(), "b.txt", b"original");

    let store = Arc::new(MemoryStore::new());
    let first = scanner(store.clone()).scan(dir.path()).unwrap();
    assert_eq!(first.duplicate_groups, 1);
    let watermark = store.last_scan_timestamp().unwrap().unwrap();

    // Same size, new content, mtime well past the watermark.
    std::fs::write(&b, b"edited!!").unwrap();
    let future = FileTime::from_unix_time(watermark as i64 + 3600, 0);
    set_file_mtime(&b, future).unwrap();

    let hasher = Arc::new(CountingHasher::default());
    let second = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan(dir.path())
        .unwrap();

    assert_eq!(second.classification.reused, 1);
    assert_eq!(second.classification.rehashed, 1);
    assert_eq!(hasher.reads_of(&a), 0);
    assert_eq!(hasher.reads_of(&b), 1);
    assert_eq!(second.duplicate_groups, 0);

    let rec_b = store.get_record(&b).unwrap().unwrap();
    assert!(rec_b.quick_fingerprint.is_computed());
    assert_eq!(rec_b.full_hash, HashState::Pending);
}

#[test]
fn test_touched_file_older_than_watermark_keeps_hash() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", b"twin");
    write_file(dir.path(), "b.txt", b"twin");

    let store = Arc::new(MemoryStore::new());
    scanner(store.clone()).scan(dir.path()).unwrap();
    let before = store.get_record(&a).unwrap().unwrap();

    // Move the mtime backwards: different from the stored value, but older
    // than the watermark.
    set_file_mtime(&a, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let hasher = Arc::new(CountingHasher::default());
    let summary = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan(dir.path())
        .unwrap();

    assert_eq!(summary.classification.reused, 2);
    assert_eq!(hasher.full_hash_count(), 0);
    let after = store.get_record(&a).unwrap().unwrap();
    assert_eq!(after.full_hash, before.full_hash);
}

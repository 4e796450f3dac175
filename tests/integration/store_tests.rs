//! Behavior shared by every [`RecordStore`] implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dupfinder::duplicates::Classification;
use dupfinder::scanner::{Digest, DigestAlgorithm, DiscoveredFile};
use dupfinder::store::{
    DiscoveryUpdate, HashState, HashUpdate, MemoryStore, RecordStore, SqliteStore,
};
use tempfile::tempdir;

use super::support::{scanner, snapshot, write_file};

fn stores() -> Vec<(&'static str, Box<dyn RecordStore>)> {
    vec![
        ("memory", Box::new(MemoryStore::new())),
        ("sqlite", Box::new(SqliteStore::open_in_memory().unwrap())),
    ]
}

fn file(path: &str, size: u64, modified: f64) -> DiscoveredFile {
    DiscoveredFile::new(PathBuf::from(path), size, modified)
}

fn digest(content: &[u8]) -> Digest {
    DigestAlgorithm::Blake3.digest(content)
}

fn upsert(store: &dyn RecordStore, files: &[DiscoveredFile], class: Classification, seen_at: f64) {
    let batch: Vec<DiscoveryUpdate> = files
        .iter()
        .map(|f| DiscoveryUpdate::new(f.clone(), class))
        .collect();
    store.upsert_discovered(&batch, seen_at).unwrap();
}

#[test]
fn test_new_then_reuse_keeps_digests() {
    for (name, store) in stores() {
        let store = store.as_ref();
        upsert(store, &[file("/t/a", 5, 10.0)], Classification::New, 100.0);
        store
            .commit_hash_results(&[HashUpdate::complete(
                PathBuf::from("/t/a"),
                digest(b"q"),
                digest(b"f"),
            )])
            .unwrap();

        upsert(store, &[file("/t/a", 5, 10.0)], Classification::Reuse, 200.0);

        let record = store.get_record(Path::new("/t/a")).unwrap().unwrap();
        assert_eq!(record.seen_at, 200.0, "{name}");
        assert_eq!(record.quick_fingerprint, HashState::Computed(digest(b"q")), "{name}");
        assert_eq!(record.full_hash, HashState::Computed(digest(b"f")), "{name}");
    }
}

#[test]
fn test_rehash_resets_both_digests() {
    for (name, store) in stores() {
        let store = store.as_ref();
        upsert(store, &[file("/t/a", 5, 10.0)], Classification::New, 100.0);
        store
            .commit_hash_results(&[HashUpdate::complete(
                PathBuf::from("/t/a"),
                digest(b"q"),
                digest(b"f"),
            )])
            .unwrap();

        upsert(store, &[file("/t/a", 6, 20.0)], Classification::Rehash, 200.0);

        let record = store.get_record(Path::new("/t/a")).unwrap().unwrap();
        assert_eq!(record.size, 6, "{name}");
        assert_eq!(record.modified, 20.0, "{name}");
        assert!(record.quick_fingerprint.is_pending(), "{name}");
        assert!(record.full_hash.is_pending(), "{name}");
        assert_eq!(store.query_pending().unwrap(), vec![PathBuf::from("/t/a")], "{name}");
    }
}

#[test]
fn test_candidates_need_a_shared_fingerprint() {
    for (name, store) in stores() {
        let store = store.as_ref();
        upsert(
            store,
            &[
                file("/t/a", 8, 1.0),
                file("/t/b", 8, 1.0),
                file("/t/c", 8, 1.0),
                file("/t/d", 9, 1.0),
            ],
            Classification::New,
            100.0,
        );
        store
            .commit_hash_results(&[
                HashUpdate::fingerprint(PathBuf::from("/t/a"), digest(b"same")),
                HashUpdate::fingerprint(PathBuf::from("/t/b"), digest(b"same")),
                HashUpdate::fingerprint(PathBuf::from("/t/c"), digest(b"other")),
                // Same fingerprint, different size: not a sibling.
                HashUpdate::fingerprint(PathBuf::from("/t/d"), digest(b"same")),
            ])
            .unwrap();

        let mut paths: Vec<PathBuf> = store
            .query_candidates()
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("/t/a"), PathBuf::from("/t/b")], "{name}");

        // Once hashed, a record is no longer a candidate but still counts
        // as a sibling.
        store
            .commit_hash_results(&[HashUpdate::complete(
                PathBuf::from("/t/a"),
                digest(b"same"),
                digest(b"full"),
            )])
            .unwrap();
        let remaining: Vec<PathBuf> = store
            .query_candidates()
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(remaining, vec![PathBuf::from("/t/b")], "{name}");
    }
}

#[test]
fn test_watermark_and_algorithm_metadata() {
    for (name, store) in stores() {
        let store = store.as_ref();
        assert!(store.watermark().unwrap().is_none(), "{name}");
        assert!(store.hash_algorithm().unwrap().is_none(), "{name}");

        let first = store.set_watermark(10.0).unwrap();
        let second = store.set_watermark(20.0).unwrap();
        assert_eq!(first.version, 1, "{name}");
        assert_eq!(second.version, 2, "{name}");
        assert_eq!(store.last_scan_timestamp().unwrap(), Some(20.0), "{name}");

        store.set_hash_algorithm(DigestAlgorithm::Sha1).unwrap();
        assert_eq!(store.hash_algorithm().unwrap(), Some(DigestAlgorithm::Sha1), "{name}");

        assert!(store.fingerprint_prefix().unwrap().is_none(), "{name}");
        store.set_fingerprint_prefix(4096).unwrap();
        store.set_fingerprint_prefix(512).unwrap();
        assert_eq!(store.fingerprint_prefix().unwrap(), Some(512), "{name}");
    }
}

/// Discovery and hash results for files `/w/0000` .. in `range`. The
/// digests depend only on the index, so overlapping workloads agree.
fn workload(range: std::ops::Range<usize>) -> (Vec<DiscoveredFile>, Vec<HashUpdate>) {
    range
        .map(|i| {
            let path = format!("/w/{i:04}");
            let content = format!("content {}", i % 7);
            let update = HashUpdate::complete(
                PathBuf::from(&path),
                digest(&content.as_bytes()[..4]),
                digest(content.as_bytes()),
            );
            (file(&path, content.len() as u64, i as f64), update)
        })
        .unzip()
}

fn apply(store: &dyn RecordStore, files: &[DiscoveredFile], updates: &[HashUpdate]) {
    for (files, updates) in files.chunks(8).zip(updates.chunks(8)) {
        upsert(store, files, Classification::New, 100.0);
        store.commit_hash_results(updates).unwrap();
    }
}

#[test]
fn test_commit_same_batch_twice_is_idempotent() {
    for (name, store) in stores() {
        let store = store.as_ref();
        let (files, updates) = workload(0..20);
        upsert(store, &files, Classification::New, 100.0);

        store.commit_hash_results(&updates).unwrap();
        let once = store.all_records().unwrap();
        store.commit_hash_results(&updates).unwrap();

        assert_eq!(store.all_records().unwrap(), once, "{name}");
        assert!(store.query_pending().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn test_two_sqlite_handles_write_concurrently() {
    let data = tempdir().unwrap();
    let db_path = data.path().join("hashes.db");
    let first = SqliteStore::open(&db_path).unwrap();
    let second = SqliteStore::open(&db_path).unwrap();
    let (files_a, updates_a) = workload(0..120);
    let (files_b, updates_b) = workload(60..180);

    std::thread::scope(|s| {
        s.spawn(|| apply(&first, &files_a, &updates_a));
        s.spawn(|| apply(&second, &files_b, &updates_b));
    });

    let expected = SqliteStore::open(&data.path().join("single.db")).unwrap();
    apply(&expected, &files_a, &updates_a);
    apply(&expected, &files_b, &updates_b);

    let written = snapshot(&first);
    assert_eq!(written.len(), 180);
    assert_eq!(written, snapshot(&expected));
    assert_eq!(snapshot(&second), written);
    assert!(first.query_pending().unwrap().is_empty());
}

#[test]
fn test_sqlite_store_survives_reopen_between_scans() {
    let dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let db_path = data.path().join("hashes.db");
    let a = write_file(dir.path(), "a.bin", &[1u8; 300]);
    write_file(dir.path(), "b.bin", &[1u8; 300]);

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let summary = scanner(store).scan(dir.path()).unwrap();
        assert_eq!(summary.hashed_files, 2);
    }

    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    assert!(store.get_record(&a).unwrap().unwrap().full_hash.is_computed());
    assert!(store.watermark().unwrap().is_some());

    let summary = scanner(store.clone()).scan(dir.path()).unwrap();
    assert_eq!(summary.classification.reused, 2);
    assert_eq!(summary.hashed_files, 0);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(store.watermark().unwrap().unwrap().version, 2);
}

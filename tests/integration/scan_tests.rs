use std::fs;
use std::sync::Arc;

use dupfinder::duplicates::{IncrementalScanner, ScanError};
use dupfinder::scanner::DigestAlgorithm;
use dupfinder::store::{HashState, MemoryStore, RecordStore, SqliteStore};
use tempfile::tempdir;

use super::support::{scanner, snapshot, test_config, write_file, CountingHasher};

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let summary = scanner(store.clone()).scan(dir.path()).unwrap();

    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.duplicate_groups, 0);
    assert!(summary.commits.is_empty());
    assert!(summary.watermark_advanced);
    assert!(store.is_empty());
}

#[test]
fn test_funnel_scenario_sizes_and_prefixes() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a.bin", &[b'X'; 1000]);
    let b = write_file(dir.path(), "b.bin", &[b'X'; 1000]);
    let c = write_file(dir.path(), "c.bin", &[b'Y'; 1000]);
    let d = write_file(dir.path(), "d.bin", &[b'Z'; 2000]);

    let store = Arc::new(MemoryStore::new());
    let hasher = Arc::new(CountingHasher::new(DigestAlgorithm::Sha256));
    let summary = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan(dir.path())
        .unwrap();

    // D has a unique size: never read.
    assert_eq!(hasher.reads_of(&d), 0);
    // C was fingerprinted but never fully hashed.
    assert_eq!(hasher.reads_of(&c), 1);
    assert!(!hasher.full_hashed(&c));
    assert!(hasher.full_hashed(&a));
    assert!(hasher.full_hashed(&b));
    assert_eq!(hasher.full_hash_count(), 2);

    let rec_a = store.get_record(&a).unwrap().unwrap();
    let rec_b = store.get_record(&b).unwrap().unwrap();
    let rec_c = store.get_record(&c).unwrap().unwrap();
    let rec_d = store.get_record(&d).unwrap().unwrap();

    assert!(rec_a.full_hash.is_computed());
    assert_eq!(rec_a.full_hash, rec_b.full_hash);
    assert_eq!(rec_a.quick_fingerprint, rec_b.quick_fingerprint);
    assert_ne!(rec_a.quick_fingerprint, rec_c.quick_fingerprint);
    assert!(rec_c.quick_fingerprint.is_computed());
    assert_eq!(rec_c.full_hash, HashState::Pending);
    assert_eq!(rec_d.quick_fingerprint, HashState::Pending);
    assert_eq!(rec_d.full_hash, HashState::Pending);

    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.classification.new, 4);
    assert_eq!(summary.funnel.size_eliminated, 1);
    assert_eq!(summary.funnel.fingerprinted, 3);
    assert_eq!(summary.funnel.fingerprint_eliminated, 1);
    assert_eq!(summary.funnel.candidates, 2);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.reclaimable_space, 1000);
    assert_eq!(summary.groups[0].paths, vec![a, b]);
}

#[test]
fn test_second_scan_is_idempotent() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"same content");
    write_file(dir.path(), "sub/b.txt", b"same content");
    write_file(dir.path(), "c.txt", b"same size!!!");
    write_file(dir.path(), "d.txt", b"unique size file");

    let store = Arc::new(MemoryStore::new());
    scanner(store.clone()).scan(dir.path()).unwrap();
    let first = snapshot(store.as_ref());

    let hasher = Arc::new(CountingHasher::new(DigestAlgorithm::default()));
    let summary = scanner(store.clone())
        .with_hasher(hasher.clone())
        .scan(dir.path())
        .unwrap();

    assert_eq!(hasher.full_hash_count(), 0);
    // c.txt shares its size with the duplicates but never got a full hash,
    // so only its fingerprint is taken again.
    assert_eq!(hasher.fingerprint_count(), 1);
    assert_eq!(summary.classification.reused, 2);
    assert_eq!(summary.classification.rehashed, 2);
    assert_eq!(summary.hashed_files, 0);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(snapshot(store.as_ref()), first);
}

#[test]
fn test_duplicates_with_sqlite_store() {
    let dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let tree = dir.path().join("tree");
    fs::create_dir(&tree).unwrap();
    for i in 0..5 {
        write_file(&tree, &format!("copy_{i}.dat"), &vec![7u8; 4096]);
    }
    write_file(&tree, "other.dat", &vec![8u8; 4096]);

    let store = Arc::new(SqliteStore::open(&data.path().join("hashes.db")).unwrap());
    let config = dupfinder::config::ScanConfig {
        batch_size: 2,
        ..test_config()
    };
    let summary = IncrementalScanner::new(config, store.clone())
        .scan(&tree)
        .unwrap();

    assert_eq!(summary.commits, vec![2, 2, 1]);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 4);
    assert_eq!(summary.groups[0].len(), 5);
    assert!(store.query_candidates().unwrap().is_empty());
    assert_eq!(store.query_pending().unwrap().len(), 1);
}

#[test]
fn test_ignore_patterns_and_empty_files() {
    let dir = tempdir().unwrap();
    write_file(dir.path(), "a.log", b"dup");
    write_file(dir.path(), "b.log", b"dup");
    write_file(dir.path(), "a.txt", b"dup");
    write_file(dir.path(), "b.txt", b"dup");
    write_file(dir.path(), "empty1", b"");
    write_file(dir.path(), "empty2", b"");

    let store = Arc::new(MemoryStore::new());
    let config = dupfinder::config::ScanConfig {
        ignore_patterns: vec!["*.log".to_string()],
        ..test_config()
    };
    let summary = IncrementalScanner::new(config, store.clone())
        .scan(dir.path())
        .unwrap();

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_scan_missing_root() {
    let store = Arc::new(MemoryStore::new());
    let result = scanner(store).scan(std::path::Path::new("/definitely/not/here/dupfinder"));
    assert!(matches!(result, Err(ScanError::PathNotFound(_))));
}

#[test]
fn test_scan_file_root() {
    let dir = tempdir().unwrap();
    let file = write_file(dir.path(), "file.txt", b"x");
    let store = Arc::new(MemoryStore::new());
    let result = scanner(store).scan(&file);
    assert!(matches!(result, Err(ScanError::NotADirectory(_))));
}

#[test]
fn test_algorithm_switch_clears_hashes() {
    let dir = tempdir().unwrap();
    let a = write_file(dir.path(), "a", b"twin");
    write_file(dir.path(), "b", b"twin");

    let store = Arc::new(MemoryStore::new());
    scanner(store.clone()).scan(dir.path()).unwrap();
    let blake = store.get_record(&a).unwrap().unwrap().full_hash;
    assert_eq!(blake.digest().unwrap().as_bytes().len(), 32);

    let config = dupfinder::config::ScanConfig {
        algorithm: DigestAlgorithm::Md5,
        ..test_config()
    };
    let summary = IncrementalScanner::new(config, store.clone())
        .scan(dir.path())
        .unwrap();

    assert_eq!(summary.classification.rehashed, 2);
    assert_eq!(summary.hashed_files, 2);
    let md5 = store.get_record(&a).unwrap().unwrap().full_hash;
    assert_eq!(md5.digest().unwrap().as_bytes().len(), 16);
    assert_eq!(store.hash_algorithm().unwrap(), Some(DigestAlgorithm::Md5));
}

#[test]
fn test_prefix_size_change_clears_fingerprints() {
    let dir = tempdir().unwrap();
    let data = tempdir().unwrap();
    let content = b"0123456789abcdef";
    write_file(dir.path(), "a", content);
    write_file(dir.path(), "b", content);

    let store = Arc::new(SqliteStore::open(&data.path().join("hashes.db")).unwrap());
    let short = dupfinder::config::ScanConfig {
        prefix_size: 4,
        ..test_config()
    };
    let summary = IncrementalScanner::new(short, store.clone())
        .scan(dir.path())
        .unwrap();
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(store.fingerprint_prefix().unwrap(), Some(4));

    // Same bytes as the stored pair, fingerprinted under a longer prefix.
    let n = write_file(dir.path(), "n", content);
    let long = dupfinder::config::ScanConfig {
        prefix_size: 8,
        ..test_config()
    };
    let scanner = IncrementalScanner::new(long, store.clone());
    let summary = scanner.scan(dir.path()).unwrap();

    assert_eq!(summary.classification.new, 1);
    assert_eq!(summary.classification.rehashed, 2);
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].len(), 3);
    assert!(store.get_record(&n).unwrap().unwrap().full_hash.is_computed());
    assert!(store.query_pending().unwrap().is_empty());
    assert_eq!(store.fingerprint_prefix().unwrap(), Some(8));

    // Unchanged parameters keep every stored digest.
    let summary = scanner.scan(dir.path()).unwrap();
    assert_eq!(summary.classification.reused, 3);
    assert_eq!(summary.hashed_files, 0);
    assert_eq!(summary.duplicate_groups, 1);
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dupfinder::config::ScanConfig;
use dupfinder::duplicates::{group_by_full_hash, IncrementalScanner, ScanError};
use dupfinder::error::ExitCode;
use dupfinder::scanner::{ContentHasher, Digest, HashError, Hasher};
use dupfinder::store::{HashState, MemoryStore, RecordStore};
use tempfile::tempdir;

use super::support::{scanner, test_config, write_file, CrashingStore, RevokedHasher};

/// Hasher that raises the shutdown flag after its first full hash.
struct InterruptingHasher {
    inner: Hasher,
    flag: Arc<AtomicBool>,
}

impl ContentHasher for InterruptingHasher {
    fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError> {
        self.inner.quick_fingerprint(path)
    }

    fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        let digest = self.inner.full_hash(path);
        self.flag.store(true, Ordering::SeqCst);
        digest
    }
}

fn identical_files(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| write_file(dir, &format!("copy{i}.bin"), &[42u8; 512]))
        .collect()
}

#[test]
fn test_revoked_file_stays_pending_and_is_retried() {
    let dir = tempdir().unwrap();
    let g = write_file(dir.path(), "g.dat", b"shared payload");
    let h = write_file(dir.path(), "h.dat", b"shared payload");

    let store = Arc::new(MemoryStore::new());
    let revoked = Arc::new(RevokedHasher {
        inner: Hasher::default(),
        revoked: g.clone(),
    });
    let first = scanner(store.clone())
        .with_hasher(revoked)
        .scan(dir.path())
        .unwrap();

    assert!(!first.interrupted);
    assert!(first.watermark_advanced);
    assert_eq!(first.hash_failures.len(), 1);
    assert_eq!(first.hash_failures[0].path(), g.as_path());
    assert_eq!(first.hashed_files, 1);
    assert_eq!(ExitCode::from_summary(&first), ExitCode::PartialSuccess);

    let rec_g = store.get_record(&g).unwrap().unwrap();
    assert!(rec_g.quick_fingerprint.is_computed());
    assert_eq!(rec_g.full_hash, HashState::Pending);
    assert!(store.get_record(&h).unwrap().unwrap().full_hash.is_computed());

    // Access restored: only G is read again.
    let second = scanner(store.clone()).scan(dir.path()).unwrap();

    assert_eq!(second.classification.reused, 1);
    assert_eq!(second.classification.rehashed, 1);
    assert_eq!(second.hashed_files, 1);
    assert_eq!(second.duplicate_groups, 1);
    assert_eq!(second.groups[0].paths, vec![g, h]);
    assert_eq!(ExitCode::from_summary(&second), ExitCode::Success);
}

#[test]
fn test_store_crash_keeps_committed_batches() {
    let dir = tempdir().unwrap();
    identical_files(dir.path(), 5);

    let inner = Arc::new(MemoryStore::new());
    let crashing = Arc::new(CrashingStore::new(inner.clone(), 1));
    let config = ScanConfig {
        batch_size: 2,
        ..test_config()
    };

    let result = IncrementalScanner::new(config.clone(), crashing.clone()).scan(dir.path());
    assert!(matches!(result, Err(ScanError::Store(_))));
    assert_eq!(crashing.full_commits(), 2);

    let records = inner.all_records().unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records.iter().filter(|r| r.full_hash.is_computed()).count(), 2);
    assert_eq!(inner.query_pending().unwrap().len(), 3);
    assert_eq!(inner.query_candidates().unwrap().len(), 3);
    assert!(inner.watermark().unwrap().is_none());

    let resumed = IncrementalScanner::new(config, inner.clone())
        .resume()
        .unwrap();

    assert_eq!(resumed.funnel.candidates, 3);
    assert_eq!(resumed.hashed_files, 3);
    assert!(!resumed.watermark_advanced);
    assert!(inner.query_candidates().unwrap().is_empty());
    assert!(inner.watermark().unwrap().is_none());

    let groups = group_by_full_hash(&inner.all_records().unwrap());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 5);
}

#[test]
fn test_shutdown_before_discovery() {
    let dir = tempdir().unwrap();
    identical_files(dir.path(), 3);

    let store = Arc::new(MemoryStore::new());
    let flag = Arc::new(AtomicBool::new(true));
    let summary = scanner(store.clone())
        .with_shutdown_flag(flag)
        .scan(dir.path())
        .unwrap();

    assert!(summary.interrupted);
    assert!(!summary.watermark_advanced);
    assert_eq!(summary.hashed_files, 0);
    assert!(store.watermark().unwrap().is_none());
    assert_eq!(ExitCode::from_summary(&summary), ExitCode::Interrupted);
}

#[test]
fn test_shutdown_during_full_hash_then_resume() {
    let dir = tempdir().unwrap();
    identical_files(dir.path(), 4);

    let store = Arc::new(MemoryStore::new());
    let flag = Arc::new(AtomicBool::new(false));
    let config = ScanConfig {
        workers: 1,
        batch_size: 1,
        ..test_config()
    };
    let hasher = Arc::new(InterruptingHasher {
        inner: Hasher::default(),
        flag: flag.clone(),
    });

    let interrupted = IncrementalScanner::new(config.clone(), store.clone())
        .with_hasher(hasher)
        .with_shutdown_flag(flag)
        .scan(dir.path())
        .unwrap();

    assert!(interrupted.interrupted);
    assert!(!interrupted.watermark_advanced);
    assert_eq!(interrupted.hashed_files, 1);
    assert_eq!(interrupted.commits, vec![1]);
    assert!(store.watermark().unwrap().is_none());
    assert_eq!(store.query_candidates().unwrap().len(), 3);

    let resumed = IncrementalScanner::new(config, store.clone())
        .resume()
        .unwrap();

    assert!(!resumed.interrupted);
    assert_eq!(resumed.hashed_files, 3);
    assert_eq!(resumed.duplicate_groups, 1);
    assert!(store.query_candidates().unwrap().is_empty());
}

#[test]
fn test_resume_with_nothing_pending() {
    let store = Arc::new(MemoryStore::new());
    let summary = scanner(store).resume().unwrap();

    assert_eq!(summary.hashed_files, 0);
    assert!(summary.commits.is_empty());
    assert_eq!(ExitCode::from_summary(&summary), ExitCode::NoDuplicates);
}

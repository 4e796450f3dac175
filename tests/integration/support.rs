//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dupfinder::config::ScanConfig;
use dupfinder::duplicates::IncrementalScanner;
use dupfinder::scanner::{ContentHasher, Digest, DigestAlgorithm, HashError, Hasher};
use dupfinder::store::{
    DiscoveryUpdate, FileRecord, HashUpdate, RecordStore, ScanWatermark, StoreError, StoreResult,
};

/// Write `content` to `dir/name` and return the canonical path.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path.canonicalize().unwrap()
}

/// Small, deterministic configuration for tests.
pub fn test_config() -> ScanConfig {
    ScanConfig {
        workers: 2,
        batch_size: 4,
        ..ScanConfig::default()
    }
}

pub fn scanner(store: Arc<dyn RecordStore>) -> IncrementalScanner {
    IncrementalScanner::new(test_config(), store)
}

/// Hasher that counts every read it performs, per path.
#[derive(Default)]
pub struct CountingHasher {
    inner: Hasher,
    fingerprints: Mutex<HashMap<PathBuf, usize>>,
    full_hashes: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingHasher {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            inner: Hasher::new(algorithm),
            ..Self::default()
        }
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.lock().unwrap().values().sum()
    }

    pub fn full_hash_count(&self) -> usize {
        self.full_hashes.lock().unwrap().values().sum()
    }

    pub fn reads_of(&self, path: &Path) -> usize {
        self.fingerprints.lock().unwrap().get(path).copied().unwrap_or(0)
            + self.full_hashes.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn full_hashed(&self, path: &Path) -> bool {
        self.full_hashes.lock().unwrap().contains_key(path)
    }
}

impl ContentHasher for CountingHasher {
    fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError> {
        *self
            .fingerprints
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        self.inner.quick_fingerprint(path)
    }

    fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        *self
            .full_hashes
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;
        self.inner.full_hash(path)
    }
}

/// Hasher whose full hash fails for one path, as if its permissions had
/// been revoked after the fingerprint was taken.
pub struct RevokedHasher {
    pub inner: Hasher,
    pub revoked: PathBuf,
}

impl ContentHasher for RevokedHasher {
    fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError> {
        self.inner.quick_fingerprint(path)
    }

    fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        if path == self.revoked {
            return Err(HashError::PermissionDenied(path.to_path_buf()));
        }
        self.inner.full_hash(path)
    }
}

/// Store wrapper that becomes unavailable after a number of full-hash
/// commits, simulating a crash between batches.
pub struct CrashingStore {
    pub inner: Arc<dyn RecordStore>,
    allowed_full_commits: usize,
    full_commits: AtomicUsize,
}

impl CrashingStore {
    pub fn new(inner: Arc<dyn RecordStore>, allowed_full_commits: usize) -> Self {
        Self {
            inner,
            allowed_full_commits,
            full_commits: AtomicUsize::new(0),
        }
    }

    pub fn full_commits(&self) -> usize {
        self.full_commits.load(Ordering::SeqCst)
    }
}

impl RecordStore for CrashingStore {
    fn upsert_discovered(&self, batch: &[DiscoveryUpdate], seen_at: f64) -> StoreResult<()> {
        self.inner.upsert_discovered(batch, seen_at)
    }

    fn get_record(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        self.inner.get_record(path)
    }

    fn all_records(&self) -> StoreResult<Vec<FileRecord>> {
        self.inner.all_records()
    }

    fn query_pending(&self) -> StoreResult<Vec<PathBuf>> {
        self.inner.query_pending()
    }

    fn query_candidates(&self) -> StoreResult<Vec<FileRecord>> {
        self.inner.query_candidates()
    }

    fn commit_hash_results(&self, batch: &[HashUpdate]) -> StoreResult<()> {
        if batch.iter().any(|u| u.full_hash.is_computed()) {
            let previous = self.full_commits.fetch_add(1, Ordering::SeqCst);
            if previous >= self.allowed_full_commits {
                return Err(StoreError::unavailable(
                    "commit_hash_results",
                    "simulated crash",
                ));
            }
        }
        self.inner.commit_hash_results(batch)
    }

    fn watermark(&self) -> StoreResult<Option<ScanWatermark>> {
        self.inner.watermark()
    }

    fn set_watermark(&self, value: f64) -> StoreResult<ScanWatermark> {
        self.inner.set_watermark(value)
    }

    fn hash_algorithm(&self) -> StoreResult<Option<DigestAlgorithm>> {
        self.inner.hash_algorithm()
    }

    fn set_hash_algorithm(&self, algorithm: DigestAlgorithm) -> StoreResult<()> {
        self.inner.set_hash_algorithm(algorithm)
    }

    fn fingerprint_prefix(&self) -> StoreResult<Option<usize>> {
        self.inner.fingerprint_prefix()
    }

    fn set_fingerprint_prefix(&self, bytes: usize) -> StoreResult<()> {
        self.inner.set_fingerprint_prefix(bytes)
    }

    fn clear_hashes(&self) -> StoreResult<usize> {
        self.inner.clear_hashes()
    }
}

/// Records with `seen_at` zeroed, for comparing two scans.
pub fn snapshot(store: &dyn RecordStore) -> Vec<FileRecord> {
    let mut records = store.all_records().unwrap();
    for record in &mut records {
        record.seen_at = 0.0;
    }
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}

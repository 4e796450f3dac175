//! In-process record store.
//!
//! Holds everything behind one mutex, so each batch is applied atomically
//! with respect to readers. Nothing survives the process; useful for
//! `--database :memory:` runs and for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{
    DiscoveryUpdate, FileRecord, HashState, HashUpdate, RecordStore, ScanWatermark, StoreError,
    StoreResult,
};
use crate::duplicates::Classification;
use crate::scanner::{Digest, DigestAlgorithm};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<PathBuf, FileRecord>,
    watermark: Option<ScanWatermark>,
    algorithm: Option<DigestAlgorithm>,
    prefix: Option<usize>,
}

/// Non-persistent [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map_or(0, |s| s.records.len())
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self, operation: &'static str) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::unavailable(operation, "memory store lock poisoned"))
    }
}

impl RecordStore for MemoryStore {
    fn upsert_discovered(&self, batch: &[DiscoveryUpdate], seen_at: f64) -> StoreResult<()> {
        let mut state = self.lock("upsert_discovered")?;
        for update in batch {
            let file = &update.file;
            if update.classification == Classification::Reuse {
                if let Some(existing) = state.records.get_mut(&file.path) {
                    existing.seen_at = seen_at;
                    continue;
                }
            }
            state
                .records
                .insert(file.path.clone(), FileRecord::discovered(file, seen_at));
        }
        Ok(())
    }

    fn get_record(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        Ok(self.lock("get_record")?.records.get(path).cloned())
    }

    fn all_records(&self) -> StoreResult<Vec<FileRecord>> {
        Ok(self.lock("all_records")?.records.values().cloned().collect())
    }

    fn query_pending(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(self
            .lock("query_pending")?
            .records
            .values()
            .filter(|r| r.full_hash.is_pending())
            .map(|r| r.path.clone())
            .collect())
    }

    fn query_candidates(&self) -> StoreResult<Vec<FileRecord>> {
        let state = self.lock("query_candidates")?;

        let mut counts: HashMap<(u64, &Digest), usize> = HashMap::new();
        for key in state.records.values().filter_map(FileRecord::fingerprint_key) {
            *counts.entry(key).or_default() += 1;
        }

        Ok(state
            .records
            .values()
            .filter(|r| r.full_hash.is_pending())
            .filter(|r| {
                r.fingerprint_key()
                    .is_some_and(|key| counts.get(&key).copied().unwrap_or(0) >= 2)
            })
            .cloned()
            .collect())
    }

    fn commit_hash_results(&self, batch: &[HashUpdate]) -> StoreResult<()> {
        let mut state = self.lock("commit_hash_results")?;
        for update in batch {
            if let Some(record) = state.records.get_mut(&update.path) {
                record.quick_fingerprint = HashState::Computed(update.quick_fingerprint.clone());
                record.full_hash = update.full_hash.clone();
            }
        }
        Ok(())
    }

    fn watermark(&self) -> StoreResult<Option<ScanWatermark>> {
        Ok(self.lock("watermark")?.watermark)
    }

    fn set_watermark(&self, value: f64) -> StoreResult<ScanWatermark> {
        let mut state = self.lock("set_watermark")?;
        let version = state.watermark.map_or(1, |w| w.version + 1);
        let watermark = ScanWatermark {
            last_scan_timestamp: value,
            version,
        };
        state.watermark = Some(watermark);
        Ok(watermark)
    }

    fn hash_algorithm(&self) -> StoreResult<Option<DigestAlgorithm>> {
        Ok(self.lock("hash_algorithm")?.algorithm)
    }

    fn set_hash_algorithm(&self, algorithm: DigestAlgorithm) -> StoreResult<()> {
        self.lock("set_hash_algorithm")?.algorithm = Some(algorithm);
        Ok(())
    }

    fn fingerprint_prefix(&self) -> StoreResult<Option<usize>> {
        Ok(self.lock("fingerprint_prefix")?.prefix)
    }

    fn set_fingerprint_prefix(&self, bytes: usize) -> StoreResult<()> {
        self.lock("set_fingerprint_prefix")?.prefix = Some(bytes);
        Ok(())
    }

    fn clear_hashes(&self) -> StoreResult<usize> {
        let mut state = self.lock("clear_hashes")?;
        let mut cleared = 0;
        for record in state.records.values_mut() {
            if record.quick_fingerprint.is_computed() || record.full_hash.is_computed() {
                record.quick_fingerprint = HashState::Pending;
                record.full_hash = HashState::Pending;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

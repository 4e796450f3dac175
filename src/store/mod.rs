//! Persistent record store for incremental scans.
//!
//! This module provides durable storage for file metadata and digests so a
//! scan only re-reads content that may have changed since the last run.
//!
//! # Architecture
//!
//! * [`record`]: Data model (`FileRecord`, `HashState`, update batches).
//! * [`sqlite`]: SQLite-backed store used by the CLI.
//! * [`memory`]: In-process store for ephemeral runs and tests.
//!
//! Both stores implement [`RecordStore`]. Every mutating operation is
//! atomic for the batch it receives: a batch is either fully visible or not
//! visible at all, and re-applying a batch yields the same state.

pub mod memory;
pub mod record;
pub mod sqlite;

use std::path::{Path, PathBuf};

use crate::scanner::DigestAlgorithm;

pub use memory::MemoryStore;
pub use record::{DiscoveryUpdate, FileRecord, HashState, HashUpdate, ScanWatermark};
pub use sqlite::SqliteStore;

/// Errors raised by a record store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backing store cannot serve the request. Fatal for a scan.
    #[error("Record store unavailable during {operation}: {source}")]
    Unavailable {
        /// Operation that failed
        operation: &'static str,
        /// Underlying cause
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A concurrent writer held the store for longer than the retry budget.
    #[error("Concurrent update conflict during {operation}")]
    Conflict {
        /// Operation that conflicted
        operation: &'static str,
    },

    /// A stored value could not be decoded.
    #[error("Invalid stored data for {path}: {detail}")]
    InvalidData {
        /// Path of the offending record
        path: String,
        /// What was wrong
        detail: String,
    },

    /// The database location could not be prepared.
    #[error("Failed to prepare store location {path}: {source}")]
    Io {
        /// Database path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Wrap any error as an availability failure for `operation`.
    pub fn unavailable<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Unavailable {
            operation,
            source: source.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record storage shared by the scan stages.
///
/// Implementations must be safe to call from the coordinating thread while
/// worker threads are running; workers never write to the store directly.
pub trait RecordStore: Send + Sync {
    /// Apply a batch of discovery results in one atomic transaction.
    ///
    /// * `Reuse`: only `seen_at` changes.
    /// * `Rehash`: metadata is replaced and both digests become pending.
    /// * `New`: a record is inserted with both digests pending.
    fn upsert_discovered(&self, batch: &[DiscoveryUpdate], seen_at: f64) -> StoreResult<()>;

    /// Fetch a single record by path.
    fn get_record(&self, path: &Path) -> StoreResult<Option<FileRecord>>;

    /// All stored records, ordered by path.
    fn all_records(&self) -> StoreResult<Vec<FileRecord>>;

    /// Paths whose full hash is pending, ordered by path.
    fn query_pending(&self) -> StoreResult<Vec<PathBuf>>;

    /// Records with a pending full hash whose `(size, quick fingerprint)`
    /// is shared with at least one other record, ordered by path.
    fn query_candidates(&self) -> StoreResult<Vec<FileRecord>>;

    /// Apply a batch of hash results in one atomic transaction.
    ///
    /// Updates for paths without a record are ignored.
    fn commit_hash_results(&self, batch: &[HashUpdate]) -> StoreResult<()>;

    /// The current watermark record, if one was ever written.
    fn watermark(&self) -> StoreResult<Option<ScanWatermark>>;

    /// Atomically replace the watermark, bumping its version.
    fn set_watermark(&self, value: f64) -> StoreResult<ScanWatermark>;

    /// Digest algorithm the stored digests were produced with.
    fn hash_algorithm(&self) -> StoreResult<Option<DigestAlgorithm>>;

    /// Record the digest algorithm the stored digests are produced with.
    fn set_hash_algorithm(&self, algorithm: DigestAlgorithm) -> StoreResult<()>;

    /// Prefix length in bytes the stored quick fingerprints cover.
    fn fingerprint_prefix(&self) -> StoreResult<Option<usize>>;

    /// Record the prefix length the stored quick fingerprints cover.
    fn set_fingerprint_prefix(&self, bytes: usize) -> StoreResult<()>;

    /// Reset every digest to pending. Returns the number of records touched.
    fn clear_hashes(&self) -> StoreResult<usize>;

    /// Start time of the last completed scan.
    fn last_scan_timestamp(&self) -> StoreResult<Option<f64>> {
        Ok(self.watermark()?.map(|w| w.last_scan_timestamp))
    }

    /// Replace the last completed scan time.
    fn set_last_scan_timestamp(&self, value: f64) -> StoreResult<()> {
        self.set_watermark(value).map(|_| ())
    }
}

//! Incremental scan pipeline.
//!
//! # Overview
//!
//! [`IncrementalScanner`] ties the stages together:
//! 1. **Discovery**: consume the discovery feed (a [`Walker`] or any
//!    iterator of entries)
//! 2. **Classification**: decide Reuse / Rehash / New per file against the
//!    stored record and the watermark, and upsert in batches
//! 3. **Funnel**: size stage and fingerprint stage (see [`super::funnel`])
//! 4. **Full hash**: bounded worker pool with batched commits (see
//!    [`super::orchestrator`])
//! 5. **Watermark**: advanced to the scan start time, only when nothing was
//!    interrupted
//!
//! # Example
//!
//! ```no_run
//! use dupfinder::config::ScanConfig;
//! use dupfinder::duplicates::IncrementalScanner;
//! use dupfinder::store::SqliteStore;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open(Path::new("hashes.db")).unwrap());
//! let scanner = IncrementalScanner::new(ScanConfig::default(), store);
//! let summary = scanner.scan(Path::new("/some/path")).unwrap();
//!
//! println!("{} duplicate groups", summary.duplicate_groups);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use serde::Serialize;

use super::funnel::{CandidateFunnel, FunnelConfig, FunnelStats};
use super::groups::{group_by_full_hash, DuplicateGroup};
use super::orchestrator::{HashWorkerOrchestrator, OrchestratorConfig, RunReport};
use super::staleness::{classify, ClassificationCounts};
use crate::config::ScanConfig;
use crate::progress::ProgressCallback;
use crate::scanner::{
    now_epoch, ContentHasher, DiscoveredFile, DiscoveryError, HashError, Hasher, Walker,
};
use crate::store::{DiscoveryUpdate, FileRecord, RecordStore, StoreError};

/// Progress phase name for discovery.
pub const PHASE_DISCOVERY: &str = "discovery";

/// Errors that end a scan.
///
/// Per-file failures are not errors at this level; they are collected in
/// the [`ScanSummary`].
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The record store failed. Committed batches remain valid.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Summary of one scan or resume run.
#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    /// Start time of the run (epoch seconds)
    pub started_at: f64,
    /// Number of files received from the discovery feed
    pub total_files: usize,
    /// Total size of those files in bytes
    pub total_size: u64,
    /// Staleness decisions
    pub classification: ClassificationCounts,
    /// Funnel statistics
    pub funnel: FunnelStats,
    /// Full hashes computed and committed
    pub hashed_files: usize,
    /// Bytes read by full hashing
    pub bytes_hashed: u64,
    /// Size of every full-hash commit, in order
    pub commits: Vec<usize>,
    /// Confirmed duplicate groups among the files of this run
    pub duplicate_groups: usize,
    /// Duplicate files, excluding one original per group
    pub duplicate_files: usize,
    /// Space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Files that could not be fingerprinted or hashed
    #[serde(serialize_with = "serialize_errors")]
    pub hash_failures: Vec<HashError>,
    /// Discovery entries that could not be read
    #[serde(serialize_with = "serialize_errors")]
    pub discovery_failures: Vec<DiscoveryError>,
    /// Whether the stop signal cut the run short
    pub interrupted: bool,
    /// Whether the watermark was advanced by this run
    pub watermark_advanced: bool,
    /// Duration of the entire run
    pub scan_duration: Duration,
    /// The confirmed duplicate groups, largest waste first
    #[serde(skip)]
    pub groups: Vec<DuplicateGroup>,
}

#[allow(clippy::ptr_arg)]
fn serialize_errors<S, E>(errors: &Vec<E>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    E: std::fmt::Display,
{
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

impl ScanSummary {
    /// Whether any per-file failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.hash_failures.is_empty() || !self.discovery_failures.is_empty()
    }

    /// Calculate the percentage of space that is wasted by duplicates.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize(self.total_size).to_string()
    }

    fn absorb(&mut self, report: RunReport) {
        self.hashed_files += report.hashed;
        self.bytes_hashed += report.bytes_hashed;
        self.commits.extend(report.commits);
        self.hash_failures.extend(report.failures);
        self.interrupted |= report.interrupted;
    }
}

/// Incremental duplicate scanner backed by a [`RecordStore`].
pub struct IncrementalScanner {
    config: ScanConfig,
    store: Arc<dyn RecordStore>,
    hasher: Arc<dyn ContentHasher>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl IncrementalScanner {
    /// Create a scanner with the default [`Hasher`] for the configured
    /// algorithm, prefix size and chunk size.
    #[must_use]
    pub fn new(config: ScanConfig, store: Arc<dyn RecordStore>) -> Self {
        let hasher = Hasher::new(config.algorithm)
            .with_prefix_size(config.prefix_size)
            .with_chunk_size(config.chunk_size);
        Self {
            config,
            store,
            hasher: Arc::new(hasher),
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Replace the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// The record store this scanner writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Walk `root` and run the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the root is missing or not a directory, or on
    /// a fatal store or thread pool failure.
    pub fn scan(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut walker = Walker::new(root, self.config.walker_config());
        if let Some(ref flag) = self.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }
        log::info!("Scanning {}", walker.root().display());

        self.scan_entries(walker.walk())
    }

    /// Run the full pipeline over an externally supplied discovery feed.
    ///
    /// Entry errors are recorded in the summary and the entry is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] on a fatal store or thread pool failure.
    pub fn scan_entries<I>(&self, feed: I) -> Result<ScanSummary, ScanError>
    where
        I: IntoIterator<Item = Result<DiscoveredFile, DiscoveryError>>,
    {
        let start = Instant::now();
        let started_at = now_epoch();
        let mut summary = ScanSummary {
            started_at,
            ..Default::default()
        };

        self.sync_digest_params()?;
        let watermark = self.store.last_scan_timestamp()?;
        log::debug!("Watermark: {:?}", watermark);

        let records = self.discover(feed, started_at, watermark, &mut summary)?;
        if summary.interrupted {
            return Ok(self.finish(summary, start));
        }

        let funnel = CandidateFunnel::new(self.hasher.clone(), self.funnel_config());
        let outcome = funnel.run(records, self.store.as_ref())?;
        summary.funnel = outcome.stats;
        summary.hash_failures.extend(outcome.failures);
        if outcome.interrupted {
            summary.interrupted = true;
            return Ok(self.finish(summary, start));
        }

        let orchestrator =
            HashWorkerOrchestrator::new(self.hasher.clone(), self.orchestrator_config());
        let report = orchestrator.run(&outcome.candidates, self.store.as_ref())?;
        summary.absorb(report);

        if !summary.interrupted {
            let watermark = self.store.set_watermark(started_at)?;
            summary.watermark_advanced = true;
            log::debug!(
                "Watermark advanced to {} (version {})",
                watermark.last_scan_timestamp,
                watermark.version
            );
        }

        self.summarize_duplicates(&mut summary, |r| r.seen_at >= started_at)?;
        Ok(self.finish(summary, start))
    }

    /// Re-dispatch stored candidates that still lack a full hash.
    ///
    /// Does not walk the tree and does not advance the watermark.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] on a fatal store or thread pool failure.
    pub fn resume(&self) -> Result<ScanSummary, ScanError> {
        let start = Instant::now();
        let mut summary = ScanSummary {
            started_at: now_epoch(),
            ..Default::default()
        };

        self.sync_digest_params()?;
        let candidates = self.store.query_candidates()?;
        summary.funnel.candidates = candidates.len();
        log::info!("Resuming: {} stored candidates lack a full hash", candidates.len());

        let orchestrator =
            HashWorkerOrchestrator::new(self.hasher.clone(), self.orchestrator_config());
        let report = orchestrator.run(&candidates, self.store.as_ref())?;
        summary.absorb(report);

        let resumed: std::collections::HashSet<PathBuf> =
            candidates.into_iter().map(|r| r.path).collect();
        self.summarize_duplicates(&mut summary, |r| resumed.contains(&r.path))?;
        Ok(self.finish(summary, start))
    }

    /// Make sure stored digests were produced with the configured algorithm
    /// and fingerprint prefix length.
    ///
    /// Digests taken under other parameters can never match fresh ones, so
    /// they are reset to pending and every affected file is rehashed.
    fn sync_digest_params(&self) -> Result<(), StoreError> {
        let algorithm = self.config.algorithm;
        let prefix = self.config.prefix_size;
        let stored_algorithm = self.store.hash_algorithm()?;
        let stored_prefix = self.store.fingerprint_prefix()?;

        match (stored_algorithm, stored_prefix) {
            (Some(a), Some(p)) if a == algorithm && p == prefix => return Ok(()),
            (None, None) => {
                log::debug!("Recording digest algorithm {} with {} byte prefix", algorithm, prefix);
            }
            _ => {
                let cleared = self.store.clear_hashes()?;
                log::warn!(
                    "Digest parameters changed from {}/{} to {}/{} bytes: cleared {} stored hashes",
                    stored_algorithm.map_or_else(|| "unknown".to_string(), |a| a.to_string()),
                    stored_prefix.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
                    algorithm,
                    prefix,
                    cleared
                );
            }
        }
        self.store.set_hash_algorithm(algorithm)?;
        self.store.set_fingerprint_prefix(prefix)
    }

    /// Classify the feed and upsert it in batches.
    ///
    /// Returns the records to run through the funnel, in their state after
    /// the upsert.
    fn discover<I>(
        &self,
        feed: I,
        started_at: f64,
        watermark: Option<f64>,
        summary: &mut ScanSummary,
    ) -> Result<Vec<FileRecord>, ScanError>
    where
        I: IntoIterator<Item = Result<DiscoveredFile, DiscoveryError>>,
    {
        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start(PHASE_DISCOVERY, 0);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<DiscoveryUpdate> = Vec::with_capacity(batch_size);
        let mut records = Vec::new();

        for entry in feed {
            if self.is_shutdown_requested() {
                log::info!("Discovery: interrupted by shutdown signal");
                summary.interrupted = true;
                break;
            }

            let file = match entry {
                Ok(file) => file,
                Err(e) => {
                    log::warn!("Skipping {}: {}", e.path().display(), e);
                    summary.discovery_failures.push(e);
                    continue;
                }
            };

            summary.total_files += 1;
            summary.total_size += file.size;
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(summary.total_files, file.path.to_string_lossy().as_ref());
            }

            let stored = self.store.get_record(&file.path)?;
            let classification = classify(&file, stored.as_ref(), watermark);
            summary.classification.record(classification);
            log::trace!("{:?}: {}", classification, file.path.display());

            let record = match stored {
                Some(mut existing) if !classification.needs_hashing() => {
                    existing.seen_at = started_at;
                    existing
                }
                _ => FileRecord::discovered(&file, started_at),
            };
            records.push(record);
            batch.push(DiscoveryUpdate::new(file, classification));

            if batch.len() >= batch_size {
                self.store.upsert_discovered(&batch, started_at)?;
                batch.clear();
            }
        }
        self.store.upsert_discovered(&batch, started_at)?;

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end(PHASE_DISCOVERY);
        }
        log::info!(
            "Discovery complete: {} files ({} reused, {} rehash, {} new)",
            summary.total_files,
            summary.classification.reused,
            summary.classification.rehashed,
            summary.classification.new
        );

        Ok(records)
    }

    fn summarize_duplicates(
        &self,
        summary: &mut ScanSummary,
        include: impl Fn(&FileRecord) -> bool,
    ) -> Result<(), StoreError> {
        let records: Vec<FileRecord> = self
            .store
            .all_records()?
            .into_iter()
            .filter(|r| include(r))
            .collect();
        let groups = group_by_full_hash(&records);

        summary.duplicate_groups = groups.len();
        summary.duplicate_files = groups.iter().map(|g| g.duplicate_count()).sum();
        summary.reclaimable_space = groups.iter().map(|g| g.wasted_space()).sum();
        summary.groups = groups;
        Ok(())
    }

    fn finish(&self, mut summary: ScanSummary, start: Instant) -> ScanSummary {
        summary.scan_duration = start.elapsed();
        log::info!(
            "Scan finished in {:.2?}: {} hashed, {} duplicate groups, {} failures{}",
            summary.scan_duration,
            summary.hashed_files,
            summary.duplicate_groups,
            summary.hash_failures.len() + summary.discovery_failures.len(),
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        summary
    }

    fn funnel_config(&self) -> FunnelConfig {
        let mut config = FunnelConfig::default()
            .with_workers(self.config.workers)
            .with_batch_size(self.config.batch_size);
        if let Some(ref flag) = self.shutdown_flag {
            config = config.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.progress_callback {
            config = config.with_progress_callback(callback.clone());
        }
        config
    }

    fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default()
            .with_workers(self.config.workers)
            .with_batch_size(self.config.batch_size);
        if let Some(ref flag) = self.shutdown_flag {
            config = config.with_shutdown_flag(flag.clone());
        }
        if let Some(ref callback) = self.progress_callback {
            config = config.with_progress_callback(callback.clone());
        }
        config
    }
}

//! Candidate funnel: size stage then fingerprint stage.
//!
//! # Overview
//!
//! The funnel receives every record touched by the current scan. Records
//! whose full hash is still pending are the ones that need work; records
//! reused from a previous scan take part only as siblings, so a new file
//! matching an already confirmed pair is still promoted.
//!
//! 1. **Size stage**: sizes with a single record are dropped. A size group
//!    made only of reused records needs no work and is dropped too.
//! 2. **Fingerprint stage**: pending survivors get their quick fingerprint
//!    computed in parallel (and persisted in batches), then everything is
//!    regrouped by `(size, quick fingerprint)`.
//!
//! Pending members of fingerprint groups with 2+ entries are returned as
//! full-hash candidates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use super::finder::ScanError;
use super::groups::{group_by_fingerprint, group_by_size};
use crate::progress::ProgressCallback;
use crate::scanner::{ContentHasher, HashError};
use crate::store::{FileRecord, HashState, HashUpdate, RecordStore};

/// Progress phase name for the fingerprint stage.
pub const PHASE_FINGERPRINT: &str = "fingerprint";

/// Configuration for the funnel.
#[derive(Clone)]
pub struct FunnelConfig {
    /// Number of threads computing quick fingerprints.
    pub workers: usize,
    /// Number of fingerprints persisted per store transaction.
    pub batch_size: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunnelConfig")
            .field("workers", &self.workers)
            .field("batch_size", &self.batch_size)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            workers: crate::config::default_workers(),
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl FunnelConfig {
    /// Set the number of fingerprint threads.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the persistence batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the shutdown flag.
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

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from one funnel pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunnelStats {
    /// Records that entered the funnel
    pub input_files: usize,
    /// Records entering with a pending full hash
    pub pending_files: usize,
    /// Pending records dropped by the size stage
    pub size_eliminated: usize,
    /// Quick fingerprints computed
    pub fingerprinted: usize,
    /// Pending records dropped by the fingerprint stage
    pub fingerprint_eliminated: usize,
    /// Records promoted to full hashing
    pub candidates: usize,
    /// Number of fingerprint groups with 2+ members
    pub candidate_groups: usize,
}

impl FunnelStats {
    /// Percentage of pending records eliminated before full hashing.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.pending_files == 0 {
            0.0
        } else {
            let eliminated = self.pending_files.saturating_sub(self.candidates);
            (eliminated as f64 / self.pending_files as f64) * 100.0
        }
    }
}

/// Result of one funnel pass.
#[derive(Debug, Default)]
pub struct FunnelOutcome {
    /// Records to full-hash, each with a computed quick fingerprint
    pub candidates: Vec<FileRecord>,
    /// Funnel statistics
    pub stats: FunnelStats,
    /// Files whose fingerprint could not be computed
    pub failures: Vec<HashError>,
    /// Whether the stop signal cut the fingerprint stage short
    pub interrupted: bool,
}

/// The two-stage pruning pipeline in front of full hashing.
pub struct CandidateFunnel {
    hasher: Arc<dyn ContentHasher>,
    config: FunnelConfig,
}

impl CandidateFunnel {
    /// Create a funnel using `hasher` for quick fingerprints.
    #[must_use]
    pub fn new(hasher: Arc<dyn ContentHasher>, config: FunnelConfig) -> Self {
        Self { hasher, config }
    }

    /// Run both stages over the records touched by the current scan.
    ///
    /// Fingerprints are persisted through `store` before this returns, so an
    /// interrupted run can be resumed from the store alone.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ThreadPool`] if the fingerprint pool cannot be
    /// built and [`ScanError::Store`] if fingerprints cannot be persisted.
    pub fn run(
        &self,
        records: Vec<FileRecord>,
        store: &dyn RecordStore,
    ) -> Result<FunnelOutcome, ScanError> {
        let mut outcome = FunnelOutcome::default();
        outcome.stats.input_files = records.len();
        outcome.stats.pending_files = records.iter().filter(|r| r.full_hash.is_pending()).count();

        // Size stage
        let (size_groups, size_stats) = group_by_size(records);
        let mut survivors: Vec<FileRecord> = Vec::new();
        for (_, group) in size_groups {
            if group.iter().any(|r| r.full_hash.is_pending()) {
                survivors.extend(group);
            }
        }
        let pending_survivors = survivors.iter().filter(|r| r.full_hash.is_pending()).count();
        outcome.stats.size_eliminated = outcome.stats.pending_files - pending_survivors;

        log::info!(
            "Size stage complete: {} records ({} unique sizes) → {} pending survivors",
            size_stats.total_files,
            size_stats.unique_sizes,
            pending_survivors
        );

        // Fingerprint stage
        let (mut to_fingerprint, siblings): (Vec<FileRecord>, Vec<FileRecord>) = survivors
            .into_iter()
            .partition(|r| r.full_hash.is_pending());

        let fingerprinted = self.fingerprint(&mut to_fingerprint, store, &mut outcome)?;
        outcome.stats.fingerprinted = fingerprinted;
        if outcome.interrupted {
            return Ok(outcome);
        }

        let groups = group_by_fingerprint(siblings.into_iter().chain(to_fingerprint));
        outcome.stats.candidate_groups = groups.len();
        let mut candidates: Vec<FileRecord> = groups
            .into_values()
            .flatten()
            .filter(|r| r.full_hash.is_pending())
            .collect();
        candidates.sort_by(|a, b| a.path.cmp(&b.path));

        outcome.stats.candidates = candidates.len();
        outcome.stats.fingerprint_eliminated =
            pending_survivors.saturating_sub(candidates.len() + outcome.failures.len());
        outcome.candidates = candidates;

        log::info!(
            "Fingerprint stage complete: {} pending → {} candidates ({:.1}% eliminated)",
            outcome.stats.pending_files,
            outcome.stats.candidates,
            outcome.stats.elimination_rate()
        );

        Ok(outcome)
    }

    /// Compute quick fingerprints in place and persist them.
    ///
    /// Records whose fingerprint fails are removed from `records`.
    fn fingerprint(
        &self,
        records: &mut Vec<FileRecord>,
        store: &dyn RecordStore,
        outcome: &mut FunnelOutcome,
    ) -> Result<usize, ScanError> {
        if records.is_empty() {
            log::debug!("Fingerprint stage: nothing to do");
            return Ok(0);
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_FINGERPRINT, records.len());
        }
        log::info!("Fingerprint stage: computing quick fingerprints for {} files", records.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;

        let processed = AtomicUsize::new(0);
        let results: Vec<Option<Result<crate::scanner::Digest, HashError>>> = pool.install(|| {
            records
                .par_iter()
                .map(|record| {
                    if self.config.is_shutdown_requested() {
                        return None;
                    }
                    let result = self.hasher.quick_fingerprint(&record.path);
                    if let Some(ref callback) = self.config.progress_callback {
                        let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
                        callback.on_progress(current, record.path.to_string_lossy().as_ref());
                    }
                    Some(result)
                })
                .collect()
        });

        let mut kept = Vec::with_capacity(records.len());
        let mut updates = Vec::with_capacity(records.len());
        for (mut record, result) in records.drain(..).zip(results) {
            match result {
                Some(Ok(fingerprint)) => {
                    log::trace!("Quick fingerprint computed: {}", record.path.display());
                    updates.push(HashUpdate::fingerprint(record.path.clone(), fingerprint.clone()));
                    record.quick_fingerprint = HashState::Computed(fingerprint);
                    kept.push(record);
                }
                Some(Err(e)) => {
                    log::warn!("Failed to fingerprint {}: {}", record.path.display(), e);
                    outcome.failures.push(e);
                }
                None => outcome.interrupted = true,
            }
        }
        *records = kept;

        for chunk in updates.chunks(self.config.batch_size.max(1)) {
            store.commit_hash_results(chunk)?;
            log::debug!("Committed {} quick fingerprints", chunk.len());
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_FINGERPRINT);
        }
        if outcome.interrupted {
            log::info!("Fingerprint stage: interrupted by shutdown signal");
        }

        Ok(updates.len())
    }
}

/// Paths of a candidate list, in order.
#[must_use]
pub fn candidate_paths(candidates: &[FileRecord]) -> Vec<PathBuf> {
    candidates.iter().map(|r| r.path.clone()).collect()
}

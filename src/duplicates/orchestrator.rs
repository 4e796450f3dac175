//! Hash worker orchestrator.
//!
//! # Overview
//!
//! Full hashes for the funnel's candidates are computed by a bounded rayon
//! pool of `N` workers. Each worker sends one [`HashOutcome`] per file over a
//! bounded channel to the coordinating thread, which buffers successes and
//! commits them to the store every `B` results, then flushes the final
//! partial buffer.
//!
//! A run moves through `Idle -> Dispatching -> Draining -> Committed`.
//! Per-file failures never abort the run; they are collected in the
//! [`RunReport`]. A store failure is fatal: dispatch stops, already
//! committed batches stay committed, and the error is returned.
//!
//! On the stop signal no new file is started, but a worker that is already
//! reading a file finishes it and its result is committed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use super::finder::ScanError;
use crate::progress::ProgressCallback;
use crate::scanner::{ContentHasher, HashError};
use crate::store::{FileRecord, HashUpdate, RecordStore, StoreError};

/// Progress phase name for full hashing.
pub const PHASE_FULLHASH: &str = "fullhash";

/// Lifecycle of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RunState {
    /// No run in progress
    Idle = 0,
    /// Workers are hashing candidates
    Dispatching = 1,
    /// Workers are done; the last buffer is being flushed
    Draining = 2,
    /// Every successful result is durable
    Committed = 3,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Dispatching,
            2 => Self::Draining,
            3 => Self::Committed,
            _ => Self::Idle,
        }
    }
}

/// Result of hashing one candidate.
#[derive(Debug)]
pub enum HashOutcome {
    /// The full hash was computed.
    Success {
        /// Result to commit
        update: HashUpdate,
        /// Bytes read
        bytes: u64,
    },
    /// The file could not be read; its full hash stays pending.
    Failure(HashError),
}

/// Configuration for the orchestrator.
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Number of concurrent hash workers (`N`).
    pub workers: usize,
    /// Successful results per store commit (`B`).
    pub batch_size: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("workers", &self.workers)
            .field("batch_size", &self.batch_size)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: crate::config::default_workers(),
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl OrchestratorConfig {
    /// Set the number of hash workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the commit batch size.
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

/// Summary of one orchestrator run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Candidates handed to the run
    pub dispatched: usize,
    /// Full hashes computed and committed
    pub hashed: usize,
    /// Bytes read by successful full hashes
    pub bytes_hashed: u64,
    /// Size of every commit, in order
    pub commits: Vec<usize>,
    /// Files that could not be hashed
    pub failures: Vec<HashError>,
    /// Whether the stop signal left candidates unprocessed
    pub interrupted: bool,
}

impl RunReport {
    /// Candidates processed, successfully or not.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.hashed + self.failures.len()
    }

    /// Paths that failed, in report order.
    #[must_use]
    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failures.iter().map(|e| e.path().to_path_buf()).collect()
    }
}

/// Bounded pool computing full hashes and committing them in batches.
pub struct HashWorkerOrchestrator {
    hasher: Arc<dyn ContentHasher>,
    config: OrchestratorConfig,
    state: AtomicU8,
}

impl HashWorkerOrchestrator {
    /// Create an orchestrator using `hasher` for full hashes.
    #[must_use]
    pub fn new(hasher: Arc<dyn ContentHasher>, config: OrchestratorConfig) -> Self {
        Self {
            hasher,
            config,
            state: AtomicU8::new(RunState::Idle as u8),
        }
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.swap(next as u8, Ordering::SeqCst);
        log::debug!(
            "Orchestrator: {:?} -> {:?}",
            RunState::from_u8(previous),
            next
        );
    }

    /// Hash every candidate and commit the results.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ThreadPool`] if the worker pool cannot be built
    /// and [`ScanError::Store`] on the first failed commit.
    pub fn run(
        &self,
        candidates: &[FileRecord],
        store: &dyn RecordStore,
    ) -> Result<RunReport, ScanError> {
        let mut report = RunReport {
            dispatched: candidates.len(),
            ..Default::default()
        };

        if candidates.is_empty() {
            log::debug!("Full hash stage: no candidates");
            self.transition(RunState::Committed);
            return Ok(report);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(PHASE_FULLHASH, candidates.len());
        }
        log::info!(
            "Full hash stage: hashing {} candidates with {} workers (batch size {})",
            candidates.len(),
            self.config.workers,
            self.config.batch_size
        );

        self.transition(RunState::Dispatching);
        let abort = AtomicBool::new(false);
        let started = AtomicUsize::new(0);

        let drained = std::thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel::<HashOutcome>(self.config.batch_size.max(1));
            let abort = &abort;
            let started = &started;
            let pool = &pool;

            scope.spawn(move || {
                pool.install(|| {
                    candidates.par_iter().for_each_with(tx, |tx, record| {
                        if abort.load(Ordering::SeqCst) || self.config.is_shutdown_requested() {
                            return;
                        }
                        let current = started.fetch_add(1, Ordering::Relaxed) + 1;
                        if let Some(ref callback) = self.config.progress_callback {
                            callback.on_progress(current, record.path.to_string_lossy().as_ref());
                        }
                        // A closed channel means the run was aborted.
                        let _ = tx.send(self.hash_one(record));
                    });
                });
            });

            let result = self.drain(rx, store, &mut report);
            if result.is_err() {
                abort.store(true, Ordering::SeqCst);
            }
            result
        });

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(PHASE_FULLHASH);
        }

        if let Err(e) = drained {
            log::error!("Full hash stage aborted: {}", e);
            return Err(e.into());
        }

        report.interrupted = report.completed() < candidates.len();
        self.transition(RunState::Committed);

        if report.interrupted {
            log::info!(
                "Full hash stage interrupted: {} of {} candidates processed",
                report.completed(),
                candidates.len()
            );
        } else {
            log::info!(
                "Full hash stage complete: {} hashed, {} failed, {} commits",
                report.hashed,
                report.failures.len(),
                report.commits.len()
            );
        }
        Ok(report)
    }

    fn hash_one(&self, record: &FileRecord) -> HashOutcome {
        let fingerprint = match record.quick_fingerprint.digest() {
            Some(fp) => Ok(fp.clone()),
            None => self.hasher.quick_fingerprint(&record.path),
        };

        match fingerprint.and_then(|fp| {
            self.hasher
                .full_hash(&record.path)
                .map(|full| HashUpdate::complete(record.path.clone(), fp, full))
        }) {
            Ok(update) => {
                log::trace!("Full hash computed: {}", record.path.display());
                if let Some(ref callback) = self.config.progress_callback {
                    callback.on_item_completed(record.size);
                }
                HashOutcome::Success {
                    update,
                    bytes: record.size,
                }
            }
            Err(e) => HashOutcome::Failure(e),
        }
    }

    /// Receive outcomes until every worker is done, committing every `B`
    /// successes and the final partial buffer.
    fn drain(
        &self,
        rx: Receiver<HashOutcome>,
        store: &dyn RecordStore,
        report: &mut RunReport,
    ) -> Result<(), StoreError> {
        let batch_size = self.config.batch_size.max(1);
        let mut buffer: Vec<HashUpdate> = Vec::with_capacity(batch_size);

        for outcome in rx {
            match outcome {
                HashOutcome::Success { update, bytes } => {
                    report.bytes_hashed += bytes;
                    buffer.push(update);
                    if buffer.len() >= batch_size {
                        Self::flush(&mut buffer, store, report)?;
                    }
                }
                HashOutcome::Failure(error) => {
                    log::warn!("Failed to hash {}: {}", error.path().display(), error);
                    report.failures.push(error);
                }
            }
        }

        self.transition(RunState::Draining);
        Self::flush(&mut buffer, store, report)
    }

    fn flush(
        buffer: &mut Vec<HashUpdate>,
        store: &dyn RecordStore,
        report: &mut RunReport,
    ) -> Result<(), StoreError> {
        if buffer.is_empty() {
            return Ok(());
        }
        store.commit_hash_results(buffer)?;
        log::debug!("Committed batch of {} full hashes", buffer.len());
        report.hashed += buffer.len();
        report.commits.push(buffer.len());
        buffer.clear();
        Ok(())
    }
}

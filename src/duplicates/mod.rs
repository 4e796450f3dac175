//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Staleness classification of discovered files
//! - The candidate funnel (size stage, then quick fingerprint stage)
//! - Full hashing by a bounded worker pool with batched commits
//! - Duplicate group management for reporting

pub mod finder;
pub mod funnel;
pub mod groups;
pub mod orchestrator;
pub mod staleness;

pub use finder::{IncrementalScanner, ScanError, ScanSummary};
pub use funnel::{CandidateFunnel, FunnelConfig, FunnelOutcome, FunnelStats};
pub use groups::{
    group_by_fingerprint, group_by_full_hash, group_by_size, DuplicateGroup, GroupingStats,
};
pub use orchestrator::{
    HashOutcome, HashWorkerOrchestrator, OrchestratorConfig, RunReport, RunState,
};
pub use staleness::{classify, Classification, ClassificationCounts, MTIME_EPSILON};

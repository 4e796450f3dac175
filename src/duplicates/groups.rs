//! Record grouping for the candidate funnel and for reporting.
//!
//! # Overview
//!
//! Files with different sizes cannot be duplicates, and files whose content
//! prefixes differ cannot be duplicates either. This module provides the
//! grouping primitives behind both pruning stages, plus the final grouping
//! by full hash used by the reporting view.
//!
//! # Example
//!
//! ```
//! use dupfinder::duplicates::group_by_size;
//! use dupfinder::scanner::DiscoveredFile;
//! use dupfinder::store::FileRecord;
//! use std::path::PathBuf;
//!
//! let records = vec![
//!     FileRecord::discovered(&DiscoveredFile::new(PathBuf::from("/a"), 1024, 0.0), 0.0),
//!     FileRecord::discovered(&DiscoveredFile::new(PathBuf::from("/b"), 1024, 0.0), 0.0),
//!     FileRecord::discovered(&DiscoveredFile::new(PathBuf::from("/c"), 2048, 0.0), 0.0),
//! ];
//!
//! let (groups, stats) = group_by_size(records);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(groups.len(), 1);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::scanner::Digest;
use crate::store::FileRecord;

/// Key of a fingerprint group: size plus quick fingerprint.
pub type FingerprintKey = (u64, Digest);

/// Confirmed duplicate group of files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Full content digest shared by every file in the group
    pub hash: Digest,
    /// File size in bytes (shared by all files)
    pub size: u64,
    /// Paths of the duplicates, sorted
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Create a new duplicate group.
    #[must_use]
    pub fn new(hash: Digest, size: u64, mut paths: Vec<PathBuf>) -> Self {
        paths.sort();
        Self { hash, size, paths }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.paths.len() as u64
    }

    /// Total wasted space (all copies minus one).
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Number of duplicate copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }

    /// Hash as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        self.hash.to_hex()
    }
}

/// Statistics from size grouping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingStats {
    /// Total number of records processed
    pub total_files: usize,
    /// Total size of all records in bytes
    pub total_size: u64,
    /// Number of unique file sizes
    pub unique_sizes: usize,
    /// Number of records that could be duplicates (in groups of 2+)
    pub potential_duplicates: usize,
    /// Number of records eliminated as unique (singleton groups)
    pub eliminated_unique: usize,
    /// Number of size groups with 2+ records
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of records eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group records by size, keeping only groups with 2+ members.
///
/// No file I/O is performed.
#[must_use]
pub fn group_by_size(
    records: impl IntoIterator<Item = FileRecord>,
) -> (HashMap<u64, Vec<FileRecord>>, GroupingStats) {
    let mut all_groups: HashMap<u64, Vec<FileRecord>> = HashMap::new();
    let mut stats = GroupingStats::default();

    for record in records {
        stats.total_files += 1;
        stats.total_size += record.size;
        all_groups.entry(record.size).or_default().push(record);
    }

    stats.unique_sizes = all_groups.len();

    let filtered: HashMap<u64, Vec<FileRecord>> = all_groups
        .into_iter()
        .filter(|(size, records)| {
            if records.len() == 1 {
                stats.eliminated_unique += 1;
                log::trace!("Eliminated unique size {}: {}", size, records[0].path.display());
                false
            } else {
                stats.potential_duplicates += records.len();
                stats.duplicate_groups += 1;
                true
            }
        })
        .collect();

    (filtered, stats)
}

/// Group records by `(size, quick fingerprint)`, keeping groups of 2+.
///
/// Records without a computed fingerprint are ignored.
#[must_use]
pub fn group_by_fingerprint(
    records: impl IntoIterator<Item = FileRecord>,
) -> HashMap<FingerprintKey, Vec<FileRecord>> {
    let mut groups: HashMap<FingerprintKey, Vec<FileRecord>> = HashMap::new();
    for record in records {
        let Some(fingerprint) = record.quick_fingerprint.digest().cloned() else {
            continue;
        };
        groups
            .entry((record.size, fingerprint))
            .or_default()
            .push(record);
    }

    groups.retain(|(size, fingerprint), members| {
        if members.len() < 2 {
            log::trace!(
                "Eliminated unique fingerprint {} ({} bytes): {}",
                fingerprint,
                size,
                members[0].path.display()
            );
        }
        members.len() >= 2
    });
    groups
}

/// Group records by full hash into duplicate groups.
///
/// Only records with a computed full hash participate. Groups are sorted by
/// wasted space, largest first, then by hash for a stable order.
#[must_use]
pub fn group_by_full_hash<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Vec<DuplicateGroup> {
    let mut by_hash: HashMap<(u64, &Digest), Vec<PathBuf>> = HashMap::new();
    for record in records {
        if let Some(hash) = record.full_hash.digest() {
            by_hash
                .entry((record.size, hash))
                .or_default()
                .push(record.path.clone());
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_hash
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|((size, hash), paths)| DuplicateGroup::new(hash.clone(), size, paths))
        .collect();

    groups.sort_by(|a, b| {
        b.wasted_space()
            .cmp(&a.wasted_space())
            .then_with(|| a.hash.cmp(&b.hash))
    });
    groups
}

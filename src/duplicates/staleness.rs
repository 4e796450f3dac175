//! Staleness classification for discovered files.
//!
//! Decides, per discovered file, whether the stored digests can be trusted
//! without reading any content.
//!
//! A stored full hash is reused only when the size is unchanged and either
//! the modification time is unchanged (within [`MTIME_EPSILON`]) or the file
//! was last modified before the previous completed scan started. Anything
//! else is re-hashed; a missing record is new.

use serde::{Deserialize, Serialize};

use crate::scanner::DiscoveredFile;
use crate::store::FileRecord;

/// Modification times closer than this are treated as equal (seconds).
///
/// Absorbs float rounding between the filesystem timestamp and the value
/// stored as a REAL.
pub const MTIME_EPSILON: f64 = 1e-6;

/// Outcome of classifying one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Stored digests are still valid; only `seen_at` is refreshed.
    Reuse,
    /// A record exists but its digests are stale.
    Rehash,
    /// No record exists for this path.
    New,
}

impl Classification {
    /// Whether this file needs hashing work in the current scan.
    #[must_use]
    pub fn needs_hashing(self) -> bool {
        !matches!(self, Self::Reuse)
    }
}

/// Classify a discovered file against its stored record.
///
/// Pure: no I/O and no side effects. `watermark` is the start time of the
/// last completed scan, if any.
#[must_use]
pub fn classify(
    discovered: &DiscoveredFile,
    stored: Option<&FileRecord>,
    watermark: Option<f64>,
) -> Classification {
    let Some(record) = stored else {
        return Classification::New;
    };

    if record.full_hash.is_pending() || record.size != discovered.size {
        return Classification::Rehash;
    }

    let mtime_unchanged = (discovered.modified - record.modified).abs() < MTIME_EPSILON;
    let older_than_watermark = watermark.is_some_and(|w| discovered.modified < w);

    if mtime_unchanged || older_than_watermark {
        Classification::Reuse
    } else {
        Classification::Rehash
    }
}

/// Running tally of classifications for one discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationCounts {
    /// Files whose stored digests were kept
    pub reused: usize,
    /// Files with stale digests
    pub rehashed: usize,
    /// Files seen for the first time
    pub new: usize,
}

impl ClassificationCounts {
    /// Count one classification.
    pub fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Reuse => self.reused += 1,
            Classification::Rehash => self.rehashed += 1,
            Classification::New => self.new += 1,
        }
    }

    /// Total files classified.
    #[must_use]
    pub fn total(&self) -> usize {
        self.reused + self.rehashed + self.new
    }

    /// Files that need hashing work.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rehashed + self.new
    }
}

//! Record definitions persisted by the store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::duplicates::Classification;
use crate::scanner::{DiscoveredFile, Digest};

/// State of a lazily computed digest.
///
/// `Pending` means "not computed for the current size and modification
/// time"; it is never confused with a computed digest of empty content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "digest")]
pub enum HashState {
    /// Not computed yet (or cleared by a metadata change).
    #[default]
    Pending,
    /// Computed digest.
    Computed(Digest),
}

impl HashState {
    /// Whether the digest is still missing.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the digest has been computed.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// The computed digest, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Pending => None,
            Self::Computed(d) => Some(d),
        }
    }
}

impl From<Option<Digest>> for HashState {
    fn from(value: Option<Digest>) -> Self {
        value.map_or(Self::Pending, Self::Computed)
    }
}

impl From<Digest> for HashState {
    fn from(value: Digest) -> Self {
        Self::Computed(value)
    }
}

/// One stored file, keyed by its absolute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path (unique identity)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time from the filesystem (epoch seconds)
    pub modified: f64,
    /// Start time of the last scan that touched this record (epoch seconds)
    pub seen_at: f64,
    /// Digest of the fixed-size content prefix
    pub quick_fingerprint: HashState,
    /// Digest of the whole content; only computed for confirmed candidates
    pub full_hash: HashState,
}

impl FileRecord {
    /// A freshly discovered record with both digests pending.
    #[must_use]
    pub fn discovered(file: &DiscoveredFile, seen_at: f64) -> Self {
        Self {
            path: file.path.clone(),
            size: file.size,
            modified: file.modified,
            seen_at,
            quick_fingerprint: HashState::Pending,
            full_hash: HashState::Pending,
        }
    }

    /// The `(size, quick fingerprint)` key used by the fingerprint stage.
    #[must_use]
    pub fn fingerprint_key(&self) -> Option<(u64, &Digest)> {
        self.quick_fingerprint.digest().map(|d| (self.size, d))
    }
}

/// A discovered file together with its staleness decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryUpdate {
    /// Metadata observed by this scan
    pub file: DiscoveredFile,
    /// Outcome of the staleness classifier
    pub classification: Classification,
}

impl DiscoveryUpdate {
    /// Pair a discovered file with its classification.
    #[must_use]
    pub fn new(file: DiscoveredFile, classification: Classification) -> Self {
        Self {
            file,
            classification,
        }
    }
}

/// Hash results for one path, committed in batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashUpdate {
    /// Path of the hashed file
    pub path: PathBuf,
    /// Quick fingerprint of the file
    pub quick_fingerprint: Digest,
    /// Full hash, `Pending` when only the fingerprint was computed
    pub full_hash: HashState,
}

impl HashUpdate {
    /// Result of the fingerprint stage only.
    #[must_use]
    pub fn fingerprint(path: PathBuf, quick_fingerprint: Digest) -> Self {
        Self {
            path,
            quick_fingerprint,
            full_hash: HashState::Pending,
        }
    }

    /// Result of a completed full hash.
    #[must_use]
    pub fn complete(path: PathBuf, quick_fingerprint: Digest, full_hash: Digest) -> Self {
        Self {
            path,
            quick_fingerprint,
            full_hash: HashState::Computed(full_hash),
        }
    }
}

/// The persisted scan watermark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanWatermark {
    /// Files modified before this time are unchanged since they were hashed
    pub last_scan_timestamp: f64,
    /// Incremented on every update
    pub version: u64,
}

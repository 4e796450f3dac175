//! Scanner module for file discovery and content hashing.
//!
//! This module provides functionality for:
//! - The discovery feed: parallel directory walking using jwalk
//! - Tiered content hashing (quick fingerprint and full hash)
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal producing [`DiscoveredFile`] entries
//! - [`hasher`]: Pluggable digests over a fixed prefix or the whole file
//!
//! # Example
//!
//! ```no_run
//! use dupfinder::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use hasher::{
    ContentHasher, Digest, DigestAlgorithm, HashError, Hasher, UnknownAlgorithm,
    DEFAULT_CHUNK_SIZE, DEFAULT_PREFIX_SIZE,
};
pub use walker::Walker;

/// One entry of the discovery feed.
///
/// Paths are unique within a single discovery pass. The modification time
/// is a floating point Unix timestamp so it can be compared directly with
/// the scan watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time (seconds since the Unix epoch)
    pub modified: f64,
}

impl DiscoveredFile {
    /// Create a new discovered file entry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: f64) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// Build an entry from filesystem metadata.
    ///
    /// Fails when the platform cannot report a modification time; without
    /// one the file could never be told apart from its stored record.
    pub fn from_metadata(
        path: PathBuf,
        metadata: &std::fs::Metadata,
    ) -> Result<Self, DiscoveryError> {
        Self::with_modified(path, metadata.len(), metadata.modified())
    }

    fn with_modified(
        path: PathBuf,
        size: u64,
        modified: std::io::Result<SystemTime>,
    ) -> Result<Self, DiscoveryError> {
        match modified {
            Ok(time) => Ok(Self::new(path, size, system_time_to_epoch(time))),
            Err(e) => Err(DiscoveryError::from_io(&path, e)),
        }
    }
}

/// Convert a [`SystemTime`] to fractional seconds since the Unix epoch.
///
/// Times before the epoch are returned as negative values.
#[must_use]
pub fn system_time_to_epoch(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
#[must_use]
pub fn now_epoch() -> f64 {
    system_time_to_epoch(SystemTime::now())
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Glob patterns to ignore (gitignore-style).
    pub ignore_patterns: Vec<String>,
}

/// A single discovery entry that could not be read.
///
/// These never abort a discovery pass; the entry is reported and omitted.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    /// Classify an I/O error raised while inspecting `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Path of the entry that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p) | Self::NotFound(p) | Self::NotADirectory(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}

//! JSON output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     { "hash": "af13...", "size": 1024, "files": ["/a/x.bin", "/b/x.bin"] }
//!   ],
//!   "summary": {
//!     "total_files": 100,
//!     "reused": 90,
//!     "rehashed": 4,
//!     "new": 6,
//!     "fingerprinted": 8,
//!     "candidates": 4,
//!     "hashed_files": 4,
//!     "commits": [4],
//!     "duplicate_groups": 2,
//!     "reclaimable_space": 51200,
//!     "hash_failures": [],
//!     "interrupted": false,
//!     "watermark_advanced": true,
//!     "scan_duration_ms": 1234,
//!     "exit_code": 0,
//!     "exit_code_name": "DF000"
//!   }
//! }
//! ```
//!
//! `summary` is omitted when rendering stored groups without a run.

use std::io::Write;

use serde::Serialize;

use crate::duplicates::{DuplicateGroup, ScanSummary};
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// Full content digest (hex)
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Absolute paths of all copies, sorted
    pub files: Vec<String>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            hash: group.hash_hex(),
            size: group.size,
            files: group
                .paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Run statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub reused: usize,
    pub rehashed: usize,
    pub new: usize,
    pub size_eliminated: usize,
    pub fingerprinted: usize,
    pub fingerprint_eliminated: usize,
    pub candidates: usize,
    pub hashed_files: usize,
    pub bytes_hashed: u64,
    /// Number of results in each full-hash commit
    pub commits: Vec<usize>,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub reclaimable_space: u64,
    /// One message per file that could not be hashed
    pub hash_failures: Vec<String>,
    pub discovery_failures: Vec<String>,
    pub interrupted: bool,
    pub watermark_advanced: bool,
    pub scan_duration_ms: u64,
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DF000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Create a JSON summary from a run summary and its exit code.
    #[must_use]
    pub fn from_scan_summary(summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            total_files: summary.total_files,
            total_size: summary.total_size,
            reused: summary.classification.reused,
            rehashed: summary.classification.rehashed,
            new: summary.classification.new,
            size_eliminated: summary.funnel.size_eliminated,
            fingerprinted: summary.funnel.fingerprinted,
            fingerprint_eliminated: summary.funnel.fingerprint_eliminated,
            candidates: summary.funnel.candidates,
            hashed_files: summary.hashed_files,
            bytes_hashed: summary.bytes_hashed,
            commits: summary.commits.clone(),
            duplicate_groups: summary.duplicate_groups,
            duplicate_files: summary.duplicate_files,
            reclaimable_space: summary.reclaimable_space,
            hash_failures: summary.hash_failures.iter().map(ToString::to_string).collect(),
            discovery_failures: summary
                .discovery_failures
                .iter()
                .map(ToString::to_string)
                .collect(),
            interrupted: summary.interrupted,
            watermark_advanced: summary.watermark_advanced,
            scan_duration_ms: summary.scan_duration.as_millis() as u64,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// List of duplicate groups
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Run statistics, if the output describes a run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JsonSummary>,
}

impl JsonOutput {
    /// JSON output for a finished scan or resume run.
    #[must_use]
    pub fn from_run(summary: &ScanSummary, exit_code: ExitCode) -> Self {
        Self {
            duplicates: summary.groups.iter().map(JsonDuplicateGroup::from).collect(),
            summary: Some(JsonSummary::from_scan_summary(summary, exit_code)),
        }
    }

    /// JSON output for stored groups only.
    ///
    /// ```
    /// use dupfinder::output::json::JsonOutput;
    ///
    /// let output = JsonOutput::from_groups(&[]);
    /// assert_eq!(output.to_json().unwrap(), r#"{"duplicates":[]}"#);
    /// ```
    #[must_use]
    pub fn from_groups(groups: &[DuplicateGroup]) -> Self {
        Self {
            duplicates: groups.iter().map(JsonDuplicateGroup::from).collect(),
            summary: None,
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}

//! Exit codes and structured error output for the binary.

use serde::Serialize;

use crate::duplicates::{ScanError, ScanSummary};
use crate::store::StoreError;

/// Process exit codes.
///
/// - 0: run completed and duplicates are known
/// - 1: fatal error (store unavailable, bad arguments, ...)
/// - 2: run completed, no duplicates
/// - 3: run completed, some files could not be read
/// - 130: interrupted by the stop signal (128 + SIGINT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed; duplicates were found.
    Success = 0,
    /// A fatal error ended the run.
    GeneralError = 1,
    /// Completed; no duplicates were found.
    NoDuplicates = 2,
    /// Completed with per-file failures.
    PartialSuccess = 3,
    /// Stopped by Ctrl+C before all work was dispatched.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DF000",
            Self::GeneralError => "DF001",
            Self::NoDuplicates => "DF002",
            Self::PartialSuccess => "DF003",
            Self::Interrupted => "DF130",
        }
    }

    /// Exit code for a run that returned a summary.
    ///
    /// Per-file failures take precedence over the duplicate count so that
    /// scripts notice unreadable files.
    #[must_use]
    pub fn from_summary(summary: &ScanSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.has_failures() {
            Self::PartialSuccess
        } else if summary.duplicate_groups == 0 {
            Self::NoDuplicates
        } else {
            Self::Success
        }
    }

    /// Exit code for an error returned by the application.
    ///
    /// Interruption is not an error: an interrupted scan still returns its
    /// summary, which [`ExitCode::from_summary`] maps.
    #[must_use]
    pub fn from_error(_err: &anyhow::Error) -> Self {
        Self::GeneralError
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DF001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the failure came from the record store
    pub store_failure: bool,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        let store_failure = err.chain().any(|cause| {
            cause.downcast_ref::<StoreError>().is_some()
                || matches!(cause.downcast_ref::<ScanError>(), Some(ScanError::Store(_)))
        });
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            store_failure,
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}

//! Command-line interface definitions for dupfinder.
//!
//! Global options (verbosity, color, error format, database path) apply to
//! every subcommand. Tuning flags override the layered configuration.
//!
//! # Example
//!
//! ```bash
//! # Incremental scan, text summary
//! dupfinder scan ~/Downloads
//!
//! # Scan with JSON output and a bigger commit batch
//! dupfinder scan ~/Downloads --output json --batch-size 5000
//!
//! # Finish an interrupted run without walking the tree again
//! dupfinder resume
//!
//! # Show stored duplicate groups
//! dupfinder report --output csv
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

use crate::scanner::DigestAlgorithm;

/// Incremental duplicate file finder.
///
/// dupfinder keeps a database of file fingerprints and content hashes so
/// repeated scans only hash what changed. Interrupted runs keep every
/// committed batch and can be resumed.
#[derive(Debug, Parser)]
#[command(name = "dupfinder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Path to the hash database
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(short, long, global = true, value_name = "PATH", env = "DUPFINDER_DATABASE")]
    pub database: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory and update the hash database
    Scan(ScanArgs),
    /// Hash the remaining candidates of an interrupted run
    Resume(ResumeArgs),
    /// Print duplicate groups stored in the database
    Report(ReportArgs),
    /// List files whose full hash is still pending
    Pending(PendingArgs),
}

/// Hashing and batching flags shared by `scan` and `resume`.
#[derive(Debug, Clone, Default, Args)]
pub struct TuningArgs {
    /// Digest algorithm for fingerprints and full hashes
    #[arg(short, long, value_enum)]
    pub algorithm: Option<DigestAlgorithm>,

    /// Number of leading bytes in the quick fingerprint (e.g., 64KiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub prefix_size: Option<u64>,

    /// Number of concurrent hash workers (default: available CPUs)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Number of hash results committed per transaction
    #[arg(short, long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Read chunk size for full hashing (e.g., 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directory path to scan for duplicates
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Output format for the scan result
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// These patterns are added to any .gitignore patterns found.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Clear all stored hashes before scanning
    #[arg(long)]
    pub clear_cache: bool,
}

impl ScanArgs {
    /// Configuration overrides carried by these flags.
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::from(&self.tuning);
        overrides.min_size = self.min_size;
        if !self.ignore_patterns.is_empty() {
            overrides.ignore_patterns = Some(self.ignore_patterns.clone());
        }
        overrides.follow_symlinks = self.follow_symlinks.then_some(true);
        overrides.skip_hidden = self.skip_hidden.then_some(true);
        overrides
    }
}

/// Arguments for the resume subcommand.
#[derive(Debug, Args)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Output format for the run result
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the report subcommand.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Output format for the duplicate groups
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the pending subcommand.
#[derive(Debug, Args)]
pub struct PendingArgs {
    /// Print only the number of pending files
    #[arg(long)]
    pub count: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON output for scripting
    Json,
    /// CSV output for spreadsheets
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Command-line layer of the configuration.
///
/// Only flags that were actually given are serialized, so lower layers
/// keep their values for everything else.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<DigestAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_patterns: Option<Vec<String>>,
}

impl From<&TuningArgs> for ConfigOverrides {
    fn from(tuning: &TuningArgs) -> Self {
        Self {
            algorithm: tuning.algorithm,
            prefix_size: tuning.prefix_size,
            workers: tuning.workers,
            batch_size: tuning.batch_size,
            chunk_size: tuning.chunk_size,
            ..Self::default()
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupfinder::cli::parse_size;
///
/// assert_eq!(parse_size("64KiB").unwrap(), 65_536);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
///
/// # Errors
///
/// Returns an error message for an empty string, a malformed number, or an
/// unknown suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

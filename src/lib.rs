//! dupfinder - incremental duplicate file finder
//!
//! Finds files with identical content under a directory tree and keeps a
//! persistent database of fingerprints and full hashes, so repeated scans
//! only hash what changed since the last completed run.
//!
//! The pipeline:
//! 1. **Discovery**: walk the tree (absolute path, size, mtime)
//! 2. **Staleness**: Reuse / Rehash / New against the stored record
//! 3. **Funnel**: drop unique sizes, then unique quick fingerprints
//! 4. **Full hash**: bounded worker pool, committed in batches
//! 5. **Watermark**: advanced only after an uninterrupted run

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod store;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::cli::{Cli, Commands, ConfigOverrides, OutputFormat, PendingArgs, ReportArgs};
use crate::config::ScanConfig;
use crate::duplicates::{group_by_full_hash, IncrementalScanner, ScanSummary};
use crate::error::ExitCode;
use crate::output::{CsvOutput, JsonOutput, TextOutput};
use crate::progress::Progress;
use crate::store::{RecordStore, SqliteStore};

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error for invalid configuration, an unavailable database, a
/// missing scan root, or a failed write of the output.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet, !cli.no_color);

    let database = database_path(cli.database.clone())?;
    let store = Arc::new(
        SqliteStore::open(&database)
            .with_context(|| format!("Failed to open database {}", database.display()))?,
    );
    log::debug!("Using database {}", database.display());

    match cli.command {
        Commands::Scan(ref args) => {
            let config = ScanConfig::load(cli.config.as_deref(), &args.config_overrides())?;
            if args.clear_cache {
                let cleared = store.clear_hashes()?;
                log::info!("Cleared {} stored hashes", cleared);
            }
            let scanner = build_scanner(&cli, config, store)?;
            let summary = scanner.scan(&args.path)?;
            render_run(&summary, args.output)
        }
        Commands::Resume(ref args) => {
            let overrides = ConfigOverrides::from(&args.tuning);
            let config = ScanConfig::load(cli.config.as_deref(), &overrides)?;
            let scanner = build_scanner(&cli, config, store)?;
            let summary = scanner.resume()?;
            render_run(&summary, args.output)
        }
        Commands::Report(ref args) => report(store.as_ref(), args),
        Commands::Pending(ref args) => pending(store.as_ref(), args),
    }
}

fn database_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(SqliteStore::default_path)
        .ok_or_else(|| anyhow!("Could not determine a database location; pass --database"))
}

fn build_scanner(
    cli: &Cli,
    config: ScanConfig,
    store: Arc<SqliteStore>,
) -> Result<IncrementalScanner> {
    let handler = signal::install_handler()?;
    log::debug!(
        "Hashing with {} ({} workers, batch size {})",
        config.algorithm,
        config.workers,
        config.batch_size
    );
    Ok(IncrementalScanner::new(config, store)
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(Arc::new(Progress::new(cli.quiet))))
}

fn render_run(summary: &ScanSummary, format: OutputFormat) -> Result<ExitCode> {
    let exit_code = ExitCode::from_summary(summary);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Text => TextOutput::from_run(summary).write_to(&mut out)?,
        OutputFormat::Json => JsonOutput::from_run(summary, exit_code).write_to(&mut out, true)?,
        OutputFormat::Csv => CsvOutput::new(&summary.groups).write_to(&mut out)?,
    }
    out.flush()?;
    Ok(exit_code)
}

fn report(store: &dyn RecordStore, args: &ReportArgs) -> Result<ExitCode> {
    let records = store.all_records()?;
    let groups = group_by_full_hash(&records);
    log::debug!("{} stored records, {} duplicate groups", records.len(), groups.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Text => TextOutput::from_groups(&groups).write_to(&mut out)?,
        OutputFormat::Json => JsonOutput::from_groups(&groups).write_to(&mut out, true)?,
        OutputFormat::Csv => CsvOutput::new(&groups).write_to(&mut out)?,
    }
    out.flush()?;

    Ok(if groups.is_empty() {
        ExitCode::NoDuplicates
    } else {
        ExitCode::Success
    })
}

fn pending(store: &dyn RecordStore, args: &PendingArgs) -> Result<ExitCode> {
    let paths = store.query_pending()?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.count {
        writeln!(out, "{}", paths.len())?;
    } else {
        for path in &paths {
            writeln!(out, "{}", path.display())?;
        }
    }
    out.flush()?;
    Ok(ExitCode::Success)
}

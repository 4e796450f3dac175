//! Progress reporting for the scan phases.
//!
//! The pipeline reports through [`ProgressCallback`]; [`Progress`] renders
//! it with indicatif: a spinner for discovery and bars for the fingerprint
//! and full-hash phases. Phases run one after another, so a single active
//! bar is kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::duplicates::finder::PHASE_DISCOVERY;
use crate::duplicates::funnel::PHASE_FINGERPRINT;
use crate::duplicates::orchestrator::PHASE_FULLHASH;

/// Progress callback for the scan pipeline.
///
/// Callbacks may be invoked from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// A phase starts. `total` is 0 when the size is not known up front.
    fn on_phase_start(&self, phase: &str, total: usize);

    /// `current` items of the running phase are done; `path` is the latest.
    fn on_progress(&self, current: usize, path: &str);

    /// One file was hashed, `bytes` long.
    fn on_item_completed(&self, _bytes: u64) {}

    /// The phase named `phase` finished (or was interrupted).
    fn on_phase_end(&self, phase: &str);
}

/// Terminal progress reporter.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    bytes: AtomicU64,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter. With `quiet` nothing is drawn.
    ///
    /// ```
    /// use dupfinder::progress::Progress;
    ///
    /// let progress = Progress::new(true);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            bytes: AtomicU64::new(0),
            quiet,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style(color: &str) -> ProgressStyle {
        let template = format!(
            "[{{elapsed_precise}}] [{{bar:40.{color}/blue}}] {{pos}}/{{len}} ({{percent}}%) {{msg}} (ETA: {{eta}})"
        );
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
    }

    fn phase_label(phase: &str) -> &str {
        match phase {
            PHASE_DISCOVERY => "Discovering",
            PHASE_FINGERPRINT => "Fingerprinting",
            PHASE_FULLHASH => "Full hashing",
            other => other,
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let bar = if phase == PHASE_DISCOVERY {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(Self::spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            let color = if phase == PHASE_FULLHASH { "green" } else { "cyan" };
            let bar = self.multi.add(ProgressBar::new(total as u64));
            bar.set_style(Self::bar_style(color));
            bar
        };
        bar.set_message(Self::phase_label(phase).to_string());
        self.bytes.store(0, Ordering::Relaxed);

        if let Some(previous) = self.active().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        if let Some(bar) = self.active().as_ref() {
            bar.set_position(current as u64);
            bar.set_message(truncate_path(path, 30));
        }
    }

    fn on_item_completed(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(bar) = self.active().take() {
            let bytes = self.bytes.load(Ordering::Relaxed);
            let message = if bytes > 0 {
                format!("{} complete ({})", Self::phase_label(phase), ByteSize::b(bytes))
            } else {
                format!("{} complete", Self::phase_label(phase))
            };
            bar.finish_with_message(message);
        }
    }
}

/// Shorten a path to its file name when it is longer than `max_len`.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len + 3 - max_len)
            .collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}

//! Ctrl+C handling.
//!
//! The stop signal is a shared `AtomicBool`. The funnel and the hash worker
//! orchestrator check it before each file; work already in flight finishes
//! and every completed batch is still committed.
//!
//! ```rust,no_run
//! use dupfinder::signal::install_handler;
//!
//! let handler = install_handler().unwrap();
//! let flag = handler.get_flag();
//! // pass `flag` to IncrementalScanner::with_shutdown_flag
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared stop signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no stop requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request a stop, as Ctrl+C would.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Flag to hand to the scanner and its workers.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C handler.
///
/// The hook can only be registered once per process. Later calls get the
/// same handler back with its flag cleared, so `run_app` can be called
/// repeatedly from tests.
///
/// # Errors
///
/// Returns [`SignalError`] if the hook cannot be registered and no handler
/// exists yet.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();
    let registered = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Finishing in-flight files and committing results..."
        );
        log::info!("Stop signal received");
    });

    match registered {
        Ok(()) => {
            let handler = GLOBAL_HANDLER.get_or_init(|| handler).clone();
            Ok(handler)
        }
        // Lost a race with another thread of this process.
        Err(ctrlc::Error::MultipleHandlers) => match GLOBAL_HANDLER.get() {
            Some(existing) => {
                existing.reset();
                Ok(existing.clone())
            }
            None => {
                log::debug!("Ctrl+C hook owned elsewhere, using an unhooked handler");
                Ok(GLOBAL_HANDLER.get_or_init(ShutdownHandler::new).clone())
            }
        },
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}

//! Scan configuration management.
//!
//! Settings are layered with figment, later sources winning:
//!
//! 1. Built-in defaults ([`ScanConfig::default`])
//! 2. `config.toml` in the platform config directory, or an explicit path
//! 3. Environment variables prefixed with `DUPFINDER_`
//! 4. Command-line overrides
//!
//! The resulting [`ScanConfig`] is validated once and then handed to the
//! scanner by value; it is never changed during a run.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::{DigestAlgorithm, WalkerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_PREFIX_SIZE};

/// Default number of results per commit batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "DUPFINDER_";

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Number of hash workers when none is configured.
///
/// Falls back to a single worker if the parallelism cannot be queried.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Errors raised while building a [`ScanConfig`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed, or a value had the wrong type.
    ///
    /// Unknown digest algorithm names end up here.
    #[error("Invalid configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value parsed but is outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Configuration key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

/// Configuration for an incremental scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Digest algorithm used for fingerprints and full hashes.
    pub algorithm: DigestAlgorithm,

    /// Number of leading bytes covered by the quick fingerprint.
    pub prefix_size: usize,

    /// Number of concurrent hash workers.
    pub workers: usize,

    /// Number of results committed per write transaction.
    pub batch_size: usize,

    /// Read chunk size for streaming full hashes.
    pub chunk_size: usize,

    /// Follow symbolic links during discovery.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories during discovery.
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Gitignore-style patterns excluded from discovery.
    pub ignore_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            prefix_size: DEFAULT_PREFIX_SIZE,
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            follow_symlinks: false,
            skip_hidden: false,
            min_size: None,
            ignore_patterns: Vec::new(),
        }
    }
}

impl ScanConfig {
    /// Default platform-specific path of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupfinder").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Build the layered figment without command-line overrides.
    ///
    /// If `config_path` is `None` the default path is used when it exists.
    /// A missing file is not an error.
    #[must_use]
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = config_path
            .map(Path::to_path_buf)
            .or_else(Self::default_path);
        if let Some(file) = file {
            log::debug!("Loading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the configuration, applying `overrides` last.
    ///
    /// `overrides` is typically built from command-line flags; fields it
    /// leaves out keep the value of the lower layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a layer fails to parse or the result does
    /// not pass [`ScanConfig::validate`].
    pub fn load<T: Serialize>(config_path: Option<&Path>, overrides: &T) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(config_path)
            .merge(Serialized::defaults(overrides))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a TOML string on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or invalid.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero worker count, batch
    /// size, prefix size, or chunk size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("workers", self.workers),
            ("batch_size", self.batch_size),
            ("prefix_size", self.prefix_size),
            ("chunk_size", self.chunk_size),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Discovery feed options derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            min_size: self.min_size,
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    /// Serialize to pretty TOML, e.g. for a starter config file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

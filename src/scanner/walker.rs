//! Discovery feed built on jwalk.
//!
//! # Overview
//!
//! [`Walker`] traverses a directory tree in parallel and yields one
//! [`DiscoveredFile`] per regular file: absolute path, size, and
//! modification time as a float epoch. Entries that cannot be inspected are
//! yielded as [`DiscoveryError`] and the walk continues.
//!
//! - Gitignore-style ignore patterns via the `ignore` crate
//! - Optional symlink following and hidden-file skipping
//! - Empty files are skipped (all empty files share the same content)
//! - Graceful shutdown via atomic flag
//!
//! # Example
//!
//! ```no_run
//! use dupfinder::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Discovered {} files", files.len());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{DiscoveredFile, DiscoveryError, WalkerConfig};

/// Directory walker producing the discovery feed.
#[derive(Debug)]
pub struct Walker {
    /// Absolute root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// The root is made absolute so every discovered path is absolute too.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        let root = path
            .canonicalize()
            .or_else(|_| std::path::absolute(path))
            .unwrap_or_else(|_| path.to_path_buf());
        Self {
            root,
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root being walked.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build gitignore matcher from config patterns and a root .gitignore.
    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn should_ignore(&self, path: &Path, gitignore: &Option<Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        gi.matched_path_or_any_parents(relative, false).is_ignore()
    }

    /// Walk the directory tree, yielding discovered files.
    ///
    /// Errors are yielded as [`DiscoveryError`] values rather than stopping
    /// iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<DiscoveredFile, DiscoveryError>> + '_ {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    return Some(Err(DiscoveryError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }));
                }
            };

            let path = entry.path();
            let file_type = entry.file_type();
            if path == self.root || file_type.is_dir() {
                return None;
            }

            if self.should_ignore(&path, &gitignore) {
                log::trace!("Ignoring file: {}", path.display());
                return None;
            }

            if file_type.is_symlink() && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", path.display());
                return None;
            }

            let metadata = if self.config.follow_symlinks {
                std::fs::metadata(&path)
            } else {
                std::fs::symlink_metadata(&path)
            };
            let metadata = match metadata {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Cannot stat {}: {}", path.display(), e);
                    return Some(Err(DiscoveryError::from_io(&path, e)));
                }
            };

            if !metadata.is_file() {
                return None;
            }
            if metadata.len() == 0 {
                log::trace!("Skipping empty file: {}", path.display());
                return None;
            }
            if self.config.min_size.is_some_and(|min| metadata.len() < min) {
                log::trace!("Skipping file below minimum size: {}", path.display());
                return None;
            }

            Some(DiscoveredFile::from_metadata(path, &metadata))
        })
    }
}

//! Tiered file hasher with streaming support.
//!
//! # Overview
//!
//! Two operations are provided, both parameterized by a [`DigestAlgorithm`]:
//!
//! - [`Hasher::quick_fingerprint`] digests the first `prefix_size` bytes of
//!   a file (64 KiB by default). Its cost does not depend on the file size.
//! - [`Hasher::full_hash`] streams the whole file through the digest in
//!   fixed-size chunks so memory use stays bounded.
//!
//! Both are read-only. Read failures surface as [`HashError`] carrying the
//! path and the underlying cause.
//!
//! # Example
//!
//! ```no_run
//! use dupfinder::scanner::{DigestAlgorithm, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new(DigestAlgorithm::Sha256);
//! let quick = hasher.quick_fingerprint(Path::new("file.bin")).unwrap();
//! let full = hasher.full_hash(Path::new("file.bin")).unwrap();
//! println!("{} / {}", quick, full);
//! ```

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;

/// Default quick-fingerprint prefix: 64 KiB.
pub const DEFAULT_PREFIX_SIZE: usize = 64 * 1024;

/// Default streaming read chunk for full hashing: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Supported content digests.
///
/// Names are resolved once, when configuration is loaded; an unknown name
/// never reaches the hashing code.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// MD5 (128-bit)
    Md5,
    /// SHA-1 (160-bit)
    Sha1,
    /// SHA-256 (256-bit)
    Sha256,
    /// SHA-512 (512-bit)
    Sha512,
    /// BLAKE3 (256-bit)
    #[default]
    Blake3,
}

impl DigestAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [DigestAlgorithm; 5] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake3,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Width of the produced digest in bytes.
    #[must_use]
    pub fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 | Self::Blake3 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Digest a complete in-memory buffer.
    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> Digest {
        let mut state = DigestState::new(self);
        state.update(bytes);
        state.finalize()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown algorithm name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported digest algorithm '{0}' (expected one of: md5, sha1, sha256, sha512, blake3)")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for DigestAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

/// Incremental digest state for one file.
enum DigestState {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Md5::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> Digest {
        let bytes: Vec<u8> = match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        };
        Digest::from_bytes(bytes)
    }
}

/// A fixed-width content digest.
///
/// Stored and displayed as lowercase hexadecimal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(Box<[u8]>);

impl Digest {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hexadecimal digest.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self::from_bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hexadecimal representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Path of the file that could not be hashed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}

/// The two hashing tiers, as seen by the funnel and the worker pool.
///
/// [`Hasher`] is the production implementation; the seam exists so callers
/// can wrap hashing (for instance to throttle or instrument reads).
pub trait ContentHasher: Send + Sync {
    /// Digest of the first bytes of the file.
    fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError>;

    /// Digest of the entire file.
    fn full_hash(&self, path: &Path) -> Result<Digest, HashError>;
}

/// Streaming file hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: DigestAlgorithm,
    prefix_size: usize,
    chunk_size: usize,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default())
    }
}

impl Hasher {
    /// Create a hasher with the default prefix and chunk sizes.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            prefix_size: DEFAULT_PREFIX_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the quick-fingerprint prefix size in bytes (minimum 1).
    #[must_use]
    pub fn with_prefix_size(mut self, bytes: usize) -> Self {
        self.prefix_size = bytes.max(1);
        self
    }

    /// Set the streaming chunk size in bytes (minimum 1).
    #[must_use]
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Configured digest algorithm.
    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Configured prefix size.
    #[must_use]
    pub fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    /// Compute the quick fingerprint over at most `prefix_size` bytes.
    ///
    /// Files shorter than the prefix are digested in full, so for them the
    /// fingerprint equals the full hash.
    pub fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let buffer_len = self.chunk_size.min(self.prefix_size);
        self.digest_reader(file.take(self.prefix_size as u64), path, buffer_len)
    }

    /// Compute the digest of the entire file, streamed in chunks.
    pub fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.digest_reader(file, path, self.chunk_size)
    }

    fn digest_reader<R: Read>(
        &self,
        mut reader: R,
        path: &Path,
        buffer_len: usize,
    ) -> Result<Digest, HashError> {
        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; buffer_len];

        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => state.update(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            }
        }

        Ok(state.finalize())
    }
}

impl ContentHasher for Hasher {
    fn quick_fingerprint(&self, path: &Path) -> Result<Digest, HashError> {
        Hasher::quick_fingerprint(self, path)
    }

    fn full_hash(&self, path: &Path) -> Result<Digest, HashError> {
        Hasher::full_hash(self, path)
    }
}

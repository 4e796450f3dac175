//! SQLite-backed record store.
//!
//! One `file_records` row per absolute path, a single-row `scan_watermark`
//! table, and a small `store_meta` key/value table holding the digest
//! algorithm and fingerprint prefix length. Digests are stored as lowercase hex; `NULL` means pending.
//!
//! Writes run inside `BEGIN IMMEDIATE` transactions so a batch is applied
//! completely or not at all. Busy/locked errors from other processes are
//! retried a few times before surfacing as [`StoreError::Conflict`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::{
    DiscoveryUpdate, FileRecord, HashState, HashUpdate, RecordStore, ScanWatermark, StoreError,
    StoreResult,
};
use crate::duplicates::Classification;
use crate::scanner::{Digest, DigestAlgorithm};

/// Default database file name inside the data directory.
pub const DATABASE_FILE_NAME: &str = "file_hashes.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_records (
        path TEXT PRIMARY KEY NOT NULL,
        size INTEGER NOT NULL,
        modified_time REAL NOT NULL,
        seen_at REAL NOT NULL,
        quick_fingerprint TEXT,
        full_hash TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_file_records_size_quick
        ON file_records(size, quick_fingerprint);
    CREATE INDEX IF NOT EXISTS idx_file_records_full_hash
        ON file_records(full_hash);
    CREATE TABLE IF NOT EXISTS scan_watermark (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        last_scan_timestamp REAL NOT NULL,
        version INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    );
";

const RECORD_COLUMNS: &str =
    "path, size, modified_time, seen_at, quick_fingerprint, full_hash";

const ALGORITHM_KEY: &str = "hash_algorithm";
const PREFIX_KEY: &str = "fingerprint_prefix";
const MAX_CONFLICT_RETRIES: u32 = 3;

/// SQLite implementation of [`RecordStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::unavailable("open", e))?;
        Self::init(&conn, true)?;
        log::debug!("Opened record store at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::unavailable("open", e))?;
        Self::init(&conn, false)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Replace how long a statement waits on another connection's lock
    /// before reporting busy. Defaults to five seconds.
    pub fn with_busy_timeout(self, timeout: Duration) -> StoreResult<Self> {
        self.lock("configure")?
            .busy_timeout(timeout)
            .map_err(|e| StoreError::unavailable("configure", e))?;
        Ok(self)
    }

    /// Default database location in the platform data directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupfinder").map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
    }

    /// Database file backing this store, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(conn: &Connection, on_disk: bool) -> StoreResult<()> {
        if on_disk {
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )
            .map_err(|e| StoreError::unavailable("configure", e))?;
        }
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| StoreError::unavailable("configure", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::unavailable("create schema", e))?;
        Ok(())
    }

    fn lock(&self, operation: &'static str) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::unavailable(operation, "connection lock poisoned"))
    }

    /// Run `f` in an immediate transaction, retrying on busy/locked.
    fn write<T>(
        &self,
        operation: &'static str,
        f: impl Fn(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let mut conn = self.lock(operation)?;
        let mut attempt = 0;
        loop {
            match Self::try_write(&mut conn, &f) {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if attempt >= MAX_CONFLICT_RETRIES {
                        log::warn!("{}: store still busy after {} retries", operation, attempt);
                        return Err(StoreError::Conflict { operation });
                    }
                    attempt += 1;
                    log::debug!("{}: store busy, retry {}", operation, attempt);
                    std::thread::sleep(Duration::from_millis(50 * u64::from(attempt)));
                }
                Err(e) => return Err(StoreError::unavailable(operation, e)),
            }
        }
    }

    fn try_write<T>(
        conn: &mut Connection,
        f: &impl Fn(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn read_records(&self, operation: &'static str, sql: &str) -> StoreResult<Vec<FileRecord>> {
        let conn = self.lock(operation)?;
        let raw = (|| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], RawRecord::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })()
        .map_err(|e| StoreError::unavailable(operation, e))?;

        raw.into_iter().map(RawRecord::decode).collect()
    }

    fn read_meta(&self, operation: &'static str, key: &str) -> StoreResult<Option<String>> {
        self.lock(operation)?
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::unavailable(operation, e))
    }

    fn write_meta(&self, operation: &'static str, key: &str, value: &str) -> StoreResult<()> {
        self.write(operation, |tx| {
            tx.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn state_to_hex(state: &HashState) -> Option<String> {
    state.digest().map(Digest::to_hex)
}

/// Row as stored, before digest decoding.
struct RawRecord {
    path: String,
    size: i64,
    modified_time: f64,
    seen_at: f64,
    quick_fingerprint: Option<String>,
    full_hash: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            size: row.get(1)?,
            modified_time: row.get(2)?,
            seen_at: row.get(3)?,
            quick_fingerprint: row.get(4)?,
            full_hash: row.get(5)?,
        })
    }

    fn decode(self) -> StoreResult<FileRecord> {
        let size = u64::try_from(self.size).map_err(|_| StoreError::InvalidData {
            path: self.path.clone(),
            detail: format!("negative size {}", self.size),
        })?;
        let quick_fingerprint = decode_digest(&self.path, self.quick_fingerprint.as_deref())?;
        let full_hash = decode_digest(&self.path, self.full_hash.as_deref())?;

        Ok(FileRecord {
            path: PathBuf::from(self.path),
            size,
            modified: self.modified_time,
            seen_at: self.seen_at,
            quick_fingerprint,
            full_hash,
        })
    }
}

fn decode_digest(path: &str, hex_value: Option<&str>) -> StoreResult<HashState> {
    match hex_value {
        None => Ok(HashState::Pending),
        Some(s) => Digest::from_hex(s)
            .map(HashState::Computed)
            .map_err(|e| StoreError::InvalidData {
                path: path.to_string(),
                detail: format!("bad digest '{s}': {e}"),
            }),
    }
}

impl RecordStore for SqliteStore {
    fn upsert_discovered(&self, batch: &[DiscoveryUpdate], seen_at: f64) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write("upsert_discovered", |tx| {
            let mut touch = tx.prepare_cached(
                "INSERT INTO file_records (path, size, modified_time, seen_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(path) DO UPDATE SET seen_at = excluded.seen_at",
            )?;
            let mut reset = tx.prepare_cached(
                "INSERT INTO file_records
                     (path, size, modified_time, seen_at, quick_fingerprint, full_hash)
                 VALUES (?1, ?2, ?3, ?4, NULL, NULL)
                 ON CONFLICT(path) DO UPDATE SET size = excluded.size,
                                                modified_time = excluded.modified_time,
                                                seen_at = excluded.seen_at,
                                                quick_fingerprint = NULL,
                                                full_hash = NULL",
            )?;

            for update in batch {
                let file = &update.file;
                let key = path_key(&file.path);
                let size = file.size as i64;
                let values = params![key, size, file.modified, seen_at];
                match update.classification {
                    Classification::Reuse => touch.execute(values)?,
                    Classification::Rehash | Classification::New => reset.execute(values)?,
                };
            }
            Ok(())
        })
    }

    fn get_record(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let conn = self.lock("get_record")?;
        let raw = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM file_records WHERE path = ?1"),
                params![path_key(path)],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|e| StoreError::unavailable("get_record", e))?;
        drop(conn);

        raw.map(RawRecord::decode).transpose()
    }

    fn all_records(&self) -> StoreResult<Vec<FileRecord>> {
        self.read_records(
            "all_records",
            &format!("SELECT {RECORD_COLUMNS} FROM file_records ORDER BY path"),
        )
    }

    fn query_pending(&self) -> StoreResult<Vec<PathBuf>> {
        let conn = self.lock("query_pending")?;
        let paths = (|| {
            let mut stmt = conn
                .prepare("SELECT path FROM file_records WHERE full_hash IS NULL ORDER BY path")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })()
        .map_err(|e| StoreError::unavailable("query_pending", e))?;

        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    fn query_candidates(&self) -> StoreResult<Vec<FileRecord>> {
        self.read_records(
            "query_candidates",
            &format!(
                "SELECT {RECORD_COLUMNS} FROM file_records r
                 WHERE r.full_hash IS NULL
                   AND r.quick_fingerprint IS NOT NULL
                   AND EXISTS (
                       SELECT 1 FROM file_records o
                       WHERE o.size = r.size
                         AND o.quick_fingerprint = r.quick_fingerprint
                         AND o.path <> r.path
                   )
                 ORDER BY r.path"
            ),
        )
    }

    fn commit_hash_results(&self, batch: &[HashUpdate]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.write("commit_hash_results", |tx| {
            let mut stmt = tx.prepare_cached(
                "UPDATE file_records SET quick_fingerprint = ?2, full_hash = ?3 WHERE path = ?1",
            )?;
            for update in batch {
                let changed = stmt.execute(params![
                    path_key(&update.path),
                    update.quick_fingerprint.to_hex(),
                    state_to_hex(&update.full_hash),
                ])?;
                if changed == 0 {
                    log::trace!("No record for {}, hash result dropped", update.path.display());
                }
            }
            Ok(())
        })
    }

    fn watermark(&self) -> StoreResult<Option<ScanWatermark>> {
        let conn = self.lock("watermark")?;
        let row = conn
            .query_row(
                "SELECT last_scan_timestamp, version FROM scan_watermark WHERE id = 1",
                [],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::unavailable("watermark", e))?;

        Ok(row.map(|(last_scan_timestamp, version)| ScanWatermark {
            last_scan_timestamp,
            version: version.max(0) as u64,
        }))
    }

    fn set_watermark(&self, value: f64) -> StoreResult<ScanWatermark> {
        let version = self.write("set_watermark", |tx| {
            tx.query_row(
                "INSERT INTO scan_watermark (id, last_scan_timestamp, version)
                 VALUES (1, ?1, 1)
                 ON CONFLICT(id) DO UPDATE SET last_scan_timestamp = excluded.last_scan_timestamp,
                                              version = scan_watermark.version + 1
                 RETURNING version",
                params![value],
                |row| row.get::<_, i64>(0),
            )
        })?;

        Ok(ScanWatermark {
            last_scan_timestamp: value,
            version: version.max(0) as u64,
        })
    }

    fn hash_algorithm(&self) -> StoreResult<Option<DigestAlgorithm>> {
        self.read_meta("hash_algorithm", ALGORITHM_KEY)?
            .map(|name| {
                name.parse::<DigestAlgorithm>()
                    .map_err(|e| StoreError::InvalidData {
                        path: ALGORITHM_KEY.to_string(),
                        detail: e.to_string(),
                    })
            })
            .transpose()
    }

    fn set_hash_algorithm(&self, algorithm: DigestAlgorithm) -> StoreResult<()> {
        self.write_meta("set_hash_algorithm", ALGORITHM_KEY, algorithm.name())
    }

    fn fingerprint_prefix(&self) -> StoreResult<Option<usize>> {
        self.read_meta("fingerprint_prefix", PREFIX_KEY)?
            .map(|value| {
                value.parse::<usize>().map_err(|e| StoreError::InvalidData {
                    path: PREFIX_KEY.to_string(),
                    detail: format!("bad prefix size {value:?}: {e}"),
                })
            })
            .transpose()
    }

    fn set_fingerprint_prefix(&self, bytes: usize) -> StoreResult<()> {
        self.write_meta("set_fingerprint_prefix", PREFIX_KEY, &bytes.to_string())
    }

    fn clear_hashes(&self) -> StoreResult<usize> {
        self.write("clear_hashes", |tx| {
            tx.execute(
                "UPDATE file_records SET quick_fingerprint = NULL, full_hash = NULL
                 WHERE quick_fingerprint IS NOT NULL OR full_hash IS NOT NULL",
                [],
            )
        })
    }
}

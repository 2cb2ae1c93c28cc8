//! Durable backing stores for match-cache snapshots.
//!
//! A snapshot is an opaque byte blob addressed by name (`"records"`,
//! `"searches"`). The `SQLite` store keeps one row per snapshot:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS cache_snapshots (
//!     name       TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! An optional CRC-32 detects corruption. A snapshot whose checksum does not
//! match is reported as absent, so the cache starts empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{GlyscanError, Result};

/// Byte-level key-value store for cache snapshots.
///
/// Implementations are synchronous; callers never hold them across an await.
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Load the snapshot stored under `name`, if any.
    ///
    /// # Errors
    /// Returns an error if the underlying store cannot be read.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the snapshot stored under `name`.
    ///
    /// # Errors
    /// Returns an error if the underlying store cannot be written.
    fn save(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Delete the snapshot stored under `name`. Missing snapshots are fine.
    ///
    /// # Errors
    /// Returns an error if the underlying store cannot be written.
    fn remove(&self, name: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// Basic CRC-32 (ISO 3309 / ITU-T V.42) computation.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SqliteCacheStore
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_snapshots (
    name       TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// `SQLite`-backed snapshot store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCacheStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteCacheStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`GlyscanError::Database`] on `SQLite` failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "cache store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`GlyscanError::Database`] on `SQLite` failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`. `Ok(false)` means corruption.
    ///
    /// # Errors
    /// Returns [`GlyscanError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data, checksum FROM cache_snapshots WHERE name = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        snapshot = name,
                        expected = %expected,
                        actual = %actual,
                        "checksum mismatch, discarding snapshot"
                    );
                    return Ok(None);
                }
            }
        }

        debug!(
            snapshot = name,
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "loaded cache snapshot"
        );
        Ok(Some(data))
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(data));
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            "INSERT INTO cache_snapshots (name, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![name, data, now, checksum],
        )?;

        debug!(
            snapshot = name,
            bytes = data.len(),
            elapsed_us = start.elapsed().as_micros(),
            "saved cache snapshot"
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM cache_snapshots WHERE name = ?1", params![name])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCacheStore
// ---------------------------------------------------------------------------

/// In-process snapshot store. Writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryCacheStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `save`/`remove` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Overwrite a snapshot without going through `save`.
    pub fn insert_raw(&self, name: &str, data: Vec<u8>) {
        self.snapshots.lock().insert(name.to_string(), data);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GlyscanError::Io(std::io::Error::other(
                "cache store is not writable",
            )));
        }
        Ok(())
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshots.lock().get(name).cloned())
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.snapshots.lock().insert(name.to_string(), data.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.check_writable()?;
        self.snapshots.lock().remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

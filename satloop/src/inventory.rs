//! Durable inventory of products known to exist locally.
//!
//! The inventory is a single embedded SQLite file and is the sole source
//! of truth for "what exists locally". Writes go through one mutex-guarded
//! connection (single-writer discipline); the reconcile manager is the only
//! component that mutates it. Records are never silently deleted — only an
//! explicit [`Inventory::purge`] removes them.
//!
//! Schema migrations are additive only: existing columns are never altered
//! or dropped, so repeated runs against an old database never lose
//! historical records.

use crate::product::{Band, ProductKey, ProductType, Satellite};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the inventory store.
///
/// These are fatal to a reconciliation run: without a durable inventory
/// no gap computation can be trusted.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("inventory database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not create the database directory
    #[error("inventory I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded back into a record
    #[error("corrupt inventory row: {0}")]
    CorruptRow(String),
}

/// Lifecycle state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// File is present and its checksum was verified at fetch time
    Fresh,
    /// File is present but due for re-verification
    Stale,
    /// Last fetch attempt exhausted its retries
    Failed,
}

impl RecordStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(Self::Fresh),
            "stale" => Ok(Self::Stale),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown record status '{}'", other)),
        }
    }
}

/// One product known to the local archive.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    /// The product this record describes
    pub key: ProductKey,
    /// Where the file lives under the cache root
    pub local_path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Hex-encoded sha256 of the file contents (empty for failed fetches)
    pub checksum: String,
    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,
    /// Record lifecycle state
    pub status: RecordStatus,
}

impl LocalRecord {
    /// Builds a Fresh record for a just-fetched file.
    pub fn fresh(
        key: ProductKey,
        local_path: PathBuf,
        size_bytes: u64,
        checksum: String,
    ) -> Self {
        Self {
            key,
            local_path,
            size_bytes,
            checksum,
            fetched_at: Utc::now(),
            status: RecordStatus::Fresh,
        }
    }

    /// Builds a Failed record for a fetch whose retries were exhausted.
    ///
    /// The key is retained so the next reconciliation pass re-attempts it.
    pub fn failed(key: ProductKey, local_path: PathBuf) -> Self {
        Self {
            key,
            local_path,
            size_bytes: 0,
            checksum: String::new(),
            fetched_at: Utc::now(),
            status: RecordStatus::Failed,
        }
    }
}

/// Additive schema migrations, applied in order on open.
///
/// New migrations append to this list; existing entries are frozen.
const MIGRATIONS: &[&str] = &[
    // v1: base schema
    "CREATE TABLE IF NOT EXISTS records (
        satellite   TEXT NOT NULL,
        product     TEXT NOT NULL,
        ts          INTEGER NOT NULL,
        band        INTEGER NOT NULL,
        local_path  TEXT NOT NULL,
        size_bytes  INTEGER NOT NULL,
        checksum    TEXT NOT NULL,
        fetched_at  INTEGER NOT NULL,
        status      TEXT NOT NULL,
        PRIMARY KEY (satellite, product, ts, band)
    )",
    // v2: range scans over one product's timeline
    "CREATE INDEX IF NOT EXISTS idx_records_timeline
        ON records (satellite, product, ts, band)",
];

/// Durable, queryable record of objects known to exist locally.
///
/// Concurrent readers are fine; all access is serialized through the
/// mutex-guarded connection so concurrent fetch completions never race
/// on the same key.
pub struct Inventory {
    conn: Mutex<Connection>,
}

impl Inventory {
    /// Opens (or creates) the inventory database at `path` and applies
    /// any pending migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let inventory = Self {
            conn: Mutex::new(conn),
        };
        inventory.migrate()?;

        debug!(path = %path.display(), "inventory opened");
        Ok(inventory)
    }

    /// Opens an in-memory inventory. Used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let inventory = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        inventory.migrate()?;
        Ok(inventory)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");

        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let pending = &MIGRATIONS[version as usize..];
        if pending.is_empty() {
            return Ok(());
        }

        for (offset, migration) in pending.iter().enumerate() {
            conn.execute_batch(migration)?;
            let new_version = version + offset as i64 + 1;
            conn.pragma_update(None, "user_version", new_version)?;
        }

        info!(
            from = version,
            to = MIGRATIONS.len(),
            "inventory schema migrated"
        );
        Ok(())
    }

    /// Looks up the record for a key, if one exists.
    pub fn lookup(&self, key: &ProductKey) -> Result<Option<LocalRecord>, StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");

        conn.query_row(
            "SELECT local_path, size_bytes, checksum, fetched_at, status
             FROM records
             WHERE satellite = ?1 AND product = ?2 AND ts = ?3 AND band = ?4",
            params![
                key.satellite.slug(),
                key.product_type.slug(),
                key.timestamp.timestamp(),
                key.band.as_u8(),
            ],
            |row| {
                Ok(RawRow {
                    local_path: row.get(0)?,
                    size_bytes: row.get(1)?,
                    checksum: row.get(2)?,
                    fetched_at: row.get(3)?,
                    status: row.get(4)?,
                })
            },
        )
        .optional()?
        .map(|raw| raw.into_record(*key))
        .transpose()
    }

    /// Inserts or updates a record.
    ///
    /// Idempotent at the semantic level: re-upserting a key with an
    /// identical checksum leaves the inventory logically unchanged
    /// (`fetched_at` may still advance).
    pub fn upsert(&self, record: &LocalRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");

        conn.execute(
            "INSERT INTO records
                (satellite, product, ts, band, local_path, size_bytes, checksum, fetched_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (satellite, product, ts, band) DO UPDATE SET
                local_path = excluded.local_path,
                size_bytes = excluded.size_bytes,
                checksum   = excluded.checksum,
                fetched_at = excluded.fetched_at,
                status     = excluded.status",
            params![
                record.key.satellite.slug(),
                record.key.product_type.slug(),
                record.key.timestamp.timestamp(),
                record.key.band.as_u8(),
                record.local_path.to_string_lossy(),
                record.size_bytes as i64,
                record.checksum,
                record.fetched_at.timestamp(),
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Returns all records for one product timeline within `[start, end)`,
    /// ordered by timestamp then band.
    pub fn range(
        &self,
        satellite: Satellite,
        product: ProductType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalRecord>, StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");

        let mut stmt = conn.prepare(
            "SELECT ts, band, local_path, size_bytes, checksum, fetched_at, status
             FROM records
             WHERE satellite = ?1 AND product = ?2 AND ts >= ?3 AND ts < ?4
             ORDER BY ts, band",
        )?;

        let rows = stmt.query_map(
            params![
                satellite.slug(),
                product.slug(),
                start.timestamp(),
                end.timestamp()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u8>(1)?,
                    RawRow {
                        local_path: row.get(2)?,
                        size_bytes: row.get(3)?,
                        checksum: row.get(4)?,
                        fetched_at: row.get(5)?,
                        status: row.get(6)?,
                    },
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (ts, band, raw) = row?;
            let timestamp = Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| StoreError::CorruptRow(format!("bad timestamp {}", ts)))?;
            let key = ProductKey::new(satellite, product, timestamp, Band(band));
            records.push(raw.into_record(key)?);
        }
        Ok(records)
    }

    /// Removes a record. The only way records ever leave the inventory.
    pub fn purge(&self, key: &ProductKey) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");

        let removed = conn.execute(
            "DELETE FROM records
             WHERE satellite = ?1 AND product = ?2 AND ts = ?3 AND band = ?4",
            params![
                key.satellite.slug(),
                key.product_type.slug(),
                key.timestamp.timestamp(),
                key.band.as_u8(),
            ],
        )?;
        Ok(removed > 0)
    }

    /// Returns the total number of records. Used by tests and diagnostics.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns true if the inventory holds no records.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Row fields that don't participate in the key.
struct RawRow {
    local_path: String,
    size_bytes: i64,
    checksum: String,
    fetched_at: i64,
    status: String,
}

impl RawRow {
    fn into_record(self, key: ProductKey) -> Result<LocalRecord, StoreError> {
        let status = self
            .status
            .parse::<RecordStatus>()
            .map_err(StoreError::CorruptRow)?;
        let fetched_at = Utc
            .timestamp_opt(self.fetched_at, 0)
            .single()
            .ok_or_else(|| StoreError::CorruptRow(format!("bad fetched_at {}", self.fetched_at)))?;

        Ok(LocalRecord {
            key,
            local_path: PathBuf::from(self.local_path),
            size_bytes: self.size_bytes as u64,
            checksum: self.checksum,
            fetched_at,
            status,
        })
    }
}

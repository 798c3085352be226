//! Memory store using SQLite
//!
//! One row per URL in `semantic_history`, vectors stored as little-endian f32
//! BLOBs, with a secondary index on `timestamp`. Similarity is computed in
//! Rust by the search engine over a full scan.
//!
//! The schema version lives in `PRAGMA user_version`. Migrations are
//! additive only:
//! - v1: `semantic_history` + timestamp index
//! - v2: optional `favicon` column, `store_meta` table (dimensions backfilled
//!   from an existing row)

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::core::record::MemoryRecord;

/// Schema version written by this build
pub const SCHEMA_VERSION: i64 = 2;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("Store read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("Store write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("Migration from v{from} to v{to} failed: {source}")]
    Migration {
        from: i64,
        to: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    #[error("Dimension mismatch: store holds {expected}-dim vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Corrupt vector for {url}: {len} bytes is not a whole number of f32")]
    CorruptVector { url: String, len: usize },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Store statistics
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub record_count: usize,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
    pub dimensions: Option<usize>,
    pub schema_version: i64,
}

/// Durable URL-keyed store of memory records.
///
/// Every operation is its own transaction; the connection lock is held for
/// one operation at a time.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    /// Open or create the store at path, migrating it if needed
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).map_err(StoreError::Open)?;
        Self::from_connection(conn)
    }

    /// Open in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection, bringing its schema up to date.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let found = schema_version(&conn)?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        let store = Self {
            conn: Mutex::new(conn),
        };
        if found < SCHEMA_VERSION {
            store.migrate(found, SCHEMA_VERSION)?;
        }
        Ok(store)
    }

    /// Apply every migration step in `(from, to]`.
    ///
    /// Each step checks the live schema before changing it, so running a
    /// step against an already-migrated store is harmless. Records are never
    /// dropped.
    pub fn migrate(&self, from: i64, to: i64) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|source| StoreError::Migration { from, to, source })?;

        let step = |version: i64| -> rusqlite::Result<()> {
            match version {
                1 => tx.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS semantic_history (
                        url TEXT PRIMARY KEY,
                        title TEXT NOT NULL,
                        text TEXT NOT NULL,
                        vector BLOB NOT NULL,
                        timestamp INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_history_timestamp ON semantic_history(timestamp);
                    "#,
                ),
                2 => {
                    if !has_column(&tx, "semantic_history", "favicon")? {
                        tx.execute_batch("ALTER TABLE semantic_history ADD COLUMN favicon TEXT;")?;
                    }
                    tx.execute_batch(
                        r#"
                        CREATE TABLE IF NOT EXISTS store_meta (
                            key TEXT PRIMARY KEY,
                            value TEXT
                        );

                        INSERT OR IGNORE INTO store_meta (key, value)
                        SELECT 'dimensions', length(vector) / 4 FROM semantic_history LIMIT 1;
                        "#,
                    )
                }
                _ => Ok(()),
            }
        };

        for version in (from + 1)..=to {
            step(version).map_err(|source| StoreError::Migration { from, to, source })?;
            debug!(version, "Applied schema step");
        }

        tx.pragma_update(None, "user_version", to)
            .map_err(|source| StoreError::Migration { from, to, source })?;
        tx.commit()
            .map_err(|source| StoreError::Migration { from, to, source })?;

        info!(from, to, "Memory store migrated");
        Ok(())
    }

    /// Insert or replace the record for `record.url`.
    ///
    /// The first write fixes the store-wide vector dimensionality; later
    /// writes with a different length are rejected without touching the
    /// store.
    pub fn upsert(&self, record: &MemoryRecord) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::Write)?;

        let dimensions = read_dimensions(&tx).map_err(StoreError::Write)?;
        match dimensions {
            Some(expected) if expected != record.vector.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    got: record.vector.len(),
                });
            }
            Some(_) => {}
            None => {
                tx.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                    params![record.vector.len().to_string()],
                )
                .map_err(StoreError::Write)?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO semantic_history (url, title, text, vector, favicon, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                text = excluded.text,
                vector = excluded.vector,
                favicon = excluded.favicon,
                timestamp = excluded.timestamp
            "#,
            params![
                record.url,
                record.title,
                record.text,
                vector_to_blob(&record.vector),
                record.favicon,
                record.timestamp,
            ],
        )
        .map_err(StoreError::Write)?;

        tx.commit().map_err(StoreError::Write)
    }

    /// Delete the record for url. Missing URLs are not an error.
    pub fn delete(&self, url: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM semantic_history WHERE url = ?1", params![url])
            .map_err(StoreError::Write)?;
        Ok(())
    }

    /// Get record by URL
    pub fn get(&self, url: &str) -> Result<Option<MemoryRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT url, title, text, vector, favicon, timestamp FROM semantic_history WHERE url = ?1",
                params![url],
                RawRow::from_row,
            )
            .optional()
            .map_err(StoreError::Read)?;

        row.map(RawRow::into_record).transpose()
    }

    /// Every record, in no particular order.
    pub fn scan_all(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.collect("SELECT url, title, text, vector, favicon, timestamp FROM semantic_history")
    }

    /// Every record, newest first (uses the timestamp index).
    pub fn list_recent(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        self.collect(
            "SELECT url, title, text, vector, favicon, timestamp FROM semantic_history
             ORDER BY timestamp DESC, url ASC",
        )
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.lock()?;

        let (count, oldest, newest): (i64, Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM semantic_history",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(StoreError::Read)?;

        Ok(StoreStats {
            record_count: count as usize,
            oldest,
            newest,
            dimensions: read_dimensions(&conn).map_err(StoreError::Read)?,
            schema_version: schema_version(&conn)?,
        })
    }

    fn collect(&self, sql: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(StoreError::Read)?;
        let rows = stmt.query_map([], RawRow::from_row).map_err(StoreError::Read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StoreError::Read)?.into_record()?);
        }
        Ok(records)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Row as read from SQLite, before the vector BLOB is decoded
struct RawRow {
    url: String,
    title: String,
    text: String,
    vector: Vec<u8>,
    favicon: Option<String>,
    timestamp: i64,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            title: row.get(1)?,
            text: row.get(2)?,
            vector: row.get(3)?,
            favicon: row.get(4)?,
            timestamp: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<MemoryRecord, StoreError> {
        let vector = blob_to_vector(&self.vector).ok_or(StoreError::CorruptVector {
            url: self.url.clone(),
            len: self.vector.len(),
        })?;

        Ok(MemoryRecord {
            url: self.url,
            title: self.title,
            text: self.text,
            vector,
            favicon: self.favicon,
            timestamp: self.timestamp,
        })
    }
}

fn schema_version(conn: &Connection) -> Result<i64, StoreError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(StoreError::Read)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn read_dimensions(conn: &Connection) -> rusqlite::Result<Option<usize>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

/// Convert f32 vector to BLOB
fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for &val in vector {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 vector
fn blob_to_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

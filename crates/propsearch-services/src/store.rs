//! Source-of-truth property store.
//!
//! `PropertyStore` is the query interface the snapshot cache reloads from.
//! `SqlitePropertyStore` is the bundled implementation.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use propsearch_core::error::RusqliteErrorExt;
use propsearch_core::StoreError;
use rusqlite::{params, Connection};

use crate::property::PropertyRecord;

pub type StoreResult<T> = Result<T, StoreError>;

/// Query interface to the property master records.
pub trait PropertyStore: Send + Sync {
    /// Every active property, ordered by name (ties by id).
    fn find_active_properties(&self) -> StoreResult<Vec<PropertyRecord>>;

    /// Cheap reachability check for health endpoints.
    fn ping(&self) -> StoreResult<()>;
}

/// SQLite-based property store.
pub struct SqlitePropertyStore {
    conn: Mutex<Connection>,
}

impl SqlitePropertyStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let conn = Connection::open(path).context("Failed to open properties database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for tests and demos).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS properties (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    city TEXT NOT NULL DEFAULT '',
                    state TEXT NOT NULL DEFAULT '',
                    country TEXT NOT NULL DEFAULT '',
                    latitude REAL,
                    longitude REAL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    tags TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_properties_active_name ON properties(is_active, name);
                "#,
            )
            .context("Failed to initialize schema")?;
        Ok(())
    }

    /// Insert or replace a batch of records in one transaction.
    pub fn upsert_many(&self, records: &[PropertyRecord]) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(RusqliteErrorExt::into_store_error)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO properties
                     (id, name, city, state, country, latitude, longitude, is_active, tags, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(RusqliteErrorExt::into_store_error)?;

            for record in records {
                let tags = serde_json::to_string(&record.tags)
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                stmt.execute(params![
                    record.id,
                    record.name,
                    record.city,
                    record.state,
                    record.country,
                    record.latitude,
                    record.longitude,
                    record.is_active as i32,
                    tags,
                    record.created_at.to_rfc3339(),
                ])
                .map_err(RusqliteErrorExt::into_store_error)?;
            }
        }
        tx.commit().map_err(RusqliteErrorExt::into_store_error)?;
        Ok(records.len())
    }

    /// Total number of rows, active or not.
    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))
            .map_err(RusqliteErrorExt::into_store_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Import a JSON array of records when the store is empty.
    ///
    /// Returns the number of records imported (0 if the store already had data).
    pub fn import_seed_file(&self, path: &Path) -> anyhow::Result<usize> {
        if self.count()? > 0 {
            tracing::debug!("Property store already populated, skipping seed import");
            return Ok(0);
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let records: Vec<PropertyRecord> =
            serde_json::from_str(&contents).context("Failed to parse seed file")?;

        let imported = self.upsert_many(&records)?;
        tracing::info!("Imported {} properties from {}", imported, path.display());
        Ok(imported)
    }

    /// Decode one row. A malformed `tags` or `created_at` column fails the
    /// query rather than being replaced with a made-up value.
    fn row_to_property(row: &rusqlite::Row) -> rusqlite::Result<PropertyRecord> {
        let id: i64 = row.get(0)?;
        let is_active: i32 = row.get(7)?;
        let tags_str: String = row.get(8)?;
        let created_at_str: String = row.get(9)?;

        let tags: BTreeSet<String> = serde_json::from_str(&tags_str).map_err(|e| {
            tracing::warn!(id, "Property row has unreadable tags: {}", e);
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                tracing::warn!(id, "Property row has unreadable created_at: {}", e);
                rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(PropertyRecord {
            id,
            name: row.get(1)?,
            city: row.get(2)?,
            state: row.get(3)?,
            country: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            is_active: is_active != 0,
            tags,
            created_at,
        })
    }
}

impl PropertyStore for SqlitePropertyStore {
    fn find_active_properties(&self) -> StoreResult<Vec<PropertyRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, city, state, country, latitude, longitude, is_active, tags, created_at
                 FROM properties
                 WHERE is_active = 1
                 ORDER BY name ASC, id ASC",
            )
            .map_err(RusqliteErrorExt::into_store_error)?;

        let rows = stmt
            .query_map([], Self::row_to_property)
            .map_err(RusqliteErrorExt::into_store_error)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(RusqliteErrorExt::into_store_error)
    }

    fn ping(&self) -> StoreResult<()> {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(RusqliteErrorExt::into_store_error)?;
        Ok(())
    }
}

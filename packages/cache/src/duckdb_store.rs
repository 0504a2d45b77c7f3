//! Cache entries stored in `DuckDB`.
//!
//! One table, `cache_entries`, keyed by the cache key. Values are stored
//! as JSON text next to their write time.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use duckdb::Connection;

use crate::{CacheEntry, CacheError, KeyValueStore};

/// [`KeyValueStore`] backed by a `DuckDB` connection.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore").finish_non_exhaustive()
    }
}

impl DuckDbStore {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory, connection or schema
    /// cannot be created.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a database that lives only as long as the store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the connection or schema cannot be
    /// created.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key TEXT PRIMARY KEY,
                t BIGINT NOT NULL,
                v TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for DuckDbStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<(i64, String)> = {
            let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
            let mut stmt = conn.prepare("SELECT t, v FROM cache_entries WHERE cache_key = ?")?;
            let mut rows = stmt.query(duckdb::params![key])?;
            match rows.next()? {
                Some(row) => Some((row.get(0)?, row.get(1)?)),
                None => None,
            }
        };

        row.map(|(t, v)| {
            Ok(CacheEntry {
                t,
                v: serde_json::from_str(&v)?,
            })
        })
        .transpose()
    }

    fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let v = serde_json::to_string(&entry.v)?;
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .execute(
                "INSERT INTO cache_entries (cache_key, t, v) VALUES (?, ?, ?)
                 ON CONFLICT (cache_key) DO UPDATE SET t = excluded.t, v = excluded.v",
                duckdb::params![key, entry.t, v],
            )?;
        Ok(())
    }
}

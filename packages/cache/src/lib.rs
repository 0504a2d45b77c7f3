#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Time-based cache for expensive lookups.
//!
//! Entries are stored as `{t, v}` where `t` is the write time in epoch
//! milliseconds. A read is a hit when the entry exists and is younger
//! than the caller's TTL; there is no explicit invalidation. The cache is
//! read-then-write without coordination, so two concurrent requests for
//! the same key may both fetch and both write.
//!
//! Storage is pluggable through [`KeyValueStore`]: [`DuckDbStore`] persists
//! to a local `DuckDB` file, [`MemoryStore`] keeps entries in process.

pub mod duckdb_store;
pub mod memory;
pub mod paths;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use duckdb_store::DuckDbStore;
pub use memory::MemoryStore;

/// How long a neighbourhood centroid stays valid.
pub const CENTROID_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long an amenity bag stays valid.
pub const AMENITIES_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long the crime category dictionary stays valid.
pub const CRIME_TYPE_TITLES_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Key of the crime category dictionary.
pub const CRIME_TYPE_TITLES_KEY: &str = "crimeTypeTitles:v1";

/// Key of a neighbourhood's centroid.
#[must_use]
pub fn centroid_key(code: &str) -> String {
    format!("centroid:{code}")
}

/// Key of a neighbourhood's amenity bag.
#[must_use]
pub fn amenities_key(code: &str) -> String {
    format!("amenities:{code}")
}

/// Errors that can occur while reading or writing the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Stored value could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stored value and the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Write time in epoch milliseconds.
    pub t: i64,
    /// Stored value.
    pub v: serde_json::Value,
}

impl CacheEntry {
    /// Returns `true` if the entry is younger than `ttl` at `now_ms`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.t) < ttl_ms
    }
}

/// Durable key/value storage behind the cache.
pub trait KeyValueStore: Send + Sync {
    /// Reads the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Writes `entry` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be written.
    fn set(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// TTL-checked typed access to a [`KeyValueStore`].
///
/// Store failures never surface to callers: a failed read is a miss and a
/// failed write is dropped, both logged at warn level.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").finish_non_exhaustive()
    }
}

impl TtlCache {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// A cache backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// A cache backed by the `DuckDB` file at [`paths::cache_db_path`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be opened.
    pub fn open_default() -> Result<Self, CacheError> {
        let path = paths::cache_db_path();
        log::info!("Opening cache at {}", path.display());
        Ok(Self::new(Arc::new(DuckDbStore::open(&path)?)))
    }

    /// Reads a value if it was written less than `ttl` ago.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        self.get_at(key, ttl, now_ms())
    }

    /// Like [`Self::get`] with an explicit clock.
    #[must_use]
    pub fn get_at<T: DeserializeOwned>(&self, key: &str, ttl: Duration, now_ms: i64) -> Option<T> {
        let entry = match self.store.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("Cache read failed for {key}: {e}");
                return None;
            }
        };
        if !entry.is_fresh(ttl, now_ms) {
            log::debug!("Cache entry {key} expired");
            return None;
        }
        match serde_json::from_value(entry.v) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Cache entry {key} has an unexpected shape: {e}");
                None
            }
        }
    }

    /// Writes a value stamped with the current time.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        self.put_at(key, value, now_ms());
    }

    /// Like [`Self::put`] with an explicit clock.
    pub fn put_at<T: Serialize>(&self, key: &str, value: &T, now_ms: i64) {
        let result = serde_json::to_value(value)
            .map_err(CacheError::from)
            .and_then(|v| self.store.set(key, &CacheEntry { t: now_ms, v }));
        if let Err(e) = result {
            log::warn!("Cache write failed for {key}: {e}");
        }
    }
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T: i64 = 1_700_000_000_000;

    #[test]
    fn hit_just_before_ttl_miss_just_after() {
        let cache = TtlCache::in_memory();
        cache.put_at("centroid:BU03630000", &json!({ "lat": 52.37, "lon": 4.9 }), T);
        let ttl_ms = i64::try_from(CENTROID_TTL.as_millis()).unwrap();

        let hit: Option<serde_json::Value> =
            cache.get_at("centroid:BU03630000", CENTROID_TTL, T + ttl_ms - 1);
        assert!(hit.is_some());

        let miss: Option<serde_json::Value> =
            cache.get_at("centroid:BU03630000", CENTROID_TTL, T + ttl_ms + 1);
        assert!(miss.is_none());
    }

    #[test]
    fn absent_key_is_miss() {
        let cache = TtlCache::in_memory();
        assert_eq!(cache.get_at::<u32>("amenities:BU1", AMENITIES_TTL, T), None);
    }

    #[test]
    fn wrong_shape_is_miss() {
        let cache = TtlCache::in_memory();
        cache.put_at("k", &"text", T);
        assert_eq!(cache.get_at::<u32>("k", AMENITIES_TTL, T), None);
    }

    #[test]
    fn later_write_replaces_earlier() {
        let cache = TtlCache::in_memory();
        cache.put_at("k", &1, T);
        cache.put_at("k", &2, T + 10);
        assert_eq!(cache.get_at::<u32>("k", Duration::from_millis(5), T + 12), Some(2));
    }

    #[test]
    fn keys_follow_prefix_layout() {
        assert_eq!(centroid_key("BU03630000"), "centroid:BU03630000");
        assert_eq!(amenities_key("BU03630000"), "amenities:BU03630000");
    }
}

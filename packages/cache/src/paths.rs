//! Canonical location of the cache database.

use std::path::{Path, PathBuf};

/// Environment variable overriding the cache database path.
pub const CACHE_DB_ENV: &str = "BUURT_INSIGHT_CACHE_DB";

/// Returns the workspace root directory, resolved at compile time from
/// `CARGO_MANIFEST_DIR`.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest
        .ancestors()
        .nth(2)
        .unwrap_or(manifest)
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the cache database path: `BUURT_INSIGHT_CACHE_DB` when set,
/// otherwise `data/cache.duckdb`.
#[must_use]
pub fn cache_db_path() -> PathBuf {
    std::env::var_os(CACHE_DB_ENV)
        .filter(|p| !p.is_empty())
        .map_or_else(|| data_dir().join("cache.duckdb"), PathBuf::from)
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

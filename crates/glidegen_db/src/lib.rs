//! SQLite store backing the glidegen entity cache.
//!
//! The in-memory [`glidegen_schema::EntityCache`] is the source of truth
//! during a run; this crate persists its fully resolved entities so later
//! runs can skip tables that were already fetched.
//!
//! # Usage
//!
//! ```rust,ignore
//! use glidegen_db::{CacheDb, Result};
//!
//! let db = CacheDb::open("~/.glidegen/cache.sqlite3").await?;
//! db.load_into(&cache).await?;
//! // ... fetch and merge ...
//! db.save_from(&cache).await?;
//! ```

mod error;
mod schema;
mod store;

pub use error::{DbError, Result};
pub use store::TableSummary;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Persistent store for cached schema entities.
#[derive(Clone)]
pub struct CacheDb {
    pool: SqlitePool,
}

impl CacheDb {
    /// Open or create a store at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Cache store opened");

        Ok(db)
    }

    /// Open an existing store (fails if not exists).
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Cache store not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Close the store connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl CacheDb {
    /// Convert a timestamp to milliseconds since Unix epoch.
    pub fn to_millis(at: chrono::DateTime<chrono::Utc>) -> i64 {
        at.timestamp_millis()
    }

    /// Convert a stored millisecond timestamp from `table` to DateTime.
    pub fn millis_to_datetime(table: &'static str, millis: i64) -> Result<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| DbError::corrupt(table, format!("timestamp {} out of range", millis)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("cache.sqlite3");

        let db = CacheDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_open_existing_fails_if_not_exists() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nonexistent.db");

        let result = CacheDb::open_existing(&db_path).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_millis_round_trip() {
        let at = CacheDb::millis_to_datetime("elements", 1_700_000_000_123).unwrap();
        assert_eq!(CacheDb::to_millis(at), 1_700_000_000_123);
    }

    #[test]
    fn test_out_of_range_millis_are_corrupt() {
        let err = CacheDb::millis_to_datetime("schema_tables", i64::MAX).unwrap_err();
        assert!(matches!(err, DbError::Corrupt { table: "schema_tables", .. }));
    }
}

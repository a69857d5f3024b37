//! Store schema creation.
//!
//! Every natural key column is stored twice: the original spelling for
//! output and a lower-cased `*_key` column the primary key is built from.

use crate::error::Result;
use crate::CacheDb;
use tracing::debug;

impl CacheDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS sources (
                fqdn_key TEXT PRIMARY KEY,
                fqdn TEXT NOT NULL,
                label TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS packages (
                source_key TEXT NOT NULL,
                name_key TEXT NOT NULL,
                source TEXT NOT NULL,
                name TEXT NOT NULL,
                sys_id TEXT,
                kind TEXT NOT NULL,
                short_description TEXT,
                scope TEXT,
                version TEXT,
                plugin_id TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (source_key, name_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS field_types (
                source_key TEXT NOT NULL,
                name_key TEXT NOT NULL,
                source TEXT NOT NULL,
                name TEXT NOT NULL,
                sys_id TEXT,
                label TEXT,
                scalar_type TEXT,
                scalar_length INTEGER,
                class_name TEXT,
                use_original_value INTEGER NOT NULL DEFAULT 0,
                is_visible INTEGER NOT NULL DEFAULT 0,
                package TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (source_key, name_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS schema_tables (
                source_key TEXT NOT NULL,
                name_key TEXT NOT NULL,
                source TEXT NOT NULL,
                name TEXT NOT NULL,
                sys_id TEXT,
                label TEXT,
                is_extendable INTEGER NOT NULL DEFAULT 0,
                number_prefix TEXT,
                super_class TEXT,
                package TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (source_key, name_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS elements (
                source_key TEXT NOT NULL,
                table_key TEXT NOT NULL,
                name_key TEXT NOT NULL,
                source TEXT NOT NULL,
                table_name TEXT NOT NULL,
                name TEXT NOT NULL,
                sys_id TEXT,
                label TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_array INTEGER NOT NULL DEFAULT 0,
                is_display INTEGER NOT NULL DEFAULT 0,
                is_mandatory INTEGER NOT NULL DEFAULT 0,
                is_primary INTEGER NOT NULL DEFAULT 0,
                is_read_only INTEGER NOT NULL DEFAULT 0,
                is_calculated INTEGER NOT NULL DEFAULT 0,
                is_unique INTEGER NOT NULL DEFAULT 0,
                max_length INTEGER,
                size_class INTEGER,
                default_value TEXT,
                comments TEXT,
                field_type TEXT,
                reference TEXT,
                package TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (source_key, table_key, name_key)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_elements_table ON elements(source_key, table_key)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Cache store schema verified");
        Ok(())
    }
}

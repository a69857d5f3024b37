//! Entity rows: upserts, listings and whole-cache save/load.

use crate::error::{DbError, Result};
use crate::CacheDb;
use chrono::{DateTime, Utc};
use glidegen_schema::{
    CacheSnapshot, ElementRecord, EntityCache, FieldTypeRecord, Fqdn, Name, PackageKind,
    PackageRecord, Source, Stored, TableRecord,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use tracing::info;

/// One row of `glidegen cache list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub source: Fqdn,
    pub name: String,
    pub label: Option<String>,
    pub super_class: Option<String>,
    pub package: Option<String>,
    pub element_count: i64,
    pub last_updated: DateTime<Utc>,
}

fn key_of(value: &str) -> String {
    value.chars().flat_map(char::to_lowercase).collect()
}

fn required<'a>(table: &'static str, field: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| DbError::corrupt(table, format!("record without {}", field)))
}

fn parse_source(table: &'static str, row: &SqliteRow) -> Result<Fqdn> {
    let raw: String = row.get("source");
    Fqdn::parse(&raw).map_err(|e| DbError::corrupt(table, e.to_string()))
}

impl CacheDb {
    // ========================================================================
    // Whole-cache operations
    // ========================================================================

    /// Persist every fully resolved entity of `cache`.
    ///
    /// Returns the number of entities written.
    pub async fn save_from(&self, cache: &EntityCache) -> Result<usize> {
        let snapshot = cache.snapshot()?;
        self.save_snapshot(&snapshot).await?;
        Ok(snapshot.entity_count())
    }

    /// Merge every stored entity into `cache`.
    ///
    /// Returns the number of entities merged.
    pub async fn load_into(&self, cache: &EntityCache) -> Result<usize> {
        let snapshot = self.load_snapshot().await?;
        Ok(cache.load_snapshot(&snapshot)?)
    }

    /// Write a snapshot in a single transaction.
    pub async fn save_snapshot(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for source in &snapshot.sources {
            upsert_source(&mut *tx, source).await?;
        }
        for stored in &snapshot.packages {
            upsert_package(&mut *tx, stored).await?;
        }
        for stored in &snapshot.field_types {
            upsert_field_type(&mut *tx, stored).await?;
        }
        for stored in &snapshot.tables {
            upsert_table(&mut *tx, stored).await?;
        }
        for stored in &snapshot.elements {
            upsert_element(&mut *tx, stored).await?;
        }

        tx.commit().await?;
        info!(entities = snapshot.entity_count(), "Cache snapshot saved");
        Ok(())
    }

    /// Read every stored entity.
    pub async fn load_snapshot(&self) -> Result<CacheSnapshot> {
        let sources = sqlx::query(
            "SELECT fqdn, label, is_default, updated_at FROM sources ORDER BY fqdn_key",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_source)
        .collect::<Result<Vec<_>>>()?;

        let packages = sqlx::query("SELECT * FROM packages ORDER BY source_key, name_key")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_package)
            .collect::<Result<Vec<_>>>()?;

        let field_types = sqlx::query("SELECT * FROM field_types ORDER BY source_key, name_key")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_field_type)
            .collect::<Result<Vec<_>>>()?;

        let tables = sqlx::query("SELECT * FROM schema_tables ORDER BY source_key, name_key")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_table)
            .collect::<Result<Vec<_>>>()?;

        let elements = sqlx::query(
            "SELECT * FROM elements ORDER BY source_key, table_key, name_key",
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(row_to_element)
        .collect::<Result<Vec<_>>>()?;

        Ok(CacheSnapshot {
            sources,
            packages,
            field_types,
            tables,
            elements,
        })
    }

    // ========================================================================
    // Table Queries
    // ========================================================================

    /// List stored tables, optionally for one source.
    pub async fn list_tables(&self, source: Option<&Fqdn>) -> Result<Vec<TableSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT t.source, t.name, t.label, t.super_class, t.package, t.updated_at,
                   (SELECT COUNT(*) FROM elements e
                     WHERE e.source_key = t.source_key AND e.table_key = t.name_key) AS element_count
            FROM schema_tables t
            WHERE ?1 IS NULL OR t.source_key = ?1
            ORDER BY t.source_key, t.name_key
            "#,
        )
        .bind(source.map(Fqdn::key))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TableSummary {
                    source: parse_source("schema_tables", row)?,
                    name: row.get("name"),
                    label: row.get("label"),
                    super_class: row.get("super_class"),
                    package: row.get("package"),
                    element_count: row.get("element_count"),
                    last_updated: Self::millis_to_datetime("schema_tables", row.get("updated_at"))?,
                })
            })
            .collect()
    }

    /// Get one stored table.
    pub async fn get_table(&self, source: &Fqdn, name: &Name) -> Result<Option<Stored<TableRecord>>> {
        let row = sqlx::query("SELECT * FROM schema_tables WHERE source_key = ? AND name_key = ?")
            .bind(source.key())
            .bind(name.key())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_table).transpose()
    }

    /// Stored columns of one table, ordered by name.
    pub async fn elements_of(&self, source: &Fqdn, table: &Name) -> Result<Vec<Stored<ElementRecord>>> {
        let rows = sqlx::query(
            "SELECT * FROM elements WHERE source_key = ? AND table_key = ? ORDER BY name_key",
        )
        .bind(source.key())
        .bind(table.key())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_element).collect()
    }
}

// ============================================================================
// Upserts
// ============================================================================

async fn upsert_source(conn: &mut SqliteConnection, source: &Source) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sources (fqdn_key, fqdn, label, is_default, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(fqdn_key) DO UPDATE SET
            fqdn = excluded.fqdn,
            label = excluded.label,
            is_default = excluded.is_default,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(source.fqdn.key())
    .bind(source.fqdn.as_str())
    .bind(&source.label)
    .bind(source.is_default)
    .bind(CacheDb::to_millis(source.last_updated))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_package(conn: &mut SqliteConnection, stored: &Stored<PackageRecord>) -> Result<()> {
    let record = &stored.record;
    let name = required("packages", "name", record.name.as_deref())?;

    sqlx::query(
        r#"
        INSERT INTO packages (source_key, name_key, source, name, sys_id, kind,
                              short_description, scope, version, plugin_id, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_key, name_key) DO UPDATE SET
            name = excluded.name,
            sys_id = excluded.sys_id,
            kind = excluded.kind,
            short_description = excluded.short_description,
            scope = excluded.scope,
            version = excluded.version,
            plugin_id = excluded.plugin_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(stored.source.key())
    .bind(key_of(name))
    .bind(stored.source.as_str())
    .bind(name)
    .bind(&record.sys_id)
    .bind(record.kind.as_str())
    .bind(&record.short_description)
    .bind(&record.scope)
    .bind(&record.version)
    .bind(&record.plugin_id)
    .bind(CacheDb::to_millis(stored.last_updated))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_field_type(
    conn: &mut SqliteConnection,
    stored: &Stored<FieldTypeRecord>,
) -> Result<()> {
    let record = &stored.record;
    let name = required("field_types", "name", record.name.as_deref())?;

    sqlx::query(
        r#"
        INSERT INTO field_types (source_key, name_key, source, name, sys_id, label, scalar_type,
                                 scalar_length, class_name, use_original_value, is_visible,
                                 package, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_key, name_key) DO UPDATE SET
            name = excluded.name,
            sys_id = excluded.sys_id,
            label = excluded.label,
            scalar_type = excluded.scalar_type,
            scalar_length = excluded.scalar_length,
            class_name = excluded.class_name,
            use_original_value = excluded.use_original_value,
            is_visible = excluded.is_visible,
            package = excluded.package,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(stored.source.key())
    .bind(key_of(name))
    .bind(stored.source.as_str())
    .bind(name)
    .bind(&record.sys_id)
    .bind(&record.label)
    .bind(&record.scalar_type)
    .bind(record.scalar_length)
    .bind(&record.class_name)
    .bind(record.use_original_value)
    .bind(record.is_visible)
    .bind(&record.package)
    .bind(CacheDb::to_millis(stored.last_updated))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_table(conn: &mut SqliteConnection, stored: &Stored<TableRecord>) -> Result<()> {
    let record = &stored.record;
    let name = required("schema_tables", "name", record.name.as_deref())?;

    sqlx::query(
        r#"
        INSERT INTO schema_tables (source_key, name_key, source, name, sys_id, label,
                                   is_extendable, number_prefix, super_class, package, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_key, name_key) DO UPDATE SET
            name = excluded.name,
            sys_id = excluded.sys_id,
            label = excluded.label,
            is_extendable = excluded.is_extendable,
            number_prefix = excluded.number_prefix,
            super_class = excluded.super_class,
            package = excluded.package,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(stored.source.key())
    .bind(key_of(name))
    .bind(stored.source.as_str())
    .bind(name)
    .bind(&record.sys_id)
    .bind(&record.label)
    .bind(record.is_extendable)
    .bind(&record.number_prefix)
    .bind(&record.super_class)
    .bind(&record.package)
    .bind(CacheDb::to_millis(stored.last_updated))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_element(conn: &mut SqliteConnection, stored: &Stored<ElementRecord>) -> Result<()> {
    let record = &stored.record;
    let table = required("elements", "table", record.table.as_deref())?;
    let name = required("elements", "name", record.name.as_deref())?;

    sqlx::query(
        r#"
        INSERT INTO elements (source_key, table_key, name_key, source, table_name, name, sys_id,
                              label, is_active, is_array, is_display, is_mandatory, is_primary,
                              is_read_only, is_calculated, is_unique, max_length, size_class,
                              default_value, comments, field_type, reference, package, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_key, table_key, name_key) DO UPDATE SET
            table_name = excluded.table_name,
            name = excluded.name,
            sys_id = excluded.sys_id,
            label = excluded.label,
            is_active = excluded.is_active,
            is_array = excluded.is_array,
            is_display = excluded.is_display,
            is_mandatory = excluded.is_mandatory,
            is_primary = excluded.is_primary,
            is_read_only = excluded.is_read_only,
            is_calculated = excluded.is_calculated,
            is_unique = excluded.is_unique,
            max_length = excluded.max_length,
            size_class = excluded.size_class,
            default_value = excluded.default_value,
            comments = excluded.comments,
            field_type = excluded.field_type,
            reference = excluded.reference,
            package = excluded.package,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(stored.source.key())
    .bind(key_of(table))
    .bind(key_of(name))
    .bind(stored.source.as_str())
    .bind(table)
    .bind(name)
    .bind(&record.sys_id)
    .bind(&record.label)
    .bind(record.is_active)
    .bind(record.is_array)
    .bind(record.is_display)
    .bind(record.is_mandatory)
    .bind(record.is_primary)
    .bind(record.is_read_only)
    .bind(record.is_calculated)
    .bind(record.is_unique)
    .bind(record.max_length)
    .bind(record.size_class)
    .bind(&record.default_value)
    .bind(&record.comments)
    .bind(&record.field_type)
    .bind(&record.reference)
    .bind(&record.package)
    .bind(CacheDb::to_millis(stored.last_updated))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Row conversion
// ============================================================================

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let fqdn: String = row.get("fqdn");
    Ok(Source {
        fqdn: Fqdn::parse(&fqdn).map_err(|e| DbError::corrupt("sources", e.to_string()))?,
        label: row.get("label"),
        is_default: row.get("is_default"),
        last_updated: CacheDb::millis_to_datetime("sources", row.get("updated_at"))?,
    })
}

fn row_to_package(row: &SqliteRow) -> Result<Stored<PackageRecord>> {
    let kind: String = row.get("kind");
    let kind = PackageKind::parse(&kind)
        .ok_or_else(|| DbError::corrupt("packages", format!("unknown package kind '{}'", kind)))?;
    Ok(Stored {
        source: parse_source("packages", row)?,
        record: PackageRecord {
            sys_id: row.get("sys_id"),
            name: Some(row.get("name")),
            kind,
            short_description: row.get("short_description"),
            scope: row.get("scope"),
            version: row.get("version"),
            plugin_id: row.get("plugin_id"),
        },
        last_updated: CacheDb::millis_to_datetime("packages", row.get("updated_at"))?,
    })
}

fn row_to_field_type(row: &SqliteRow) -> Result<Stored<FieldTypeRecord>> {
    Ok(Stored {
        source: parse_source("field_types", row)?,
        record: FieldTypeRecord {
            sys_id: row.get("sys_id"),
            name: Some(row.get("name")),
            label: row.get("label"),
            scalar_type: row.get("scalar_type"),
            scalar_length: row.get("scalar_length"),
            class_name: row.get("class_name"),
            use_original_value: row.get("use_original_value"),
            is_visible: row.get("is_visible"),
            package: row.get("package"),
            package_id: None,
        },
        last_updated: CacheDb::millis_to_datetime("field_types", row.get("updated_at"))?,
    })
}

fn row_to_table(row: &SqliteRow) -> Result<Stored<TableRecord>> {
    Ok(Stored {
        source: parse_source("schema_tables", row)?,
        record: TableRecord {
            sys_id: row.get("sys_id"),
            name: Some(row.get("name")),
            label: row.get("label"),
            is_extendable: row.get("is_extendable"),
            number_prefix: row.get("number_prefix"),
            super_class: row.get("super_class"),
            super_class_id: None,
            package: row.get("package"),
            package_id: None,
        },
        last_updated: CacheDb::millis_to_datetime("schema_tables", row.get("updated_at"))?,
    })
}

fn row_to_element(row: &SqliteRow) -> Result<Stored<ElementRecord>> {
    Ok(Stored {
        source: parse_source("elements", row)?,
        record: ElementRecord {
            sys_id: row.get("sys_id"),
            table: Some(row.get("table_name")),
            name: Some(row.get("name")),
            label: row.get("label"),
            is_active: row.get("is_active"),
            is_array: row.get("is_array"),
            is_display: row.get("is_display"),
            is_mandatory: row.get("is_mandatory"),
            is_primary: row.get("is_primary"),
            is_read_only: row.get("is_read_only"),
            is_calculated: row.get("is_calculated"),
            is_unique: row.get("is_unique"),
            max_length: row.get("max_length"),
            size_class: row.get("size_class"),
            default_value: row.get("default_value"),
            comments: row.get("comments"),
            field_type: row.get("field_type"),
            reference: row.get("reference"),
            package: row.get("package"),
            package_id: None,
        },
        last_updated: CacheDb::millis_to_datetime("elements", row.get("updated_at"))?,
    })
}

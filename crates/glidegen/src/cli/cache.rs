//! `glidegen cache`: inspect the local cache store.

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_time, or_dash, print_table};
use anyhow::{Context, Result};
use clap::Subcommand;
use glidegen::GlidegenConfig;
use glidegen_db::CacheDb;
use glidegen_schema::{ElementRecord, Fqdn, Name};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached tables per source
    List {
        /// Only tables from this instance host name
        #[arg(long)]
        source: Option<String>,

        /// Cache store path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Show a cached table and its columns
    Show {
        table: String,

        /// Only the table from this instance host name
        #[arg(long)]
        source: Option<String>,

        /// Cache store path
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Execute a cache subcommand
pub fn run(action: CacheAction, config: GlidegenConfig) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(action, &config))
}

async fn run_async(action: CacheAction, config: &GlidegenConfig) -> Result<()> {
    match action {
        CacheAction::List { source, db } => {
            let source = parse_source(source.as_deref())?;
            let db = open(db, config).await?;
            list(&db, source.as_ref()).await
        }
        CacheAction::Show { table, source, db } => {
            let table =
                Name::parse(&table).with_context(|| format!("Invalid table name '{}'", table))?;
            let source = parse_source(source.as_deref())?;
            let db = open(db, config).await?;
            show(&db, &table, source.as_ref()).await
        }
    }
}

async fn open(path: Option<PathBuf>, config: &GlidegenConfig) -> Result<CacheDb> {
    let path = match path {
        Some(path) => path,
        None => config.database_path()?,
    };
    if !path.exists() {
        return Err(HelpfulError::cache_not_found(&path).into());
    }
    CacheDb::open_existing(&path)
        .await
        .with_context(|| format!("Failed to open cache store {}", path.display()))
}

fn parse_source(source: Option<&str>) -> Result<Option<Fqdn>> {
    source
        .map(|value| Fqdn::parse(value).with_context(|| format!("Invalid source '{}'", value)))
        .transpose()
}

async fn list(db: &CacheDb, source: Option<&Fqdn>) -> Result<()> {
    let tables = db.list_tables(source).await?;
    if tables.is_empty() {
        println!("No cached tables");
        return Ok(());
    }

    let rows = tables
        .iter()
        .map(|table| {
            vec![
                table.source.to_string(),
                table.name.clone(),
                or_dash(table.label.as_deref()),
                or_dash(table.super_class.as_deref()),
                or_dash(table.package.as_deref()),
                table.element_count.to_string(),
                format_time(table.last_updated),
            ]
        })
        .collect();
    print_table(
        &["SOURCE", "TABLE", "LABEL", "EXTENDS", "PACKAGE", "COLUMNS", "UPDATED"],
        rows,
    );
    Ok(())
}

async fn show(db: &CacheDb, table: &Name, source: Option<&Fqdn>) -> Result<()> {
    let matches: Vec<Fqdn> = db
        .list_tables(source)
        .await?
        .into_iter()
        .filter(|summary| table.matches(&summary.name))
        .map(|summary| summary.source)
        .collect();
    if matches.is_empty() {
        anyhow::bail!("Table '{}' is not cached", table);
    }

    for source in matches {
        let Some(stored) = db.get_table(&source, table).await? else {
            continue;
        };
        let record = &stored.record;
        println!("{} ({})", or_dash(record.name.as_deref()), source);
        println!("  Label:       {}", or_dash(record.label.as_deref()));
        println!("  Extends:     {}", or_dash(record.super_class.as_deref()));
        println!("  Package:     {}", or_dash(record.package.as_deref()));
        println!("  Prefix:      {}", or_dash(record.number_prefix.as_deref()));
        println!("  Extendable:  {}", record.is_extendable);
        println!("  Updated:     {}", format_time(stored.last_updated));

        let elements = db.elements_of(&source, table).await?;
        let rows = elements.iter().map(|stored| column_row(&stored.record)).collect();
        print_table(&["COLUMN", "LABEL", "TYPE", "REFERENCE", "FLAGS"], rows);
    }
    Ok(())
}

fn column_row(record: &ElementRecord) -> Vec<String> {
    let flags: Vec<&str> = [
        (record.is_primary, "primary"),
        (record.is_mandatory, "mandatory"),
        (!record.is_active, "inactive"),
        (record.is_array, "array"),
        (record.is_read_only, "read-only"),
        (record.is_display, "display"),
        (record.is_calculated, "calculated"),
        (record.is_unique, "unique"),
    ]
    .into_iter()
    .filter_map(|(set, label)| set.then_some(label))
    .collect();

    vec![
        or_dash(record.name.as_deref()),
        or_dash(record.label.as_deref()),
        or_dash(record.field_type.as_deref()),
        or_dash(record.reference.as_deref()),
        if flags.is_empty() { "-".to_string() } else { flags.join(", ") },
    ]
}

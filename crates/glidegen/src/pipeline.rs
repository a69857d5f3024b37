//! The `generate` run: fetch, cache, render, write.

use crate::loader::{LoadOptions, SchemaLoader};
use crate::output::OutputTarget;
use anyhow::{bail, Context, Result};
use glidegen_db::CacheDb;
use glidegen_remote::RemoteSchemaSource;
use glidegen_render::{capture_tables, render, RenderOptions};
use glidegen_schema::{CancellationToken, EntityCache, Handle, Name, Table};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub tables: Vec<Name>,
    pub output: PathBuf,
    pub force: bool,
    pub database: PathBuf,
    pub load: LoadOptions,
    pub render: RenderOptions,
}

#[derive(Debug)]
pub struct GenerateReport {
    pub output: PathBuf,
    /// Tables written, in output order.
    pub rendered: Vec<Name>,
    /// One message per table that was requested or needed but left out.
    pub problems: Vec<String>,
    /// Entities persisted to the cache store.
    pub saved: usize,
}

/// Run a full generation pass against `source`.
///
/// The destination is checked before anything is fetched, and nothing is
/// written unless rendering completes.
pub async fn generate(
    request: GenerateRequest,
    source: Arc<dyn RemoteSchemaSource>,
    cancel: &CancellationToken,
) -> Result<GenerateReport> {
    if request.tables.is_empty() {
        bail!("No tables requested");
    }
    let target = OutputTarget::prepare(&request.output, request.force)?;

    let db = CacheDb::open(&request.database)
        .await
        .with_context(|| format!("Failed to open cache store {}", request.database.display()))?;
    let cache = Arc::new(EntityCache::new());
    let restored = db.load_into(&cache).await.context("Failed to read cache store")?;
    cache.register_source(source.fqdn().clone(), None, true)?;
    info!(restored, source = %source.fqdn(), "Cache restored");

    let loader = SchemaLoader::new(source, Arc::clone(&cache), cancel.clone(), request.load);
    let report = loader.load_tables(request.tables).await?;
    let mut problems: Vec<String> = report
        .failed
        .iter()
        .map(|(name, e)| format!("{}: {}", name, e))
        .collect();
    if report.loaded.is_empty() {
        bail!("None of the requested tables could be loaded: {}", problems.join("; "));
    }

    let saved = db.save_from(&cache).await.context("Failed to update cache store")?;
    db.close().await;

    let selected = with_super_classes(&cache, &report.loaded)?;
    let (views, capture_failed) = capture_tables(&cache, &selected)?;
    problems.extend(capture_failed.iter().map(|e| e.to_string()));

    let output = render(views, &request.render, cancel)?;
    problems.extend(output.failed.iter().map(|e| e.to_string()));
    if output.rendered.is_empty() {
        bail!("No tables could be rendered: {}", problems.join("; "));
    }
    target.write(&output.text)?;

    for problem in &problems {
        warn!(problem = %problem, "Left out of output");
    }
    Ok(GenerateReport {
        output: target.path().to_path_buf(),
        rendered: output.rendered,
        problems,
        saved,
    })
}

/// `tables` plus every cached ancestor, each once.
fn with_super_classes(cache: &EntityCache, tables: &[Handle<Table>]) -> Result<Vec<Handle<Table>>> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for table in tables {
        let mut next = Some(table.clone());
        while let Some(current) = next.take() {
            if !seen.insert(current.name().clone()) {
                break;
            }
            let super_class = current.read()?.super_class.as_ref().map(|r| r.name().clone());
            if let Some(super_class) = super_class {
                next = cache.get_table(current.source(), &super_class)?;
            }
            selected.push(current);
        }
    }
    Ok(selected)
}

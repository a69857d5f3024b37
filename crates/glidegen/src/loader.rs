//! Fetches requested tables into the entity cache.
//!
//! Each requested table is loaded with its superclass chain, owning
//! packages, columns and column types. Superclasses and packages arrive
//! from the remote as sys_ids only, so they are loaded before the record
//! that points at them. Tables already complete in the cache are reused
//! unless a refresh was requested.

use glidegen_remote::{RemoteError, RemoteSchemaSource};
use glidegen_schema::{
    CacheError, CancellationToken, ElementRecord, EntityCache, EntityKind, Fqdn, Handle, Name,
    SysId, Table, TableRecord,
};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Longest superclass chain followed before giving up.
pub const MAX_INHERITANCE_DEPTH: usize = 32;

pub type Result<T> = std::result::Result<T, LoadError>;

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Handle<Table>>> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Table '{0}' was not found on the instance")]
    TableNotFound(String),

    #[error("Superclass {sys_id} of table '{table}' was not found on the instance")]
    SuperClassNotFound { table: String, sys_id: String },

    #[error("Inheritance chain of '{0}' exceeds {MAX_INHERITANCE_DEPTH} levels")]
    InheritanceTooDeep(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl LoadError {
    /// Errors that end the whole run rather than one requested table.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Cancelled | Self::Task(_) | Self::Remote(RemoteError::Cancelled) => true,
            Self::Cache(CacheError::ResolutionInconsistency { .. })
            | Self::Cache(CacheError::Poisoned(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Re-fetch tables even when the cache already holds them.
    pub refresh: bool,
    pub max_concurrent_fetches: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            refresh: false,
            max_concurrent_fetches: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadReport {
    /// Requested tables now in the cache, ordered by name.
    pub loaded: Vec<Handle<Table>>,
    /// Requested tables that could not be loaded.
    pub failed: Vec<(Name, LoadError)>,
    /// Tables fetched from the remote, superclasses included.
    pub fetched: usize,
    /// Records dropped for missing identity fields.
    pub skipped_records: usize,
    /// Names still referenced but not cached, such as reference columns
    /// pointing at tables nobody asked for.
    pub unresolved: usize,
}

/// Loads tables from one remote source into a shared cache.
#[derive(Clone)]
pub struct SchemaLoader {
    source: Arc<dyn RemoteSchemaSource>,
    cache: Arc<EntityCache>,
    cancel: CancellationToken,
    options: LoadOptions,
    loaded: Arc<Mutex<HashSet<Name>>>,
    /// One lock per table name, held while that table is stored.
    claims: Arc<Mutex<HashMap<Name, Arc<AsyncMutex<()>>>>>,
    field_types: Arc<Mutex<HashSet<Name>>>,
    fetched: Arc<AtomicUsize>,
    skipped: Arc<AtomicUsize>,
}

impl SchemaLoader {
    pub fn new(
        source: Arc<dyn RemoteSchemaSource>,
        cache: Arc<EntityCache>,
        cancel: CancellationToken,
        options: LoadOptions,
    ) -> Self {
        Self {
            source,
            cache,
            cancel,
            options,
            loaded: Arc::new(Mutex::new(HashSet::new())),
            claims: Arc::new(Mutex::new(HashMap::new())),
            field_types: Arc::new(Mutex::new(HashSet::new())),
            fetched: Arc::new(AtomicUsize::new(0)),
            skipped: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fqdn(&self) -> &Fqdn {
        self.source.fqdn()
    }

    /// Load every named table, at most `max_concurrent_fetches` at a time.
    ///
    /// A table that fails is reported and the others continue; only fatal
    /// errors (see [`LoadError::is_fatal`]) abort the whole load.
    pub async fn load_tables(&self, names: Vec<Name>) -> Result<LoadReport> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_fetches.max(1)));
        let mut join_set = JoinSet::new();

        for name in names {
            let loader = self.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => loader.load_named(name.clone(), 0).await,
                    Err(e) => Err(LoadError::Task(e.to_string())),
                };
                (name, result)
            });
        }

        let mut report = LoadReport::default();
        while let Some(joined) = join_set.join_next().await {
            let (name, result) = joined.map_err(|e| LoadError::Task(e.to_string()))?;
            match result {
                Ok(handle) => report.loaded.push(handle),
                Err(e) if e.is_fatal() => {
                    join_set.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "Table could not be loaded");
                    report.failed.push((name, e));
                }
            }
        }

        self.load_pending_field_types().await?;
        report.unresolved = self.cache.unresolved_references()?.len();

        report.loaded.sort_by(|a, b| a.name().cmp(b.name()));
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        report.fetched = self.fetched.load(Ordering::SeqCst);
        report.skipped_records = self.skipped.load(Ordering::SeqCst);

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            fetched = report.fetched,
            skipped_records = report.skipped_records,
            unresolved = report.unresolved,
            "Schema load complete"
        );
        Ok(report)
    }

    // ========================================================================
    // Tables
    // ========================================================================

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LoadError::Cancelled);
        }
        Ok(())
    }

    fn was_loaded(&self, name: &Name) -> bool {
        self.loaded
            .lock()
            .map(|loaded| loaded.contains(name))
            .unwrap_or(false)
    }

    fn mark_loaded(&self, name: &Name) -> Result<()> {
        self.loaded
            .lock()
            .map_err(|_| CacheError::Poisoned("loader"))?
            .insert(name.clone());
        Ok(())
    }

    fn claim(&self, name: &Name) -> Result<Arc<AsyncMutex<()>>> {
        let mut claims = self
            .claims
            .lock()
            .map_err(|_| CacheError::Poisoned("loader"))?;
        Ok(Arc::clone(claims.entry(name.clone()).or_default()))
    }

    /// A cached table that needs no fetch, if there is one.
    fn reusable(&self, name: &Name) -> Result<Option<Handle<Table>>> {
        let Some(handle) = self.cache.get_table(self.fqdn(), name)? else {
            return Ok(None);
        };
        if self.was_loaded(name) || (!self.options.refresh && !handle.is_stub()?) {
            return Ok(Some(handle));
        }
        Ok(None)
    }

    fn load_named(&self, name: Name, depth: usize) -> LoadFuture<'_> {
        Box::pin(async move {
            self.check_cancelled()?;
            if depth > MAX_INHERITANCE_DEPTH {
                return Err(LoadError::InheritanceTooDeep(name.to_string()));
            }

            if let Some(handle) = self.reusable(&name)? {
                if !self.was_loaded(&name) {
                    let super_class = handle.read()?.super_class.as_ref().map(|r| r.name().clone());
                    if let Some(super_class) = super_class {
                        self.load_named(super_class, depth + 1).await?;
                    }
                    self.mark_loaded(&name)?;
                    debug!(table = %name, "Using cached table");
                }
                return Ok(handle);
            }

            let record = self
                .source
                .get_table_by_name(name.as_str())
                .await?
                .ok_or_else(|| LoadError::TableNotFound(name.to_string()))?;
            self.load_record(record, depth).await
        })
    }

    fn load_record(&self, mut record: TableRecord, depth: usize) -> LoadFuture<'_> {
        Box::pin(async move {
            self.check_cancelled()?;
            let name = record
                .name
                .as_deref()
                .and_then(|name| Name::parse(name).ok())
                .ok_or_else(|| CacheError::incomplete(EntityKind::Table, "missing name"))?;
            if depth > MAX_INHERITANCE_DEPTH {
                return Err(LoadError::InheritanceTooDeep(name.to_string()));
            }

            if let Some(super_id) = record.super_class_id.as_deref().and_then(|id| SysId::parse(id).ok()) {
                self.load_super_class(&name, &super_id, depth).await?;
            }

            // Held only while this table is stored, never across another table's load.
            let claim = self.claim(&name)?;
            let _claimed = claim.lock().await;
            if self.was_loaded(&name) {
                if let Some(handle) = self.cache.get_table(self.fqdn(), &name)? {
                    debug!(table = %name, "Table loaded by another request");
                    return Ok(handle);
                }
            }

            record.package_id = self.ensure_package(record.package_id.take(), &name).await?;
            let handle = self.cache.upsert_table(self.fqdn(), &record)?;
            self.fetched.fetch_add(1, Ordering::SeqCst);

            self.load_elements(&name).await?;
            self.mark_loaded(&name)?;
            debug!(table = %name, "Table loaded");
            Ok(handle)
        })
    }

    async fn load_super_class(&self, table: &Name, super_id: &SysId, depth: usize) -> Result<()> {
        if let Some(known) = self.cache.table_by_sys_id(self.fqdn(), super_id)? {
            self.load_named(known.name().clone(), depth + 1).await?;
            return Ok(());
        }
        let parent = self
            .source
            .get_table_by_id(super_id)
            .await?
            .ok_or_else(|| LoadError::SuperClassNotFound {
                table: table.to_string(),
                sys_id: super_id.to_string(),
            })?;
        self.load_record(parent, depth + 1).await?;
        Ok(())
    }

    async fn load_elements(&self, table: &Name) -> Result<()> {
        let records = self.source.get_elements_by_table_name(table.as_str()).await?;
        debug!(table = %table, count = records.len(), "Fetched columns");

        for mut record in records {
            self.check_cancelled()?;
            self.ensure_field_type(record.field_type.as_deref()).await?;
            record.package_id = self.ensure_package(record.package_id.take(), table).await?;
            self.store_element(table, &record)?;
        }
        Ok(())
    }

    fn store_element(&self, table: &Name, record: &ElementRecord) -> Result<()> {
        match self.cache.upsert_element(self.fqdn(), record) {
            Ok(_) => Ok(()),
            Err(e) if e.is_record_scoped() => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                warn!(table = %table, error = %e, "Skipping column record");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Packages and field types
    // ========================================================================

    /// The package sys_id to keep on a record, loading the package first.
    /// Packages the remote does not know are dropped from the record.
    async fn ensure_package(&self, package_id: Option<String>, origin: &Name) -> Result<Option<String>> {
        let Some(raw) = package_id else {
            return Ok(None);
        };
        let Ok(sys_id) = SysId::parse(&raw) else {
            warn!(origin = %origin, package = %raw, "Ignoring malformed package sys_id");
            return Ok(None);
        };
        if self.cache.package_by_sys_id(self.fqdn(), &sys_id)?.is_some() {
            return Ok(Some(raw));
        }

        let Some(package) = self.source.get_package_by_identifier(&sys_id).await? else {
            warn!(origin = %origin, package = %raw, "Package not found; dropping reference");
            return Ok(None);
        };
        match self.cache.upsert_package(self.fqdn(), &package) {
            Ok(_) => Ok(Some(raw)),
            Err(e) if e.is_record_scoped() => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                warn!(origin = %origin, error = %e, "Skipping package record");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch column types the cache is still waiting on, e.g. for tables
    /// restored from the store before their types were known.
    async fn load_pending_field_types(&self) -> Result<()> {
        let pending = self.cache.unresolved_references()?;
        for reference in pending {
            if reference.kind != EntityKind::FieldType || &reference.key.source != self.fqdn() {
                continue;
            }
            self.check_cancelled()?;
            self.ensure_field_type(Some(reference.key.name.as_str())).await?;
        }
        Ok(())
    }

    async fn ensure_field_type(&self, type_name: Option<&str>) -> Result<()> {
        let Some(name) = type_name.and_then(|name| Name::parse(name).ok()) else {
            return Ok(());
        };
        let first_sighting = self
            .field_types
            .lock()
            .map_err(|_| CacheError::Poisoned("loader"))?
            .insert(name.clone());
        if !first_sighting {
            return Ok(());
        }
        if !self.options.refresh {
            if let Some(cached) = self.cache.get_field_type(self.fqdn(), &name)? {
                if !cached.is_stub()? {
                    return Ok(());
                }
            }
        }

        match self.source.get_field_type_by_name(name.as_str()).await? {
            Some(record) => match self.cache.upsert_field_type(self.fqdn(), &record) {
                Ok(_) => Ok(()),
                Err(e) if e.is_record_scoped() => {
                    self.skipped.fetch_add(1, Ordering::SeqCst);
                    warn!(field_type = %name, error = %e, "Skipping field type record");
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            None => {
                debug!(field_type = %name, "No field type record");
                Ok(())
            }
        }
    }
}

//! The entity cache.
//!
//! One canonical [`Handle`] exists per natural key. The index mutex guards
//! handle selection, sys_id translation and the waiter lists; entity data is
//! merged under each entity's own write lock while the index is held. Lock
//! order is always index first, then at most one entity lock at a time.

use crate::cross_ref::{assign_name, CrossRef};
use crate::entity::{
    Element, ElementFlags, ElementKey, EntityKind, EntityState, FieldType, NaturalKey, Package,
    PackageDetail, Source, Table,
};
use crate::error::{CacheError, Result};
use crate::handle::{Handle, Record};
use crate::record::{
    identity, optional_name, optional_text, required_name, ElementRecord, FieldTypeRecord,
    PackageRecord, SchemaRecord, TableRecord,
};
use crate::snapshot::{CacheSnapshot, Stored};
use chrono::{DateTime, Duration, Utc};
use glidegen_ids::{Fqdn, Name, SysId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

// ============================================================================
// Public handle types
// ============================================================================

/// A handle of any cached kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityHandle {
    Table(Handle<Table>),
    Element(Handle<Element>),
    FieldType(Handle<FieldType>),
    Package(Handle<Package>),
}

impl EntityHandle {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityHandle::Table(_) => EntityKind::Table,
            EntityHandle::Element(_) => EntityKind::Element,
            EntityHandle::FieldType(_) => EntityKind::FieldType,
            EntityHandle::Package(_) => EntityKind::Package,
        }
    }

    pub fn name(&self) -> &Name {
        match self {
            EntityHandle::Table(h) => h.name(),
            EntityHandle::Element(h) => h.name(),
            EntityHandle::FieldType(h) => h.name(),
            EntityHandle::Package(h) => h.name(),
        }
    }

    pub fn as_table(&self) -> Option<&Handle<Table>> {
        match self {
            EntityHandle::Table(h) => Some(h),
            _ => None,
        }
    }
}

/// A name some cached entity refers to but the cache does not hold yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingReference {
    pub kind: EntityKind,
    pub key: NaturalKey,
}

// ============================================================================
// Waiters
// ============================================================================

/// A dependent slot waiting for a table to enter the cache.
#[derive(Clone)]
enum TableWaiter {
    SuperClass(Handle<Table>),
    ElementTable(Handle<Element>),
    ElementReference(Handle<Element>),
}

/// A dependent slot waiting for a package to enter the cache.
#[derive(Clone)]
enum PackageWaiter {
    Table(Handle<Table>),
    FieldType(Handle<FieldType>),
    Element(Handle<Element>),
}

impl TableWaiter {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SuperClass(a), Self::SuperClass(b)) => a.same_entity(b),
            (Self::ElementTable(a), Self::ElementTable(b)) => a.same_entity(b),
            (Self::ElementReference(a), Self::ElementReference(b)) => a.same_entity(b),
            _ => false,
        }
    }

    fn settle(&self, target: &Handle<Table>) -> Result<()> {
        match self {
            Self::SuperClass(table) => settle_slot(table.write()?.super_class.as_mut(), target),
            Self::ElementTable(element) => settle_slot(Some(&mut element.write()?.table), target),
            Self::ElementReference(element) => {
                settle_slot(element.write()?.reference.as_mut(), target)
            }
        }
    }

    fn still_waiting(&self, name: &Name) -> Result<bool> {
        Ok(match self {
            Self::SuperClass(table) => waiting_on(table.read()?.super_class.as_ref(), name),
            Self::ElementTable(element) => waiting_on(Some(&element.read()?.table), name),
            Self::ElementReference(element) => {
                waiting_on(element.read()?.reference.as_ref(), name)
            }
        })
    }
}

impl PackageWaiter {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Table(a), Self::Table(b)) => a.same_entity(b),
            (Self::FieldType(a), Self::FieldType(b)) => a.same_entity(b),
            (Self::Element(a), Self::Element(b)) => a.same_entity(b),
            _ => false,
        }
    }

    fn settle(&self, target: &Handle<Package>) -> Result<()> {
        match self {
            Self::Table(table) => settle_slot(table.write()?.package.as_mut(), target),
            Self::FieldType(field_type) => settle_slot(field_type.write()?.package.as_mut(), target),
            Self::Element(element) => settle_slot(element.write()?.package.as_mut(), target),
        }
    }

    fn still_waiting(&self, name: &Name) -> Result<bool> {
        Ok(match self {
            Self::Table(table) => waiting_on(table.read()?.package.as_ref(), name),
            Self::FieldType(field_type) => waiting_on(field_type.read()?.package.as_ref(), name),
            Self::Element(element) => waiting_on(element.read()?.package.as_ref(), name),
        })
    }
}

/// Upgrade a slot that still names `target`.
///
/// A waiter goes stale when its slot was renamed or cleared after it
/// registered; stale waiters are dropped without touching the slot.
fn settle_slot<T: Record>(slot: Option<&mut CrossRef<T>>, target: &Handle<T>) -> Result<()> {
    match slot {
        Some(reference) if !reference.is_resolved() && reference.name() == target.name() => {
            reference.upgrade(target)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

fn waiting_on<T: Record>(slot: Option<&CrossRef<T>>, name: &Name) -> bool {
    slot.map_or(false, |r| !r.is_resolved() && r.name() == name)
}

fn push_waiter<W>(
    waiters: &mut HashMap<NaturalKey, Vec<W>>,
    key: NaturalKey,
    waiter: W,
    same: impl Fn(&W, &W) -> bool,
) {
    let list = waiters.entry(key).or_default();
    if !list.iter().any(|existing| same(existing, &waiter)) {
        list.push(waiter);
    }
}

/// Upgrade `slot` from the index when its target is cached.
///
/// Returns the key to wait on when the target is still missing.
fn link_slot<T: Record<Key = NaturalKey>>(
    slot: Option<&mut CrossRef<T>>,
    source: &Fqdn,
    targets: &HashMap<NaturalKey, Handle<T>>,
) -> Result<Option<NaturalKey>> {
    let Some(reference) = slot else {
        return Ok(None);
    };
    if reference.is_resolved() {
        return Ok(None);
    }
    let key = NaturalKey::new(source.clone(), reference.name().clone());
    match targets.get(&key) {
        Some(target) => {
            reference.upgrade(target)?;
            Ok(None)
        }
        None => Ok(Some(key)),
    }
}

// ============================================================================
// Timestamps
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Stamp {
    Now,
    At(DateTime<Utc>),
}

impl Stamp {
    /// Timestamp for a merge. Fresh merges always move `LastUpdated` forward.
    fn next(self, previous: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Stamp::At(at) => at,
            Stamp::Now => {
                let now = Utc::now();
                if now > previous {
                    now
                } else {
                    previous + Duration::microseconds(1)
                }
            }
        }
    }
}

/// Translate a name-or-sys_id reference into a name.
fn reference_name(
    ids: &HashMap<(Fqdn, SysId), NaturalKey>,
    kind: EntityKind,
    source: &Fqdn,
    name: Option<&str>,
    sys_id: Option<&str>,
    origin: &Name,
) -> Result<Option<Name>> {
    if let Some(name) = optional_name(name) {
        return Ok(Some(name));
    }
    let Some(raw) = optional_text(sys_id) else {
        return Ok(None);
    };
    let unknown = || CacheError::UnknownReference {
        kind,
        sys_id: raw.clone(),
        origin: origin.to_string(),
    };
    let parsed = SysId::parse(&raw).map_err(|_| unknown())?;
    ids.get(&(source.clone(), parsed))
        .map(|key| Some(key.name.clone()))
        .ok_or_else(unknown)
}

// ============================================================================
// Index
// ============================================================================

#[derive(Default)]
struct Index {
    sources: HashMap<Fqdn, Source>,
    tables: HashMap<NaturalKey, Handle<Table>>,
    field_types: HashMap<NaturalKey, Handle<FieldType>>,
    packages: HashMap<NaturalKey, Handle<Package>>,
    elements: HashMap<ElementKey, Handle<Element>>,
    table_elements: HashMap<NaturalKey, Vec<Handle<Element>>>,
    table_ids: HashMap<(Fqdn, SysId), NaturalKey>,
    package_ids: HashMap<(Fqdn, SysId), NaturalKey>,
    table_waiters: HashMap<NaturalKey, Vec<TableWaiter>>,
    field_type_waiters: HashMap<NaturalKey, Vec<Handle<Element>>>,
    package_waiters: HashMap<NaturalKey, Vec<PackageWaiter>>,
}

impl Index {
    // ------------------------------------------------------------------
    // Canonical handle selection
    // ------------------------------------------------------------------

    fn table_entry(&mut self, key: NaturalKey) -> Result<Handle<Table>> {
        if let Some(handle) = self.tables.get(&key) {
            return Ok(handle.clone());
        }
        let handle = Handle::new(key.clone(), Table::stub());
        self.tables.insert(key.clone(), handle.clone());
        if let Some(waiters) = self.table_waiters.remove(&key) {
            for waiter in waiters {
                waiter.settle(&handle)?;
            }
        }
        Ok(handle)
    }

    fn field_type_entry(&mut self, key: NaturalKey) -> Result<Handle<FieldType>> {
        if let Some(handle) = self.field_types.get(&key) {
            return Ok(handle.clone());
        }
        let handle = Handle::new(key.clone(), FieldType::stub());
        self.field_types.insert(key.clone(), handle.clone());
        if let Some(waiters) = self.field_type_waiters.remove(&key) {
            for element in waiters {
                settle_slot(element.write()?.field_type.as_mut(), &handle)?;
            }
        }
        Ok(handle)
    }

    fn package_entry(&mut self, key: NaturalKey) -> Result<Handle<Package>> {
        if let Some(handle) = self.packages.get(&key) {
            return Ok(handle.clone());
        }
        let handle = Handle::new(key.clone(), Package::stub());
        self.packages.insert(key.clone(), handle.clone());
        if let Some(waiters) = self.package_waiters.remove(&key) {
            for waiter in waiters {
                waiter.settle(&handle)?;
            }
        }
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    fn link_table(&mut self, handle: &Handle<Table>) -> Result<()> {
        let source = handle.source().clone();
        let (super_wait, package_wait) = {
            let mut data = handle.write()?;
            let super_wait = link_slot(data.super_class.as_mut(), &source, &self.tables)?;
            let package_wait = link_slot(data.package.as_mut(), &source, &self.packages)?;
            (super_wait, package_wait)
        };
        if let Some(key) = super_wait {
            push_waiter(
                &mut self.table_waiters,
                key,
                TableWaiter::SuperClass(handle.clone()),
                TableWaiter::same,
            );
        }
        if let Some(key) = package_wait {
            push_waiter(
                &mut self.package_waiters,
                key,
                PackageWaiter::Table(handle.clone()),
                PackageWaiter::same,
            );
        }
        Ok(())
    }

    fn link_field_type(&mut self, handle: &Handle<FieldType>) -> Result<()> {
        let source = handle.source().clone();
        let package_wait = {
            let mut data = handle.write()?;
            link_slot(data.package.as_mut(), &source, &self.packages)?
        };
        if let Some(key) = package_wait {
            push_waiter(
                &mut self.package_waiters,
                key,
                PackageWaiter::FieldType(handle.clone()),
                PackageWaiter::same,
            );
        }
        Ok(())
    }

    fn link_element(&mut self, handle: &Handle<Element>) -> Result<()> {
        let source = handle.source().clone();
        let (table_wait, type_wait, reference_wait, package_wait) = {
            let mut data = handle.write()?;
            (
                link_slot(Some(&mut data.table), &source, &self.tables)?,
                link_slot(data.field_type.as_mut(), &source, &self.field_types)?,
                link_slot(data.reference.as_mut(), &source, &self.tables)?,
                link_slot(data.package.as_mut(), &source, &self.packages)?,
            )
        };
        if let Some(key) = table_wait {
            push_waiter(
                &mut self.table_waiters,
                key,
                TableWaiter::ElementTable(handle.clone()),
                TableWaiter::same,
            );
        }
        if let Some(key) = type_wait {
            push_waiter(
                &mut self.field_type_waiters,
                key,
                handle.clone(),
                |a, b| a.same_entity(b),
            );
        }
        if let Some(key) = reference_wait {
            push_waiter(
                &mut self.table_waiters,
                key,
                TableWaiter::ElementReference(handle.clone()),
                TableWaiter::same,
            );
        }
        if let Some(key) = package_wait {
            push_waiter(
                &mut self.package_waiters,
                key,
                PackageWaiter::Element(handle.clone()),
                PackageWaiter::same,
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Upserts
    // ------------------------------------------------------------------

    fn upsert_package(
        &mut self,
        source: &Fqdn,
        record: &PackageRecord,
        stamp: Stamp,
    ) -> Result<Handle<Package>> {
        let (sys_id, name) = identity(
            EntityKind::Package,
            record.sys_id.as_deref(),
            record.name.as_deref(),
        )?;
        let key = NaturalKey::new(source.clone(), name);
        let handle = self.package_entry(key.clone())?;
        {
            let mut data = handle.write()?;
            if data.state == EntityState::Stub {
                debug!(package = %key.name, "Merging package record into stub");
            }
            data.sys_id = Some(sys_id.clone());
            data.short_description = optional_text(record.short_description.as_deref());
            data.detail = PackageDetail::build(
                record.kind,
                optional_text(record.scope.as_deref()),
                optional_text(record.version.as_deref()),
                optional_text(record.plugin_id.as_deref()),
            );
            data.state = EntityState::Complete;
            data.last_updated = stamp.next(data.last_updated);
        }
        self.package_ids.insert((source.clone(), sys_id), key);
        Ok(handle)
    }

    fn upsert_field_type(
        &mut self,
        source: &Fqdn,
        record: &FieldTypeRecord,
        stamp: Stamp,
    ) -> Result<Handle<FieldType>> {
        let (sys_id, name) = identity(
            EntityKind::FieldType,
            record.sys_id.as_deref(),
            record.name.as_deref(),
        )?;
        let package = reference_name(
            &self.package_ids,
            EntityKind::Package,
            source,
            record.package.as_deref(),
            record.package_id.as_deref(),
            &name,
        )?;
        let key = NaturalKey::new(source.clone(), name);
        let handle = self.field_type_entry(key.clone())?;
        {
            let mut data = handle.write()?;
            if data.state == EntityState::Stub {
                debug!(field_type = %key.name, "Merging field type record into stub");
            }
            data.sys_id = Some(sys_id);
            data.label =
                optional_text(record.label.as_deref()).unwrap_or_else(|| key.name.to_string());
            data.scalar_type = optional_text(record.scalar_type.as_deref());
            data.scalar_length = record.scalar_length;
            data.class_name = optional_text(record.class_name.as_deref());
            data.use_original_value = record.use_original_value;
            data.is_visible = record.is_visible;
            assign_name(&mut data.package, package);
            data.state = EntityState::Complete;
            data.last_updated = stamp.next(data.last_updated);
        }
        self.link_field_type(&handle)?;
        Ok(handle)
    }

    fn upsert_table(
        &mut self,
        source: &Fqdn,
        record: &TableRecord,
        stamp: Stamp,
    ) -> Result<Handle<Table>> {
        let (sys_id, name) = identity(
            EntityKind::Table,
            record.sys_id.as_deref(),
            record.name.as_deref(),
        )?;
        let super_class = reference_name(
            &self.table_ids,
            EntityKind::Table,
            source,
            record.super_class.as_deref(),
            record.super_class_id.as_deref(),
            &name,
        )?;
        if super_class.as_ref() == Some(&name) {
            return Err(CacheError::SelfInheritance(name.to_string()));
        }
        let package = reference_name(
            &self.package_ids,
            EntityKind::Package,
            source,
            record.package.as_deref(),
            record.package_id.as_deref(),
            &name,
        )?;
        let key = NaturalKey::new(source.clone(), name);
        let handle = self.table_entry(key.clone())?;
        {
            let mut data = handle.write()?;
            if data.state == EntityState::Stub {
                debug!(table = %key.name, "Merging table record into stub");
            }
            data.sys_id = Some(sys_id.clone());
            data.label =
                optional_text(record.label.as_deref()).unwrap_or_else(|| key.name.to_string());
            data.is_extendable = record.is_extendable;
            data.number_prefix = optional_text(record.number_prefix.as_deref());
            assign_name(&mut data.super_class, super_class);
            assign_name(&mut data.package, package);
            data.state = EntityState::Complete;
            data.last_updated = stamp.next(data.last_updated);
        }
        self.table_ids.insert((source.clone(), sys_id), key);
        self.link_table(&handle)?;
        Ok(handle)
    }

    fn upsert_element(
        &mut self,
        source: &Fqdn,
        record: &ElementRecord,
        stamp: Stamp,
    ) -> Result<Handle<Element>> {
        let (sys_id, name) = identity(
            EntityKind::Element,
            record.sys_id.as_deref(),
            record.name.as_deref(),
        )?;
        let table = required_name(EntityKind::Element, "table", record.table.as_deref())?;
        let package = reference_name(
            &self.package_ids,
            EntityKind::Package,
            source,
            record.package.as_deref(),
            record.package_id.as_deref(),
            &name,
        )?;
        let key = ElementKey::new(source.clone(), table.clone(), name);
        let handle = match self.elements.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let created = Handle::new(key.clone(), Element::empty(table.clone()));
                self.elements.insert(key.clone(), created.clone());
                self.table_elements
                    .entry(key.table_key())
                    .or_default()
                    .push(created.clone());
                created
            }
        };
        {
            let mut data = handle.write()?;
            data.sys_id = Some(sys_id);
            data.label =
                optional_text(record.label.as_deref()).unwrap_or_else(|| key.name.to_string());
            data.flags = ElementFlags {
                is_active: record.is_active,
                is_array: record.is_array,
                is_display: record.is_display,
                is_mandatory: record.is_mandatory,
                is_primary: record.is_primary,
                is_read_only: record.is_read_only,
                is_calculated: record.is_calculated,
                is_unique: record.is_unique,
            };
            data.max_length = record.max_length;
            data.size_class = record.size_class;
            data.default_value = optional_text(record.default_value.as_deref());
            data.comments = optional_text(record.comments.as_deref());
            data.table.set_name(table);
            assign_name(
                &mut data.field_type,
                optional_name(record.field_type.as_deref()),
            );
            assign_name(
                &mut data.reference,
                optional_name(record.reference.as_deref()),
            );
            assign_name(&mut data.package, package);
            data.state = EntityState::Complete;
            data.last_updated = stamp.next(data.last_updated);
        }
        self.link_element(&handle)?;
        Ok(handle)
    }
}

// ============================================================================
// EntityCache
// ============================================================================

/// Cache of schema entities keyed by case-insensitive natural key.
///
/// Safe to share across tasks; every method takes `&self`.
#[derive(Default)]
pub struct EntityCache {
    index: Mutex<Index>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Index>> {
        self.index
            .lock()
            .map_err(|_| CacheError::Poisoned("cache index"))
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Record the instance entities are fetched from.
    pub fn register_source(
        &self,
        fqdn: Fqdn,
        label: Option<String>,
        is_default: bool,
    ) -> Result<Source> {
        let mut index = self.lock()?;
        if is_default {
            for other in index.sources.values_mut() {
                other.is_default = false;
            }
        }
        let source = Source {
            fqdn: fqdn.clone(),
            label,
            is_default,
            last_updated: Utc::now(),
        };
        index.sources.insert(fqdn, source.clone());
        Ok(source)
    }

    pub fn sources(&self) -> Result<Vec<Source>> {
        let index = self.lock()?;
        let mut sources: Vec<Source> = index.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));
        Ok(sources)
    }

    // ------------------------------------------------------------------
    // Resolve (stub-creating lookups)
    // ------------------------------------------------------------------

    /// Cached entity for `name`, or a new stub. Elements need their table
    /// and cannot be resolved by name.
    pub fn resolve(&self, kind: EntityKind, source: &Fqdn, name: &Name) -> Result<EntityHandle> {
        match kind {
            EntityKind::Table => self.resolve_table(source, name).map(EntityHandle::Table),
            EntityKind::FieldType => self
                .resolve_field_type(source, name)
                .map(EntityHandle::FieldType),
            EntityKind::Package => self.resolve_package(source, name).map(EntityHandle::Package),
            EntityKind::Element => Err(CacheError::Unsupported(kind)),
        }
    }

    pub fn resolve_table(&self, source: &Fqdn, name: &Name) -> Result<Handle<Table>> {
        let mut index = self.lock()?;
        index.table_entry(NaturalKey::new(source.clone(), name.clone()))
    }

    pub fn resolve_field_type(&self, source: &Fqdn, name: &Name) -> Result<Handle<FieldType>> {
        let mut index = self.lock()?;
        index.field_type_entry(NaturalKey::new(source.clone(), name.clone()))
    }

    pub fn resolve_package(&self, source: &Fqdn, name: &Name) -> Result<Handle<Package>> {
        let mut index = self.lock()?;
        index.package_entry(NaturalKey::new(source.clone(), name.clone()))
    }

    // ------------------------------------------------------------------
    // Get (no stub creation)
    // ------------------------------------------------------------------

    pub fn get(&self, kind: EntityKind, source: &Fqdn, name: &Name) -> Result<Option<EntityHandle>> {
        Ok(match kind {
            EntityKind::Table => self.get_table(source, name)?.map(EntityHandle::Table),
            EntityKind::FieldType => self
                .get_field_type(source, name)?
                .map(EntityHandle::FieldType),
            EntityKind::Package => self.get_package(source, name)?.map(EntityHandle::Package),
            EntityKind::Element => return Err(CacheError::Unsupported(kind)),
        })
    }

    pub fn get_table(&self, source: &Fqdn, name: &Name) -> Result<Option<Handle<Table>>> {
        let index = self.lock()?;
        Ok(index
            .tables
            .get(&NaturalKey::new(source.clone(), name.clone()))
            .cloned())
    }

    pub fn get_field_type(&self, source: &Fqdn, name: &Name) -> Result<Option<Handle<FieldType>>> {
        let index = self.lock()?;
        Ok(index
            .field_types
            .get(&NaturalKey::new(source.clone(), name.clone()))
            .cloned())
    }

    pub fn get_package(&self, source: &Fqdn, name: &Name) -> Result<Option<Handle<Package>>> {
        let index = self.lock()?;
        Ok(index
            .packages
            .get(&NaturalKey::new(source.clone(), name.clone()))
            .cloned())
    }

    pub fn get_element(
        &self,
        source: &Fqdn,
        table: &Name,
        name: &Name,
    ) -> Result<Option<Handle<Element>>> {
        let index = self.lock()?;
        Ok(index
            .elements
            .get(&ElementKey::new(source.clone(), table.clone(), name.clone()))
            .cloned())
    }

    pub fn table_by_sys_id(&self, source: &Fqdn, sys_id: &SysId) -> Result<Option<Handle<Table>>> {
        let index = self.lock()?;
        Ok(index
            .table_ids
            .get(&(source.clone(), sys_id.clone()))
            .and_then(|key| index.tables.get(key))
            .cloned())
    }

    pub fn package_by_sys_id(
        &self,
        source: &Fqdn,
        sys_id: &SysId,
    ) -> Result<Option<Handle<Package>>> {
        let index = self.lock()?;
        Ok(index
            .package_ids
            .get(&(source.clone(), sys_id.clone()))
            .and_then(|key| index.packages.get(key))
            .cloned())
    }

    // ------------------------------------------------------------------
    // Upsert
    // ------------------------------------------------------------------

    /// Merge any record kind, returning the canonical handle.
    pub fn upsert(&self, source: &Fqdn, record: &SchemaRecord) -> Result<EntityHandle> {
        match record {
            SchemaRecord::Table(r) => self.upsert_table(source, r).map(EntityHandle::Table),
            SchemaRecord::Element(r) => self.upsert_element(source, r).map(EntityHandle::Element),
            SchemaRecord::FieldType(r) => self
                .upsert_field_type(source, r)
                .map(EntityHandle::FieldType),
            SchemaRecord::Package(r) => self.upsert_package(source, r).map(EntityHandle::Package),
        }
    }

    pub fn upsert_table(&self, source: &Fqdn, record: &TableRecord) -> Result<Handle<Table>> {
        self.lock()?.upsert_table(source, record, Stamp::Now)
    }

    pub fn upsert_element(&self, source: &Fqdn, record: &ElementRecord) -> Result<Handle<Element>> {
        self.lock()?.upsert_element(source, record, Stamp::Now)
    }

    pub fn upsert_field_type(
        &self,
        source: &Fqdn,
        record: &FieldTypeRecord,
    ) -> Result<Handle<FieldType>> {
        self.lock()?.upsert_field_type(source, record, Stamp::Now)
    }

    pub fn upsert_package(&self, source: &Fqdn, record: &PackageRecord) -> Result<Handle<Package>> {
        self.lock()?.upsert_package(source, record, Stamp::Now)
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    /// Resolve a table's superclass and package names against the cache.
    pub fn link_table(&self, table: &Handle<Table>) -> Result<()> {
        self.lock()?.link_table(table)
    }

    pub fn link_field_type(&self, field_type: &Handle<FieldType>) -> Result<()> {
        self.lock()?.link_field_type(field_type)
    }

    pub fn link_element(&self, element: &Handle<Element>) -> Result<()> {
        self.lock()?.link_element(element)
    }

    /// Names that cached entities refer to but that have no entity yet.
    pub fn unresolved_references(&self) -> Result<Vec<PendingReference>> {
        let index = self.lock()?;
        let mut pending = Vec::new();
        for (key, waiters) in &index.table_waiters {
            for waiter in waiters {
                if waiter.still_waiting(&key.name)? {
                    pending.push(PendingReference {
                        kind: EntityKind::Table,
                        key: key.clone(),
                    });
                    break;
                }
            }
        }
        for (key, waiters) in &index.field_type_waiters {
            for element in waiters {
                if waiting_on(element.read()?.field_type.as_ref(), &key.name) {
                    pending.push(PendingReference {
                        kind: EntityKind::FieldType,
                        key: key.clone(),
                    });
                    break;
                }
            }
        }
        for (key, waiters) in &index.package_waiters {
            for waiter in waiters {
                if waiter.still_waiting(&key.name)? {
                    pending.push(PendingReference {
                        kind: EntityKind::Package,
                        key: key.clone(),
                    });
                    break;
                }
            }
        }
        pending.sort();
        Ok(pending)
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// All cached tables, stubs included, ordered by source then name.
    pub fn tables(&self) -> Result<Vec<Handle<Table>>> {
        let index = self.lock()?;
        let mut tables: Vec<Handle<Table>> = index.tables.values().cloned().collect();
        tables.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(tables)
    }

    /// Columns cached for `table`, ordered by name.
    pub fn elements_of(&self, table: &Handle<Table>) -> Result<Vec<Handle<Element>>> {
        let index = self.lock()?;
        let mut elements = index
            .table_elements
            .get(table.key())
            .cloned()
            .unwrap_or_default();
        elements.sort_by(|a, b| {
            a.name()
                .cmp(b.name())
                .then_with(|| a.name().as_str().cmp(b.name().as_str()))
        });
        Ok(elements)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Copy every fully resolved entity out of the cache.
    pub fn snapshot(&self) -> Result<CacheSnapshot> {
        let index = self.lock()?;
        let mut snapshot = CacheSnapshot {
            sources: index.sources.values().cloned().collect(),
            ..CacheSnapshot::default()
        };
        snapshot.sources.sort_by(|a, b| a.fqdn.cmp(&b.fqdn));

        let mut packages: Vec<&Handle<Package>> = index.packages.values().collect();
        packages.sort_by(|a, b| a.key().cmp(b.key()));
        for handle in packages {
            let data = handle.read()?;
            if data.state != EntityState::Complete {
                continue;
            }
            snapshot.packages.push(Stored {
                source: handle.source().clone(),
                record: PackageRecord {
                    sys_id: data.sys_id.as_ref().map(ToString::to_string),
                    name: Some(handle.name().to_string()),
                    kind: data.detail.kind(),
                    short_description: data.short_description.clone(),
                    scope: data.detail.scope().map(str::to_string),
                    version: data.detail.version().map(str::to_string),
                    plugin_id: data.detail.plugin_id().map(str::to_string),
                },
                last_updated: data.last_updated,
            });
        }

        let mut field_types: Vec<&Handle<FieldType>> = index.field_types.values().collect();
        field_types.sort_by(|a, b| a.key().cmp(b.key()));
        for handle in field_types {
            let data = handle.read()?;
            if data.state != EntityState::Complete {
                continue;
            }
            snapshot.field_types.push(Stored {
                source: handle.source().clone(),
                record: FieldTypeRecord {
                    sys_id: data.sys_id.as_ref().map(ToString::to_string),
                    name: Some(handle.name().to_string()),
                    label: Some(data.label.clone()),
                    scalar_type: data.scalar_type.clone(),
                    scalar_length: data.scalar_length,
                    class_name: data.class_name.clone(),
                    use_original_value: data.use_original_value,
                    is_visible: data.is_visible,
                    package: data.package.as_ref().map(|r| r.name().to_string()),
                    package_id: None,
                },
                last_updated: data.last_updated,
            });
        }

        let mut tables: Vec<&Handle<Table>> = index.tables.values().collect();
        tables.sort_by(|a, b| a.key().cmp(b.key()));
        for handle in tables {
            let data = handle.read()?;
            if data.state != EntityState::Complete {
                continue;
            }
            snapshot.tables.push(Stored {
                source: handle.source().clone(),
                record: TableRecord {
                    sys_id: data.sys_id.as_ref().map(ToString::to_string),
                    name: Some(handle.name().to_string()),
                    label: Some(data.label.clone()),
                    is_extendable: data.is_extendable,
                    number_prefix: data.number_prefix.clone(),
                    super_class: data.super_class.as_ref().map(|r| r.name().to_string()),
                    super_class_id: None,
                    package: data.package.as_ref().map(|r| r.name().to_string()),
                    package_id: None,
                },
                last_updated: data.last_updated,
            });
        }

        let mut elements: Vec<&Handle<Element>> = index.elements.values().collect();
        elements.sort_by(|a, b| a.key().cmp(b.key()));
        for handle in elements {
            let data = handle.read()?;
            let flags = data.flags;
            snapshot.elements.push(Stored {
                source: handle.source().clone(),
                record: ElementRecord {
                    sys_id: data.sys_id.as_ref().map(ToString::to_string),
                    table: Some(handle.key().table.to_string()),
                    name: Some(handle.name().to_string()),
                    label: Some(data.label.clone()),
                    is_active: flags.is_active,
                    is_array: flags.is_array,
                    is_display: flags.is_display,
                    is_mandatory: flags.is_mandatory,
                    is_primary: flags.is_primary,
                    is_read_only: flags.is_read_only,
                    is_calculated: flags.is_calculated,
                    is_unique: flags.is_unique,
                    max_length: data.max_length,
                    size_class: data.size_class,
                    default_value: data.default_value.clone(),
                    comments: data.comments.clone(),
                    field_type: data.field_type.as_ref().map(|r| r.name().to_string()),
                    reference: data.reference.as_ref().map(|r| r.name().to_string()),
                    package: data.package.as_ref().map(|r| r.name().to_string()),
                    package_id: None,
                },
                last_updated: data.last_updated,
            });
        }

        Ok(snapshot)
    }

    /// Merge a persisted snapshot, keeping its timestamps.
    ///
    /// Returns the number of entities merged.
    pub fn load_snapshot(&self, snapshot: &CacheSnapshot) -> Result<usize> {
        let mut index = self.lock()?;
        for source in &snapshot.sources {
            index
                .sources
                .entry(source.fqdn.clone())
                .or_insert_with(|| source.clone());
        }
        for stored in &snapshot.packages {
            index.upsert_package(&stored.source, &stored.record, Stamp::At(stored.last_updated))?;
        }
        for stored in &snapshot.field_types {
            index.upsert_field_type(
                &stored.source,
                &stored.record,
                Stamp::At(stored.last_updated),
            )?;
        }
        for stored in &snapshot.tables {
            index.upsert_table(&stored.source, &stored.record, Stamp::At(stored.last_updated))?;
        }
        for stored in &snapshot.elements {
            index.upsert_element(&stored.source, &stored.record, Stamp::At(stored.last_updated))?;
        }
        let merged = snapshot.entity_count();
        debug!(entities = merged, "Loaded cache snapshot");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PackageKind;
    use std::sync::Arc;
    use std::thread;

    const TASK_ID: &str = "8f1f1c4a1b7f5010a9c4a8f3b24bcb3a";
    const PROBLEM_ID: &str = "9e7f5c1b1b7f5010a9c4a8f3b24bcb3b";
    const PACKAGE_ID: &str = "1a2b3c4d5e6f708192a3b4c5d6e7f809";

    fn source() -> Fqdn {
        Fqdn::parse("dev.example.com").unwrap()
    }

    fn name(value: &str) -> Name {
        Name::parse(value).unwrap()
    }

    fn task_record() -> TableRecord {
        TableRecord {
            sys_id: Some(TASK_ID.to_string()),
            name: Some("task".to_string()),
            label: Some("Task".to_string()),
            is_extendable: true,
            number_prefix: Some("TASK".to_string()),
            ..TableRecord::default()
        }
    }

    fn element_record(table: &str, column: &str, field_type: &str) -> ElementRecord {
        ElementRecord {
            sys_id: Some(SysId::new().to_string()),
            table: Some(table.to_string()),
            name: Some(column.to_string()),
            label: Some(column.replace('_', " ")),
            is_active: true,
            field_type: Some(field_type.to_string()),
            ..ElementRecord::default()
        }
    }

    fn field_type_record(type_name: &str) -> FieldTypeRecord {
        FieldTypeRecord {
            sys_id: Some(SysId::new().to_string()),
            name: Some(type_name.to_string()),
            label: Some(type_name.to_uppercase()),
            is_visible: true,
            ..FieldTypeRecord::default()
        }
    }

    #[test]
    fn upserting_twice_keeps_one_entity_and_advances_timestamp() {
        let cache = EntityCache::new();
        let first = cache.upsert_table(&source(), &task_record()).unwrap();
        let stamp = first.read().unwrap().last_updated;

        let mut changed = task_record();
        changed.name = Some("TASK".to_string());
        changed.label = Some("Task (renamed)".to_string());
        let second = cache.upsert_table(&source(), &changed).unwrap();

        assert!(first.same_entity(&second));
        assert_eq!(cache.tables().unwrap().len(), 1);
        let data = second.read().unwrap();
        assert_eq!(data.label, "Task (renamed)");
        assert!(data.last_updated > stamp);
        assert_eq!(second.name().as_str(), "task");
    }

    #[test]
    fn incomplete_records_are_rejected_without_side_effects() {
        let cache = EntityCache::new();
        let mut record = task_record();
        record.sys_id = None;
        let err = cache.upsert_table(&source(), &record).unwrap_err();
        assert!(err.is_record_scoped());
        assert!(cache.tables().unwrap().is_empty());
    }

    #[test]
    fn resolve_creates_stub_that_upsert_fills_in_place() {
        let cache = EntityCache::new();
        let stub = cache.resolve_table(&source(), &name("Task")).unwrap();
        assert!(stub.is_stub().unwrap());

        let full = cache.upsert_table(&source(), &task_record()).unwrap();
        assert!(stub.same_entity(&full));
        assert!(!stub.is_stub().unwrap());
        assert_eq!(stub.read().unwrap().number_prefix.as_deref(), Some("TASK"));
    }

    #[test]
    fn element_type_upgrades_when_field_type_arrives() {
        let cache = EntityCache::new();
        let element = cache
            .upsert_element(&source(), &element_record("task", "short_description", "string"))
            .unwrap();
        assert!(!element
            .read()
            .unwrap()
            .field_type
            .as_ref()
            .unwrap()
            .is_resolved());
        assert_eq!(
            cache.unresolved_references().unwrap(),
            vec![
                PendingReference {
                    kind: EntityKind::Table,
                    key: NaturalKey::new(source(), name("task")),
                },
                PendingReference {
                    kind: EntityKind::FieldType,
                    key: NaturalKey::new(source(), name("string")),
                },
            ]
        );

        let field_type = cache
            .upsert_field_type(&source(), &field_type_record("String"))
            .unwrap();
        let data = element.read().unwrap();
        let resolved = data.field_type.as_ref().unwrap().handle().unwrap();
        assert!(resolved.same_entity(&field_type));
        assert_eq!(resolved.read().unwrap().label, "STRING");
    }

    #[test]
    fn resolve_upgrades_waiters_to_the_stub() {
        let cache = EntityCache::new();
        let element = cache
            .upsert_element(&source(), &element_record("task", "assigned_to", "reference"))
            .unwrap();
        let stub = cache.resolve_table(&source(), &name("task")).unwrap();
        let data = element.read().unwrap();
        assert!(data.table.handle().unwrap().same_entity(&stub));
    }

    #[test]
    fn superclass_sys_id_translates_through_known_tables() {
        let cache = EntityCache::new();
        let task = cache.upsert_table(&source(), &task_record()).unwrap();
        let problem = cache
            .upsert_table(
                &source(),
                &TableRecord {
                    sys_id: Some(PROBLEM_ID.to_string()),
                    name: Some("problem".to_string()),
                    label: Some("Problem".to_string()),
                    super_class_id: Some(TASK_ID.to_string()),
                    ..TableRecord::default()
                },
            )
            .unwrap();
        let data = problem.read().unwrap();
        let parent = data.super_class.as_ref().unwrap().handle().unwrap();
        assert!(parent.same_entity(&task));
    }

    #[test]
    fn unknown_superclass_sys_id_fails_the_table() {
        let cache = EntityCache::new();
        let err = cache
            .upsert_table(
                &source(),
                &TableRecord {
                    sys_id: Some(PROBLEM_ID.to_string()),
                    name: Some("problem".to_string()),
                    super_class_id: Some(TASK_ID.to_string()),
                    ..TableRecord::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::UnknownReference { .. }));
        assert!(cache.get_table(&source(), &name("problem")).unwrap().is_none());
    }

    #[test]
    fn self_inheritance_is_refused() {
        let cache = EntityCache::new();
        let mut record = task_record();
        record.super_class = Some("TASK".to_string());
        assert!(matches!(
            cache.upsert_table(&source(), &record),
            Err(CacheError::SelfInheritance(_))
        ));
    }

    #[test]
    fn changing_superclass_name_drops_the_old_handle() {
        let cache = EntityCache::new();
        cache.upsert_table(&source(), &task_record()).unwrap();
        let mut child = TableRecord {
            sys_id: Some(PROBLEM_ID.to_string()),
            name: Some("problem".to_string()),
            super_class: Some("task".to_string()),
            ..TableRecord::default()
        };
        let problem = cache.upsert_table(&source(), &child).unwrap();
        assert!(problem.read().unwrap().super_class.as_ref().unwrap().is_resolved());

        child.super_class = Some("base_task".to_string());
        cache.upsert_table(&source(), &child).unwrap();
        let data = problem.read().unwrap();
        let reference = data.super_class.as_ref().unwrap();
        assert!(!reference.is_resolved());
        assert_eq!(reference.name().as_str(), "base_task");
    }

    #[test]
    fn stale_waiters_are_not_reported_or_applied() {
        let cache = EntityCache::new();
        let mut record = element_record("task", "priority", "integer");
        cache.upsert_element(&source(), &record).unwrap();
        record.field_type = Some("decimal".to_string());
        let element = cache.upsert_element(&source(), &record).unwrap();

        let pending = cache.unresolved_references().unwrap();
        assert!(!pending.iter().any(|p| p.key.name.matches("integer")));

        cache
            .upsert_field_type(&source(), &field_type_record("integer"))
            .unwrap();
        let data = element.read().unwrap();
        let reference = data.field_type.as_ref().unwrap();
        assert_eq!(reference.name().as_str(), "decimal");
        assert!(!reference.is_resolved());
    }

    #[test]
    fn package_sys_id_links_tables_to_packages() {
        let cache = EntityCache::new();
        let package = cache
            .upsert_package(
                &source(),
                &PackageRecord {
                    sys_id: Some(PACKAGE_ID.to_string()),
                    name: Some("x_acme_app".to_string()),
                    kind: PackageKind::CustomApplication,
                    short_description: Some("Acme".to_string()),
                    scope: Some("x_acme_app".to_string()),
                    version: Some("1.0.0".to_string()),
                    plugin_id: None,
                },
            )
            .unwrap();
        let mut record = task_record();
        record.package_id = Some(PACKAGE_ID.to_uppercase());
        let table = cache.upsert_table(&source(), &record).unwrap();
        let data = table.read().unwrap();
        assert!(data.package.as_ref().unwrap().handle().unwrap().same_entity(&package));
        assert_eq!(package.read().unwrap().detail.scope(), Some("x_acme_app"));
    }

    #[test]
    fn same_name_from_two_sources_is_two_entities() {
        let cache = EntityCache::new();
        let other = Fqdn::parse("prod.example.com").unwrap();
        let a = cache.upsert_table(&source(), &task_record()).unwrap();
        let b = cache.upsert_table(&other, &task_record()).unwrap();
        assert!(!a.same_entity(&b));
        assert_eq!(cache.tables().unwrap().len(), 2);
    }

    #[test]
    fn elements_of_returns_columns_sorted_by_name() {
        let cache = EntityCache::new();
        let task = cache.upsert_table(&source(), &task_record()).unwrap();
        for column in ["short_description", "Active", "number"] {
            cache
                .upsert_element(&source(), &element_record("task", column, "string"))
                .unwrap();
        }
        let names: Vec<String> = cache
            .elements_of(&task)
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["Active", "number", "short_description"]);
    }

    #[test]
    fn snapshot_restores_links_and_timestamps() {
        let cache = EntityCache::new();
        cache
            .register_source(source(), Some("Dev".to_string()), true)
            .unwrap();
        cache.upsert_table(&source(), &task_record()).unwrap();
        cache
            .upsert_field_type(&source(), &field_type_record("string"))
            .unwrap();
        cache
            .upsert_element(&source(), &element_record("task", "number", "string"))
            .unwrap();
        cache.resolve_table(&source(), &name("sys_user")).unwrap();
        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.tables.len(), 1, "stubs are not persisted");

        let restored = EntityCache::new();
        assert_eq!(restored.load_snapshot(&snapshot).unwrap(), 3);
        let element = restored
            .get_element(&source(), &name("task"), &name("number"))
            .unwrap()
            .unwrap();
        let data = element.read().unwrap();
        assert!(data.table.is_resolved());
        assert!(data.field_type.as_ref().unwrap().is_resolved());
        assert_eq!(data.last_updated, snapshot.elements[0].last_updated);
        assert_eq!(restored.sources().unwrap()[0].label.as_deref(), Some("Dev"));
    }

    #[test]
    fn element_kind_is_not_resolvable_by_name() {
        let cache = EntityCache::new();
        assert_eq!(
            cache
                .resolve(EntityKind::Element, &source(), &name("number"))
                .unwrap_err(),
            CacheError::Unsupported(EntityKind::Element)
        );
    }

    #[test]
    fn concurrent_upserts_share_one_handle_and_never_tear() {
        let cache = Arc::new(EntityCache::new());
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    let mut record = task_record();
                    let tag = if i % 2 == 0 { "A" } else { "B" };
                    record.label = Some(format!("Label {}", tag));
                    record.number_prefix = Some(format!("P{}", tag));
                    for _ in 0..50 {
                        cache.upsert_table(&source(), &record).unwrap();
                    }
                    cache.get_table(&source(), &name("task")).unwrap().unwrap()
                })
            })
            .collect();

        let reader = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(task) = cache.get_table(&source(), &name("task")).unwrap() {
                        let data = task.read().unwrap();
                        if data.state == EntityState::Complete {
                            let tag = data.label.trim_start_matches("Label ");
                            assert_eq!(data.number_prefix.as_deref(), Some(&*format!("P{}", tag)));
                        }
                    }
                }
            })
        };

        let handles: Vec<Handle<Table>> = writers.into_iter().map(|w| w.join().unwrap()).collect();
        reader.join().unwrap();
        assert!(handles.windows(2).all(|w| w[0].same_entity(&w[1])));
        assert_eq!(cache.tables().unwrap().len(), 1);
    }
}

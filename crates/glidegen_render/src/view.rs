//! Immutable views of cached tables, captured for rendering.
//!
//! Capturing takes each entity read lock in turn and copies out what the
//! renderer needs, so rendering itself never touches the cache.

use crate::error::{RenderError, Result};
use glidegen_schema::{
    CrossRef, Element, ElementFlags, EntityCache, EntityState, FieldType, Fqdn, Handle, Name,
    Package, PackageKind, Table,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageView {
    pub name: Name,
    pub kind: PackageKind,
    pub short_description: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementView {
    pub name: Name,
    pub label: String,
    pub flags: ElementFlags,
    pub max_length: Option<i32>,
    pub default_value: Option<String>,
    pub comments: Option<String>,
    /// Scalar type name, e.g. `string` or `reference`.
    pub type_name: Option<Name>,
    /// Label of the scalar type, when it has been fetched.
    pub type_label: Option<String>,
    /// Target table of a reference column.
    pub reference: Option<Name>,
}

impl ElementView {
    /// A column with only a name and a type; everything else defaulted.
    pub fn new(name: Name, type_name: Option<Name>) -> Self {
        Self {
            label: name.to_string(),
            name,
            flags: ElementFlags::default(),
            max_length: None,
            default_value: None,
            comments: None,
            type_name,
            type_label: None,
            reference: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    pub source: Fqdn,
    pub name: Name,
    pub label: String,
    pub is_extendable: bool,
    pub number_prefix: Option<String>,
    pub super_class: Option<Name>,
    pub package: Option<PackageView>,
    /// Own columns, ascending by name.
    pub elements: Vec<ElementView>,
}

impl TableView {
    pub fn element(&self, name: &Name) -> Option<&ElementView> {
        self.elements.iter().find(|e| &e.name == name)
    }
}

/// Copy one table and its columns out of the cache.
///
/// A table still known only by name cannot be rendered. Unresolved
/// packages and field types are tolerated; they just leave documentation
/// out.
pub fn capture_table(cache: &EntityCache, table: &Handle<Table>) -> Result<TableView> {
    let (label, is_extendable, number_prefix, super_class, package) = {
        let data = table.read()?;
        if data.state == EntityState::Stub {
            return Err(RenderError::StubTable(table.name().to_string()));
        }
        (
            data.label.clone(),
            data.is_extendable,
            data.number_prefix.clone(),
            data.super_class.as_ref().map(|r| r.name().clone()),
            data.package.clone(),
        )
    };

    let package = match package {
        Some(reference) => package_view(&reference)?,
        None => None,
    };

    let mut elements = Vec::new();
    for element in cache.elements_of(table)? {
        elements.push(element_view(&element)?);
    }

    debug!(table = %table.name(), elements = elements.len(), "Captured table");
    Ok(TableView {
        source: table.source().clone(),
        name: table.name().clone(),
        label,
        is_extendable,
        number_prefix,
        super_class,
        package,
        elements,
    })
}

/// Capture several tables, collecting per-table failures instead of
/// stopping at the first.
pub fn capture_tables(
    cache: &EntityCache,
    tables: &[Handle<Table>],
) -> Result<(Vec<TableView>, Vec<RenderError>)> {
    let mut views = Vec::with_capacity(tables.len());
    let mut failed = Vec::new();
    for table in tables {
        match capture_table(cache, table) {
            Ok(view) => views.push(view),
            Err(e) if e.is_table_scoped() => failed.push(e),
            Err(e) => return Err(e),
        }
    }
    Ok((views, failed))
}

fn package_view(reference: &CrossRef<Package>) -> Result<Option<PackageView>> {
    let Some(handle) = reference.handle() else {
        debug!(package = %reference.name(), "Package never resolved; omitting");
        return Ok(None);
    };
    let data = handle.read()?;
    if data.state == EntityState::Stub {
        return Ok(None);
    }
    Ok(Some(PackageView {
        name: handle.name().clone(),
        kind: data.detail.kind(),
        short_description: data.short_description.clone(),
        scope: data.detail.scope().map(str::to_string),
    }))
}

fn element_view(element: &Handle<Element>) -> Result<ElementView> {
    let (mut view, field_type) = {
        let data = element.read()?;
        let view = ElementView {
            name: element.name().clone(),
            label: data.label.clone(),
            flags: data.flags,
            max_length: data.max_length,
            default_value: data.default_value.clone(),
            comments: data.comments.clone(),
            type_name: data.field_type.as_ref().map(|r| r.name().clone()),
            type_label: None,
            reference: data.reference.as_ref().map(|r| r.name().clone()),
        };
        (view, data.field_type.as_ref().and_then(CrossRef::handle).cloned())
    };

    // Element guard is released before the field type is read.
    if let Some(field_type) = field_type {
        view.type_label = type_label(&field_type)?;
    }
    Ok(view)
}

fn type_label(field_type: &Handle<FieldType>) -> Result<Option<String>> {
    let data = field_type.read()?;
    if data.state == EntityState::Stub || data.label.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(data.label.clone()))
}

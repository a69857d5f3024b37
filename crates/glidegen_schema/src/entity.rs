//! Cached schema entities.

use crate::cross_ref::CrossRef;
use crate::handle::Record;
use chrono::{DateTime, Utc};
use glidegen_ids::{Fqdn, Name, SysId};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Kinds and keys
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Table,
    Element,
    FieldType,
    Package,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Table => "table",
            EntityKind::Element => "element",
            EntityKind::FieldType => "field_type",
            EntityKind::Package => "package",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Natural key of a table, field type or package: name plus originating instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub source: Fqdn,
    pub name: Name,
}

impl NaturalKey {
    pub fn new(source: Fqdn, name: Name) -> Self {
        Self { source, name }
    }
}

/// Natural key of a column: column name within its table, per instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey {
    pub source: Fqdn,
    pub table: Name,
    pub name: Name,
}

impl ElementKey {
    pub fn new(source: Fqdn, table: Name, name: Name) -> Self {
        Self {
            source,
            table,
            name,
        }
    }

    pub fn table_key(&self) -> NaturalKey {
        NaturalKey::new(self.source.clone(), self.table.clone())
    }
}

/// Whether an entity has been filled from a fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Created from a name only; every other field holds its default.
    Stub,
    Complete,
}

// ============================================================================
// Source
// ============================================================================

/// The remote instance entities were fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub fqdn: Fqdn,
    pub label: Option<String>,
    pub is_default: bool,
    pub last_updated: DateTime<Utc>,
}

// ============================================================================
// Package
// ============================================================================

/// Which remote table a package record was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    Package,
    Application,
    CustomApplication,
    StoreApplication,
    Plugin,
}

impl PackageKind {
    /// Lookup order used when resolving a package identifier remotely.
    pub const LOOKUP_ORDER: [PackageKind; 5] = [
        PackageKind::Plugin,
        PackageKind::StoreApplication,
        PackageKind::CustomApplication,
        PackageKind::Application,
        PackageKind::Package,
    ];

    /// Remote table holding records of this kind.
    pub fn remote_table(&self) -> &'static str {
        match self {
            PackageKind::Package => "sys_package",
            PackageKind::Application => "sys_scope",
            PackageKind::CustomApplication => "sys_app",
            PackageKind::StoreApplication => "sys_store_app",
            PackageKind::Plugin => "v_plugin",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::Package => "package",
            PackageKind::Application => "application",
            PackageKind::CustomApplication => "custom_application",
            PackageKind::StoreApplication => "store_application",
            PackageKind::Plugin => "plugin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "package" => Some(PackageKind::Package),
            "application" => Some(PackageKind::Application),
            "custom_application" => Some(PackageKind::CustomApplication),
            "store_application" => Some(PackageKind::StoreApplication),
            "plugin" => Some(PackageKind::Plugin),
            _ => None,
        }
    }

    pub fn is_application(&self) -> bool {
        matches!(
            self,
            PackageKind::Application
                | PackageKind::CustomApplication
                | PackageKind::StoreApplication
        )
    }
}

/// Variant-specific package data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageDetail {
    Package,
    Application {
        scope: Option<String>,
        version: Option<String>,
    },
    CustomApplication {
        scope: Option<String>,
        version: Option<String>,
    },
    StoreApplication {
        scope: Option<String>,
        version: Option<String>,
    },
    Plugin {
        plugin_id: Option<String>,
    },
}

impl PackageDetail {
    pub fn kind(&self) -> PackageKind {
        match self {
            PackageDetail::Package => PackageKind::Package,
            PackageDetail::Application { .. } => PackageKind::Application,
            PackageDetail::CustomApplication { .. } => PackageKind::CustomApplication,
            PackageDetail::StoreApplication { .. } => PackageKind::StoreApplication,
            PackageDetail::Plugin { .. } => PackageKind::Plugin,
        }
    }

    /// Application scope, for the application variants.
    pub fn scope(&self) -> Option<&str> {
        match self {
            PackageDetail::Application { scope, .. }
            | PackageDetail::CustomApplication { scope, .. }
            | PackageDetail::StoreApplication { scope, .. } => scope.as_deref(),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            PackageDetail::Application { version, .. }
            | PackageDetail::CustomApplication { version, .. }
            | PackageDetail::StoreApplication { version, .. } => version.as_deref(),
            _ => None,
        }
    }

    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            PackageDetail::Plugin { plugin_id } => plugin_id.as_deref(),
            _ => None,
        }
    }

    pub fn build(
        kind: PackageKind,
        scope: Option<String>,
        version: Option<String>,
        plugin_id: Option<String>,
    ) -> Self {
        match kind {
            PackageKind::Package => PackageDetail::Package,
            PackageKind::Application => PackageDetail::Application { scope, version },
            PackageKind::CustomApplication => PackageDetail::CustomApplication { scope, version },
            PackageKind::StoreApplication => PackageDetail::StoreApplication { scope, version },
            PackageKind::Plugin => PackageDetail::Plugin { plugin_id },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub sys_id: Option<SysId>,
    pub short_description: Option<String>,
    pub detail: PackageDetail,
    pub state: EntityState,
    pub last_updated: DateTime<Utc>,
}

impl Package {
    pub(crate) fn stub() -> Self {
        Self {
            sys_id: None,
            short_description: None,
            detail: PackageDetail::Package,
            state: EntityState::Stub,
            last_updated: Utc::now(),
        }
    }
}

impl Record for Package {
    type Key = NaturalKey;

    const KIND: EntityKind = EntityKind::Package;

    fn key_name(key: &NaturalKey) -> &Name {
        &key.name
    }

    fn key_source(key: &NaturalKey) -> &Fqdn {
        &key.source
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

// ============================================================================
// FieldType
// ============================================================================

/// A scalar ("glide") column type.
#[derive(Debug, Clone)]
pub struct FieldType {
    pub sys_id: Option<SysId>,
    pub label: String,
    pub scalar_type: Option<String>,
    pub scalar_length: Option<i32>,
    pub class_name: Option<String>,
    pub use_original_value: bool,
    pub is_visible: bool,
    pub package: Option<CrossRef<Package>>,
    pub state: EntityState,
    pub last_updated: DateTime<Utc>,
}

impl FieldType {
    pub(crate) fn stub() -> Self {
        Self {
            sys_id: None,
            label: String::new(),
            scalar_type: None,
            scalar_length: None,
            class_name: None,
            use_original_value: false,
            is_visible: false,
            package: None,
            state: EntityState::Stub,
            last_updated: Utc::now(),
        }
    }
}

impl Record for FieldType {
    type Key = NaturalKey;

    const KIND: EntityKind = EntityKind::FieldType;

    fn key_name(key: &NaturalKey) -> &Name {
        &key.name
    }

    fn key_source(key: &NaturalKey) -> &Fqdn {
        &key.source
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Debug, Clone)]
pub struct Table {
    pub sys_id: Option<SysId>,
    pub label: String,
    pub is_extendable: bool,
    pub number_prefix: Option<String>,
    pub super_class: Option<CrossRef<Table>>,
    pub package: Option<CrossRef<Package>>,
    pub state: EntityState,
    pub last_updated: DateTime<Utc>,
}

impl Table {
    pub(crate) fn stub() -> Self {
        Self {
            sys_id: None,
            label: String::new(),
            is_extendable: false,
            number_prefix: None,
            super_class: None,
            package: None,
            state: EntityState::Stub,
            last_updated: Utc::now(),
        }
    }
}

impl Record for Table {
    type Key = NaturalKey;

    const KIND: EntityKind = EntityKind::Table;

    fn key_name(key: &NaturalKey) -> &Name {
        &key.name
    }

    fn key_source(key: &NaturalKey) -> &Fqdn {
        &key.source
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

// ============================================================================
// Element
// ============================================================================

/// Boolean column attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementFlags {
    pub is_active: bool,
    pub is_array: bool,
    pub is_display: bool,
    pub is_mandatory: bool,
    pub is_primary: bool,
    pub is_read_only: bool,
    pub is_calculated: bool,
    pub is_unique: bool,
}

impl Default for ElementFlags {
    fn default() -> Self {
        Self {
            is_active: true,
            is_array: false,
            is_display: false,
            is_mandatory: false,
            is_primary: false,
            is_read_only: false,
            is_calculated: false,
            is_unique: false,
        }
    }
}

/// A table column.
#[derive(Debug, Clone)]
pub struct Element {
    pub sys_id: Option<SysId>,
    pub label: String,
    pub flags: ElementFlags,
    pub max_length: Option<i32>,
    pub size_class: Option<i32>,
    pub default_value: Option<String>,
    pub comments: Option<String>,
    pub table: CrossRef<Table>,
    pub field_type: Option<CrossRef<FieldType>>,
    pub reference: Option<CrossRef<Table>>,
    pub package: Option<CrossRef<Package>>,
    pub state: EntityState,
    pub last_updated: DateTime<Utc>,
}

impl Element {
    pub(crate) fn empty(table: Name) -> Self {
        Self {
            sys_id: None,
            label: String::new(),
            flags: ElementFlags::default(),
            max_length: None,
            size_class: None,
            default_value: None,
            comments: None,
            table: CrossRef::Unresolved(table),
            field_type: None,
            reference: None,
            package: None,
            state: EntityState::Stub,
            last_updated: Utc::now(),
        }
    }
}

impl Record for Element {
    type Key = ElementKey;

    const KIND: EntityKind = EntityKind::Element;

    fn key_name(key: &ElementKey) -> &Name {
        &key.name
    }

    fn key_source(key: &ElementKey) -> &Fqdn {
        &key.source
    }

    fn state(&self) -> EntityState {
        self.state
    }

    fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

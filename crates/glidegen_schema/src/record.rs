//! Flat records merged into the cache by `upsert`.
//!
//! Records reference other entities by name. Where the remote only delivers
//! a sys_id (superclass and package columns), the `*_id` field carries it and
//! the cache translates it through the sys_ids it has already seen.

use crate::entity::{EntityKind, PackageKind};
use crate::error::{CacheError, Result};
use glidegen_ids::{Name, SysId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub sys_id: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub is_extendable: bool,
    pub number_prefix: Option<String>,
    pub super_class: Option<String>,
    pub super_class_id: Option<String>,
    pub package: Option<String>,
    pub package_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub sys_id: Option<String>,
    pub table: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub is_active: bool,
    pub is_array: bool,
    pub is_display: bool,
    pub is_mandatory: bool,
    pub is_primary: bool,
    pub is_read_only: bool,
    pub is_calculated: bool,
    pub is_unique: bool,
    pub max_length: Option<i32>,
    pub size_class: Option<i32>,
    pub default_value: Option<String>,
    pub comments: Option<String>,
    pub field_type: Option<String>,
    pub reference: Option<String>,
    pub package: Option<String>,
    pub package_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypeRecord {
    pub sys_id: Option<String>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub scalar_type: Option<String>,
    pub scalar_length: Option<i32>,
    pub class_name: Option<String>,
    pub use_original_value: bool,
    pub is_visible: bool,
    pub package: Option<String>,
    pub package_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub sys_id: Option<String>,
    pub name: Option<String>,
    pub kind: PackageKind,
    pub short_description: Option<String>,
    pub scope: Option<String>,
    pub version: Option<String>,
    pub plugin_id: Option<String>,
}

/// Any record the cache can merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRecord {
    Table(TableRecord),
    Element(ElementRecord),
    FieldType(FieldTypeRecord),
    Package(PackageRecord),
}

impl SchemaRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            SchemaRecord::Table(_) => EntityKind::Table,
            SchemaRecord::Element(_) => EntityKind::Element,
            SchemaRecord::FieldType(_) => EntityKind::FieldType,
            SchemaRecord::Package(_) => EntityKind::Package,
        }
    }
}

/// Validate the identity fields every record must carry.
pub(crate) fn identity(
    kind: EntityKind,
    sys_id: Option<&str>,
    name: Option<&str>,
) -> Result<(SysId, Name)> {
    let name = required_name(kind, "name", name)?;
    let sys_id = match sys_id.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => SysId::parse(raw).map_err(|e| {
            CacheError::incomplete(kind, format!("'{}' has unusable sys_id: {}", name, e))
        })?,
        None => {
            return Err(CacheError::incomplete(
                kind,
                format!("'{}' has no sys_id", name),
            ))
        }
    };
    Ok((sys_id, name))
}

pub(crate) fn required_name(kind: EntityKind, field: &str, value: Option<&str>) -> Result<Name> {
    value
        .and_then(|v| Name::parse(v).ok())
        .ok_or_else(|| CacheError::incomplete(kind, format!("missing {}", field)))
}

/// Optional name reference; blank values mean "no reference".
pub(crate) fn optional_name(value: Option<&str>) -> Option<Name> {
    value.and_then(|v| Name::parse(v).ok())
}

pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_name_and_sys_id() {
        let err = identity(EntityKind::Table, None, Some("task")).unwrap_err();
        assert!(err.is_record_scoped());
        let err = identity(EntityKind::Table, Some("8f1f1c4a1b7f5010a9c4a8f3b24bcb3a"), None)
            .unwrap_err();
        assert_eq!(err, CacheError::incomplete(EntityKind::Table, "missing name"));
        let err = identity(EntityKind::Table, Some("not-an-id"), Some("task")).unwrap_err();
        assert!(err.to_string().contains("unusable sys_id"));
    }

    #[test]
    fn blank_references_are_absent() {
        assert!(optional_name(Some("  ")).is_none());
        assert!(optional_text(Some("")).is_none());
        assert_eq!(optional_text(Some(" INC ")).as_deref(), Some("INC"));
    }
}

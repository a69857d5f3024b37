//! Column partitioning against the parent table.
//!
//! A derived table's own columns split three ways: columns the parent does
//! not have are declared, columns the parent has in an identical form are
//! inherited (documented only), and columns that differ are overridden.
//! Only the immediate parent is consulted.

use crate::classify::{classify, RenderMode};
use crate::view::{ElementView, TableView};
use glidegen_schema::Name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interface every root table extends implicitly.
pub const BASE_RECORD_INTERFACE: &str = "IBaseRecord";

/// A root table holding all of these columns extends the base record.
pub const BASE_RECORD_KEY_FIELDS: [&str; 2] = ["sys_id", "sys_created_on"];

/// Columns the base record interface already declares.
pub const BASE_RECORD_FIELDS: [&str; 6] = [
    "sys_id",
    "sys_created_by",
    "sys_created_on",
    "sys_mod_count",
    "sys_updated_by",
    "sys_updated_on",
];

/// Which attributes decide whether a column differs from its parent's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementComparison {
    /// Treat a change in comments alone as an override.
    #[serde(default)]
    pub compare_comments: bool,
}

impl ElementComparison {
    pub fn same(&self, own: &ElementView, parent: &ElementView, mode: RenderMode) -> bool {
        own.label == parent.label
            && wrapper_of(own, mode) == wrapper_of(parent, mode)
            && own.type_name == parent.type_name
            && own.reference == parent.reference
            && own.flags == parent.flags
            && (!self.compare_comments || own.comments == parent.comments)
    }
}

fn wrapper_of(element: &ElementView, mode: RenderMode) -> (crate::classify::WrapperCategory, bool) {
    classify(
        element.type_name.as_ref().map_or("", Name::as_str),
        mode,
    )
}

/// What the field interface extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extends<'a> {
    Nothing,
    BaseRecord,
    SuperClass(&'a TableView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override<'a> {
    pub element: &'a ElementView,
    pub parent: &'a ElementView,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<'a> {
    pub extends: Extends<'a>,
    pub declared: Vec<&'a ElementView>,
    pub overridden: Vec<Override<'a>>,
    /// Columns identical to the parent's, paired with the parent column.
    pub inherited: Vec<Override<'a>>,
}

impl<'a> Partition<'a> {
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty() && self.overridden.is_empty() && self.inherited.is_empty()
    }
}

/// True when `elements` hold every base record key column.
pub fn extends_base_record(elements: &[ElementView]) -> bool {
    BASE_RECORD_KEY_FIELDS
        .iter()
        .all(|key| elements.iter().any(|e| e.name.matches(key)))
}

fn is_base_record_field(name: &Name) -> bool {
    BASE_RECORD_FIELDS.iter().any(|field| name.matches(field))
}

/// Partition `table`'s columns against `parent`.
///
/// `parent` must be the table's superclass when it has one. Tables with an
/// explicit superclass never fall back to the base record check, even if
/// the parent is missing.
pub fn partition<'a>(
    table: &'a TableView,
    parent: Option<&'a TableView>,
    mode: RenderMode,
    comparison: ElementComparison,
) -> Partition<'a> {
    let mut result = Partition {
        extends: Extends::Nothing,
        declared: Vec::new(),
        overridden: Vec::new(),
        inherited: Vec::new(),
    };

    match parent {
        Some(parent) => {
            result.extends = Extends::SuperClass(parent);
            let by_name: HashMap<&Name, &ElementView> =
                parent.elements.iter().map(|e| (&e.name, e)).collect();
            for element in &table.elements {
                match by_name.get(&element.name) {
                    None => result.declared.push(element),
                    Some(base) if comparison.same(element, base, mode) => {
                        result.inherited.push(Override {
                            element,
                            parent: base,
                        })
                    }
                    Some(base) => result.overridden.push(Override {
                        element,
                        parent: base,
                    }),
                }
            }
        }
        None if table.super_class.is_none() && extends_base_record(&table.elements) => {
            result.extends = Extends::BaseRecord;
            result.declared = table
                .elements
                .iter()
                .filter(|e| !is_base_record_field(&e.name))
                .collect();
        }
        None => result.declared = table.elements.iter().collect(),
    }

    result
}

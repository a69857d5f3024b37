//! Table API response shapes and record field extraction.
//!
//! Every response is `{"result": ...}` where the result is one record
//! object, an array of records, or an empty array for "no match". With
//! `sysparm_display_value=all` each field is a `{value, display_value}`
//! pair; plain string fields are accepted as well. Only `value` is
//! load-bearing except where noted.

use crate::error::{RemoteError, Result};
use glidegen_schema::{
    ElementRecord, FieldTypeRecord, PackageKind, PackageRecord, SysId, TableRecord,
};
use serde_json::{Map, Value};
use tracing::warn;

pub type Fields = Map<String, Value>;

pub const JSON_KEY_RESULT: &str = "result";
pub const JSON_KEY_VALUE: &str = "value";
pub const JSON_KEY_DISPLAY_VALUE: &str = "display_value";

pub const TABLE_SYS_DB_OBJECT: &str = "sys_db_object";
pub const TABLE_SYS_DICTIONARY: &str = "sys_dictionary";
pub const TABLE_SYS_GLIDE_OBJECT: &str = "sys_glide_object";

// ============================================================================
// Response shapes
// ============================================================================

fn result_property<'a>(uri: &str, body: &'a Value) -> Result<&'a Value> {
    let object = body
        .as_object()
        .ok_or_else(|| RemoteError::shape(uri, "response body is not a JSON object"))?;
    object
        .get(JSON_KEY_RESULT)
        .ok_or_else(|| RemoteError::ResultPropertyNotFound {
            uri: uri.to_string(),
        })
}

/// The single record of a lookup response.
///
/// An empty array is `Ok(None)`. Extra records are logged and ignored.
pub fn single_result(uri: &str, body: &Value) -> Result<Option<Fields>> {
    match result_property(uri, body)? {
        Value::Object(fields) => Ok(Some(fields.clone())),
        Value::Array(items) => match items.split_first() {
            None => Ok(None),
            Some((first, rest)) => {
                if !rest.is_empty() {
                    warn!(uri, excess = rest.len(), "Lookup matched several records; using the first");
                }
                first
                    .as_object()
                    .cloned()
                    .map(Some)
                    .ok_or_else(|| RemoteError::shape(uri, "result item is not an object"))
            }
        },
        other => Err(RemoteError::shape(
            uri,
            format!("result is {}", json_kind(other)),
        )),
    }
}

/// Every record of a list response. A lone object counts as one record.
pub fn list_result(uri: &str, body: &Value) -> Result<Vec<Fields>> {
    match result_property(uri, body)? {
        Value::Object(fields) => Ok(vec![fields.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .cloned()
                    .ok_or_else(|| RemoteError::shape(uri, "result item is not an object"))
            })
            .collect(),
        other => Err(RemoteError::shape(
            uri,
            format!("result is {}", json_kind(other)),
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Field access
// ============================================================================

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The `value` of a field, whichever way it was serialized.
pub fn field_value(fields: &Fields, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Object(pair) => pair.get(JSON_KEY_VALUE).and_then(scalar),
        other => scalar(other),
    }
}

/// The `display_value` of a field, falling back to its value.
pub fn field_display(fields: &Fields, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::Object(pair) => pair
            .get(JSON_KEY_DISPLAY_VALUE)
            .and_then(scalar)
            .or_else(|| pair.get(JSON_KEY_VALUE).and_then(scalar)),
        other => scalar(other),
    }
}

pub fn field_bool(fields: &Fields, key: &str) -> Option<bool> {
    field_value(fields, key).and_then(|v| match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    })
}

pub fn field_i32(fields: &Fields, key: &str) -> Option<i32> {
    field_value(fields, key).and_then(|v| v.parse().ok())
}

/// A sys_id-valued reference field. Non-id values such as the `global`
/// scope marker mean "no reference".
pub fn field_sys_id(fields: &Fields, key: &str) -> Option<String> {
    field_value(fields, key)
        .and_then(|v| SysId::parse(&v).ok())
        .map(|id| id.to_string())
}

fn owning_package_id(fields: &Fields) -> Option<String> {
    field_sys_id(fields, "sys_scope").or_else(|| field_sys_id(fields, "sys_package"))
}

// ============================================================================
// Record conversion
// ============================================================================

/// `sys_db_object` row.
pub fn table_record(fields: &Fields) -> TableRecord {
    TableRecord {
        sys_id: field_value(fields, "sys_id"),
        name: field_value(fields, "name"),
        label: field_value(fields, "label"),
        is_extendable: field_bool(fields, "is_extendable").unwrap_or(false),
        number_prefix: field_display(fields, "number_ref"),
        super_class: None,
        super_class_id: field_sys_id(fields, "super_class"),
        package: None,
        package_id: owning_package_id(fields),
    }
}

/// `sys_dictionary` row.
pub fn element_record(fields: &Fields) -> ElementRecord {
    ElementRecord {
        sys_id: field_value(fields, "sys_id"),
        table: field_value(fields, "name"),
        name: field_value(fields, "element"),
        label: field_value(fields, "column_label"),
        is_active: field_bool(fields, "active").unwrap_or(true),
        is_array: field_bool(fields, "array").unwrap_or(false),
        is_display: field_bool(fields, "display").unwrap_or(false),
        is_mandatory: field_bool(fields, "mandatory").unwrap_or(false),
        is_primary: field_bool(fields, "primary").unwrap_or(false),
        is_read_only: field_bool(fields, "read_only").unwrap_or(false),
        is_calculated: field_bool(fields, "virtual").unwrap_or(false),
        is_unique: field_bool(fields, "unique").unwrap_or(false),
        max_length: field_i32(fields, "max_length"),
        size_class: field_i32(fields, "sizeclass"),
        default_value: field_value(fields, "default_value"),
        comments: field_value(fields, "comments"),
        field_type: field_value(fields, "internal_type"),
        reference: field_value(fields, "reference"),
        package: None,
        package_id: owning_package_id(fields),
    }
}

/// `sys_glide_object` row.
pub fn field_type_record(fields: &Fields) -> FieldTypeRecord {
    FieldTypeRecord {
        sys_id: field_value(fields, "sys_id"),
        name: field_value(fields, "name"),
        label: field_value(fields, "label"),
        scalar_type: field_value(fields, "scalar_type"),
        scalar_length: field_i32(fields, "scalar_length"),
        class_name: field_value(fields, "class_name"),
        use_original_value: field_bool(fields, "use_original_value").unwrap_or(false),
        is_visible: field_bool(fields, "visible").unwrap_or(false),
        package: None,
        package_id: owning_package_id(fields),
    }
}

/// A row from whichever package table answered.
pub fn package_record(kind: PackageKind, fields: &Fields) -> PackageRecord {
    let (scope, version, plugin_id) = match kind {
        PackageKind::Package => (None, None, None),
        PackageKind::Plugin => (None, None, field_value(fields, "id")),
        _ => (
            field_value(fields, "scope"),
            field_value(fields, "version"),
            None,
        ),
    };
    PackageRecord {
        sys_id: field_value(fields, "sys_id"),
        name: field_value(fields, "name"),
        kind,
        short_description: field_value(fields, "short_description"),
        scope,
        version,
        plugin_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URI: &str = "https://dev.example.com/api/now/table/sys_db_object";

    #[test]
    fn empty_array_means_no_match() {
        assert!(single_result(URI, &json!({"result": []})).unwrap().is_none());
    }

    #[test]
    fn first_of_several_results_is_used() {
        let body = json!({"result": [{"name": "task"}, {"name": "incident"}]});
        let fields = single_result(URI, &body).unwrap().unwrap();
        assert_eq!(field_value(&fields, "name").as_deref(), Some("task"));
    }

    #[test]
    fn object_result_is_a_single_record() {
        let body = json!({"result": {"name": "task"}});
        assert_eq!(list_result(URI, &body).unwrap().len(), 1);
    }

    #[test]
    fn missing_result_and_odd_shapes_are_errors() {
        assert!(matches!(
            single_result(URI, &json!({"error": "nope"})),
            Err(RemoteError::ResultPropertyNotFound { .. })
        ));
        assert!(matches!(
            single_result(URI, &json!({"result": "task"})),
            Err(RemoteError::UnexpectedResponseShape { .. })
        ));
        assert!(matches!(
            list_result(URI, &json!([1, 2])),
            Err(RemoteError::UnexpectedResponseShape { .. })
        ));
    }

    #[test]
    fn reference_pairs_and_plain_values_both_read() {
        let fields = json!({
            "super_class": {"value": "8f1f1c4a1b7f5010a9c4a8f3b24bcb3a", "display_value": "Task"},
            "sys_scope": {"value": "global", "display_value": "Global"},
            "is_extendable": "true",
            "max_length": {"value": "160", "display_value": "160"},
            "label": "  ",
        });
        let fields = fields.as_object().unwrap();
        assert_eq!(
            field_sys_id(fields, "super_class").as_deref(),
            Some("8f1f1c4a1b7f5010a9c4a8f3b24bcb3a")
        );
        assert_eq!(field_display(fields, "super_class").as_deref(), Some("Task"));
        assert!(field_sys_id(fields, "sys_scope").is_none());
        assert_eq!(field_bool(fields, "is_extendable"), Some(true));
        assert_eq!(field_i32(fields, "max_length"), Some(160));
        assert!(field_value(fields, "label").is_none());
    }

    #[test]
    fn dictionary_rows_become_element_records() {
        let row = json!({
            "sys_id": {"value": "0a1b2c3d4e5f60718293a4b5c6d7e8f9", "display_value": "0a1b2c3d4e5f60718293a4b5c6d7e8f9"},
            "name": {"value": "incident", "display_value": "Incident"},
            "element": {"value": "caller_id", "display_value": "caller_id"},
            "column_label": {"value": "Caller", "display_value": "Caller"},
            "internal_type": {"value": "reference", "display_value": "Reference"},
            "reference": {"value": "sys_user", "display_value": "User"},
            "mandatory": {"value": "true", "display_value": "true"},
            "sys_scope": {"value": "global", "display_value": "Global"},
        });
        let record = element_record(row.as_object().unwrap());
        assert_eq!(record.table.as_deref(), Some("incident"));
        assert_eq!(record.name.as_deref(), Some("caller_id"));
        assert_eq!(record.field_type.as_deref(), Some("reference"));
        assert_eq!(record.reference.as_deref(), Some("sys_user"));
        assert!(record.is_mandatory);
        assert!(record.is_active);
        assert!(record.package_id.is_none());
    }

    #[test]
    fn package_fields_depend_on_kind() {
        let row = json!({
            "sys_id": "1a2b3c4d5e6f708192a3b4c5d6e7f809",
            "name": "Fleet",
            "scope": "x_acme_fleet",
            "version": "2.1.0",
            "id": "com.acme.fleet",
        });
        let fields = row.as_object().unwrap();
        let app = package_record(PackageKind::StoreApplication, fields);
        assert_eq!(app.scope.as_deref(), Some("x_acme_fleet"));
        assert!(app.plugin_id.is_none());
        let plugin = package_record(PackageKind::Plugin, fields);
        assert_eq!(plugin.plugin_id.as_deref(), Some("com.acme.fleet"));
        assert!(plugin.scope.is_none());
    }
}

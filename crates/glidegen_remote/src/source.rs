//! The remote schema source seam.

use crate::error::Result;
use crate::wire::{self, Fields, TABLE_SYS_DB_OBJECT, TABLE_SYS_DICTIONARY, TABLE_SYS_GLIDE_OBJECT};
use async_trait::async_trait;
use glidegen_schema::ids::eq_ignore_case;
use glidegen_schema::{
    ElementRecord, FieldTypeRecord, Fqdn, PackageKind, PackageRecord, SysId, TableRecord,
};
use serde_json::Value;
use tracing::debug;

// ============================================================================
// Queries
// ============================================================================

/// One condition of an encoded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals { field: String, value: String },
    IsNotEmpty(String),
}

/// A conjunction of conditions, rendered as a `sysparm_query` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    conditions: Vec<Condition>,
}

impl RecordQuery {
    pub fn equals(field: &str, value: &str) -> Self {
        Self::default().and_equals(field, value)
    }

    pub fn and_equals(mut self, field: &str, value: &str) -> Self {
        self.conditions.push(Condition::Equals {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn and_not_empty(mut self, field: &str) -> Self {
        self.conditions
            .push(Condition::IsNotEmpty(field.to_string()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Encoded query string, e.g. `name=task^elementISNOTEMPTY`.
    pub fn encoded(&self) -> String {
        self.conditions
            .iter()
            .map(|condition| match condition {
                Condition::Equals { field, value } => format!("{}={}", field, value),
                Condition::IsNotEmpty(field) => format!("{}ISNOTEMPTY", field),
            })
            .collect::<Vec<_>>()
            .join("^")
    }

    /// Evaluate against a record, comparing values case-insensitively.
    pub fn matches(&self, fields: &Fields) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Equals { field, value } => wire::field_value(fields, field)
                .map_or(false, |actual| eq_ignore_case(&actual, value)),
            Condition::IsNotEmpty(field) => wire::field_value(fields, field).is_some(),
        })
    }
}

/// Raw body of a Table API response and the URI it came from.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub uri: String,
    pub body: Value,
}

impl ApiResponse {
    pub fn single(&self) -> Result<Option<Fields>> {
        wire::single_result(&self.uri, &self.body)
    }

    pub fn list(&self) -> Result<Vec<Fields>> {
        wire::list_result(&self.uri, &self.body)
    }
}

// ============================================================================
// RemoteSchemaSource
// ============================================================================

/// Where schema records come from.
///
/// Implementors provide [`query`](Self::query); the lookups are built on it
/// so every transport shares one response-shape policy.
#[async_trait]
pub trait RemoteSchemaSource: Send + Sync {
    /// Host name of the instance this source reads from.
    fn fqdn(&self) -> &Fqdn;

    /// Run an encoded query against one remote table.
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<ApiResponse>;

    async fn get_table_by_name(&self, name: &str) -> Result<Option<TableRecord>> {
        let response = self
            .query(TABLE_SYS_DB_OBJECT, &RecordQuery::equals("name", name))
            .await?;
        Ok(response.single()?.map(|fields| wire::table_record(&fields)))
    }

    async fn get_table_by_id(&self, sys_id: &SysId) -> Result<Option<TableRecord>> {
        let response = self
            .query(TABLE_SYS_DB_OBJECT, &RecordQuery::equals("sys_id", sys_id.as_str()))
            .await?;
        Ok(response.single()?.map(|fields| wire::table_record(&fields)))
    }

    /// Column definitions of a table. The table's own collection row
    /// (blank element name) is excluded.
    async fn get_elements_by_table_name(&self, table: &str) -> Result<Vec<ElementRecord>> {
        let query = RecordQuery::equals("name", table).and_not_empty("element");
        let response = self.query(TABLE_SYS_DICTIONARY, &query).await?;
        Ok(response
            .list()?
            .iter()
            .map(wire::element_record)
            .collect())
    }

    async fn get_field_type_by_name(&self, name: &str) -> Result<Option<FieldTypeRecord>> {
        let response = self
            .query(TABLE_SYS_GLIDE_OBJECT, &RecordQuery::equals("name", name))
            .await?;
        Ok(response
            .single()?
            .map(|fields| wire::field_type_record(&fields)))
    }

    /// Try each package table in [`PackageKind::LOOKUP_ORDER`]; the first
    /// match wins.
    async fn get_package_by_identifier(&self, sys_id: &SysId) -> Result<Option<PackageRecord>> {
        let query = RecordQuery::equals("sys_id", sys_id.as_str());
        for kind in PackageKind::LOOKUP_ORDER {
            let response = self.query(kind.remote_table(), &query).await?;
            if let Some(fields) = response.single()? {
                return Ok(Some(wire::package_record(kind, &fields)));
            }
        }
        debug!(package = %sys_id, "No package table matched");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queries_encode_with_caret_separators() {
        let query = RecordQuery::equals("name", "incident").and_not_empty("element");
        assert_eq!(query.encoded(), "name=incident^elementISNOTEMPTY");
    }

    #[test]
    fn queries_match_case_insensitively() {
        let row = json!({"name": {"value": "Incident"}, "element": "caller_id"});
        let fields = row.as_object().unwrap();
        assert!(RecordQuery::equals("name", "incident")
            .and_not_empty("element")
            .matches(fields));
        assert!(!RecordQuery::equals("name", "incident")
            .and_not_empty("reference")
            .matches(fields));
    }
}

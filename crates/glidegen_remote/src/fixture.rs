//! In-memory schema source, loaded from JSON.
//!
//! A fixture file mirrors what the Table API would return:
//!
//! ```json
//! {
//!   "fqdn": "dev12345.service-now.com",
//!   "tables": {
//!     "sys_db_object": [ { "name": "task", "sys_id": "...", ... } ],
//!     "sys_dictionary": [ ... ],
//!     "sys_glide_object": [ ... ]
//!   }
//! }
//! ```
//!
//! Fields may be plain strings or `{value, display_value}` pairs.

use crate::error::{RemoteError, Result};
use crate::source::{ApiResponse, RecordQuery, RemoteSchemaSource};
use crate::wire::Fields;
use async_trait::async_trait;
use glidegen_schema::{CancellationToken, Fqdn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Deserialize)]
struct FixtureFile {
    fqdn: Fqdn,
    #[serde(default)]
    tables: HashMap<String, Vec<Value>>,
}

/// Schema source answering from records held in memory.
#[derive(Debug)]
pub struct FixtureSource {
    fqdn: Fqdn,
    tables: HashMap<String, Vec<Fields>>,
    cancel: CancellationToken,
    requests: AtomicUsize,
}

impl FixtureSource {
    pub fn new(fqdn: Fqdn) -> Self {
        Self {
            fqdn,
            tables: HashMap::new(),
            cancel: CancellationToken::new(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Add one record to a remote table. Non-object values are rejected.
    pub fn insert(&mut self, table: &str, record: Value) -> Result<()> {
        let fields = match record {
            Value::Object(fields) => fields,
            other => {
                return Err(RemoteError::Fixture(format!(
                    "record in '{}' is not an object: {}",
                    table, other
                )))
            }
        };
        self.tables
            .entry(table.to_ascii_lowercase())
            .or_default()
            .push(fields);
        Ok(())
    }

    pub fn with_record(mut self, table: &str, record: Value) -> Result<Self> {
        self.insert(table, record)?;
        Ok(self)
    }

    pub fn from_json(value: Value) -> Result<Self> {
        let file: FixtureFile =
            serde_json::from_value(value).map_err(|e| RemoteError::Fixture(e.to_string()))?;
        let mut source = Self::new(file.fqdn);
        let mut tables: Vec<(String, Vec<Value>)> = file.tables.into_iter().collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        for (table, records) in tables {
            for record in records {
                source.insert(&table, record)?;
            }
        }
        Ok(source)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            RemoteError::Fixture(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json(value)
    }

    /// Number of queries answered so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSchemaSource for FixtureSource {
    fn fqdn(&self) -> &Fqdn {
        &self.fqdn
    }

    async fn query(&self, table: &str, query: &RecordQuery) -> Result<ApiResponse> {
        if self.cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        self.requests.fetch_add(1, Ordering::SeqCst);

        let matches: Vec<Value> = self
            .tables
            .get(&table.to_ascii_lowercase())
            .map(|records| {
                records
                    .iter()
                    .filter(|fields| query.matches(fields))
                    .map(|fields| Value::Object(fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ApiResponse {
            uri: format!(
                "fixture://{}/api/now/table/{}?sysparm_query={}",
                self.fqdn,
                table,
                query.encoded()
            ),
            body: json!({ "result": matches }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glidegen_schema::{PackageKind, SysId};

    const STORE_APP_ID: &str = "1a2b3c4d5e6f708192a3b4c5d6e7f809";

    fn fixture() -> FixtureSource {
        FixtureSource::from_json(json!({
            "fqdn": "dev.example.com",
            "tables": {
                "sys_db_object": [
                    {"sys_id": "8f1f1c4a1b7f5010a9c4a8f3b24bcb3a", "name": "task", "label": "Task"}
                ],
                "sys_dictionary": [
                    {"sys_id": "0a1b2c3d4e5f60718293a4b5c6d7e8f9", "name": "task", "element": ""},
                    {"sys_id": "0a1b2c3d4e5f60718293a4b5c6d7e8fa", "name": "task", "element": "number"},
                    {"sys_id": "0a1b2c3d4e5f60718293a4b5c6d7e8fb", "name": "task", "element": "active"}
                ],
                "sys_store_app": [
                    {"sys_id": STORE_APP_ID, "name": "Fleet", "scope": "x_acme_fleet", "source": "x_acme_fleet"}
                ],
                "sys_scope": [
                    {"sys_id": STORE_APP_ID, "name": "Fleet", "scope": "x_acme_fleet"}
                ]
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn lookups_by_name_ignore_case() {
        let source = fixture();
        let table = source.get_table_by_name("TASK").await.unwrap().unwrap();
        assert_eq!(table.label.as_deref(), Some("Task"));
        assert!(source.get_table_by_name("incident").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn collection_rows_are_not_columns() {
        let source = fixture();
        let elements = source.get_elements_by_table_name("task").await.unwrap();
        let names: Vec<_> = elements.iter().filter_map(|e| e.name.as_deref()).collect();
        assert_eq!(names, vec!["number", "active"]);
    }

    #[tokio::test]
    async fn package_lookup_prefers_store_app_over_scope() {
        let source = fixture();
        let id = SysId::parse(STORE_APP_ID).unwrap();
        let package = source
            .get_package_by_identifier(&id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(package.kind, PackageKind::StoreApplication);
        assert_eq!(package.scope.as_deref(), Some("x_acme_fleet"));
        // plugin table queried first, then the store app table answered
        assert_eq!(source.request_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_source_refuses_queries() {
        let cancel = CancellationToken::new();
        let source = fixture().with_cancellation(cancel.clone());
        cancel.cancel();
        assert!(matches!(
            source.get_table_by_name("task").await,
            Err(RemoteError::Cancelled)
        ));
    }

    #[test]
    fn non_object_records_are_rejected() {
        let mut source = FixtureSource::new(Fqdn::parse("dev.example.com").unwrap());
        assert!(source.insert("sys_db_object", json!("task")).is_err());
    }
}

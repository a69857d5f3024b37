//! Plain-data image of the cache, used to persist it between runs.

use crate::entity::Source;
use crate::record::{ElementRecord, FieldTypeRecord, PackageRecord, TableRecord};
use chrono::{DateTime, Utc};
use glidegen_ids::Fqdn;
use serde::{Deserialize, Serialize};

/// A record together with the instance it came from and when it was merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<R> {
    pub source: Fqdn,
    pub record: R,
    pub last_updated: DateTime<Utc>,
}

/// Every fully resolved entity in the cache. Stubs are not included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub sources: Vec<Source>,
    pub packages: Vec<Stored<PackageRecord>>,
    pub field_types: Vec<Stored<FieldTypeRecord>>,
    pub tables: Vec<Stored<TableRecord>>,
    pub elements: Vec<Stored<ElementRecord>>,
}

impl CacheSnapshot {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
            && self.field_types.is_empty()
            && self.tables.is_empty()
            && self.elements.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.packages.len() + self.field_types.len() + self.tables.len() + self.elements.len()
    }
}

//! Entity cache for remote schema metadata.
//!
//! Tables, columns, scalar types and packages mirrored from a remote
//! instance, keyed by case-insensitive natural key. Cross references start
//! out as names and upgrade to canonical handles as their targets arrive.

pub mod cache;
pub mod cancel;
pub mod cross_ref;
pub mod entity;
pub mod error;
pub mod handle;
pub mod record;
pub mod snapshot;

pub use cache::{EntityCache, EntityHandle, PendingReference};
pub use cancel::CancellationToken;
pub use cross_ref::CrossRef;
pub use entity::{
    Element, ElementFlags, ElementKey, EntityKind, EntityState, FieldType, NaturalKey, Package,
    PackageDetail, PackageKind, Source, Table,
};
pub use error::{CacheError, Result};
pub use handle::{Handle, Record};
pub use record::{ElementRecord, FieldTypeRecord, PackageRecord, SchemaRecord, TableRecord};
pub use snapshot::{CacheSnapshot, Stored};

pub use glidegen_ids as ids;
pub use glidegen_ids::{Fqdn, Name, SysId};

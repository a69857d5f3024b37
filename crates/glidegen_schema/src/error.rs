//! Error types for the entity cache.

use crate::entity::EntityKind;
use thiserror::Error;

/// Cache operation result type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Entity cache errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A record arrived without the name or sys_id that identifies it.
    /// Fatal for that record only.
    #[error("Incomplete {kind} record: {detail}")]
    IncompleteRecord { kind: EntityKind, detail: String },

    /// A cross reference and the entity offered to satisfy it disagree.
    #[error("Resolution inconsistency on {kind} reference: expected '{expected}', got '{found}'")]
    ResolutionInconsistency {
        kind: EntityKind,
        expected: String,
        found: String,
    },

    /// A record pointed at a sys_id the cache has never seen.
    #[error("Unknown {kind} sys_id '{sys_id}' on {origin}")]
    UnknownReference {
        kind: EntityKind,
        sys_id: String,
        origin: String,
    },

    /// A table named itself as its own superclass.
    #[error("Table '{0}' names itself as superclass")]
    SelfInheritance(String),

    /// The entity kind cannot be created from a name alone.
    #[error("{0} entities cannot be resolved by name")]
    Unsupported(EntityKind),

    /// A lock guarding cache state was poisoned by a panicking writer.
    #[error("Cache lock poisoned: {0}")]
    Poisoned(&'static str),
}

impl CacheError {
    /// Create an incomplete record error.
    pub fn incomplete(kind: EntityKind, detail: impl Into<String>) -> Self {
        Self::IncompleteRecord {
            kind,
            detail: detail.into(),
        }
    }

    /// Create a resolution inconsistency error.
    pub fn inconsistent(
        kind: EntityKind,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::ResolutionInconsistency {
            kind,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// True when the error only invalidates the record that caused it.
    pub fn is_record_scoped(&self) -> bool {
        matches!(self, Self::IncompleteRecord { .. })
    }
}

//! Canonical entity handles.
//!
//! The cache hands out exactly one `Handle<T>` per natural key. The key is
//! immutable and lives outside the lock; everything mutable sits behind a
//! per-entity `RwLock`, so a reader always observes a whole before- or
//! after-state of an upsert.
//!
//! Never call back into `EntityCache` while holding a guard returned by
//! [`Handle::read`]. Writers take the cache index first and entity locks
//! second.

use crate::entity::{EntityKind, EntityState};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use glidegen_ids::{Fqdn, Name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Entity payload stored behind a handle.
pub trait Record: fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    const KIND: EntityKind;

    fn key_name(key: &Self::Key) -> &Name;

    fn key_source(key: &Self::Key) -> &Fqdn;

    fn state(&self) -> EntityState;

    fn last_updated(&self) -> DateTime<Utc>;
}

struct Inner<T: Record> {
    key: T::Key,
    data: RwLock<T>,
}

/// Shared, canonical reference to a cached entity.
pub struct Handle<T: Record> {
    inner: Arc<Inner<T>>,
}

impl<T: Record> Handle<T> {
    pub(crate) fn new(key: T::Key, data: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                key,
                data: RwLock::new(data),
            }),
        }
    }

    pub fn key(&self) -> &T::Key {
        &self.inner.key
    }

    pub fn name(&self) -> &Name {
        T::key_name(&self.inner.key)
    }

    pub fn source(&self) -> &Fqdn {
        T::key_source(&self.inner.key)
    }

    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    /// Take the entity read lock.
    pub fn read(&self) -> Result<RwLockReadGuard<'_, T>> {
        self.inner
            .data
            .read()
            .map_err(|_| CacheError::Poisoned(T::KIND.as_str()))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, T>> {
        self.inner
            .data
            .write()
            .map_err(|_| CacheError::Poisoned(T::KIND.as_str()))
    }

    /// True when both handles point at the same cached instance.
    pub fn same_entity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// True while the entity is known only by name.
    pub fn is_stub(&self) -> Result<bool> {
        Ok(self.read()?.state() == EntityState::Stub)
    }
}

impl<T: Record> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_entity(other) || self.inner.key == other.inner.key
    }
}

impl<T: Record> Eq for Handle<T> {}

impl<T: Record> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.key.hash(state);
    }
}

impl<T: Record> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", T::KIND, self.inner.key)
    }
}

//! Name-or-handle cross references between cached entities.

use crate::error::{CacheError, Result};
use crate::handle::{Handle, Record};
use glidegen_ids::Name;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A reference to another entity, held either by name or by canonical handle.
///
/// The two representations can never disagree: a resolved reference has no
/// separate name, and the only transitions are the methods below. Callers
/// mutate a `CrossRef` while holding the owning entity's write lock, which
/// makes every transition atomic for other readers of that entity.
pub enum CrossRef<T: Record> {
    Unresolved(Name),
    Resolved(Handle<T>),
}

impl<T: Record> CrossRef<T> {
    pub fn named(name: Name) -> Self {
        Self::Unresolved(name)
    }

    pub fn name(&self) -> &Name {
        match self {
            Self::Unresolved(name) => name,
            Self::Resolved(handle) => handle.name(),
        }
    }

    pub fn handle(&self) -> Option<&Handle<T>> {
        match self {
            Self::Unresolved(_) => None,
            Self::Resolved(handle) => Some(handle),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Point the reference at `name`.
    ///
    /// A resolved handle survives when it already carries that name;
    /// otherwise the reference drops back to name-only.
    pub fn set_name(&mut self, name: Name) {
        if let Self::Resolved(handle) = self {
            if handle.name() == &name {
                return;
            }
        }
        *self = Self::Unresolved(name);
    }

    /// Replace the reference with `handle`. The handle is authoritative.
    pub fn set_resolved(&mut self, handle: Handle<T>) {
        *self = Self::Resolved(handle);
    }

    /// Upgrade a name-only reference to the entity it names.
    ///
    /// Returns `Ok(true)` when the reference changed. A name that differs from
    /// the handle's, or a different instance already holding the slot, is an
    /// inconsistency and is reported rather than overwritten.
    pub fn upgrade(&mut self, handle: &Handle<T>) -> Result<bool> {
        match self {
            Self::Unresolved(name) => {
                if name != handle.name() {
                    return Err(CacheError::inconsistent(
                        T::KIND,
                        name.as_str(),
                        handle.name().as_str(),
                    ));
                }
                *self = Self::Resolved(handle.clone());
                Ok(true)
            }
            Self::Resolved(existing) => {
                if existing.same_entity(handle) {
                    Ok(false)
                } else {
                    Err(CacheError::inconsistent(
                        T::KIND,
                        format!("{:?}", existing),
                        format!("{:?}", handle),
                    ))
                }
            }
        }
    }
}

/// Apply `set_name` semantics to an optional reference slot.
pub fn assign_name<T: Record>(slot: &mut Option<CrossRef<T>>, name: Option<Name>) {
    match (slot.as_mut(), name) {
        (_, None) => *slot = None,
        (Some(existing), Some(name)) => existing.set_name(name),
        (None, Some(name)) => *slot = Some(CrossRef::Unresolved(name)),
    }
}

impl<T: Record> Clone for CrossRef<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unresolved(name) => Self::Unresolved(name.clone()),
            Self::Resolved(handle) => Self::Resolved(handle.clone()),
        }
    }
}

/// Equality compares names, whichever representation each side holds.
impl<T: Record> PartialEq for CrossRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl<T: Record> Eq for CrossRef<T> {}

impl<T: Record> Hash for CrossRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl<T: Record> fmt::Debug for CrossRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(name) => write!(f, "Unresolved({})", name),
            Self::Resolved(handle) => write!(f, "Resolved({:?})", handle),
        }
    }
}

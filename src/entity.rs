//! Entity identity and staleness tracking.
//!
//! Everything the crate serves is keyed by a stable 64-bit identity. The
//! provider layer never looks inside an entity; it only needs the id accessor
//! ([`Identified`]) and a staleness flag it manages itself ([`Entry`]).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable 64-bit identifier for an entity.
///
/// Once assigned, an `EntityId` never changes for the lifetime of the object
/// it names.
///
/// # Examples
///
/// ```
/// use strata::EntityId;
///
/// let id = EntityId::new(42);
/// assert_eq!(id.raw(), 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity id from a raw 64-bit value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Identifier accessor for identity-bearing records.
///
/// The provider is generic over any entity type that can name its own id.
pub trait Identified {
    /// Returns the stable identity of this record.
    fn id(&self) -> EntityId;
}

impl<V: Identified> Identified for Arc<V> {
    fn id(&self) -> EntityId {
        (**self).id()
    }
}

impl<V: Identified + ?Sized> Identified for &V {
    fn id(&self) -> EntityId {
        (**self).id()
    }
}

/// An entity paired with its provider-managed staleness flag.
///
/// The flag is only ever *set* by the provider; it is never cleared in place.
/// A stale entry is superseded by a fresh `Entry` taking its slot in the
/// cache. Application code can observe staleness but cannot mutate it.
#[derive(Debug)]
pub struct Entry<T> {
    value: T,
    stale: AtomicBool,
}

impl<T> Entry<T> {
    /// Wraps a freshly obtained entity.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            stale: AtomicBool::new(false),
        }
    }

    /// Wraps an entity whose stored copy is already known to be stale.
    ///
    /// Local stores use this to report persisted staleness on lookup.
    #[must_use]
    pub fn stale(value: T) -> Self {
        Self {
            value,
            stale: AtomicBool::new(true),
        }
    }

    /// Returns the wrapped entity.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns true if this copy may be outdated and due for refresh.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Flags this copy as stale. Provider-internal; the flag is cleared only
    /// by a fresh entry superseding this one.
    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

impl<T: Identified> Identified for Entry<T> {
    fn id(&self) -> EntityId {
        self.value.id()
    }
}

/// Shared handle to a cached entity.
///
/// Entries are shared between the memory cache, result sets, and callers;
/// the last holder keeps the entity alive.
pub type EntityRef<T> = Arc<Entry<T>>;

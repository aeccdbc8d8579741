//! Collaborator contracts the provider depends on.
//!
//! The surrounding application implements these traits; the provider composes
//! injected values rather than exposing internal state to subclasses. Each
//! tier owns its own failure mode: the cache is infallible, the local store
//! fails with [`LocalStoreError`], the remote origin with [`TransportError`].

use crate::entity::{Entry, EntityId, EntityRef};
use crate::error::{LocalStoreError, TransportError};
use crate::ids::IdSet;

/// A bounded, eviction-capable id-to-entity cache.
///
/// Eviction policy is opaque to the provider (LRU is typical but not
/// required). If several providers share one cache, the implementation must
/// be safe for concurrent access; the provider assumes but does not enforce
/// this.
pub trait MemoryCache<T>: Send + Sync {
    /// Looks up a cached entry by id.
    fn get(&self, id: EntityId) -> Option<EntityRef<T>>;

    /// Inserts or replaces the entry for `id`, possibly evicting another.
    fn put(&self, id: EntityId, entry: EntityRef<T>);
}

/// Durable local lookup, update, and stale-marking by id.
pub trait LocalStore<T>: Send + Sync {
    /// Retrieves the stored copy of `id`, carrying its persisted staleness.
    ///
    /// # Errors
    /// [`LocalStoreError`] when persistence is unavailable.
    fn get(&self, id: EntityId) -> Result<Option<Entry<T>>, LocalStoreError>;

    /// Persists a fresh copy of one entity, clearing any stale marking.
    ///
    /// # Errors
    /// [`LocalStoreError`] when persistence is unavailable.
    fn update(&self, entity: &T) -> Result<(), LocalStoreError>;

    /// Persists fresh copies of a batch of entities.
    ///
    /// # Errors
    /// [`LocalStoreError`] when persistence is unavailable.
    fn update_bulk(&self, entities: &[T]) -> Result<(), LocalStoreError>;

    /// Marks the stored copy of `id` stale. Unknown ids are a no-op.
    ///
    /// # Errors
    /// [`LocalStoreError`] when persistence is unavailable.
    fn mark_stale(&self, id: EntityId) -> Result<(), LocalStoreError>;

    /// Marks the stored copies of every id in `ids` stale.
    ///
    /// # Errors
    /// [`LocalStoreError`] when persistence is unavailable.
    fn mark_stale_bulk(&self, ids: &IdSet) -> Result<(), LocalStoreError>;
}

/// Network lookup and bulk lookup by id.
///
/// Retries and backoff, if any, belong to the implementation; the provider
/// never retries.
pub trait RemoteStore<T>: Send + Sync {
    /// Collaborator-defined hint telling the origin how complete an answer to
    /// return (e.g. full vs. best-effort).
    type Request: Send + Sync;

    /// Fetches a single entity, `None` when the origin does not know the id.
    ///
    /// # Errors
    /// [`TransportError`] when the origin is unreachable or answers invalidly.
    fn fetch(
        &self,
        id: EntityId,
        request: Option<&Self::Request>,
    ) -> Result<Option<T>, TransportError>;

    /// Fetches a batch of entities in one round trip. Ids unknown to the
    /// origin are simply absent from the returned list.
    ///
    /// # Errors
    /// [`TransportError`] when the origin is unreachable or answers invalidly.
    fn fetch_bulk(
        &self,
        ids: &IdSet,
        request: Option<&Self::Request>,
    ) -> Result<Vec<T>, TransportError>;
}

impl<T, C: MemoryCache<T>> MemoryCache<T> for std::sync::Arc<C> {
    fn get(&self, id: EntityId) -> Option<EntityRef<T>> {
        (**self).get(id)
    }

    fn put(&self, id: EntityId, entry: EntityRef<T>) {
        (**self).put(id, entry);
    }
}

impl<T, L: LocalStore<T>> LocalStore<T> for std::sync::Arc<L> {
    fn get(&self, id: EntityId) -> Result<Option<Entry<T>>, LocalStoreError> {
        (**self).get(id)
    }

    fn update(&self, entity: &T) -> Result<(), LocalStoreError> {
        (**self).update(entity)
    }

    fn update_bulk(&self, entities: &[T]) -> Result<(), LocalStoreError> {
        (**self).update_bulk(entities)
    }

    fn mark_stale(&self, id: EntityId) -> Result<(), LocalStoreError> {
        (**self).mark_stale(id)
    }

    fn mark_stale_bulk(&self, ids: &IdSet) -> Result<(), LocalStoreError> {
        (**self).mark_stale_bulk(ids)
    }
}

impl<T, R: RemoteStore<T>> RemoteStore<T> for std::sync::Arc<R> {
    type Request = R::Request;

    fn fetch(
        &self,
        id: EntityId,
        request: Option<&Self::Request>,
    ) -> Result<Option<T>, TransportError> {
        (**self).fetch(id, request)
    }

    fn fetch_bulk(
        &self,
        ids: &IdSet,
        request: Option<&Self::Request>,
    ) -> Result<Vec<T>, TransportError> {
        (**self).fetch_bulk(ids, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the contracts are object-safe.
    fn _assert_cache_object_safe(_: &dyn MemoryCache<u64>) {}
    fn _assert_local_object_safe(_: &dyn LocalStore<u64>) {}
    fn _assert_remote_object_safe(_: &dyn RemoteStore<u64, Request = ()>) {}
}

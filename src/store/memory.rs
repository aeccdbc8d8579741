//! In-memory reference backends.
//!
//! Thread-safe reference implementations of the collaborator contracts, for
//! embedded use, tests, and documentation. The remote and local backends keep
//! call counters so tests can verify which tiers an operation touched and how
//! bulk misses were coalesced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::entity::{Entry, EntityId, EntityRef, Identified};
use crate::error::{LocalStoreError, TransportError};
use crate::ids::IdSet;
use crate::store::traits::{LocalStore, MemoryCache, RemoteStore};

struct Slot<T> {
    entry: EntityRef<T>,
    last_used: AtomicU64,
}

/// A bounded least-recently-used [`MemoryCache`].
///
/// Use recency is tracked with a monotonic tick; eviction scans for the
/// minimum, which is fine at the small capacities a per-provider cache runs
/// at.
pub struct LruCache<T> {
    capacity: usize,
    tick: AtomicU64,
    slots: RwLock<HashMap<EntityId, Slot<T>>>,
}

impl<T> LruCache<T> {
    /// Creates a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: AtomicU64::new(0),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of currently cached entries.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl<T: Send + Sync> MemoryCache<T> for LruCache<T> {
    fn get(&self, id: EntityId) -> Option<EntityRef<T>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(&id)?;
        slot.last_used.store(self.next_tick(), Ordering::Relaxed);
        Some(EntityRef::clone(&slot.entry))
    }

    fn put(&self, id: EntityId, entry: EntityRef<T>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if !slots.contains_key(&id) && slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                slots.remove(&oldest);
            }
        }
        slots.insert(
            id,
            Slot {
                entry,
                last_used: AtomicU64::new(self.next_tick()),
            },
        );
    }
}

struct Record<T> {
    value: T,
    stale: bool,
}

/// An in-memory [`LocalStore`] with read/write call counters.
#[derive(Default)]
pub struct MemoryLocalStore<T> {
    records: RwLock<HashMap<EntityId, Record<T>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl<T: Identified + Clone> MemoryLocalStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Seeds a fresh record, bypassing the write counter.
    pub fn seed(&self, value: T) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(
            value.id(),
            Record {
                value,
                stale: false,
            },
        );
    }

    /// Seeds a record already marked stale.
    pub fn seed_stale(&self, value: T) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(value.id(), Record { value, stale: true });
    }

    /// Number of lookups served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of records persisted so far (bulk updates count per record).
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the persisted staleness of `id`, or `None` if unknown.
    pub fn staleness(&self, id: EntityId) -> Option<bool> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(&id).map(|record| record.stale)
    }
}

impl<T: Identified + Clone + Send + Sync> LocalStore<T> for MemoryLocalStore<T> {
    fn get(&self, id: EntityId) -> Result<Option<Entry<T>>, LocalStoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&id).map(|record| {
            if record.stale {
                Entry::stale(record.value.clone())
            } else {
                Entry::new(record.value.clone())
            }
        }))
    }

    fn update(&self, entity: &T) -> Result<(), LocalStoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(
            entity.id(),
            Record {
                value: entity.clone(),
                stale: false,
            },
        );
        Ok(())
    }

    fn update_bulk(&self, entities: &[T]) -> Result<(), LocalStoreError> {
        self.writes
            .fetch_add(entities.len() as u64, Ordering::Relaxed);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for entity in entities {
            records.insert(
                entity.id(),
                Record {
                    value: entity.clone(),
                    stale: false,
                },
            );
        }
        Ok(())
    }

    fn mark_stale(&self, id: EntityId) -> Result<(), LocalStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(&id) {
            record.stale = true;
        }
        Ok(())
    }

    fn mark_stale_bulk(&self, ids: &IdSet) -> Result<(), LocalStoreError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if let Some(record) = records.get_mut(&id) {
                record.stale = true;
            }
        }
        Ok(())
    }
}

/// Richness hint understood by the reference remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Richness {
    /// Demand a complete answer.
    Full,
    /// Accept a best-effort, possibly partial answer.
    Partial,
}

/// An in-memory [`RemoteStore`] over a fixture map.
///
/// Records every single and bulk fetch, including the id set of each bulk
/// round trip and the richness hints seen, and can be switched to an
/// unreachable state to exercise transport failures.
#[derive(Default)]
pub struct MemoryRemoteStore<T> {
    records: RwLock<HashMap<EntityId, T>>,
    fetches: AtomicU64,
    bulk_fetches: AtomicU64,
    bulk_requests: Mutex<Vec<Vec<EntityId>>>,
    hints: Mutex<Vec<Option<Richness>>>,
    unreachable: AtomicBool,
}

impl<T: Identified + Clone> MemoryRemoteStore<T> {
    /// Creates an empty origin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            bulk_fetches: AtomicU64::new(0),
            bulk_requests: Mutex::new(Vec::new()),
            hints: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Seeds the origin fixture with a value.
    pub fn seed(&self, value: T) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(value.id(), value);
    }

    /// Removes a value from the origin fixture.
    pub fn remove(&self, id: EntityId) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(&id);
    }

    /// Simulates the origin becoming unreachable (or reachable again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    /// Number of single fetches issued.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of bulk fetches issued.
    pub fn bulk_fetch_count(&self) -> u64 {
        self.bulk_fetches.load(Ordering::Relaxed)
    }

    /// The id set of every bulk round trip, in call order.
    pub fn bulk_requests(&self) -> Vec<Vec<EntityId>> {
        self.bulk_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The richness hints seen, in call order across single and bulk fetches.
    pub fn hints(&self) -> Vec<Option<Richness>> {
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.unreachable.load(Ordering::Relaxed) {
            Err(TransportError::new("origin unreachable"))
        } else {
            Ok(())
        }
    }

    fn record_hint(&self, request: Option<&Richness>) {
        self.hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.copied());
    }
}

impl<T: Identified + Clone + Send + Sync> RemoteStore<T> for MemoryRemoteStore<T> {
    type Request = Richness;

    fn fetch(
        &self,
        id: EntityId,
        request: Option<&Self::Request>,
    ) -> Result<Option<T>, TransportError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.record_hint(request);
        self.check_reachable()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&id).cloned())
    }

    fn fetch_bulk(
        &self,
        ids: &IdSet,
        request: Option<&Self::Request>,
    ) -> Result<Vec<T>, TransportError> {
        self.bulk_fetches.fetch_add(1, Ordering::Relaxed);
        self.record_hint(request);
        self.bulk_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.iter().collect());
        self.check_reachable()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids.iter().filter_map(|id| records.get(&id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: EntityId,
        name: String,
    }

    impl Identified for Widget {
        fn id(&self) -> EntityId {
            self.id
        }
    }

    fn widget(id: u64, name: &str) -> Widget {
        Widget {
            id: EntityId::new(id),
            name: name.to_string(),
        }
    }

    fn entry(id: u64, name: &str) -> EntityRef<Widget> {
        Arc::new(Entry::new(widget(id, name)))
    }

    #[test]
    fn test_lru_cache_hit_and_miss() {
        let cache = LruCache::new(4);
        cache.put(EntityId::new(1), entry(1, "a"));
        assert!(cache.get(EntityId::new(1)).is_some());
        assert!(cache.get(EntityId::new(2)).is_none());
    }

    #[test]
    fn test_lru_cache_evicts_least_recently_used() {
        let cache = LruCache::new(2);
        cache.put(EntityId::new(1), entry(1, "a"));
        cache.put(EntityId::new(2), entry(2, "b"));
        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.get(EntityId::new(1)).is_some());
        cache.put(EntityId::new(3), entry(3, "c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(EntityId::new(1)).is_some());
        assert!(cache.get(EntityId::new(2)).is_none());
        assert!(cache.get(EntityId::new(3)).is_some());
    }

    #[test]
    fn test_lru_cache_replaces_in_place() {
        let cache = LruCache::new(1);
        cache.put(EntityId::new(1), entry(1, "a"));
        cache.put(EntityId::new(1), entry(1, "b"));
        assert_eq!(cache.len(), 1);
        let hit = cache.get(EntityId::new(1)).unwrap();
        assert_eq!(hit.value().name, "b");
    }

    #[test]
    fn test_local_store_reports_staleness() {
        let store = MemoryLocalStore::new();
        store.seed(widget(1, "fresh"));
        store.seed_stale(widget(2, "old"));

        let fresh = store.get(EntityId::new(1)).unwrap().unwrap();
        assert!(!fresh.is_stale());
        let stale = store.get(EntityId::new(2)).unwrap().unwrap();
        assert!(stale.is_stale());
        assert!(store.get(EntityId::new(3)).unwrap().is_none());
        assert_eq!(store.read_count(), 3);
    }

    #[test]
    fn test_local_store_update_clears_staleness() {
        let store = MemoryLocalStore::new();
        store.seed_stale(widget(1, "old"));
        store.update(&widget(1, "new")).unwrap();
        assert_eq!(store.staleness(EntityId::new(1)), Some(false));
        let entry = store.get(EntityId::new(1)).unwrap().unwrap();
        assert_eq!(entry.value().name, "new");
    }

    #[test]
    fn test_local_store_mark_stale_bulk() {
        let store = MemoryLocalStore::new();
        store.seed(widget(1, "a"));
        store.seed(widget(2, "b"));
        let ids: IdSet = [1u64, 2, 99].into_iter().collect();
        store.mark_stale_bulk(&ids).unwrap();
        assert_eq!(store.staleness(EntityId::new(1)), Some(true));
        assert_eq!(store.staleness(EntityId::new(2)), Some(true));
        assert_eq!(store.staleness(EntityId::new(99)), None);
    }

    #[test]
    fn test_remote_store_bulk_records_requests() {
        let store = MemoryRemoteStore::new();
        store.seed(widget(5, "b"));
        store.seed(widget(9, "c"));

        let ids: IdSet = [5u64, 9, 11].into_iter().collect();
        let values = store.fetch_bulk(&ids, Some(&Richness::Full)).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(store.bulk_fetch_count(), 1);
        assert_eq!(
            store.bulk_requests(),
            vec![vec![EntityId::new(5), EntityId::new(9), EntityId::new(11)]]
        );
        assert_eq!(store.hints(), vec![Some(Richness::Full)]);
    }

    #[test]
    fn test_remote_store_unreachable() {
        let store = MemoryRemoteStore::new();
        store.seed(widget(1, "a"));
        store.set_unreachable(true);
        assert!(store.fetch(EntityId::new(1), None).is_err());
        store.set_unreachable(false);
        assert_eq!(store.fetch(EntityId::new(1), None).unwrap().unwrap().name, "a");
    }
}

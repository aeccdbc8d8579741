//! The tier orchestrator.
//!
//! [`Provider`] serves entities by id out of a memory cache, falling through
//! to a local durable store and finally to a remote origin. Bulk lookups
//! coalesce misses so a call of any size costs at most two remote round
//! trips: one to fill gaps, one to refresh entries still flagged stale.
//!
//! The provider performs no internal locking. It is designed to run on a
//! single sequential worker (see [`crate::server`]) and relies on that
//! external serialization for the correctness of its cache mutations.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::entity::{Entry, EntityId, EntityRef, Identified};
use crate::error::{StrataError, StrataResult};
use crate::ids::IdSet;
use crate::results::ResultSet;
use crate::store::{LocalStore, MemoryCache, RemoteStore};

/// Whether a lookup may fall through to the remote origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Permit remote fallback.
    All,
    /// Never contact the remote origin.
    LocalOnly,
}

/// A failed single-entity lookup.
///
/// Carries the stale copy when one was available, so callers can distinguish
/// stale-but-available from missing.
#[derive(Debug)]
pub struct GetError<T> {
    /// The collaborator failure that aborted the lookup.
    pub error: StrataError,
    /// The previously cached or stored copy, still flagged stale.
    pub stale: Option<EntityRef<T>>,
}

impl<T> GetError<T> {
    fn new(error: impl Into<StrataError>, stale: Option<EntityRef<T>>) -> Self {
        Self {
            error: error.into(),
            stale,
        }
    }
}

impl<T> fmt::Display for GetError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for GetError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A failed bulk lookup.
///
/// The two remote phases are independently atomic: a failing phase discards
/// its entire batch, but everything resolved before it is surfaced here.
#[derive(Debug)]
pub struct BulkError<T> {
    /// The collaborator failure that aborted the failing phase.
    pub error: StrataError,
    /// Entries resolved before the failing phase.
    pub resolved: ResultSet<EntityRef<T>>,
}

impl<T> BulkError<T> {
    fn new(error: impl Into<StrataError>, resolved: ResultSet<EntityRef<T>>) -> Self {
        Self {
            error: error.into(),
            resolved,
        }
    }
}

impl<T> fmt::Display for BulkError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for BulkError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Serves entities by id through the cache, local, and remote tiers.
///
/// The collaborators are injected values; the provider owns no long-lived
/// state beyond them.
///
/// # Examples
///
/// ```
/// use strata::{EntityId, Identified, LruCache, MemoryLocalStore, MemoryRemoteStore,
///              Provider, Scope};
///
/// #[derive(Clone, Debug)]
/// struct User {
///     id: EntityId,
///     name: String,
/// }
///
/// impl Identified for User {
///     fn id(&self) -> EntityId {
///         self.id
///     }
/// }
///
/// let local = MemoryLocalStore::new();
/// local.seed(User { id: EntityId::new(3), name: "ada".into() });
///
/// let provider = Provider::new(LruCache::new(64), local, MemoryRemoteStore::new());
/// let hit = provider.get(EntityId::new(3), Scope::LocalOnly, None).unwrap();
/// assert_eq!(hit.unwrap().value().name, "ada");
/// ```
pub struct Provider<T, C, L, R> {
    cache: C,
    local: L,
    remote: R,
    _entity: PhantomData<fn() -> T>,
}

impl<T, C, L, R> Provider<T, C, L, R>
where
    T: Identified,
    C: MemoryCache<T>,
    L: LocalStore<T>,
    R: RemoteStore<T>,
{
    /// Creates a provider over the injected collaborators.
    pub fn new(cache: C, local: L, remote: R) -> Self {
        Self {
            cache,
            local,
            remote,
            _entity: PhantomData,
        }
    }

    /// Gets a single entity by id.
    ///
    /// A fresh cache hit returns immediately without touching the local or
    /// remote tier. A miss (or stale hit) falls through to the local store
    /// and then, under [`Scope::All`], to the remote origin. `None` means
    /// not found; with [`Scope::LocalOnly`] an absent or known-stale entry is
    /// reported as not found without any remote call.
    ///
    /// # Errors
    /// [`GetError`] on a collaborator failure. When a stale copy was in hand
    /// it rides along in the error, still flagged stale.
    pub fn get(
        &self,
        id: EntityId,
        scope: Scope,
        request: Option<&R::Request>,
    ) -> Result<Option<EntityRef<T>>, GetError<T>> {
        let mut stale_copy = None;

        if let Some(hit) = self.cache.get(id) {
            if !hit.is_stale() {
                trace!(%id, "cache hit");
                return Ok(Some(hit));
            }
            trace!(%id, "stale cache hit");
            stale_copy = Some(hit);
        }

        match self.local.get(id) {
            Ok(Some(entry)) => {
                let entry: EntityRef<T> = Arc::new(entry);
                self.cache.put(id, Arc::clone(&entry));
                if !entry.is_stale() {
                    trace!(%id, "local hit");
                    return Ok(Some(entry));
                }
                stale_copy = Some(entry);
            }
            Ok(None) => {}
            Err(err) => return Err(GetError::new(err, stale_copy)),
        }

        if scope == Scope::LocalOnly {
            return Ok(None);
        }

        match self.remote.fetch(id, request) {
            Ok(Some(value)) => {
                if let Err(err) = self.local.update(&value) {
                    return Err(GetError::new(err, stale_copy));
                }
                let entry: EntityRef<T> = Arc::new(Entry::new(value));
                self.cache.put(id, Arc::clone(&entry));
                Ok(Some(entry))
            }
            // The origin no longer knows the id; a stale copy in hand is
            // still better than nothing and stays flagged.
            Ok(None) => Ok(stale_copy),
            Err(err) => {
                warn!(%id, error = %err, "remote fetch failed, staleness left set");
                Err(GetError::new(err, stale_copy))
            }
        }
    }

    /// Gets a set of entities, coalescing misses into at most two remote
    /// round trips: one bulk call for ids absent from every tier, then one
    /// bulk call for entries still flagged stale.
    ///
    /// Duplicate ids cause redundant but harmless lookups. Ids resolved by
    /// no tier are simply absent from the result; absence is not an error.
    ///
    /// # Errors
    /// [`BulkError`] on a collaborator failure, carrying everything resolved
    /// before the failing phase.
    pub fn get_bulk(
        &self,
        ids: &IdSet,
        scope: Scope,
        request: Option<&R::Request>,
    ) -> Result<ResultSet<EntityRef<T>>, BulkError<T>> {
        let mut sorted = ids.clone();
        sorted.sort();

        let mut results = ResultSet::with_capacity(sorted.len());
        let mut missing = IdSet::new();

        // Sorted input means the append fast path applies throughout.
        for id in &sorted {
            if let Some(hit) = self.cache.get(id) {
                results.append(hit);
                continue;
            }
            match self.local.get(id) {
                Ok(Some(entry)) => {
                    let entry: EntityRef<T> = Arc::new(entry);
                    self.cache.put(id, Arc::clone(&entry));
                    results.append(entry);
                }
                Ok(None) => missing.add(id),
                Err(err) => return Err(BulkError::new(err, results)),
            }
        }

        debug!(
            requested = sorted.len(),
            resolved = results.len(),
            missing = missing.len(),
            "bulk tier scan complete"
        );

        if scope == Scope::All && !missing.is_empty() {
            if let Err(err) = self.merge_from_remote(&missing, request, &mut results) {
                return Err(BulkError::new(err, mem::take(&mut results)));
            }
        }

        if scope == Scope::All {
            let mut stale_ids = IdSet::new();
            for (id, entry) in results.iter() {
                if entry.is_stale() {
                    stale_ids.add(id);
                }
            }
            if !stale_ids.is_empty() {
                debug!(stale = stale_ids.len(), "bulk staleness refresh");
                if let Err(err) = self.merge_from_remote(&stale_ids, request, &mut results) {
                    return Err(BulkError::new(err, mem::take(&mut results)));
                }
            }
        }

        Ok(results)
    }

    /// Refreshes a single entity.
    ///
    /// `defer = true` marks the id stale in the local store and, if present,
    /// in the cache; the actual re-fetch happens lazily on the next `get`.
    /// `defer = false` fetches from the origin now and persists locally; the
    /// cache is updated only if the id was already cached.
    ///
    /// # Errors
    /// Any local store or transport failure.
    pub fn refresh(&self, id: EntityId, defer: bool) -> StrataResult<()> {
        if defer {
            self.local.mark_stale(id)?;
            if let Some(entry) = self.cache.get(id) {
                entry.mark_stale();
            }
            return Ok(());
        }

        match self.remote.fetch(id, None)? {
            Some(value) => {
                self.local.update(&value)?;
                if self.cache.get(id).is_some() {
                    self.cache.put(id, Arc::new(Entry::new(value)));
                }
                Ok(())
            }
            None => {
                debug!(%id, "eager refresh skipped, origin no longer has id");
                Ok(())
            }
        }
    }

    /// Refreshes a set of entities; the eager path is a single bulk round
    /// trip.
    ///
    /// # Errors
    /// Any local store or transport failure; an eager bulk failure discards
    /// the whole batch.
    pub fn refresh_bulk(&self, ids: &IdSet, defer: bool) -> StrataResult<()> {
        if defer {
            self.local.mark_stale_bulk(ids)?;
            for id in ids {
                if let Some(entry) = self.cache.get(id) {
                    entry.mark_stale();
                }
            }
            return Ok(());
        }

        let values = self.remote.fetch_bulk(ids, None)?;
        self.local.update_bulk(&values)?;
        for value in values {
            let id = value.id();
            if self.cache.get(id).is_some() {
                self.cache.put(id, Arc::new(Entry::new(value)));
            }
        }
        Ok(())
    }

    /// Returns the injected cache collaborator.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns the injected local store collaborator.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Returns the injected remote store collaborator.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// One bulk round trip: fetch, persist, cache, merge. Fails without
    /// merging anything, so a phase is all-or-nothing.
    fn merge_from_remote(
        &self,
        ids: &IdSet,
        request: Option<&R::Request>,
        results: &mut ResultSet<EntityRef<T>>,
    ) -> StrataResult<()> {
        let values = self.remote.fetch_bulk(ids, request)?;
        self.local.update_bulk(&values)?;
        for value in values {
            let id = value.id();
            let entry: EntityRef<T> = Arc::new(Entry::new(value));
            self.cache.put(id, Arc::clone(&entry));
            // Remote results may arrive in any order relative to the set.
            results.put(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LruCache, MemoryLocalStore, MemoryRemoteStore, Richness};

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

    type TestProvider = Provider<
        Widget,
        Arc<LruCache<Widget>>,
        Arc<MemoryLocalStore<Widget>>,
        Arc<MemoryRemoteStore<Widget>>,
    >;

    fn provider() -> TestProvider {
        Provider::new(
            Arc::new(LruCache::new(16)),
            Arc::new(MemoryLocalStore::new()),
            Arc::new(MemoryRemoteStore::new()),
        )
    }

    #[test]
    fn test_fresh_cache_hit_touches_no_other_tier() {
        let provider = provider();
        provider.remote().seed(widget(1, "a"));
        provider.get(EntityId::new(1), Scope::All, None).unwrap();
        assert_eq!(provider.local().read_count(), 1);
        assert_eq!(provider.remote().fetch_count(), 1);

        // Second lookup is served from the cache alone.
        let hit = provider.get(EntityId::new(1), Scope::All, None).unwrap();
        assert_eq!(hit.unwrap().value().name, "a");
        assert_eq!(provider.local().read_count(), 1);
        assert_eq!(provider.remote().fetch_count(), 1);
    }

    #[test]
    fn test_local_hit_is_cached_and_returned() {
        let provider = provider();
        provider.local().seed(widget(2, "b"));

        let hit = provider.get(EntityId::new(2), Scope::All, None).unwrap();
        assert_eq!(hit.unwrap().value().name, "b");
        assert_eq!(provider.remote().fetch_count(), 0);

        provider.get(EntityId::new(2), Scope::All, None).unwrap();
        assert_eq!(provider.local().read_count(), 1);
    }

    #[test]
    fn test_remote_fallback_persists_and_caches() {
        let provider = provider();
        provider.remote().seed(widget(3, "c"));

        let hit = provider.get(EntityId::new(3), Scope::All, None).unwrap();
        assert_eq!(hit.unwrap().value().name, "c");
        assert_eq!(provider.remote().fetch_count(), 1);
        assert_eq!(provider.local().write_count(), 1);
        assert_eq!(provider.local().staleness(EntityId::new(3)), Some(false));

        provider.get(EntityId::new(3), Scope::All, None).unwrap();
        assert_eq!(provider.remote().fetch_count(), 1);
    }

    #[test]
    fn test_local_only_never_contacts_remote() {
        let provider = provider();
        provider.remote().seed(widget(4, "d"));

        let hit = provider.get(EntityId::new(4), Scope::LocalOnly, None).unwrap();
        assert!(hit.is_none());
        assert_eq!(provider.remote().fetch_count(), 0);
    }

    #[test]
    fn test_local_only_reports_stale_as_absent() {
        let provider = provider();
        provider.local().seed_stale(widget(5, "e"));

        let hit = provider.get(EntityId::new(5), Scope::LocalOnly, None).unwrap();
        assert!(hit.is_none());
        assert_eq!(provider.remote().fetch_count(), 0);
    }

    #[test]
    fn test_stale_local_hit_refetched_from_origin() {
        let provider = provider();
        provider.local().seed_stale(widget(6, "old"));
        provider.remote().seed(widget(6, "new"));

        let hit = provider
            .get(EntityId::new(6), Scope::All, None)
            .unwrap()
            .unwrap();
        assert_eq!(hit.value().name, "new");
        assert!(!hit.is_stale());
        assert_eq!(provider.local().staleness(EntityId::new(6)), Some(false));
    }

    #[test]
    fn test_failed_refetch_returns_stale_alongside_error() {
        let provider = provider();
        provider.local().seed_stale(widget(7, "old"));
        provider.remote().set_unreachable(true);

        let err = provider.get(EntityId::new(7), Scope::All, None).unwrap_err();
        assert!(err.error.is_transport());
        let stale = err.stale.expect("stale copy should ride along");
        assert_eq!(stale.value().name, "old");
        assert!(stale.is_stale());
    }

    #[test]
    fn test_origin_absent_returns_stale_copy() {
        let provider = provider();
        provider.local().seed_stale(widget(8, "old"));

        let hit = provider
            .get(EntityId::new(8), Scope::All, None)
            .unwrap()
            .unwrap();
        assert_eq!(hit.value().name, "old");
        assert!(hit.is_stale());
    }

    #[test]
    fn test_missing_everywhere_is_none_not_error() {
        let provider = provider();
        assert!(provider.get(EntityId::new(9), Scope::All, None).unwrap().is_none());
    }

    #[test]
    fn test_richness_hint_reaches_origin() {
        let provider = provider();
        provider.remote().seed(widget(10, "j"));
        provider
            .get(EntityId::new(10), Scope::All, Some(&Richness::Partial))
            .unwrap();
        assert_eq!(provider.remote().hints(), vec![Some(Richness::Partial)]);
    }

    #[test]
    fn test_deferred_refresh_marks_both_tiers_without_remote() {
        let provider = provider();
        provider.local().seed(widget(11, "k"));
        let cached = provider
            .get(EntityId::new(11), Scope::All, None)
            .unwrap()
            .unwrap();

        provider.refresh(EntityId::new(11), true).unwrap();
        assert!(cached.is_stale());
        assert_eq!(provider.local().staleness(EntityId::new(11)), Some(true));
        assert_eq!(provider.remote().fetch_count(), 0);
    }

    #[test]
    fn test_deferred_refresh_then_get_refetches_once() {
        let provider = provider();
        provider.local().seed(widget(12, "old"));
        provider.remote().seed(widget(12, "new"));
        provider.get(EntityId::new(12), Scope::All, None).unwrap();

        provider.refresh(EntityId::new(12), true).unwrap();

        let hit = provider
            .get(EntityId::new(12), Scope::All, None)
            .unwrap()
            .unwrap();
        assert_eq!(provider.remote().fetch_count(), 1);
        assert_eq!(hit.value().name, "new");
        assert!(!hit.is_stale());
    }

    #[test]
    fn test_eager_refresh_updates_cache_only_if_cached() {
        let provider = provider();
        provider.local().seed(widget(13, "old"));
        provider.remote().seed(widget(13, "new"));

        // Never observed: persists locally, leaves the cache alone.
        provider.refresh(EntityId::new(13), false).unwrap();
        assert_eq!(provider.local().write_count(), 1);
        assert!(provider.cache().get(EntityId::new(13)).is_none());

        // Observed: the cached copy is superseded.
        provider.get(EntityId::new(13), Scope::All, None).unwrap();
        provider.remote().seed(widget(13, "newer"));
        provider.refresh(EntityId::new(13), false).unwrap();
        let cached = provider.cache().get(EntityId::new(13)).unwrap();
        assert_eq!(cached.value().name, "newer");
    }

    #[test]
    fn test_bulk_second_phase_refreshes_stale_entries() {
        let provider = provider();
        provider.local().seed(widget(1, "a"));
        provider.local().seed_stale(widget(2, "old"));
        provider.remote().seed(widget(2, "new"));
        provider.remote().seed(widget(3, "c"));

        let ids: IdSet = [1u64, 2, 3].into_iter().collect();
        let results = provider.get_bulk(&ids, Scope::All, None).unwrap();

        assert_eq!(results.len(), 3);
        let refreshed = results.get(EntityId::new(2)).unwrap();
        assert_eq!(refreshed.value().name, "new");
        assert!(!refreshed.is_stale());

        // Phase 1 asked for {3}, phase 2 for {2}.
        assert_eq!(
            provider.remote().bulk_requests(),
            vec![vec![EntityId::new(3)], vec![EntityId::new(2)]]
        );
    }

    #[test]
    fn test_bulk_phase_one_failure_surfaces_resolved_entries() {
        let provider = provider();
        provider.local().seed(widget(1, "a"));
        provider.remote().set_unreachable(true);

        let ids: IdSet = [1u64, 2].into_iter().collect();
        let err = provider.get_bulk(&ids, Scope::All, None).unwrap_err();
        assert!(err.error.is_transport());
        assert_eq!(err.resolved.len(), 1);
        assert!(err.resolved.get(EntityId::new(1)).is_some());
    }

    #[test]
    fn test_bulk_local_only_keeps_stale_hits() {
        let provider = provider();
        provider.local().seed_stale(widget(4, "old"));

        let ids: IdSet = [4u64].into_iter().collect();
        let results = provider.get_bulk(&ids, Scope::LocalOnly, None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.get(EntityId::new(4)).unwrap().is_stale());
        assert_eq!(provider.remote().bulk_fetch_count(), 0);
    }
}

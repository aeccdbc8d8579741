//! Sparse, identifier-ordered result sets.
//!
//! A [`ResultSet`] maps ids to values using two parallel vectors kept strictly
//! ascending and unique by id. It is optimized for the small cardinalities a
//! single request produces: `put` pays an O(n) shift in the worst case, while
//! `append` is the O(1) fast path for values supplied in non-decreasing id
//! order (bulk results usually arrive that way).

use crate::entity::{EntityId, Identified};
use crate::error::{StrataError, StrataResult};
use crate::ids::ideal_len;

/// An ordered sparse map from entity id to value.
///
/// Invariant: `len()` entries occupy indices `[0, len)`, ids strictly
/// ascending, ids unique.
///
/// # Examples
///
/// ```
/// use strata::{EntityId, Identified, ResultSet};
///
/// struct Row(u64);
/// impl Identified for Row {
///     fn id(&self) -> EntityId {
///         EntityId::new(self.0)
///     }
/// }
///
/// let mut results = ResultSet::new();
/// results.put(Row(9));
/// results.put(Row(3));
/// assert_eq!(results.id_at(0).unwrap(), EntityId::new(3));
/// assert!(results.get(EntityId::new(7)).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet<V> {
    ids: Vec<EntityId>,
    values: Vec<V>,
}

impl<V> Default for ResultSet<V> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<V: Identified> ResultSet<V> {
    /// Default entry capacity before bucket rounding.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Creates an empty result set with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates an empty result set sized for at least `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = ideal_len(capacity);
        Self {
            ids: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Inserts a value at its id-ordered position, overwriting any existing
    /// value with the same id. O(log n) search plus O(n) shift.
    pub fn put(&mut self, value: V) {
        let id = value.id();
        match self.ids.binary_search(&id) {
            Ok(i) => {
                self.values[i] = value;
            }
            Err(i) => {
                self.grow_for_one();
                self.ids.insert(i, id);
                self.values.insert(i, value);
            }
        }
    }

    /// Appends a value whose id extends the ascending order: O(1) amortized.
    /// Falls back to [`put`](Self::put) when the id would violate ordering.
    pub fn append(&mut self, value: V) {
        let id = value.id();
        if let Some(&last) = self.ids.last() {
            if id <= last {
                self.put(value);
                return;
            }
        }
        self.grow_for_one();
        self.ids.push(id);
        self.values.push(value);
    }

    /// Looks a value up by id. O(log n); `None` is the not-found signal.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&V> {
        match self.ids.binary_search(&id) {
            Ok(i) => Some(&self.values[i]),
            Err(_) => None,
        }
    }

    /// Returns the id at `index`.
    ///
    /// # Errors
    /// `StrataError::OutOfRange` if `index >= len()`.
    pub fn id_at(&self, index: usize) -> StrataResult<EntityId> {
        self.ids
            .get(index)
            .copied()
            .ok_or(StrataError::OutOfRange {
                index,
                len: self.ids.len(),
            })
    }

    /// Returns the value at `index`.
    ///
    /// # Errors
    /// `StrataError::OutOfRange` if `index >= len()`.
    pub fn value_at(&self, index: usize) -> StrataResult<&V> {
        self.values.get(index).ok_or(StrataError::OutOfRange {
            index,
            len: self.values.len(),
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the set holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over `(id, value)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &V)> {
        self.ids.iter().copied().zip(self.values.iter())
    }

    /// Iterates over the values in ascending id order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.values.iter()
    }

    fn grow_for_one(&mut self) {
        if self.ids.len() == self.ids.capacity() {
            let target = ideal_len(self.ids.len() + 1);
            let extra = target - self.ids.len();
            self.ids.reserve_exact(extra);
            self.values.reserve_exact(extra);
        }
    }
}

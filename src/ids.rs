//! Identity sets: growable collections of 64-bit ids.
//!
//! An [`IdSet`] is write-once, read-many per request: callers accumulate the
//! ids they need, sort once, then iterate. Duplicates are permitted and cause
//! redundant but harmless lookups downstream.

use std::mem;

use crate::entity::EntityId;

/// Bytes per stored id.
const ID_BYTES: usize = mem::size_of::<u64>();

/// Fixed allocator overhead subtracted from each power-of-two bucket.
const BUCKET_OVERHEAD: usize = 12;

/// Rounds a requested byte capacity up to the nearest power-of-two-minus-12
/// bucket.
///
/// This trades a small amount of over-allocation for amortized O(1) growth
/// while avoiding allocator slack at common small sizes.
#[must_use]
pub(crate) fn ideal_byte_len(bytes: usize) -> usize {
    for shift in 4..32 {
        let bucket = (1usize << shift) - BUCKET_OVERHEAD;
        if bytes <= bucket {
            return bucket;
        }
    }
    bytes
}

/// Rounds an id-count capacity up via [`ideal_byte_len`].
#[must_use]
pub(crate) fn ideal_len(len: usize) -> usize {
    ideal_byte_len(len * ID_BYTES) / ID_BYTES
}

/// A growable, unordered-until-sorted collection of entity ids.
///
/// # Examples
///
/// ```
/// use strata::IdSet;
///
/// let mut ids = IdSet::new();
/// ids.add(9.into());
/// ids.add(3.into());
/// ids.sort();
/// assert_eq!(ids.get(0).map(u64::from), Some(3));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<EntityId>,
}

impl IdSet {
    /// Default id capacity before bucket rounding.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Creates an empty id set with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates an empty id set sized for at least `capacity` ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(ideal_len(capacity)),
        }
    }

    /// Appends an id. Never fails; amortizes to O(1).
    pub fn add(&mut self, id: EntityId) {
        if self.ids.len() == self.ids.capacity() {
            let target = ideal_len(self.ids.len() + 1);
            self.ids.reserve_exact(target - self.ids.len());
        }
        self.ids.push(id);
    }

    /// Returns the id at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<EntityId> {
        self.ids.get(index).copied()
    }

    /// Returns the number of ids held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no ids are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sorts the ids in place. Afterwards elements are non-decreasing;
    /// duplicate ids are indistinguishable so stability is moot.
    pub fn sort(&mut self) {
        self.ids.sort_unstable();
    }

    /// Iterates over the ids in storage order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ids.iter().copied()
    }

    /// Returns the ids as a slice in storage order.
    #[must_use]
    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }
}

impl FromIterator<EntityId> for IdSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.add(id);
        }
        set
    }
}

impl FromIterator<u64> for IdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        iter.into_iter().map(EntityId::new).collect()
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = EntityId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, EntityId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

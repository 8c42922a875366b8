//! Per-segment ordered index.
//!
//! Maps composite keys to value handles in [`compare_keys`]
//! (crate::keys::compare_keys) order. Built on crossbeam-skiplist so that
//! scans iterate lock-free while the segment's writer thread keeps
//! inserting; an in-flight range sees a consistent view and is safe to stop
//! early.

use std::ops::Bound;

use crossbeam_skiplist::map::Entry;
use crossbeam_skiplist::SkipMap;

use crate::keys::CompositeKey;
use crate::vlog::ValueHandle;

/// One index entry: a composite key and the handle of its value record.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub key: CompositeKey,
    pub handle: ValueHandle,
}

/// A position in the index, used by forward iteration.
pub struct Cursor<'a>(Entry<'a, CompositeKey, ValueHandle>);

impl<'a> Cursor<'a> {
    pub fn key(&self) -> &CompositeKey {
        self.0.key()
    }

    pub fn handle(&self) -> &ValueHandle {
        self.0.value()
    }

    /// The next position in ascending order, if any.
    pub fn step(&self) -> Option<Cursor<'a>> {
        self.0.next().map(Cursor)
    }
}

/// Sorted map from composite key to value handle.
#[derive(Debug)]
pub struct OrderedIndex {
    map: SkipMap<CompositeKey, ValueHandle>,
}

impl Default for OrderedIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedIndex {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }

    /// Inserts or replaces the entry for a composite key.
    pub fn set(&self, record: IndexRecord) {
        self.map.insert(record.key, record.handle);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes all entries. Safe against concurrent readers; an in-flight
    /// iterator keeps yielding the entries it has pinned.
    pub fn clear(&self) {
        while self.map.pop_front().is_some() {}
    }

    /// Ascending iteration starting at the smallest entry >= `from`.
    pub fn ascend(&self, from: CompositeKey) -> impl Iterator<Item = Cursor<'_>> + '_ {
        self.map.range(from..).map(Cursor)
    }

    /// The smallest entry >= `from`, if any.
    pub fn seek(&self, from: &CompositeKey) -> Option<Cursor<'_>> {
        self.map.lower_bound(Bound::Included(from)).map(Cursor)
    }

    /// The smallest entry in the index, if any.
    pub fn front(&self) -> Option<Cursor<'_>> {
        self.map.front().map(Cursor)
    }
}

//! Forward iteration over a segment, for the surrounding store's merging
//! iterator.

use crate::error::Result;
use crate::index::{Cursor, OrderedIndex};
use crate::keys::CompositeKey;
use crate::vlog::ValueStruct;

/// Walks entries in ascending composite-key order. End-of-iteration is a
/// terminal state: once the iterator has moved past the last entry, `valid`
/// stays false.
pub trait ForwardIterator {
    /// Positions at the smallest entry >= `key`.
    fn seek(&mut self, key: &[u8]);

    /// Positions at the first entry.
    fn rewind(&mut self);

    /// Advances to the next entry.
    fn next(&mut self);

    /// Whether the iterator is positioned on an entry.
    fn valid(&self) -> bool;

    /// The current composite key. Panics if the iterator is not valid.
    fn key(&self) -> &[u8];

    /// The current value record. Panics if the iterator is not valid.
    fn value(&self) -> ValueStruct;

    /// Releases the iterator's position.
    fn close(&mut self) -> Result<()>;
}

/// Iterator over one segment's index.
pub struct SegmentIter<'a> {
    index: &'a OrderedIndex,
    cursor: Option<Cursor<'a>>,
    exhausted: bool,
}

impl<'a> SegmentIter<'a> {
    pub(crate) fn new(index: &'a OrderedIndex) -> Self {
        let cursor = index.front();
        Self {
            index,
            exhausted: cursor.is_none(),
            cursor,
        }
    }

    fn current(&self) -> &Cursor<'a> {
        self.cursor
            .as_ref()
            .expect("iterator is not positioned on an entry")
    }
}

impl ForwardIterator for SegmentIter<'_> {
    fn seek(&mut self, key: &[u8]) {
        if self.exhausted {
            return;
        }
        self.cursor = self.index.seek(&CompositeKey(key.to_vec()));
        if self.cursor.is_none() {
            self.exhausted = true;
        }
    }

    fn rewind(&mut self) {
        if self.exhausted {
            return;
        }
        self.cursor = self.index.front();
        if self.cursor.is_none() {
            self.exhausted = true;
        }
    }

    fn next(&mut self) {
        if self.exhausted {
            return;
        }
        self.cursor = self.cursor.take().and_then(|cursor| cursor.step());
        if self.cursor.is_none() {
            self.exhausted = true;
        }
    }

    fn valid(&self) -> bool {
        !self.exhausted && self.cursor.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current().key().as_ref()
    }

    fn value(&self) -> ValueStruct {
        self.current().handle().value().clone()
    }

    fn close(&mut self) -> Result<()> {
        self.cursor = None;
        self.exhausted = true;
        Ok(())
    }
}

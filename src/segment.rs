//! One ring slot: value log + ordered index + async writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{IndexRecord, OrderedIndex};
use crate::iterator::SegmentIter;
use crate::keys::{self, CompositeKey};
use crate::vlog::{ValueHandle, ValueLog, ValueStruct};
use crate::writer::AsyncWriter;

/// A segment stores every write whose timestamp maps to its slot, plus the
/// copy-ahead mirrors of writes to the preceding slots. The index is mutated
/// by the writer thread and by the synchronous [`add_index`](Segment::add_index)
/// path, which serializes against the writer by waiting for the queue to
/// drain; readers iterate lock-free.
pub struct Segment {
    index: Arc<OrderedIndex>,
    vlog: Arc<ValueLog>,
    writer: AsyncWriter,
}

impl Segment {
    pub fn new() -> Self {
        let index = Arc::new(OrderedIndex::new());
        let vlog = Arc::new(ValueLog::new());
        let writer = AsyncWriter::spawn(index.clone(), vlog.clone());
        Self { index, vlog, writer }
    }

    /// Appends a value and installs its index entry synchronously.
    pub fn put(&self, key: &[u8], value: ValueStruct) -> Result<()> {
        let handle = self.add_value(value)?;
        self.add_index(IndexRecord {
            key: CompositeKey(key.to_vec()),
            handle,
        });
        Ok(())
    }

    /// Appends a value record, returning its stable handle.
    pub fn add_value(&self, value: ValueStruct) -> Result<ValueHandle> {
        self.vlog.push(value)
    }

    /// Installs an index entry on the calling thread. Waits until all
    /// previously enqueued async entries have been applied, so ordering
    /// between the active segment's synchronous write and the copy-ahead
    /// writers behind it stays observable.
    pub fn add_index(&self, record: IndexRecord) {
        self.writer.wait_drain();
        self.index.set(record);
    }

    /// Enqueues an index entry for the writer thread.
    pub fn add_index_async(&self, record: IndexRecord) {
        self.writer.enqueue(record);
    }

    /// Range scan with MVCC collapse: starting at `start_user_key`, returns
    /// up to `count` user keys in ascending order, each with its newest
    /// version visible at `snapshot_ts`.
    pub fn scan(
        &self,
        start_user_key: &[u8],
        count: usize,
        snapshot_ts: u64,
    ) -> Vec<(Vec<u8>, ValueStruct)> {
        // Observe all fan-out that reached this segment before we started.
        self.writer.wait_drain();

        // Versions of the start key newer than the snapshot sort before the
        // seek key and are never visited; for every later user key the first
        // entry at or below the snapshot is the newest visible version.
        let seek = CompositeKey(keys::key_with_ts(start_user_key, snapshot_ts));
        let mut rows: BTreeMap<Vec<u8>, ValueStruct> = BTreeMap::new();

        for cursor in self.index.ascend(seek) {
            if rows.len() == count {
                break;
            }
            let key = cursor.key().as_ref();
            if keys::parse_ts(key) > snapshot_ts {
                continue;
            }
            let user_key = keys::user_key(key);
            if rows.contains_key(user_key) {
                continue;
            }
            rows.insert(user_key.to_vec(), cursor.handle().value().clone());
        }

        rows.into_iter().collect()
    }

    /// Clears the index and value log, returning the number of index entries
    /// removed. The writer thread stays alive; the clear flows through its
    /// queue so it lands after every pending insert, and the count is taken
    /// by the writer at that point.
    pub fn free(&self) -> usize {
        self.writer.clear()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward iterator over this segment in ascending composite-key order.
    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter::new(&self.index)
    }

    pub(crate) fn shutdown_writer(&self) {
        self.writer.shutdown();
    }

    pub(crate) fn join_writer(&self) {
        self.writer.join();
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::new()
    }
}

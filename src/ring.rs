//! The segment ring: a fixed circle of segments covering three TTL windows,
//! with clock-to-segment routing, copy-ahead write fan-out, and periodic
//! pruning.
//!
//! A write lands synchronously in the segment owning its timestamp and is
//! mirrored asynchronously into the next `fanout` segments, so any scan with
//! a snapshot inside the TTL window is served by a single segment that
//! already holds the data. The prune ticker clears the segment that is about
//! to re-enter the live window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::{self, NANOS_PER_SEC};
use crate::config::RingConfig;
use crate::error::Result;
use crate::fmt;
use crate::index::IndexRecord;
use crate::iterator::SegmentIter;
use crate::keys::{self, CompositeKey};
use crate::segment::Segment;
use crate::vlog::ValueStruct;

/// The pure clock-to-segment mapping and ring dimensions.
///
/// `fanout = ⌈ttl / segment_duration⌉` segments mirror each write ahead of
/// its own slot. The ring holds `3 * fanout + 2` slots: one fan-out window
/// ahead of the writers, one window behind for in-TTL snapshots, one more as
/// a buffer so the prune cursor never touches a slot a live writer or reader
/// can reach, and two slots of slack for the cycle-wrap boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    segment_secs: u64,
    fanout: usize,
    slots: usize,
    cycle_secs: u64,
}

impl Geometry {
    pub fn from_config(config: &RingConfig) -> Self {
        let segment_secs = config.segment_duration.as_secs();
        let fanout = config.ttl.as_secs().div_ceil(segment_secs) as usize;
        let slots = 3 * fanout + 2;
        Self {
            segment_secs,
            fanout,
            slots,
            cycle_secs: slots as u64 * segment_secs,
        }
    }

    /// Number of segments each write is mirrored into ahead of its own.
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Total number of segments in the ring.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// The modulus of the clock-to-segment mapping, in seconds.
    pub fn cycle_secs(&self) -> u64 {
        self.cycle_secs
    }

    /// The slot owning a nanosecond timestamp. Pure: depends only on the
    /// timestamp's whole seconds and the ring dimensions.
    pub fn segment_index(&self, ts: u64) -> usize {
        ((clock::ts_secs(ts) % self.cycle_secs) / self.segment_secs) as usize
    }
}

struct RingCore {
    segments: Vec<Segment>,
    geometry: Geometry,
    ttl: Duration,
}

impl RingCore {
    fn put(&self, key: &[u8], value: ValueStruct) -> Result<()> {
        let ts = keys::parse_ts(key);
        let index = self.geometry.segment_index(ts);
        tracing::trace!(key = %fmt::composite(key), segment = index, "put");

        let handle = self.segments[index].add_value(value)?;
        let record = IndexRecord {
            key: CompositeKey(key.to_vec()),
            handle,
        };

        // Install in the owning segment on this thread, then mirror the
        // identical entry into the next `fanout` segments asynchronously.
        self.segments[index].add_index(record.clone());
        for step in 1..=self.geometry.fanout() {
            let next = (index + step) % self.geometry.slots();
            self.segments[next].add_index_async(record.clone());
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<ValueStruct>> {
        let ts = keys::parse_ts(key);
        let user_key = keys::user_key(key);

        let mut rows = self.scan(user_key, 1, ts)?;
        match rows.pop() {
            Some((found, value)) if rows.is_empty() && found == user_key => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    fn scan(
        &self,
        start_user_key: &[u8],
        count: usize,
        snapshot_ts: u64,
    ) -> Result<Vec<(Vec<u8>, ValueStruct)>> {
        if !clock::is_live(snapshot_ts, self.ttl) {
            tracing::debug!(snapshot_ts, "snapshot beyond ttl, returning empty");
            return Ok(Vec::new());
        }

        let index = self.geometry.segment_index(snapshot_ts);
        Ok(self.segments[index].scan(start_user_key, count, snapshot_ts))
    }

    /// Clears the segment that will re-enter the live window next: one slot
    /// behind the position `2 * fanout` segments before the current one.
    fn prune(&self) -> usize {
        let slots = self.geometry.slots();
        let current = self.geometry.segment_index(clock::now_nanos());
        let target = (current + slots - 1 - 2 * self.geometry.fanout()) % slots;

        let removed = self.segments[target].free();
        tracing::debug!(segment = target, removed, "pruned segment");
        removed
    }

    fn current_segment(&self) -> &Segment {
        &self.segments[self.geometry.segment_index(clock::now_nanos())]
    }

    fn last_segment(&self) -> &Segment {
        let ts = clock::now_nanos().saturating_sub(self.geometry.segment_secs * NANOS_PER_SEC);
        &self.segments[self.geometry.segment_index(ts)]
    }
}

/// Runs [`RingCore::prune`] once per segment duration until stopped.
struct GcTicker {
    stop_tx: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl GcTicker {
    /// Spawns the prune loop. Must be called inside a tokio runtime.
    fn start(core: Arc<RingCore>, period: Duration) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(());

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The zeroth tick completes immediately; pruning starts one full
            // period in.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        core.prune();
                    }
                    _ = stop_rx.changed() => {
                        tracing::debug!("gc ticker stopped");
                        return;
                    }
                }
            }
        });

        Self { stop_tx, task }
    }

    /// Signals the loop to exit and waits for it.
    async fn stop(self) -> Result<()> {
        self.stop_tx.send(()).ok();
        self.task.await?;
        Ok(())
    }
}

/// Time-windowed key-value index over a ring of segments.
pub struct SegRing {
    core: Arc<RingCore>,
    gc: GcTicker,
}

impl SegRing {
    /// Builds the ring and starts its writers and the prune ticker. Must be
    /// called inside a tokio runtime; the per-segment writers are plain OS
    /// threads and never touch it.
    pub fn new(config: RingConfig) -> Result<Self> {
        config.validate()?;
        let geometry = Geometry::from_config(&config);
        let segments = (0..geometry.slots()).map(|_| Segment::new()).collect();

        let core = Arc::new(RingCore {
            segments,
            geometry,
            ttl: config.ttl,
        });
        let gc = GcTicker::start(core.clone(), config.segment_duration);

        tracing::info!(
            slots = geometry.slots(),
            fanout = geometry.fanout(),
            cycle_secs = geometry.cycle_secs(),
            ttl_secs = config.ttl.as_secs(),
            "segment ring started"
        );
        Ok(Self { core, gc })
    }

    /// Writes a value under a composite key (user key plus timestamp
    /// suffix; see [`keys::key_with_ts`]). Blocks until the owning
    /// segment's write queue has drained.
    pub fn put(&self, key: &[u8], value: ValueStruct) -> Result<()> {
        self.core.put(key, value)
    }

    /// Point lookup at the composite key's timestamp. Returns the value
    /// only if the user key itself has a visible version.
    pub fn get(&self, key: &[u8]) -> Result<Option<ValueStruct>> {
        self.core.get(key)
    }

    /// Range scan at a snapshot timestamp: up to `count` user keys starting
    /// at `start_user_key`, ascending, each collapsed to its newest version
    /// at or below `snapshot_ts`. Snapshots older than the TTL yield an
    /// empty result.
    pub fn scan(
        &self,
        start_user_key: &[u8],
        count: usize,
        snapshot_ts: u64,
    ) -> Result<Vec<(Vec<u8>, ValueStruct)>> {
        self.core.scan(start_user_key, count, snapshot_ts)
    }

    /// Clears the segment about to re-enter the live window, returning how
    /// many index entries were dropped. Runs automatically once per
    /// segment duration.
    pub fn prune(&self) -> usize {
        self.core.prune()
    }

    /// Whether the segment owning the current wall-clock time is empty.
    pub fn is_empty(&self) -> bool {
        self.core.current_segment().is_empty()
    }

    /// The ring dimensions and clock mapping.
    pub fn geometry(&self) -> Geometry {
        self.core.geometry
    }

    /// The segment owning the current wall-clock time.
    pub fn current_segment(&self) -> &Segment {
        self.core.current_segment()
    }

    /// The segment owning the previous segment-duration window.
    pub fn last_segment(&self) -> &Segment {
        self.core.last_segment()
    }

    /// Forward iterator over the current segment, for the surrounding
    /// store's merging iterator.
    pub fn iter(&self) -> SegmentIter<'_> {
        self.core.current_segment().iter()
    }

    /// Stops the prune ticker, drains and clears every segment, and joins
    /// the writer threads. In-flight writes from other threads may be lost.
    pub async fn close(self) -> Result<()> {
        self.gc.stop().await?;

        for segment in &self.core.segments {
            segment.free();
        }
        for segment in &self.core.segments {
            segment.shutdown_writer();
        }
        for segment in &self.core.segments {
            segment.join_writer();
        }

        tracing::info!("segment ring closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::key_with_ts;

    fn geometry(segment_secs: u64, ttl_secs: u64) -> Geometry {
        Geometry::from_config(&RingConfig::new(
            Duration::from_secs(segment_secs),
            Duration::from_secs(ttl_secs),
        ))
    }

    #[test]
    fn test_geometry_dimensions() {
        let g = geometry(15, 60);
        assert_eq!(g.fanout(), 4);
        assert_eq!(g.slots(), 14);
        assert_eq!(g.cycle_secs(), 210);

        // A TTL that is not a segment multiple rounds the fan-out up.
        let g = geometry(15, 61);
        assert_eq!(g.fanout(), 5);
        assert_eq!(g.slots(), 17);

        let g = geometry(1, 2);
        assert_eq!(g.fanout(), 2);
        assert_eq!(g.slots(), 8);
        assert_eq!(g.cycle_secs(), 8);
    }

    #[test]
    fn test_segment_index_is_pure_modular() {
        let g = geometry(15, 60);
        for secs in [0u64, 1, 14, 15, 209, 210, 1_000_000] {
            let ts = secs * NANOS_PER_SEC;
            let expected = ((secs % 210) / 15) as usize;
            assert_eq!(g.segment_index(ts), expected);
            // Sub-second offsets never change the slot.
            assert_eq!(g.segment_index(ts + 999_999_999), expected);
        }
    }

    #[test]
    fn test_segment_index_wraps_after_one_cycle() {
        let g = geometry(15, 60);
        let ts = clock::now_nanos();
        let one_cycle = g.cycle_secs() * NANOS_PER_SEC;
        assert_eq!(g.segment_index(ts), g.segment_index(ts + one_cycle));
        assert_eq!(g.segment_index(ts), g.segment_index(ts + 3 * one_cycle));
        // Adjacent windows map to adjacent slots.
        let base = (ts / NANOS_PER_SEC / 15) * 15 * NANOS_PER_SEC;
        assert_eq!(
            (g.segment_index(base) + 1) % g.slots(),
            g.segment_index(base + 15 * NANOS_PER_SEC)
        );
    }

    fn put(ring: &SegRing, user_key: &[u8], ts: u64, value: &[u8]) {
        ring.put(&key_with_ts(user_key, ts), ValueStruct::new(value))
            .unwrap();
    }

    fn values(rows: &[(Vec<u8>, ValueStruct)]) -> Vec<&[u8]> {
        rows.iter().map(|(_, v)| v.value.as_slice()).collect()
    }

    #[tokio::test]
    async fn test_write_then_read_in_order() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;

        put(&ring, b"1", clock::now_nanos(), b"a");
        tokio::time::sleep(Duration::from_secs(1)).await;
        put(&ring, b"2", clock::now_nanos(), b"b");
        tokio::time::sleep(Duration::from_secs(1)).await;
        put(&ring, b"3", clock::now_nanos(), b"c");
        tokio::time::sleep(Duration::from_secs(1)).await;
        put(&ring, b"4", clock::now_nanos(), b"d");

        let now = clock::now_nanos();
        for count in 1..=4 {
            let rows = ring.scan(b"1", count, now)?;
            assert_eq!(rows.len(), count);
            assert_eq!(values(&rows), [b"a", b"b", b"c", b"d"][..count].to_vec());
        }

        ring.close().await
    }

    #[tokio::test]
    async fn test_scan_at_past_snapshot() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;

        let t0 = clock::now_nanos();
        let t1 = t0 + 1;
        let t2 = t0 + 2;
        put(&ring, b"1", t0, b"a");
        put(&ring, b"2", t1, b"b");
        put(&ring, b"3", t2, b"c");

        let rows = ring.scan(b"1", 4, t1)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (b"1".to_vec(), ValueStruct::new(b"a".as_slice())));
        assert_eq!(rows[1], (b"2".to_vec(), ValueStruct::new(b"b".as_slice())));

        ring.close().await
    }

    #[tokio::test]
    async fn test_overwrite_visible_per_snapshot() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;

        let t0 = clock::now_nanos();
        let t1 = t0 + 1_000;
        put(&ring, b"x", t0, b"v0");
        put(&ring, b"x", t1, b"v1");

        assert_eq!(values(&ring.scan(b"x", 1, t1)?), vec![b"v1"]);
        assert_eq!(values(&ring.scan(b"x", 1, t0)?), vec![b"v0"]);

        ring.close().await
    }

    #[tokio::test]
    async fn test_expired_snapshot_returns_empty() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;
        put(&ring, b"1", clock::now_nanos(), b"a");

        let expired = clock::now_nanos() - 2 * 60 * NANOS_PER_SEC;
        assert!(ring.scan(b"1", 1, expired)?.is_empty());

        ring.close().await
    }

    #[tokio::test]
    async fn test_expired_write_invisible_at_current_snapshot() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;

        // Older than TTL plus two segments: its fan-out window ends before
        // the current slot, so today's segment never received it.
        let stale = clock::now_nanos() - (60 + 30) * NANOS_PER_SEC;
        put(&ring, b"z", stale, b"val");

        assert!(ring.scan(b"z", 1, clock::now_nanos())?.is_empty());
        ring.close().await
    }

    #[tokio::test]
    async fn test_get_read_your_writes() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;

        let ts = clock::now_nanos();
        let key = key_with_ts(b"user", ts);
        ring.put(&key, ValueStruct::new(b"payload".as_slice()))?;

        let got = ring.get(&key)?.unwrap();
        assert_eq!(got.value, b"payload");

        // Absent key: the scan surfaces a different user key, so get
        // reports a miss rather than the neighbor.
        let miss = ring.get(&key_with_ts(b"use", ts))?;
        assert!(miss.is_none());

        ring.close().await
    }

    #[tokio::test]
    async fn test_is_empty_tracks_current_segment() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;
        assert!(ring.is_empty());
        assert!(ring.last_segment().is_empty());

        put(&ring, b"k", clock::now_nanos(), b"v");
        assert!(!ring.is_empty());

        ring.close().await
    }

    #[tokio::test]
    async fn test_prune_reclaims_only_dead_segment() -> Result<()> {
        let config = RingConfig::new(Duration::from_secs(1), Duration::from_secs(2));
        let ring = SegRing::new(config)?;
        let geometry = ring.geometry();

        // Stay clear of a second boundary so "now" cannot change slots
        // between the put and the prune below.
        let subsec = clock::now_nanos() % NANOS_PER_SEC;
        if subsec > 700_000_000 {
            tokio::time::sleep(Duration::from_millis(400)).await;
        }

        // A write whose slot is exactly the prune target (1 + 2*fanout
        // segments behind now).
        let behind = (1 + 2 * geometry.fanout()) as u64;
        let dead_ts = clock::now_nanos() - behind * NANOS_PER_SEC;
        put(&ring, b"old", dead_ts, b"stale");

        // A fresh write in the current slot must survive.
        let fresh_ts = clock::now_nanos();
        put(&ring, b"new", fresh_ts, b"live");

        let removed = ring.prune();
        assert!(removed >= 1, "expected the dead slot to hold entries");
        assert_eq!(values(&ring.scan(b"new", 1, fresh_ts)?), vec![b"live"]);

        ring.close().await
    }

    #[tokio::test]
    async fn test_iterator_over_current_segment() -> Result<()> {
        use crate::iterator::ForwardIterator as _;

        let ring = SegRing::new(RingConfig::default())?;
        let ts = clock::now_nanos();
        put(&ring, b"a", ts, b"va");
        put(&ring, b"b", ts, b"vb");

        let mut iter = ring.iter();
        let mut seen = Vec::new();
        while iter.valid() {
            seen.push(keys::user_key(iter.key()).to_vec());
            iter.next();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);

        drop(iter);
        ring.close().await
    }

    #[tokio::test]
    async fn test_close_is_clean() -> Result<()> {
        let ring = SegRing::new(RingConfig::default())?;
        put(&ring, b"k", clock::now_nanos(), b"v");
        ring.close().await
    }

    #[tokio::test]
    async fn test_gc_ticker_runs_and_stops() -> Result<()> {
        let config = RingConfig::new(Duration::from_secs(1), Duration::from_secs(2));
        let ring = SegRing::new(config)?;

        // Let the ticker fire at least once (it prunes an empty slot), then
        // verify shutdown joins the loop cleanly.
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(ring.is_empty());
        ring.close().await
    }
}

//! Per-segment async writer.
//!
//! Each segment owns one dedicated OS thread that drains a bounded command
//! queue and applies index insertions. Serializing all index mutations into
//! this single stream is what keeps scan readers lock-free. The queue is
//! effectively unbounded at this capacity; if it does fill, the producer
//! blocks. Dropping entries would break the copy-ahead guarantee that every
//! in-window scan finds its data already in place.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::index::{IndexRecord, OrderedIndex};
use crate::vlog::ValueLog;

/// Capacity of the per-segment command queue.
pub const QUEUE_CAPACITY: usize = 1 << 20;

/// How often an idle worker re-checks the done flag.
const IDLE_POLL: Duration = Duration::from_millis(10);

const BACKOFF_START: Duration = Duration::from_millis(1);
const BACKOFF_CAP: Duration = Duration::from_millis(250);

pub(crate) enum WriterCmd {
    /// Install an index entry.
    Apply(IndexRecord),
    /// Empty the index and value log, serialized behind pending applies.
    /// The worker reports how many index entries it dropped.
    Clear(Sender<usize>),
    /// Drain whatever is queued, then exit.
    Shutdown,
}

/// Handle to a segment's writer thread.
pub struct AsyncWriter {
    tx: SyncSender<WriterCmd>,
    pending: Arc<AtomicI64>,
    done: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncWriter {
    /// Spawns the worker thread for a segment. The thread lives until
    /// [`shutdown`](Self::shutdown) and is reused across segment frees.
    pub(crate) fn spawn(index: Arc<OrderedIndex>, vlog: Arc<ValueLog>) -> Self {
        let (tx, rx) = sync_channel(QUEUE_CAPACITY);
        let pending = Arc::new(AtomicI64::new(0));
        let done = Arc::new(AtomicBool::new(false));

        let handle = {
            let pending = pending.clone();
            let done = done.clone();
            thread::spawn(move || run(&index, &vlog, &rx, &pending, &done))
        };

        Self {
            tx,
            pending,
            done,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Publishes an index entry to the worker. Blocks only if the queue is
    /// full. The pending counter is bumped before the send so it never
    /// transiently undercounts.
    pub(crate) fn enqueue(&self, record: IndexRecord) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(WriterCmd::Apply(record)).is_err() {
            // Worker gone (post-shutdown write); the entry is lost.
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Clears the index and value log through the worker queue, so the clear
    /// lands after every pending insert. Blocks until the worker has applied
    /// it and returns the number of index entries dropped, counted by the
    /// worker at that point; a count taken on the calling thread could miss
    /// applies still queued ahead of the clear.
    pub(crate) fn clear(&self) -> usize {
        let (ack_tx, ack_rx) = channel();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(WriterCmd::Clear(ack_tx)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return 0;
        }
        ack_rx.recv().unwrap_or(0)
    }

    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Spin until every queued command has been applied, backing off
    /// exponentially from 1ms up to 250ms per sleep.
    pub fn wait_drain(&self) {
        let mut delay = BACKOFF_START;
        while self.pending.load(Ordering::SeqCst) > 0 {
            thread::sleep(delay);
            delay = (delay * 2).min(BACKOFF_CAP);
        }
    }

    /// Signals the worker to drain and exit.
    pub(crate) fn shutdown(&self) {
        self.done.store(true, Ordering::SeqCst);
        // Best-effort wakeup; the idle poll catches the flag regardless.
        let _ = self.tx.try_send(WriterCmd::Shutdown);
    }

    /// Waits for the worker thread to exit.
    pub(crate) fn join(&self) {
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn run(
    index: &OrderedIndex,
    vlog: &ValueLog,
    rx: &Receiver<WriterCmd>,
    pending: &AtomicI64,
    done: &AtomicBool,
) {
    loop {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(WriterCmd::Shutdown) => break,
            Ok(cmd) => apply(index, vlog, cmd, pending),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if done.load(Ordering::SeqCst) {
            break;
        }
    }
    // Entries enqueued before shutdown are still applied.
    while let Ok(cmd) = rx.try_recv() {
        match cmd {
            WriterCmd::Shutdown => {}
            cmd => apply(index, vlog, cmd, pending),
        }
    }
}

fn apply(index: &OrderedIndex, vlog: &ValueLog, cmd: WriterCmd, pending: &AtomicI64) {
    match cmd {
        WriterCmd::Apply(record) => {
            index.set(record);
            pending.fetch_sub(1, Ordering::SeqCst);
        }
        WriterCmd::Clear(ack) => {
            let removed = index.len();
            index.clear();
            if let Err(err) = vlog.clear() {
                tracing::error!(error = %err, "value log clear failed");
            }
            // Report before the pending decrement so a caller waiting on the
            // drain finds the count already posted.
            let _ = ack.send(removed);
            pending.fetch_sub(1, Ordering::SeqCst);
        }
        WriterCmd::Shutdown => {}
    }
}

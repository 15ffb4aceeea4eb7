//! Scheduler statistics.
//!
//! Counters are recorded into plain thread-local cells with no
//! synchronization at all, then flushed into a global atomic accumulator by
//! [`report_thread_stats`]. Workers flush when a stats merge is requested
//! (see `Scheduler::merge_worker_thread_stats`) and once more at thread
//! exit; the thread that drives the scheduler flushes itself.

use crossbeam::utils::CachePadded;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct LocalStats {
    loops_scheduled: Cell<u64>,
    serial_loops: Cell<u64>,
    chunks_executed: Cell<u64>,
    indices_visited: Cell<u64>,
}

thread_local! {
    static LOCAL: LocalStats = LocalStats::default();
}

struct GlobalStats {
    loops_scheduled: CachePadded<AtomicU64>,
    serial_loops: CachePadded<AtomicU64>,
    chunks_executed: CachePadded<AtomicU64>,
    indices_visited: CachePadded<AtomicU64>,
}

static GLOBAL: GlobalStats = GlobalStats {
    loops_scheduled: CachePadded::new(AtomicU64::new(0)),
    serial_loops: CachePadded::new(AtomicU64::new(0)),
    chunks_executed: CachePadded::new(AtomicU64::new(0)),
    indices_visited: CachePadded::new(AtomicU64::new(0)),
};

/// One loop pushed onto a pool.
pub(crate) fn record_loop_scheduled() {
    LOCAL.with(|s| s.loops_scheduled.set(s.loops_scheduled.get() + 1));
}

/// One loop executed on the serial fast path.
pub(crate) fn record_serial_loop() {
    LOCAL.with(|s| s.serial_loops.set(s.serial_loops.get() + 1));
}

/// One chunk of `indices` consecutive indices executed.
pub(crate) fn record_chunk(indices: u64) {
    LOCAL.with(|s| {
        s.chunks_executed.set(s.chunks_executed.get() + 1);
        s.indices_visited.set(s.indices_visited.get() + indices);
    });
}

/// Flushes the calling thread's counters into the global accumulator and
/// resets them.
pub fn report_thread_stats() {
    LOCAL.with(|s| {
        GLOBAL
            .loops_scheduled
            .fetch_add(s.loops_scheduled.take(), Ordering::Relaxed);
        GLOBAL
            .serial_loops
            .fetch_add(s.serial_loops.take(), Ordering::Relaxed);
        GLOBAL
            .chunks_executed
            .fetch_add(s.chunks_executed.take(), Ordering::Relaxed);
        GLOBAL
            .indices_visited
            .fetch_add(s.indices_visited.take(), Ordering::Relaxed);
    });
}

/// Snapshot of the global accumulator at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Loops that went through the pool.
    pub loops_scheduled: u64,
    /// Loops that ran on the serial fast path.
    pub serial_loops: u64,
    /// Chunks claimed and executed, across all threads.
    pub chunks_executed: u64,
    /// Individual loop indices visited, across all threads.
    pub indices_visited: u64,
}

impl StatsSnapshot {
    /// Mean number of indices per executed chunk.
    pub fn mean_chunk_len(&self) -> f64 {
        if self.chunks_executed > 0 {
            self.indices_visited as f64 / self.chunks_executed as f64
        } else {
            0.0
        }
    }
}

/// Reads the global accumulator. Only counters already flushed by
/// [`report_thread_stats`] (or a stats merge) are visible here.
pub fn snapshot() -> StatsSnapshot {
    StatsSnapshot {
        loops_scheduled: GLOBAL.loops_scheduled.load(Ordering::Relaxed),
        serial_loops: GLOBAL.serial_loops.load(Ordering::Relaxed),
        chunks_executed: GLOBAL.chunks_executed.load(Ordering::Relaxed),
        indices_visited: GLOBAL.indices_visited.load(Ordering::Relaxed),
    }
}

/// Clears the global accumulator and the calling thread's local counters.
///
/// Intended for tests. Unlike [`Scheduler::merge_worker_thread_stats`],
/// this does not coordinate with other threads: their local counters are
/// untouched and may be flushed into the accumulator afterwards.
///
/// [`Scheduler::merge_worker_thread_stats`]: crate::Scheduler::merge_worker_thread_stats
pub fn reset() {
    LOCAL.with(|s| {
        s.loops_scheduled.set(0);
        s.serial_loops.set(0);
        s.chunks_executed.set(0);
        s.indices_visited.set(0);
    });
    GLOBAL.loops_scheduled.store(0, Ordering::Relaxed);
    GLOBAL.serial_loops.store(0, Ordering::Relaxed);
    GLOBAL.chunks_executed.store(0, Ordering::Relaxed);
    GLOBAL.indices_visited.store(0, Ordering::Relaxed);
}

//! Scheduler lifecycle and parallel-for entry points.
//!
//! The [`Scheduler`] is the primary interface of the crate. It owns the
//! worker threads, the mutex-guarded stack of pending loops, and the two
//! condition variables the drain and stats-merge protocols wait on. It is
//! an explicit value rather than process-global state so tests can run
//! several independent pools side by side.

use crate::barrier::Barrier;
use crate::job::ForLoop;
use crate::{stats, worker, SchedulerConfig};
use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// Pool state guarded by the scheduler mutex. Every field, and every
/// progress counter of the loops held in `work`, is mutated only while the
/// lock is held.
pub(crate) struct PoolState {
    /// Pending loops as a stack; the last element is the head being
    /// drained. More than one entry only occurs under (unsupported) nested
    /// scheduling.
    pub(crate) work: Vec<Arc<ForLoop>>,
    pub(crate) shutdown: bool,
    pub(crate) report_requested: bool,
    /// Bumped once per stats merge; workers compare it against the epoch
    /// they last answered.
    pub(crate) report_epoch: u64,
    /// Workers that still owe a report for the current merge.
    pub(crate) reporters_left: usize,
}

impl PoolState {
    /// Removes `job` from the pending stack if it is still linked.
    pub(crate) fn unlink(&mut self, job: &Arc<ForLoop>) {
        if let Some(pos) = self.work.iter().position(|l| Arc::ptr_eq(l, job)) {
            self.work.remove(pos);
        }
    }
}

/// State shared between the scheduler handle and its workers.
pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    /// Workers sleep here when idle; the caller of a pooled loop sleeps
    /// here while its drained loop still has chunks in flight.
    pub(crate) work_cv: Condvar,
    /// The stats-merge initiator sleeps here until every worker reported.
    pub(crate) report_cv: Condvar,
}

/// Number of logical cores on this machine, at least 1.
pub fn num_system_cores() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// A chunked parallel-for scheduler over a persistent worker-thread pool.
///
/// Construction is cheap and spawns nothing; a scheduler only executes in
/// parallel between [`Scheduler::init`] and [`Scheduler::shutdown`].
/// Outside that window every loop runs serially on the calling thread.
pub struct Scheduler {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Creates a scheduler for a pool of `num_threads` total threads
    /// (the initializing thread counts as one of them).
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0, "pool needs at least one thread");
        Self::with_config(SchedulerConfig {
            num_threads: Some(num_threads),
            ..SchedulerConfig::default()
        })
    }

    /// Creates a scheduler with one pool thread per hardware core.
    pub fn with_default_threads() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates a scheduler with custom configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Scheduler {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    work: Vec::new(),
                    shutdown: false,
                    report_requested: false,
                    report_epoch: 0,
                    reporters_left: 0,
                }),
                work_cv: Condvar::new(),
                report_cv: Condvar::new(),
            }),
            threads: Vec::new(),
            config,
        }
    }

    /// Spawns the worker threads.
    ///
    /// The calling thread becomes worker index 0 and later helps drain
    /// every loop it schedules. Returns only once all workers have
    /// published their thread index and finished per-thread setup, so no
    /// `parallel_for` call can race with an incompletely started pool.
    ///
    /// Thread-spawn failure is fatal: a partial pool would leave the
    /// already-spawned workers parked at the startup barrier forever.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler is already running.
    pub fn init(&mut self) {
        assert!(
            self.threads.is_empty(),
            "scheduler already initialized; call shutdown() first"
        );
        worker::set_thread_index(0);

        let num_threads = self.max_thread_index();
        let barrier = Arc::new(Barrier::new(num_threads));
        for index in 1..num_threads {
            let shared = Arc::clone(&self.shared);
            let barrier = Arc::clone(&barrier);
            let pinning = self.config.pinning;
            let handle = thread::Builder::new()
                .name(format!("parloop-worker-{index}"))
                .spawn(move || worker::worker_entry(shared, index, barrier, pinning))
                .unwrap_or_else(|err| panic!("failed to spawn worker thread {index}: {err}"));
            self.threads.push(handle);
        }
        barrier.wait();
    }

    /// Stops and joins all worker threads.
    ///
    /// No-op when no threads are running, so calling it twice (or on a
    /// never-initialized scheduler) is fine. Pending loops are not drained;
    /// a well-behaved caller has no loop outstanding when it shuts the pool
    /// down. After this returns the scheduler can be `init()`-ed again.
    ///
    /// Returns an error describing how many workers panicked, if any.
    pub fn shutdown(&mut self) -> Result<(), String> {
        if self.threads.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            self.shared.work_cv.notify_all();
        }

        let mut panicked = 0;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        self.shared.state.lock().unwrap().shutdown = false;

        if panicked > 0 {
            Err(format!("{panicked} worker thread(s) panicked"))
        } else {
            Ok(())
        }
    }

    /// Number of distinct thread indices this pool can produce, i.e. the
    /// configured pool size (or the hardware core count when unset).
    /// Suitable for sizing per-thread scratch arrays before `init()`.
    pub fn max_thread_index(&self) -> usize {
        self.config.num_threads.unwrap_or_else(num_system_cores).max(1)
    }

    /// Number of currently spawned worker threads (pool size minus one
    /// while running, zero otherwise).
    pub fn num_workers(&self) -> usize {
        self.threads.len()
    }

    /// Runs `func` for every index in `[0, count)` with chunk size 1.
    ///
    /// Blocking; see [`Scheduler::parallel_for_chunked`].
    pub fn parallel_for<F>(&self, count: i64, func: F)
    where
        F: Fn(i64) + Sync,
    {
        self.parallel_for_chunked(count, 1, func);
    }

    /// Runs `func` for every index in `[0, count)`, handing `chunk_size`
    /// consecutive indices to a thread per claim.
    ///
    /// Blocks until every index has been visited exactly once; the calling
    /// thread claims chunks alongside the workers rather than sleeping.
    /// There is no ordering guarantee between indices and no guarantee
    /// about which thread runs which index. If the pool is not running or
    /// `count < chunk_size`, the whole range runs in order on the calling
    /// thread without any locking.
    ///
    /// `func` must not panic and must not call back into the scheduler;
    /// nested parallel loops are unsupported.
    ///
    /// # Panics
    ///
    /// Panics if `count` is negative or `chunk_size` is not positive.
    pub fn parallel_for_chunked<F>(&self, count: i64, chunk_size: i64, func: F)
    where
        F: Fn(i64) + Sync,
    {
        assert!(count >= 0, "parallel_for count must be non-negative");
        assert!(chunk_size >= 1, "parallel_for chunk size must be positive");

        // Fast path: serial execution with no synchronization at all.
        if self.threads.is_empty() || count < chunk_size {
            stats::record_serial_loop();
            for index in 0..count {
                func(index);
            }
            return;
        }

        // Safety: this frame blocks until the loop is finished and the
        // unlink guard removes it from the work stack on every exit path.
        let job = Arc::new(unsafe { ForLoop::one_d(&func, count, chunk_size) });
        self.drain(job);
    }

    /// Runs `func(x, y)` for every cell of an `nx` x `ny` grid.
    ///
    /// The grid is linearized row-major with chunk size 1. The serial fast
    /// path (pool not running, or at most one cell) iterates y outer, x
    /// inner. Same blocking and exactly-once guarantees as
    /// [`Scheduler::parallel_for_chunked`].
    ///
    /// # Panics
    ///
    /// Panics if `nx` or `ny` is negative.
    pub fn parallel_for_2d<F>(&self, nx: i32, ny: i32, func: F)
    where
        F: Fn(i32, i32) + Sync,
    {
        assert!(nx >= 0 && ny >= 0, "parallel_for_2d extents must be non-negative");

        if self.threads.is_empty() || nx as i64 * ny as i64 <= 1 {
            stats::record_serial_loop();
            for y in 0..ny {
                for x in 0..nx {
                    func(x, y);
                }
            }
            return;
        }

        // Safety: as in parallel_for_chunked.
        let job = Arc::new(unsafe { ForLoop::two_d(&func, nx, ny) });
        self.drain(job);
    }

    /// Pushes `job` onto the pending stack and claims chunks from it on the
    /// calling thread until it is finished.
    fn drain(&self, job: Arc<ForLoop>) {
        stats::record_loop_scheduled();
        #[cfg(feature = "trace")]
        let _span = crate::trace::SpanGuard::new("parallel_for", worker::thread_index());

        let guard = UnlinkGuard {
            shared: &self.shared,
            job: &job,
            caller_mid_chunk: Cell::new(false),
        };

        let mut state = self.shared.state.lock().unwrap();
        state.work.push(Arc::clone(&job));
        self.shared.work_cv.notify_all();

        loop {
            if job.finished() {
                break;
            }
            if job.drained() {
                // All indices are claimed; wait for the in-flight chunks.
                // A worker finishing the last one notifies this condvar.
                state = self.shared.work_cv.wait(state).unwrap();
                continue;
            }

            let (start, end) = job.claim_chunk();
            if job.drained() {
                state.unlink(&job);
            }
            guard.caller_mid_chunk.set(true);

            drop(state);
            job.run_chunk(start, end);
            state = self.shared.state.lock().unwrap();
            job.finish_chunk();
            guard.caller_mid_chunk.set(false);
        }
        drop(state);

        // Normal exit: the loop is off the stack and every chunk has been
        // retired, so the guard has nothing left to do. It only matters on
        // unwind out of the callback above.
        std::mem::forget(guard);
    }

    /// Forces every live worker to flush its thread-local statistics into
    /// the global accumulator, exactly once each, and blocks until all of
    /// them have.
    ///
    /// Workers answer the request only while idle, never mid-chunk, so the
    /// merged snapshot is consistent. With no workers running this returns
    /// immediately. Must be called by the thread that owns the scheduler
    /// (enforced by `&mut self`); the owner's own counters are flushed with
    /// [`stats::report_thread_stats`].
    pub fn merge_worker_thread_stats(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.report_requested = true;
        state.report_epoch += 1;
        state.reporters_left = self.threads.len();
        self.shared.work_cv.notify_all();

        while state.reporters_left > 0 {
            state = self.shared.report_cv.wait(state).unwrap();
        }
        state.report_requested = false;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::with_default_threads()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            eprintln!("scheduler shutdown: {err}");
        }
    }
}

/// Cleans up after the drain loop if it unwinds (a panicking callback).
///
/// The closure behind the loop only lives as long as the drain frame, so
/// unwinding may not release it while any thread could still call it. The
/// guard removes the loop from the pending stack, abandons its unclaimed
/// indices, retires the caller's own claimed chunk (its `finish_chunk`
/// never ran), and then blocks until the workers have retired theirs.
struct UnlinkGuard<'a> {
    shared: &'a Shared,
    job: &'a Arc<ForLoop>,
    caller_mid_chunk: Cell<bool>,
}

impl Drop for UnlinkGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.unlink(self.job);
        self.job.abandon();
        if self.caller_mid_chunk.get() {
            self.job.finish_chunk();
        }
        while !self.job.finished() {
            state = self.shared.work_cv.wait(state).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_serial_without_init() {
        let scheduler = Scheduler::new(4);
        let sum = AtomicU64::new(0);
        scheduler.parallel_for(100, |i| {
            sum.fetch_add(i as u64, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 4950);
    }

    #[test]
    fn test_pooled_execution() {
        let mut scheduler = Scheduler::new(4);
        scheduler.init();
        assert_eq!(scheduler.num_workers(), 3);

        let sum = AtomicU64::new(0);
        scheduler.parallel_for_chunked(1000, 16, |i| {
            sum.fetch_add(i as u64, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 499_500);

        scheduler.shutdown().expect("shutdown failed");
        assert_eq!(scheduler.num_workers(), 0);
    }

    #[test]
    fn test_zero_count_is_a_no_op() {
        let mut scheduler = Scheduler::new(2);
        scheduler.init();
        scheduler.parallel_for(0, |_| panic!("must not be called"));
        scheduler.parallel_for_2d(0, 5, |_, _| panic!("must not be called"));
        scheduler.shutdown().expect("shutdown failed");
    }

    #[test]
    fn test_reinit_after_shutdown() {
        let mut scheduler = Scheduler::new(2);
        for _ in 0..3 {
            scheduler.init();
            let hits = AtomicU64::new(0);
            scheduler.parallel_for(50, |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            });
            assert_eq!(hits.load(Ordering::Relaxed), 50);
            scheduler.shutdown().expect("shutdown failed");
        }
    }

    #[test]
    #[should_panic(expected = "already initialized")]
    fn test_double_init_panics() {
        let mut scheduler = Scheduler::new(2);
        scheduler.init();
        scheduler.init();
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_count_panics() {
        let scheduler = Scheduler::new(1);
        scheduler.parallel_for(-1, |_| {});
    }

    #[test]
    fn test_max_thread_index_before_init() {
        let scheduler = Scheduler::new(6);
        assert_eq!(scheduler.max_thread_index(), 6);
        assert!(Scheduler::with_default_threads().max_thread_index() >= 1);
    }
}

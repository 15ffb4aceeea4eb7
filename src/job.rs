//! Parallel-for loop descriptors.
//!
//! A [`ForLoop`] records one queued parallel-for job: its callback, the
//! extent of its index space, the chunk granularity, and the two progress
//! counters that the pool mutex guards. Workers and the initiating caller
//! use the same claim/finish pair to drain it.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// The callback of a loop, 1-D or 2-D. 2-D bodies are linearized to
/// `[0, nx*ny)` and decoded as `i -> (i % nx, i / nx)`.
pub(crate) enum LoopBody {
    OneD(&'static (dyn Fn(i64) + Sync)),
    TwoD {
        func: &'static (dyn Fn(i32, i32) + Sync),
        width: i64,
    },
}

/// A queued parallel-for job.
///
/// `next_index` and `active_workers` are stored as atomics only so the type
/// is `Sync`; both are read and written exclusively with the pool mutex
/// held, so all accesses use relaxed ordering.
pub(crate) struct ForLoop {
    body: LoopBody,
    max_index: i64,
    chunk_size: i64,
    next_index: AtomicI64,
    active_workers: AtomicUsize,
}

impl ForLoop {
    /// Creates a 1-D loop over `[0, max_index)`.
    ///
    /// # Safety
    ///
    /// `func` is borrowed for `'static` here but usually lives on the
    /// caller's stack. The caller must not let the loop outlive the
    /// borrow: it has to block until [`ForLoop::finished`] before
    /// returning, and must unlink the loop from the shared work stack on
    /// every exit path so no worker can claim a chunk afterwards.
    pub(crate) unsafe fn one_d(
        func: &(dyn Fn(i64) + Sync),
        max_index: i64,
        chunk_size: i64,
    ) -> Self {
        let func: &'static (dyn Fn(i64) + Sync) = unsafe { std::mem::transmute(func) };
        ForLoop {
            body: LoopBody::OneD(func),
            max_index,
            chunk_size,
            next_index: AtomicI64::new(0),
            active_workers: AtomicUsize::new(0),
        }
    }

    /// Creates a 2-D loop over an `nx` x `ny` grid with chunk size 1.
    ///
    /// # Safety
    ///
    /// Same contract as [`ForLoop::one_d`].
    pub(crate) unsafe fn two_d(func: &(dyn Fn(i32, i32) + Sync), nx: i32, ny: i32) -> Self {
        let func: &'static (dyn Fn(i32, i32) + Sync) = unsafe { std::mem::transmute(func) };
        ForLoop {
            body: LoopBody::TwoD {
                func,
                width: nx as i64,
            },
            max_index: nx as i64 * ny as i64,
            chunk_size: 1,
            next_index: AtomicI64::new(0),
            active_workers: AtomicUsize::new(0),
        }
    }

    /// True once every index has been claimed. A drained loop must not stay
    /// in the work stack; it can still have chunks in flight.
    pub(crate) fn drained(&self) -> bool {
        self.next_index.load(Ordering::Relaxed) >= self.max_index
    }

    /// True once every index has been claimed and no thread is still
    /// executing a chunk. The sole termination predicate.
    pub(crate) fn finished(&self) -> bool {
        self.drained() && self.active_workers.load(Ordering::Relaxed) == 0
    }

    /// Claims the next chunk: `[start, end)` with `end - start` at most the
    /// chunk size. Bumps `active_workers`. Pool mutex must be held.
    pub(crate) fn claim_chunk(&self) -> (i64, i64) {
        let start = self.next_index.load(Ordering::Relaxed);
        let end = (start + self.chunk_size).min(self.max_index);
        self.next_index.store(end, Ordering::Relaxed);
        self.active_workers.fetch_add(1, Ordering::Relaxed);
        (start, end)
    }

    /// Marks a claimed chunk as executed. Pool mutex must be held.
    /// Returns true if the loop is now finished.
    pub(crate) fn finish_chunk(&self) -> bool {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
        self.finished()
    }

    /// Abandons the unclaimed remainder of the index space, so the loop
    /// counts as finished once the in-flight chunks land. Used when the
    /// initiating call unwinds. Pool mutex must be held.
    pub(crate) fn abandon(&self) {
        self.next_index.store(self.max_index, Ordering::Relaxed);
    }

    /// Runs the callback for every index in `[start, end)`. Called with the
    /// pool mutex released.
    pub(crate) fn run_chunk(&self, start: i64, end: i64) {
        #[cfg(feature = "trace")]
        let _span = crate::trace::SpanGuard::new("chunk", crate::worker::thread_index());

        for index in start..end {
            match self.body {
                LoopBody::OneD(func) => func(index),
                LoopBody::TwoD { func, width } => {
                    func((index % width) as i32, (index / width) as i32);
                }
            }
        }
        crate::stats::record_chunk((end - start) as u64);
    }
}

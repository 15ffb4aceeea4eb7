//! Worker thread implementation.
//!
//! Each worker repeatedly claims a chunk from the head of the pending-loop
//! stack and executes it with the pool mutex released. When there is no
//! work it sleeps on the pool condvar; when a stats report has been
//! requested it flushes its thread-local counters first. The decision order
//! inside the locked loop is: shutdown, report, idle wait, claim.

use crate::barrier::Barrier;
use crate::scheduler::Shared;
use crate::{stats, PinningStrategy};
use std::cell::Cell;
use std::sync::Arc;

thread_local! {
    static THREAD_INDEX: Cell<usize> = const { Cell::new(0) };
}

/// Index of the current thread within its pool: 0 for the thread that
/// initialized the scheduler (and for any thread that never joined a pool),
/// `1..N` for spawned workers. Useful for partitioning per-thread scratch
/// buffers; always below the scheduler's `max_thread_index()`.
pub fn thread_index() -> usize {
    THREAD_INDEX.with(|idx| idx.get())
}

pub(crate) fn set_thread_index(index: usize) {
    THREAD_INDEX.with(|idx| idx.set(index));
}

/// Entry point of a spawned worker thread.
///
/// Publishes the thread index and applies core pinning before crossing the
/// init barrier, so `Scheduler::init` cannot return while any worker is
/// still setting up.
pub(crate) fn worker_entry(
    shared: Arc<Shared>,
    index: usize,
    barrier: Arc<Barrier>,
    pinning: PinningStrategy,
) {
    set_thread_index(index);
    pin_current_thread(index, pinning);
    barrier.wait();
    drop(barrier);

    run_loop(&shared);

    // Flush whatever this thread recorded since the last merge; otherwise
    // the counts would die with the thread.
    stats::report_thread_stats();
    #[cfg(feature = "trace")]
    crate::trace::collect_local_spans();
}

fn pin_current_thread(index: usize, strategy: PinningStrategy) {
    let target = match strategy {
        PinningStrategy::None => return,
        PinningStrategy::Linear => index,
        PinningStrategy::AvoidSmt => index * 2,
    };
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(core) = core_ids.get(target) {
            core_affinity::set_for_current(*core);
        }
    }
}

fn run_loop(shared: &Shared) {
    // Epoch of the last merge this thread answered; guards against a
    // spurious wakeup reporting twice in the same merge round.
    let mut reported_epoch = 0u64;

    let mut state = shared.state.lock().unwrap();
    while !state.shutdown {
        if state.report_requested && reported_epoch < state.report_epoch {
            reported_epoch = state.report_epoch;
            stats::report_thread_stats();
            state.reporters_left -= 1;
            if state.reporters_left == 0 {
                shared.report_cv.notify_one();
            }
            state = shared.work_cv.wait(state).unwrap();
        } else if state.work.is_empty() {
            state = shared.work_cv.wait(state).unwrap();
        } else {
            // Claim a chunk from the head loop. The head is unlinked as
            // soon as its last index is claimed, so every loop in the
            // stack still has indices available.
            let job = Arc::clone(state.work.last().unwrap());
            let (start, end) = job.claim_chunk();
            if job.drained() {
                state.unlink(&job);
            }

            drop(state);
            job.run_chunk(start, end);
            state = shared.state.lock().unwrap();

            if job.finish_chunk() {
                // The initiating caller waits on this condvar for the last
                // in-flight chunk of its loop.
                shared.work_cv.notify_all();
            }
        }
    }
}

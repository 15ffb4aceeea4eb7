//! # parloop - Chunked Parallel-For Scheduler
//!
//! A parallel-for scheduler that splits a 1-D or 2-D iteration space into
//! chunks and drains them across a pool of persistent worker threads. The
//! calling thread participates in the drain instead of blocking passively,
//! so a `parallel_for` call returns exactly when every index has been
//! visited once.
//!
//! ## Architecture
//!
//! A [`Scheduler`] owns the worker threads and a mutex-guarded stack of
//! pending loops. Key components include:
//!
//! - **ForLoop**: a queued description of one parallel-for job
//! - **Chunk claim**: under the pool lock, a thread takes the next
//!   `chunk_size` indices of the head loop and executes them unlocked
//! - **Barrier**: one-shot rendezvous used during pool startup
//! - **Stats merge**: a cooperative protocol that forces every idle worker
//!   to flush its thread-local statistics exactly once
//!
//! ## Example
//!
//! ```no_run
//! use parloop::Scheduler;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! let mut scheduler = Scheduler::new(4); // 4 pool threads (3 spawned + caller)
//! scheduler.init();
//!
//! let sum = AtomicU64::new(0);
//! scheduler.parallel_for(1000, |i| {
//!     sum.fetch_add(i as u64, Ordering::Relaxed);
//! });
//! assert_eq!(sum.load(Ordering::Relaxed), 499_500);
//!
//! scheduler.shutdown().expect("shutdown failed");
//! ```
//!
//! A scheduler that was never `init()`-ed runs every loop serially on the
//! calling thread, which keeps small workloads free of synchronization
//! overhead and makes the crate usable without any setup.

pub mod barrier;
pub mod iter;
mod job;
pub mod scheduler;
pub mod stats;
#[cfg(feature = "trace")]
pub mod trace;
pub mod worker;

use serde::{Deserialize, Serialize};

/// Strategy for pinning worker threads to CPU cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (worker i -> logical processor i).
    Linear,
    /// Pin to even-numbered logical processors only, avoiding SMT contention.
    AvoidSmt,
}

/// Configuration for a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Total pool size including the calling thread. `None` means one
    /// thread per hardware core.
    pub num_threads: Option<usize>,
    /// Core pinning applied to spawned workers.
    pub pinning: PinningStrategy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            pinning: PinningStrategy::None,
        }
    }
}

pub use barrier::Barrier;
pub use scheduler::{num_system_cores, Scheduler};
pub use stats::StatsSnapshot;
pub use worker::thread_index;

//! Stats-merge protocol: every worker reports exactly once per merge, and
//! nothing is lost at shutdown.
//!
//! The accumulator is process-wide, so these tests serialize on a lock and
//! reset it; they must not share a binary with other stats assertions.

use parloop::{stats, Scheduler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static TEST_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_merge_with_no_pool_returns_immediately() {
    let _guard = TEST_LOCK.lock().unwrap();
    let mut scheduler = Scheduler::new(4); // never init()-ed
    scheduler.merge_worker_thread_stats();
}

#[test]
fn test_merge_collects_every_chunk() {
    let _guard = TEST_LOCK.lock().unwrap();
    stats::reset();

    let mut scheduler = Scheduler::new(4);
    scheduler.init();

    let sum = AtomicU64::new(0);
    scheduler.parallel_for_chunked(1000, 10, |i| {
        sum.fetch_add(i as u64, Ordering::Relaxed);
    });
    assert_eq!(sum.load(Ordering::Relaxed), 499_500);

    scheduler.merge_worker_thread_stats();
    stats::report_thread_stats(); // the driving thread flushes itself

    let snapshot = stats::snapshot();
    assert_eq!(snapshot.loops_scheduled, 1);
    assert_eq!(snapshot.indices_visited, 1000);
    // 1000 indices in claims of exactly 10.
    assert_eq!(snapshot.chunks_executed, 100);
    assert_eq!(snapshot.mean_chunk_len(), 10.0);

    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn test_repeated_merges_do_not_double_count() {
    let _guard = TEST_LOCK.lock().unwrap();
    stats::reset();

    let mut scheduler = Scheduler::new(4);
    scheduler.init();

    scheduler.parallel_for_chunked(600, 5, |_| {});

    scheduler.merge_worker_thread_stats();
    scheduler.merge_worker_thread_stats();
    scheduler.merge_worker_thread_stats();
    stats::report_thread_stats();

    // Reporting is flush-and-reset, so extra merges add nothing.
    assert_eq!(stats::snapshot().indices_visited, 600);

    scheduler.shutdown().expect("shutdown failed");
}

#[test]
fn test_shutdown_flushes_worker_stats() {
    let _guard = TEST_LOCK.lock().unwrap();
    stats::reset();

    let mut scheduler = Scheduler::new(2);
    scheduler.init();
    scheduler.parallel_for_chunked(500, 4, |_| {});
    scheduler.shutdown().expect("shutdown failed");

    // Workers flushed at exit; only the calling thread is outstanding.
    stats::report_thread_stats();
    assert_eq!(stats::snapshot().indices_visited, 500);
}

#[test]
fn test_serial_loops_are_counted() {
    let _guard = TEST_LOCK.lock().unwrap();
    stats::reset();

    let scheduler = Scheduler::new(4); // serial mode
    scheduler.parallel_for(10, |_| {});
    scheduler.parallel_for_2d(2, 2, |_, _| {});
    stats::report_thread_stats();

    let snapshot = stats::snapshot();
    assert_eq!(snapshot.serial_loops, 2);
    assert_eq!(snapshot.loops_scheduled, 0);
}

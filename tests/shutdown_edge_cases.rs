use parloop::Scheduler;
use std::sync::atomic::{AtomicU64, Ordering};

#[test]
fn test_double_shutdown_is_a_no_op() {
    let mut scheduler = Scheduler::new(2);
    scheduler.init();
    scheduler.shutdown().expect("first shutdown failed");
    // Second call has no threads left to stop.
    scheduler.shutdown().expect("second shutdown failed");
}

#[test]
fn test_shutdown_without_init_is_a_no_op() {
    let mut scheduler = Scheduler::new(2);
    scheduler.shutdown().expect("shutdown of idle scheduler failed");
}

#[test]
fn test_drop_joins_workers() {
    // Drop must shut the pool down cleanly without an explicit call.
    let mut scheduler = Scheduler::new(4);
    scheduler.init();
    scheduler.parallel_for(100, |_| {});
    drop(scheduler);
}

#[test]
fn test_pool_usable_across_reinit() {
    let mut scheduler = Scheduler::new(3);

    scheduler.init();
    let first = AtomicU64::new(0);
    scheduler.parallel_for(200, |_| {
        first.fetch_add(1, Ordering::Relaxed);
    });
    scheduler.shutdown().expect("shutdown failed");

    // Serial between the two pool lifetimes.
    let between = AtomicU64::new(0);
    scheduler.parallel_for(10, |_| {
        between.fetch_add(1, Ordering::Relaxed);
    });

    scheduler.init();
    let second = AtomicU64::new(0);
    scheduler.parallel_for(200, |_| {
        second.fetch_add(1, Ordering::Relaxed);
    });
    scheduler.shutdown().expect("shutdown failed");

    assert_eq!(first.load(Ordering::Relaxed), 200);
    assert_eq!(between.load(Ordering::Relaxed), 10);
    assert_eq!(second.load(Ordering::Relaxed), 200);
}

use parloop::{stats, thread_index, Scheduler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

fn main() {
    println!("parloop - Chunked Parallel-For Scheduler\n");

    let num_threads = 4;
    let mut scheduler = Scheduler::new(num_threads);
    scheduler.init();
    println!("Initialized pool with {} threads\n", num_threads);

    // Example 1: 1-D parallel loop
    println!("Example 1: Parallel summation");
    let count = 1_000_000i64;
    let sum = AtomicU64::new(0);

    let start = Instant::now();
    scheduler.parallel_for_chunked(count, 4096, |i| {
        sum.fetch_add(i as u64, Ordering::Relaxed);
    });
    let duration = start.elapsed();

    let expected: u64 = (0..count as u64).sum();
    println!("  Summed {} indices in {:?}", count, duration);
    println!("  Result: {} (expected: {})\n", sum.load(Ordering::Relaxed), expected);

    // Example 2: 2-D grid, one histogram bucket per pool thread
    println!("Example 2: 2-D grid with per-thread partitioning");
    let (nx, ny) = (1024, 1024);
    let per_thread: Vec<AtomicU64> = (0..scheduler.max_thread_index())
        .map(|_| AtomicU64::new(0))
        .collect();

    let start = Instant::now();
    scheduler.parallel_for_2d(nx, ny, |_x, _y| {
        per_thread[thread_index()].fetch_add(1, Ordering::Relaxed);
    });
    let duration = start.elapsed();

    let total: u64 = per_thread.iter().map(|c| c.load(Ordering::Relaxed)).sum();
    println!("  Visited {} cells in {:?}", total, duration);
    for (index, cells) in per_thread.iter().enumerate() {
        println!("  Thread {}: {} cells", index, cells.load(Ordering::Relaxed));
    }
    println!();

    // Example 3: statistics merge
    println!("Example 3: Statistics");
    scheduler.merge_worker_thread_stats();
    stats::report_thread_stats();
    let snapshot = stats::snapshot();
    println!("  Loops scheduled:  {}", snapshot.loops_scheduled);
    println!("  Serial loops:     {}", snapshot.serial_loops);
    println!("  Chunks executed:  {}", snapshot.chunks_executed);
    println!("  Indices visited:  {}", snapshot.indices_visited);
    println!("  Mean chunk size:  {:.1}\n", snapshot.mean_chunk_len());

    println!("Shutting down...");
    match scheduler.shutdown() {
        Ok(()) => println!("Done!"),
        Err(err) => eprintln!("Shutdown error: {}", err),
    }
}

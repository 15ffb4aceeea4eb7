//! One-shot barrier for multi-thread rendezvous.
//!
//! Unlike `std::sync::Barrier` this barrier is single-use: once all
//! participants have passed, further waits are a usage error. It should be
//! shared through an `Arc` so the memory outlives every participant still
//! inside [`Barrier::wait`].

use std::sync::{Condvar, Mutex};

/// A one-shot rendezvous for a fixed number of participants.
pub struct Barrier {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Barrier {
    /// Creates a barrier for `count` participants.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new(count: usize) -> Self {
        assert!(count > 0, "barrier needs at least one participant");
        Barrier {
            count: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    /// Blocks until all participants have arrived.
    ///
    /// The last arriver wakes everyone and returns immediately.
    ///
    /// # Panics
    ///
    /// Panics if called more times than the configured participant count.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        assert!(*count > 0, "barrier waited on more times than its participant count");
        *count -= 1;
        if *count == 0 {
            self.cv.notify_all();
        } else {
            while *count > 0 {
                count = self.cv.wait(count).unwrap();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_participant_returns_immediately() {
        let barrier = Barrier::new(1);
        barrier.wait();
    }

    #[test]
    fn test_all_participants_return() {
        let n = 4;
        let barrier = Arc::new(Barrier::new(n));
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..n - 1)
            .map(|_| {
                let barrier = barrier.clone();
                let passed = passed.clone();
                thread::spawn(move || {
                    barrier.wait();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        barrier.wait();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), n - 1);
    }

    #[test]
    #[should_panic(expected = "more times than its participant count")]
    fn test_over_wait_panics() {
        let barrier = Barrier::new(1);
        barrier.wait();
        barrier.wait();
    }

    #[test]
    #[should_panic(expected = "at least one participant")]
    fn test_zero_participants_panics() {
        let _ = Barrier::new(0);
    }
}

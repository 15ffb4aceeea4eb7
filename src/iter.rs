//! Slice adapters over the scheduler.
//!
//! Extension traits that map slice elements onto `parallel_for_chunked`,
//! picking a chunk size from the pool width so each thread gets a few
//! claims' worth of work.

use crate::Scheduler;

/// A mutable slice stripped of its borrow so it can be shared with the
/// pool. Sound only because the scheduler hands each index to exactly one
/// callback invocation, so no element is ever touched from two threads.
struct UnsafeSlice<T> {
    ptr: *mut [T],
}

unsafe impl<T> Send for UnsafeSlice<T> {}
unsafe impl<T> Sync for UnsafeSlice<T> {}

impl<T> UnsafeSlice<T> {
    fn new(slice: &mut [T]) -> Self {
        Self {
            ptr: slice as *mut [T],
        }
    }

    /// # Safety
    ///
    /// No other thread may hold a reference to element `index` while the
    /// returned borrow is live.
    unsafe fn get_mut<'a>(&self, index: usize) -> &'a mut T {
        unsafe { &mut (*self.ptr)[index] }
    }
}

// Deriving these would demand T: Copy.
impl<T> Copy for UnsafeSlice<T> {}
impl<T> Clone for UnsafeSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

fn chunk_for(scheduler: &Scheduler, len: usize) -> i64 {
    // A few chunks per pool thread keeps claims rare while still letting
    // the pool balance uneven element costs.
    ((len / (scheduler.max_thread_index() * 4)).max(1)) as i64
}

pub trait ParallelSlice<T> {
    fn par_iter<'a>(&'a self, scheduler: &'a Scheduler) -> ParallelIter<'a, T>;
}

pub trait ParallelSliceMut<T> {
    fn par_iter_mut<'a>(&'a mut self, scheduler: &'a Scheduler) -> ParallelIterMut<'a, T>;
}

impl<T: Sync> ParallelSlice<T> for [T] {
    fn par_iter<'a>(&'a self, scheduler: &'a Scheduler) -> ParallelIter<'a, T> {
        ParallelIter {
            slice: self,
            scheduler,
        }
    }
}

impl<T: Send> ParallelSliceMut<T> for [T] {
    fn par_iter_mut<'a>(&'a mut self, scheduler: &'a Scheduler) -> ParallelIterMut<'a, T> {
        ParallelIterMut {
            slice: self,
            scheduler,
        }
    }
}

pub struct ParallelIter<'a, T> {
    slice: &'a [T],
    scheduler: &'a Scheduler,
}

impl<'a, T: Sync> ParallelIter<'a, T> {
    pub fn for_each<F>(self, op: F)
    where
        F: Fn(&T) + Sync,
    {
        let len = self.slice.len();
        let slice = self.slice;
        // Loop callbacks borrow from this frame, so no 'static hoops: the
        // drain blocks until every index has run.
        self.scheduler
            .parallel_for_chunked(len as i64, chunk_for(self.scheduler, len), |i| {
                op(&slice[i as usize]);
            });
    }
}

pub struct ParallelIterMut<'a, T> {
    slice: &'a mut [T],
    scheduler: &'a Scheduler,
}

impl<'a, T: Send> ParallelIterMut<'a, T> {
    pub fn for_each<F>(self, op: F)
    where
        F: Fn(&mut T) + Sync,
    {
        let len = self.slice.len();
        let slice = UnsafeSlice::new(self.slice);
        self.scheduler
            .parallel_for_chunked(len as i64, chunk_for(self.scheduler, len), |i| {
                // Safety: each index is visited exactly once, so access
                // through the slice is disjoint.
                let item = unsafe { slice.get_mut(i as usize) };
                op(item);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_par_iter_reads_every_element() {
        let mut scheduler = Scheduler::new(4);
        scheduler.init();

        let data: Vec<u64> = (0..1000).collect();
        let sum = AtomicU64::new(0);
        data.par_iter(&scheduler).for_each(|v| {
            sum.fetch_add(*v, Ordering::Relaxed);
        });

        assert_eq!(sum.load(Ordering::Relaxed), 499_500);
        scheduler.shutdown().expect("shutdown failed");
    }

    #[test]
    fn test_par_iter_mut_writes_every_element() {
        let mut scheduler = Scheduler::new(4);
        scheduler.init();

        let mut data = vec![0u64; 512];
        data.par_iter_mut(&scheduler).for_each(|v| *v += 7);

        assert!(data.iter().all(|&v| v == 7));
        scheduler.shutdown().expect("shutdown failed");
    }

    #[test]
    fn test_par_iter_on_serial_scheduler() {
        let scheduler = Scheduler::new(1);
        let mut data = vec![1u64; 64];
        data.par_iter_mut(&scheduler).for_each(|v| *v *= 2);
        assert!(data.iter().all(|&v| v == 2));
    }
}

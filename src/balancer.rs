//! The load-balancer (§5, §7).
//!
//! Threads only block on three things in the hot paths: requesting the next
//! batch from the load-balancer, the per-thread log mutex, and the phase
//! barrier. This module is the first of those. It hands out half-open
//! index ranges `[begin, end)` over a flat id space, and aggregates the
//! first non-ok status reported by any worker so a phase can abort cleanly
//! without hot loops allocating error values on every iteration.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::EngineError;

/// Hands out `[begin, end)` ranges over `0..total` in `batch_size`-sized
/// chunks. Safe to share behind a `&LoadBalancer` across worker threads.
pub struct LoadBalancer {
    total: u64,
    batch_size: u64,
    cursor: AtomicU64,
}

impl LoadBalancer {
    pub fn new(total: u64, batch_size: u64) -> Self {
        LoadBalancer {
            total,
            batch_size: batch_size.max(1),
            cursor: AtomicU64::new(0),
        }
    }

    /// Atomically claim the next batch. Returns `None` once exhausted.
    pub fn next_batch(&self) -> Option<(u64, u64)> {
        loop {
            let begin = self.cursor.load(Ordering::Relaxed);
            if begin >= self.total {
                return None;
            }
            let end = (begin + self.batch_size).min(self.total);
            if self
                .cursor
                .compare_exchange(begin, end, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Some((begin, end));
            }
        }
    }

    /// Run `work` over every batch using rayon for the actual worker pool,
    /// matching §5's "fixed-size pool drawn from hardware concurrency"
    /// scheduling model while keeping the explicit batch hand-out the spec
    /// requires. The first error reported by any batch aborts the phase;
    /// other in-flight batches still complete (rayon has no cooperative
    /// cancellation), but their results are discarded.
    pub fn for_each_batch<F>(&self, work: F) -> Result<(), EngineError>
    where
        F: Fn(u64, u64) -> Result<(), EngineError> + Sync,
    {
        let status: Mutex<Option<EngineError>> = Mutex::new(None);
        let batches = std::iter::from_fn(|| self.next_batch()).collect::<Vec<_>>();
        use rayon::prelude::*;
        batches.par_iter().for_each(|&(begin, end)| {
            if status.lock().unwrap().is_some() {
                return;
            }
            if let Err(e) = work(begin, end) {
                let mut slot = status.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(e);
                }
            }
        });
        match status.into_inner().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-thread-sharded counter used for the LowHash two-pass bucket sizing
/// discipline named in §5: pass 1 increments counts, pass 2 reads them back
/// to compute write offsets via a running prefix sum.
pub struct AtomicCounters {
    counts: Vec<AtomicUsize>,
}

impl AtomicCounters {
    pub fn new(n: usize) -> Self {
        AtomicCounters {
            counts: (0..n).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn increment(&self, index: usize) -> usize {
        self.counts[index].fetch_add(1, Ordering::Relaxed)
    }

    pub fn get(&self, index: usize) -> usize {
        self.counts[index].load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_disjoint_covering_batches() {
        let lb = LoadBalancer::new(103, 10);
        let mut seen = vec![false; 103];
        while let Some((begin, end)) = lb.next_batch() {
            for i in begin..end {
                assert!(!seen[i as usize], "batch overlap at {i}");
                seen[i as usize] = true;
            }
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn for_each_batch_propagates_first_error() {
        let lb = LoadBalancer::new(50, 5);
        let result = lb.for_each_batch(|begin, _end| {
            if begin == 20 {
                Err(EngineError::NoCandidates)
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }
}

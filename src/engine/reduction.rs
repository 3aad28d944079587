// src/engine/reduction.rs
//
// Cross-task min/max reduction.
//
// Every task folds the values it writes into a private LocalExtrema and merges
// it into the pass-wide ReductionState once, after its rows are committed. The
// merge is a compare-and-update loop per bound, so two workers merging at the
// same time can never lose each other's update.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Frozen `{min, max}` of a completed pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extrema {
    pub min: f32,
    pub max: f32,
}

impl Extrema {
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Sequential fold over the color channels of `bytes`, used as a baseline.
    pub fn scan(bytes: &[u8], channels: usize, color_channels: usize) -> Option<Self> {
        let mut local = LocalExtrema::default();
        for px in bytes.chunks_exact(channels) {
            for &v in &px[..color_channels.min(channels)] {
                local.fold(v as f32);
            }
        }
        local.finish()
    }
}

/// Task-private accumulator; never shared between threads.
#[derive(Clone, Copy, Debug)]
pub struct LocalExtrema {
    min: f32,
    max: f32,
}

impl Default for LocalExtrema {
    fn default() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }
}

impl LocalExtrema {
    #[inline]
    pub fn fold(&mut self, value: f32) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn finish(&self) -> Option<Extrema> {
        (!self.is_empty()).then_some(Extrema {
            min: self.min,
            max: self.max,
        })
    }
}

/// Pass-wide accumulator shared by all tasks of one pass.
#[derive(Debug)]
pub struct ReductionState {
    min_bits: AtomicU32,
    max_bits: AtomicU32,
    merges: AtomicUsize,
}

impl Default for ReductionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReductionState {
    pub fn new() -> Self {
        Self {
            min_bits: AtomicU32::new(f32::INFINITY.to_bits()),
            max_bits: AtomicU32::new(f32::NEG_INFINITY.to_bits()),
            merges: AtomicUsize::new(0),
        }
    }

    /// Merge a task-local result. Empty locals are counted but change nothing.
    pub fn merge(&self, local: &LocalExtrema) {
        if !local.is_empty() {
            update_bound(&self.min_bits, local.min, |new, cur| new < cur);
            update_bound(&self.max_bits, local.max, |new, cur| new > cur);
        }
        self.merges.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of merges so far.
    pub fn merges(&self) -> usize {
        self.merges.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Option<Extrema> {
        let min = f32::from_bits(self.min_bits.load(Ordering::Acquire));
        let max = f32::from_bits(self.max_bits.load(Ordering::Acquire));
        (min <= max).then_some(Extrema { min, max })
    }
}

/// Store `candidate` if `better(candidate, current)` holds, retrying on contention.
fn update_bound<F>(cell: &AtomicU32, candidate: f32, better: F)
where
    F: Fn(f32, f32) -> bool,
{
    let mut current = cell.load(Ordering::Acquire);
    while better(candidate, f32::from_bits(current)) {
        match cell.compare_exchange_weak(
            current,
            candidate.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn empty_state_has_no_snapshot() {
        let state = ReductionState::new();
        assert_eq!(state.snapshot(), None);
        state.merge(&LocalExtrema::default());
        assert_eq!(state.snapshot(), None);
        assert_eq!(state.merges(), 1);
    }

    #[test]
    fn local_fold_and_merge() {
        let mut a = LocalExtrema::default();
        a.fold(10.0);
        a.fold(3.0);
        let mut b = LocalExtrema::default();
        b.fold(200.0);

        let state = ReductionState::new();
        state.merge(&a);
        state.merge(&b);
        assert_eq!(state.snapshot(), Some(Extrema { min: 3.0, max: 200.0 }));
    }

    #[test]
    fn scan_ignores_alpha() {
        let bytes = [10, 20, 30, 0, 40, 50, 60, 255];
        let e = Extrema::scan(&bytes, 4, 3).unwrap();
        assert_eq!(e, Extrema { min: 10.0, max: 60.0 });
    }

    #[test]
    fn concurrent_merges_never_lose_updates() {
        let state = Arc::new(ReductionState::new());
        let handles: Vec<_> = (0..16u32)
            .map(|t| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        let mut local = LocalExtrema::default();
                        local.fold(((t * 500 + i) % 7919) as f32);
                        state.merge(&local);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected_min = (0..8000u32).map(|v| v % 7919).min().unwrap() as f32;
        let expected_max = (0..8000u32).map(|v| v % 7919).max().unwrap() as f32;
        assert_eq!(
            state.snapshot(),
            Some(Extrema {
                min: expected_min,
                max: expected_max
            })
        );
        assert_eq!(state.merges(), 8000);
    }
}

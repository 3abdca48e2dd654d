// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The value source every `any()` draws from.
//!
//! Each explored path reseeds the source, so a failing path can be replayed
//! from the run seed and its path index alone.

use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Percentage of scalar draws that pick a boundary value.
pub(crate) const DEFAULT_EDGE_PERCENT: u32 = 20;

pub(crate) struct ValueSource {
    rng: StdRng,
    edge_percent: u32,
}

impl ValueSource {
    pub(crate) fn seeded(seed: u64, edge_percent: u32) -> Self {
        ValueSource { rng: StdRng::seed_from_u64(seed), edge_percent: edge_percent.min(100) }
    }

    /// Whether the next scalar should come from the boundary set.
    pub(crate) fn edge(&mut self) -> bool {
        self.edge_percent > 0 && self.rng.gen_range(0..100) < self.edge_percent
    }

    /// A uniform index in `0..bound`, or 0 for an empty range.
    pub(crate) fn below(&mut self, bound: usize) -> usize {
        if bound == 0 { 0 } else { self.rng.gen_range(0..bound) }
    }

    pub(crate) fn pick<T: Copy>(&mut self, choices: &[T]) -> T {
        choices[self.below(choices.len())]
    }

    pub(crate) fn bits<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        self.rng.r#gen()
    }
}

thread_local! {
    /// One source per thread, so harnesses can be explored in parallel.
    static SOURCE: RefCell<ValueSource> =
        RefCell::new(ValueSource::seeded(0, DEFAULT_EDGE_PERCENT));
}

/// Restart the source of this thread for a new path.
pub(crate) fn reseed(seed: u64, edge_percent: u32) {
    SOURCE.with(|source| *source.borrow_mut() = ValueSource::seeded(seed, edge_percent));
}

/// Draw from the source of this thread. `f` must not call `any()` itself.
pub(crate) fn draw<R>(f: impl FnOnce(&mut ValueSource) -> R) -> R {
    SOURCE.with(|source| f(&mut source.borrow_mut()))
}

/// The seed of path `path` of harness `harness` in a run seeded with `seed`.
pub fn path_seed(seed: u64, harness: &str, path: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    harness.hash(&mut hasher);
    path.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_replays_same_values() {
        reseed(7, DEFAULT_EDGE_PERCENT);
        let first: Vec<u64> = (0..16).map(|_| draw(|s| s.bits())).collect();
        reseed(7, DEFAULT_EDGE_PERCENT);
        let second: Vec<u64> = (0..16).map(|_| draw(|s| s.bits())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn path_seeds_differ_per_path_and_harness() {
        assert_ne!(path_seed(1, "h", 0), path_seed(1, "h", 1));
        assert_ne!(path_seed(1, "a", 0), path_seed(1, "b", 0));
        assert_eq!(path_seed(3, "h", 9), path_seed(3, "h", 9));
    }

    #[test]
    fn below_handles_empty_range() {
        let mut source = ValueSource::seeded(0, 0);
        assert_eq!(source.below(0), 0);
        assert!(source.below(3) < 3);
        assert!(!source.edge());
    }
}

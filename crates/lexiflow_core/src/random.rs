//! Injectable randomness for bonus word selection.
//!
//! # Responsibility
//! - Hide the entropy source behind `RandomSource` so tests can script or
//!   seed draws.
//! - Provide the uniform subset selection used by the reward engine.
//!
//! # Invariants
//! - `index_below(n)` returns a value in `0..n` for every `n >= 1`.
//! - `select_uniform` makes every `count`-sized subset equally likely.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Uniform integer source.
pub trait RandomSource: Send + Sync {
    /// Returns a uniformly distributed index in `0..upper_exclusive`.
    ///
    /// Callers never pass `0`.
    fn index_below(&self, upper_exclusive: usize) -> usize;
}

/// Thread-local OS-seeded generator for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index_below(&self, upper_exclusive: usize) -> usize {
        rand::thread_rng().gen_range(0..upper_exclusive)
    }
}

/// Reproducible generator for tests and statistical checks.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn index_below(&self, upper_exclusive: usize) -> usize {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..upper_exclusive)
    }
}

/// Replays a fixed script of draws, reduced modulo the requested bound.
///
/// Once the script is exhausted every draw returns `0`.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    draws: Mutex<VecDeque<usize>>,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = usize>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn index_below(&self, upper_exclusive: usize) -> usize {
        let mut draws = match self.draws.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        draws.pop_front().unwrap_or(0) % upper_exclusive
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn index_below(&self, upper_exclusive: usize) -> usize {
        (**self).index_below(upper_exclusive)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for std::sync::Arc<R> {
    fn index_below(&self, upper_exclusive: usize) -> usize {
        (**self).index_below(upper_exclusive)
    }
}

/// Picks `count` distinct items uniformly at random without replacement.
///
/// Runs the first `count` steps of a Fisher-Yates shuffle in place and keeps
/// the shuffled prefix. Returns `None` when fewer than `count` items exist.
pub fn select_uniform<T, R>(mut items: Vec<T>, count: usize, rng: &R) -> Option<Vec<T>>
where
    R: RandomSource + ?Sized,
{
    if items.len() < count {
        return None;
    }
    for i in 0..count {
        let j = i + rng.index_below(items.len() - i);
        items.swap(i, j);
    }
    items.truncate(count);
    Some(items)
}

#[cfg(test)]
mod tests {
    use super::{select_uniform, RandomSource, ScriptedRandom, SeededRandom, ThreadRandom};
    use std::collections::HashSet;

    #[test]
    fn scripted_draws_pick_expected_prefix() {
        // Draw 2 of 4 remaining swaps "c" to the front, then draw 0 keeps "b".
        let rng = ScriptedRandom::new([2, 0]);
        let picked = select_uniform(vec!["a", "b", "c", "d"], 2, &rng).unwrap();
        assert_eq!(picked, vec!["c", "b"]);
    }

    #[test]
    fn rejects_short_input_without_drawing() {
        let rng = ScriptedRandom::new([3]);
        assert!(select_uniform(vec![1, 2, 3], 4, &rng).is_none());
        assert_eq!(rng.index_below(10), 3);
    }

    #[test]
    fn selection_is_distinct_and_exact_size() {
        let rng = ThreadRandom;
        for _ in 0..100 {
            let picked = select_uniform((0..20).collect::<Vec<_>>(), 5, &rng).unwrap();
            assert_eq!(picked.len(), 5);
            assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 5);
        }
    }

    #[test]
    fn seeded_sources_are_reproducible() {
        let first = select_uniform((0..50).collect::<Vec<_>>(), 5, &SeededRandom::new(7));
        let second = select_uniform((0..50).collect::<Vec<_>>(), 5, &SeededRandom::new(7));
        assert_eq!(first, second);
    }

    #[test]
    fn every_subset_of_two_from_four_is_reachable_with_similar_frequency() {
        let rng = SeededRandom::new(42);
        let trials = 60_000;
        let mut counts = std::collections::HashMap::new();
        for _ in 0..trials {
            let mut picked = select_uniform(vec![0, 1, 2, 3], 2, &rng).unwrap();
            picked.sort_unstable();
            *counts.entry(picked).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), 6);
        let expected = trials / 6;
        for (subset, count) in counts {
            let deviation = count.abs_diff(expected) as f64 / expected as f64;
            assert!(deviation < 0.05, "subset {subset:?} drawn {count} times");
        }
    }
}

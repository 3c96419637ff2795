//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the orchestrator produces identical
//! command batches given identical inputs.
//!
//! # Testing Strategy
//!
//! Decisions must be reproducible so that recorded decision logs can be
//! replayed and compared. Sources of non-determinism include:
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Every per-unit map in the core is a `BTreeMap` and units are visited
//!   in id order.
//!
//! - **Floating-point noise in hashes**: positions are quantized to
//!   fixed point before hashing.
//!
//! - **State leaking between ticks**: the only cross-tick state is the
//!   tracker, the role book and the pending-orders ledger, all owned by
//!   the orchestrator.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: a single tick is idempotent
//! 2. **Property tests**: random fights still produce deterministic batches
//! 3. **Scenario tests**: multi-tick skirmishes are reproducible
//! 4. **Parallel tests**: running N skirmishes on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final hash of each run.
    pub hashes: Vec<u64>,
    /// Number of ticks run.
    pub ticks: u64,
}

impl DeterminismResult {
    fn from_hashes(hashes: Vec<u64>, ticks: u64) -> Self {
        Self {
            is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
            hashes,
            ticks,
        }
    }

    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Decisions are non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the scenario
/// * `ticks` - Number of ticks per run
/// * `setup` - Function creating the initial state
/// * `step` - Function advancing the state by one tick
/// * `hash` - Function computing the state hash
///
/// # Example
///
/// ```ignore
/// use combat_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,
///     50,
///     || Skirmish::new("duel", TestWorld::open(), units()),
///     |s| { s.step(); },
///     |s| s.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            hash(&state)
        })
        .collect();
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Run `runs` copies of a scenario on scoped threads and collect the final
/// hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences. The state itself never crosses threads; each
/// thread builds its own.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_scoped<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S + Sync,
    Step: Fn(&mut S) + Sync,
    HashFn: Fn(&S) -> u64 + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..runs)
            .map(|_| {
                s.spawn(|| {
                    let mut state = setup();
                    for _ in 0..ticks {
                        step(&mut state);
                    }
                    hash(&state)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("determinism worker panicked"))
            .collect()
    });
    DeterminismResult::from_hashes(hashes, ticks)
}

/// Run two copies side by side, returning the first tick after which their
/// hashes differ (0 when the initial states already differ).
pub fn find_first_divergence<S, Setup, Step, HashFn>(setup: Setup, ticks: u64, step: Step, hash: HashFn) -> Option<u64>
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut a = setup();
    let mut b = setup();
    if hash(&a) != hash(&b) {
        return Some(0);
    }
    (1..=ticks).find(|_| {
        step(&mut a);
        step(&mut b);
        hash(&a) != hash(&b)
    })
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

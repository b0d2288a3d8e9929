//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Battles are replayed from a seed and a deploy stream, so every run must
//! land on the same state. Sources of non-determinism include:
//!
//! - **Floating-point math**: we use fixed-point arithmetic via
//!   [`outpost_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: registries are ordered maps, so passes
//!   always visit entities in ascending ID order.
//!
//! - **System randomness**: all random behavior uses the seeded RNG held
//!   by the simulation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use outpost_core::math::Fixed;
use outpost_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
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

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
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
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice from the same setup with steps of `dt` and
/// compare the final state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64, dt: Fixed) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick(dt);
        },
        |sim| sim.state_hash(),
    )
    .is_deterministic
}

/// Run `num_sims` simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under different memory
/// layouts or thread scheduling.
pub fn run_parallel_simulations<F>(
    setup_fn: F,
    num_sims: usize,
    num_ticks: u64,
    dt: Fixed,
) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick(dt);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64, dt: Fixed) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick(dt);
        sim2.tick(dt);

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that snapshot then restore preserves the base exactly.
///
/// Restoring compacts entity IDs, so the comparison is done on the
/// snapshots themselves rather than on state hashes.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64, dt: Fixed) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick(dt);
    }

    let before = sim.snapshot();
    match Simulation::restore(*sim.config(), sim.catalog().clone(), &before) {
        Ok(restored) => restored.snapshot() == before,
        Err(_) => false,
    }
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for simulation inputs.
pub mod strategies {
    use proptest::prelude::*;

    use outpost_core::components::{Cost, Health};
    use outpost_core::data::{BuildingKind, UnitKind};
    use outpost_core::economy::ResourceKind;
    use outpost_core::grid::Footprint;
    use outpost_core::math::{Fixed, Vec2Fixed};

    /// A fixed-point number in `[0, 1000)` with quarter-unit resolution.
    pub fn arb_fixed() -> impl Strategy<Value = Fixed> {
        (0i32..4000).prop_map(|q| Fixed::from_num(q) / 4)
    }

    /// A positive tick length between 0.05 and 1 second.
    pub fn arb_dt() -> impl Strategy<Value = Fixed> {
        (1i32..=20).prop_map(|n| Fixed::from_num(n) / 20)
    }

    /// A world position on the standard 440x440 map.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        (0i32..440, 0i32..440).prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// A gold and elixir price.
    pub fn arb_cost() -> impl Strategy<Value = Cost> {
        (0u32..2000, 0u32..2000).prop_map(|(gold, elixir)| Cost::new(gold, elixir))
    }

    /// A health pool that may already be damaged.
    pub fn arb_health() -> impl Strategy<Value = Health> {
        (1u32..5000)
            .prop_flat_map(|max| (Just(max), 0..=max))
            .prop_map(|(max, current)| Health { current, max })
    }

    /// Damage per hit.
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        0u32..2000
    }

    /// A building footprint up to 5x5.
    pub fn arb_footprint() -> impl Strategy<Value = Footprint> {
        (1u32..=5, 1u32..=5).prop_map(|(w, h)| Footprint::new(w, h))
    }

    /// Any ledger resource.
    pub fn arb_resource() -> impl Strategy<Value = ResourceKind> {
        prop::sample::select(ResourceKind::ALL.to_vec())
    }

    /// A building kind with no special placement rules.
    pub fn arb_building_kind() -> impl Strategy<Value = BuildingKind> {
        prop::sample::select(vec![
            BuildingKind::Cannon,
            BuildingKind::ArcherTower,
            BuildingKind::GoldMine,
            BuildingKind::ElixirCollector,
            BuildingKind::GoldStorage,
            BuildingKind::ElixirStorage,
            BuildingKind::Barracks,
            BuildingKind::Wall,
        ])
    }

    /// A unit kind trainable at a level 1 barracks.
    pub fn arb_starter_unit() -> impl Strategy<Value = UnitKind> {
        prop::sample::select(vec![UnitKind::Barbarian, UnitKind::Archer])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{barbarian_raid, defended_base, quarter};

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 10, || 0u64, |n| *n += 7, |n| *n);
        result.assert_deterministic();
        assert_eq!(result.unique_hashes(), vec![70]);
    }

    #[test]
    fn test_detects_divergent_runs() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_raid_is_deterministic() {
        assert!(verify_simulation_determinism(|| barbarian_raid(7), 200, quarter()));
        assert_eq!(find_first_divergence(|| barbarian_raid(7), 200, quarter()), None);
    }

    #[test]
    fn test_parallel_raids_agree() {
        run_parallel_simulations(|| barbarian_raid(3), 4, 120, quarter()).assert_deterministic();
    }

    #[test]
    fn test_snapshot_restore_is_stable() {
        assert!(verify_snapshot_determinism(|| defended_base(1), 40, quarter()));
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&(1u32, "gold")), compute_hash(&(1u32, "gold")));
    }
}

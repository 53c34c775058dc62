//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a [`World`] produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays must reproduce the exact event sequence of the original run.
//! Sources of non-determinism include:
//!
//! - **Map iteration order**: actors live in a `BTreeMap` and are always
//!   visited in ascending id order.
//! - **Shared id counters**: every world owns its own `IdGenerator`, so two
//!   worlds seeded the same way issue the same ids.
//! - **Wall-clock time**: tag expiry and cooldowns read the world's logical
//!   clock only.
//! - **Float drift**: attribute math is plain `f64`, evaluated in a fixed
//!   order on every read, so identical calls give identical bits.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: attribute formula, tag union, pre-phase merge order
//! 2. **Property tests**: random modifier and handler orders still resolve
//!    to the same values
//! 3. **Integration tests**: scripted scenarios are reproducible
//! 4. **Parallel tests**: worlds built on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use ability_core::data::AbilityRegistry;
use ability_core::world::{World, WorldSnapshot};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps run.
    pub steps: u64,
}

impl DeterminismResult {
    /// All unique hashes (1 for a deterministic world).
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
                "World is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance by one step
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```
/// use ability_test_utils::determinism::verify_determinism;
/// use ability_test_utils::fixtures::{duel, duel_round};
///
/// let result = verify_determinism(
///     3,
///     20,
///     duel,
///     |(world, attacker, defender, _)| duel_round(world, *attacker, *defender),
///     |(world, ..)| world.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
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
        for _ in 0..steps {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Run two identically built worlds through `steps` calls of `step` and
/// compare their final hashes.
pub fn verify_world_determinism<Setup, Step>(setup: Setup, step: Step, steps: u64) -> bool
where
    Setup: Fn() -> World,
    Step: Fn(&mut World, u64),
{
    let result = verify_determinism(
        2,
        steps,
        || (setup(), 0u64),
        |(world, n)| {
            step(world, *n);
            *n += 1;
        },
        |(world, _)| world.state_hash(),
    );
    result.is_deterministic
}

/// Result of worlds run on separate threads.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each world.
    pub hashes: Vec<u64>,
    /// Number of steps each world ran.
    pub steps: u64,
}

impl ParallelRunResult {
    /// Whether every world produced the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert every world matched.
    ///
    /// # Panics
    ///
    /// Panics if the worlds produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "Parallel worlds diverged!\nWorlds: {}\nSteps: {}\nAll hashes: {:?}",
            self.hashes.len(),
            self.steps,
            self.hashes
        );
    }
}

/// Build and run `worlds` worlds on scoped threads.
///
/// A world is single-threaded and never leaves the thread that built it;
/// only the setup and step functions are shared.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_worlds<Setup, Step>(setup: Setup, step: Step, worlds: usize, steps: u64) -> ParallelRunResult
where
    Setup: Fn() -> World + Sync,
    Step: Fn(&mut World, u64) + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..worlds)
            .map(|_| {
                s.spawn(|| {
                    let mut world = setup();
                    for n in 0..steps {
                        step(&mut world, n);
                    }
                    world.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("world thread panicked"))
            .collect()
    });

    ParallelRunResult { hashes, steps }
}

/// Compare two runs step by step and find the first divergence.
///
/// # Returns
///
/// `None` if the worlds stay identical, `Some(step)` if they diverge after
/// that step (0 means the freshly built worlds already differ).
pub fn find_first_divergence<Setup, Step>(setup: Setup, step: Step, steps: u64) -> Option<u64>
where
    Setup: Fn() -> World,
    Step: Fn(&mut World, u64),
{
    let mut first = setup();
    let mut second = setup();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for n in 0..steps {
        step(&mut first, n);
        step(&mut second, n);
        if first.state_hash() != second.state_hash() {
            return Some(n + 1);
        }
    }

    None
}

/// Verify that a snapshot round trip through bincode preserves the state
/// hash, and that the restored world keeps evolving like the original.
pub fn verify_snapshot_determinism<Setup, Step>(
    setup: Setup,
    step: Step,
    registry: &AbilityRegistry,
    steps: u64,
) -> bool
where
    Setup: Fn() -> World,
    Step: Fn(&mut World, u64),
{
    let mut world = setup();
    for n in 0..steps {
        step(&mut world, n);
    }

    let Ok(bytes) = world.snapshot().to_bytes() else {
        return false;
    };
    let Ok(snapshot) = WorldSnapshot::from_bytes(&bytes) else {
        return false;
    };
    let Ok(mut restored) = World::restore(&snapshot, registry) else {
        return false;
    };
    if restored.state_hash() != world.state_hash() {
        return false;
    }

    for n in steps..steps * 2 {
        step(&mut world, n);
        step(&mut restored, n);
    }
    restored.state_hash() == world.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine inputs.
///
/// These generate random but reproducible inputs for property-based
/// testing of ordering independence and determinism.
pub mod strategies {
    use ability_core::attribute::{ModifierLayer, ModifierSpec};
    use proptest::prelude::*;

    /// Any modifier layer.
    pub fn arb_layer() -> impl Strategy<Value = ModifierLayer> {
        prop_oneof![
            Just(ModifierLayer::AddBase),
            Just(ModifierLayer::MulBase),
            Just(ModifierLayer::AddFinal),
            Just(ModifierLayer::MulFinal),
        ]
    }

    /// Modifier with an integer amount (additive) or a quarter-step
    /// fraction (multiplicative), so sums are exact in any order.
    pub fn arb_modifier() -> impl Strategy<Value = ModifierSpec> {
        (arb_layer(), -20i32..20i32).prop_map(|(layer, n)| {
            let value = match layer {
                ModifierLayer::AddBase | ModifierLayer::AddFinal => f64::from(n),
                ModifierLayer::MulBase | ModifierLayer::MulFinal => f64::from(n) / 4.0,
            };
            ModifierSpec::new(layer, value)
        })
    }

    /// A list of modifiers.
    pub fn arb_modifiers(max_len: usize) -> impl Strategy<Value = Vec<ModifierSpec>> {
        proptest::collection::vec(arb_modifier(), 0..max_len)
    }

    /// Base attribute values (0-1000, whole numbers).
    pub fn arb_base() -> impl Strategy<Value = f64> {
        (0u32..1000u32).prop_map(f64::from)
    }

    /// Damage amounts (1-100, whole numbers).
    pub fn arb_damage() -> impl Strategy<Value = f64> {
        (1u32..100u32).prop_map(f64::from)
    }

    /// One tag operation against a container.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TagOp {
        /// Add loose stacks.
        AddLoose(String, u32),
        /// Remove loose stacks.
        RemoveLoose(String, u32),
        /// Add one timed layer.
        AddTimed(String, u64),
        /// Advance time.
        Tick(u64),
    }

    fn arb_tag_name() -> impl Strategy<Value = String> {
        prop_oneof![Just("stun".to_string()), Just("burn".to_string()), Just("haste".to_string())]
    }

    /// Any tag operation.
    pub fn arb_tag_op() -> impl Strategy<Value = TagOp> {
        prop_oneof![
            (arb_tag_name(), 1u32..4u32).prop_map(|(t, n)| TagOp::AddLoose(t, n)),
            (arb_tag_name(), 1u32..4u32).prop_map(|(t, n)| TagOp::RemoveLoose(t, n)),
            (arb_tag_name(), 1u64..500u64).prop_map(|(t, d)| TagOp::AddTimed(t, d)),
            (0u64..300u64).prop_map(TagOp::Tick),
        ]
    }

    /// A sequence of tag operations.
    pub fn arb_tag_ops(max_len: usize) -> impl Strategy<Value = Vec<TagOp>> {
        proptest::collection::vec(arb_tag_op(), 0..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::{arb_damage, arb_tag_ops, TagOp};
    use super::*;
    use crate::fixtures::{duel, duel_round, fighter_defs, strike, world};
    use ability_core::event::GameEvent;
    use ability_core::ids::ActorId;
    use ability_core::tags::TagContainer;
    use proptest::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_world_determinism() {
        assert!(verify_world_determinism(world, |w, _| {
            w.tick(16);
        }, 50));
    }

    #[test]
    fn test_duel_determinism() {
        let result = verify_determinism(
            4,
            30,
            duel,
            |(world, attacker, defender, _)| duel_round(world, *attacker, *defender),
            |(world, ..)| world.state_hash(),
        );
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
    }

    fn skirmish() -> World {
        let mut world = world();
        for i in 0..6 {
            let id = world
                .spawn_actor(&format!("unit{i}"), &fighter_defs(80.0, 40.0))
                .expect("spawn");
            world.grant_ability(id, strike(7.0, 10.0, 400)).expect("grant");
        }
        world
    }

    fn skirmish_step(world: &mut World, n: u64) {
        let ids = world.actors().ids();
        let source = ids[(n as usize) % ids.len()];
        let target = ids[(n as usize * 5 + 1) % ids.len()];
        world.dispatch(GameEvent::damage(source, target, 4.0));
        let strike = world
            .actor(source)
            .and_then(|a| a.abilities().find_by_config("strike").first().copied());
        if let Some(strike) = strike {
            let _ = world.activate(source, strike);
        }
        world.tick(50);
    }

    #[test]
    fn test_skirmish_has_no_divergence() {
        assert_eq!(find_first_divergence(skirmish, skirmish_step, 60), None);
    }

    #[test]
    fn test_parallel_worlds_match() {
        let result = run_parallel_worlds(skirmish, skirmish_step, 4, 40);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_hash_changes_with_state() {
        let mut a = world();
        let mut b = world();
        a.spawn_actor("x", &fighter_defs(10.0, 0.0)).unwrap();
        b.spawn_actor("x", &fighter_defs(10.0, 0.0)).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
        b.dispatch(GameEvent::damage(ActorId(1), ActorId(1), 1.0));
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u8, "a")), compute_hash(&(1u8, "a")));
    }

    // =========================================================================
    // Property tests
    // =========================================================================

    proptest! {
        #[test]
        fn prop_damage_sequence_is_deterministic(amounts in proptest::collection::vec(arb_damage(), 1..20)) {
            let run = |amounts: &[f64]| {
                let (mut world, attacker, defender, _) = duel();
                for &amount in amounts {
                    world.dispatch(GameEvent::damage(attacker, defender, amount));
                    world.tick(10);
                }
                world.state_hash()
            };
            prop_assert_eq!(run(&amounts), run(&amounts));
        }

        #[test]
        fn prop_tag_ops_replay_identically(ops in arb_tag_ops(40)) {
            let run = |ops: &[TagOp]| {
                let mut tags = TagContainer::new();
                for op in ops {
                    match op {
                        TagOp::AddLoose(t, n) => tags.add_loose_tag(t, *n),
                        TagOp::RemoveLoose(t, n) => tags.remove_loose_tag(t, *n),
                        TagOp::AddTimed(t, d) => tags.add_auto_duration_tag(t, *d),
                        TagOp::Tick(dt) => tags.tick(*dt),
                    }
                }
                tags.all_tags()
            };
            prop_assert_eq!(run(&ops), run(&ops));
        }
    }
}

//! Event resolution benchmarks for ability_core.
//!
//! Run with: `cargo bench -p ability_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use ability_core::ability::components::{EffectHandler, PreEffect, PreEventComponent};
use ability_core::ability::{Ability, EventFilter};
use ability_core::event::{CustomEvent, EventKind, GameEvent};
use ability_test_utils::fixtures::{echo, fighter_defs, thorns, world, world_with_depth};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn armor(value: f64) -> Ability {
    Ability::new("armor").with_component(PreEventComponent::new(
        EventKind::Damage,
        EffectHandler::new(
            "armor",
            EventFilter::OwnerIsTarget,
            PreEffect::Add {
                field: "amount".to_string(),
                value,
            },
        ),
    ))
}

/// Damage between two actors while the crowd around them grows.
pub fn dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_damage");
    for actors in [2usize, 16, 128] {
        let mut world = world();
        let ids: Vec<_> = (0..actors)
            .map(|i| {
                let id = world
                    .spawn_actor(&format!("unit{i}"), &fighter_defs(1.0e9, 0.0))
                    .expect("valid defs");
                world.grant_ability(id, armor(-0.5)).expect("grant");
                id
            })
            .collect();
        world.grant_ability(ids[1], thorns(0.25)).expect("grant");

        group.bench_with_input(BenchmarkId::from_parameter(actors), &actors, |b, _| {
            b.iter(|| {
                black_box(world.dispatch(GameEvent::damage(ids[0], ids[1], 3.0)));
                world.log().clear();
            });
        });
    }
    group.finish();
}

/// A self-triggering chain running into the depth bound.
pub fn cascade_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade");
    for depth in [8usize, 32] {
        let mut world = world_with_depth(depth);
        let id = world.spawn_actor("bell", &fighter_defs(10.0, 0.0)).expect("valid defs");
        world.grant_ability(id, echo("ping")).expect("grant");

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                world.dispatch(CustomEvent::new("ping").unwrap().with_source(id).into());
                world.log().clear();
            });
        });
    }
    group.finish();
}

/// Snapshot encoding and state hashing.
pub fn snapshot_benchmark(c: &mut Criterion) {
    let mut world = world();
    for i in 0..64 {
        let id = world
            .spawn_actor(&format!("unit{i}"), &fighter_defs(100.0, 50.0))
            .expect("valid defs");
        world.grant_ability(id, thorns(1.0)).expect("grant");
    }

    c.bench_function("state_hash", |b| b.iter(|| black_box(world.state_hash())));
    c.bench_function("snapshot_to_bytes", |b| {
        b.iter(|| black_box(world.snapshot().to_bytes().expect("encode")));
    });
}

criterion_group!(benches, dispatch_benchmark, cascade_benchmark, snapshot_benchmark);
criterion_main!(benches);

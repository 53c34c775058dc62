//! Cascade tests: recursive post-phase broadcasts and the depth bound.

use ability_core::event::{CustomEvent, GameEvent};
use ability_core::processor::TraceLevel;
use ability_core::record::EngineEvent;
use ability_test_utils::fixtures::{echo, fighter_defs, thorns, world_with_depth};

fn resolved_count(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::EventResolved { .. }))
        .count()
}

#[test]
fn test_self_triggering_chain_stops_at_max_depth() {
    for max_depth in [1, 4, 16] {
        let mut world = world_with_depth(max_depth);
        let id = world.spawn_actor("bell", &fighter_defs(10.0, 0.0)).unwrap();
        world.grant_ability(id, echo("ping")).unwrap();
        world.log().clear();

        world.dispatch(CustomEvent::new("ping").unwrap().with_source(id).into());

        assert_eq!(world.processor().broadcasts(), max_depth as u64);
        assert_eq!(world.processor().truncations(), 1);
        assert_eq!(world.processor().depth(), 0);
        assert_eq!(resolved_count(&world.log().drain()), max_depth);
    }
}

#[test]
fn test_mutual_thorns_is_bounded() {
    let mut world = world_with_depth(8);
    let a = world.spawn_actor("a", &fighter_defs(1_000.0, 0.0)).unwrap();
    let b = world.spawn_actor("b", &fighter_defs(1_000.0, 0.0)).unwrap();
    world.grant_ability(a, thorns(1.0)).unwrap();
    world.grant_ability(b, thorns(1.0)).unwrap();

    world.dispatch(GameEvent::damage(a, b, 5.0));

    assert_eq!(world.processor().broadcasts(), 8);
    // Initial hit plus seven reflections alternate between the two.
    let hp_a = world.actor(a).unwrap().attributes().current_value("hp").unwrap();
    let hp_b = world.actor(b).unwrap().attributes().current_value("hp").unwrap();
    assert!((hp_b - (1_000.0 - 5.0 - 3.0)).abs() < 1e-9);
    assert!((hp_a - (1_000.0 - 4.0)).abs() < 1e-9);
}

#[test]
fn test_truncation_is_traced() {
    let mut world = world_with_depth(2);
    world.processor_mut().set_trace_level(TraceLevel::Summary);
    let id = world.spawn_actor("bell", &fighter_defs(10.0, 0.0)).unwrap();
    world.grant_ability(id, echo("ping")).unwrap();

    world.dispatch(CustomEvent::new("ping").unwrap().with_source(id).into());

    let traces = world.processor_mut().take_traces();
    assert!(traces.iter().any(|t| t.truncated));
    assert!(traces.iter().all(|t| t.depth <= 2));
    assert!(world.processor().traces().is_empty());
}

#[test]
fn test_next_dispatch_starts_fresh() {
    let mut world = world_with_depth(3);
    let id = world.spawn_actor("bell", &fighter_defs(10.0, 0.0)).unwrap();
    world.grant_ability(id, echo("ping")).unwrap();

    world.dispatch(CustomEvent::new("ping").unwrap().with_source(id).into());
    world.dispatch(CustomEvent::new("ping").unwrap().with_source(id).into());

    assert_eq!(world.processor().broadcasts(), 6);
    assert_eq!(world.processor().truncations(), 2);
}

#[test]
fn test_emitted_events_resolve_in_emission_order() {
    let mut world = world_with_depth(16);
    let a = world.spawn_actor("a", &fighter_defs(100.0, 0.0)).unwrap();
    let b = world.spawn_actor("b", &fighter_defs(100.0, 0.0)).unwrap();
    world.grant_ability(b, thorns(1.0)).unwrap();
    world.grant_ability(b, thorns(2.0)).unwrap();
    world.log().clear();

    world.dispatch(GameEvent::damage(a, b, 10.0));

    let amounts: Vec<f64> = world
        .log()
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::EventResolved {
                event: GameEvent::Damage(d),
                ..
            } => Some(d.amount),
            _ => None,
        })
        .collect();
    assert_eq!(amounts, vec![10.0, 1.0, 2.0]);
}

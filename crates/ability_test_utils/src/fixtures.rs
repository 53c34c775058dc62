//! Test fixtures and helpers.
//!
//! Pre-built worlds, actor definitions and closure helpers for consistent
//! testing.

use std::cell::RefCell;
use std::rc::Rc;

use ability_core::ability::components::{ActiveUseComponent, GameEventComponent};
use ability_core::ability::{
    Ability, AttributeCost, CooldownCost, EmitDamage, EventFilter, FnAction, Recipient,
};
use ability_core::attribute::AttributeDef;
use ability_core::config::EngineConfig;
use ability_core::event::{EventKind, GameEvent, Intent, MutableEvent};
use ability_core::ids::{AbilityId, ActorId};
use ability_core::processor::{FnPreHandler, PreHandlerContext};
use ability_core::tags::TagMap;
use ability_core::world::World;
use ability_core::error::HandlerError;

/// Tolerance used by [`approx_eq`].
pub const EPSILON: f64 = 1e-9;

/// Whether two floats are equal within [`EPSILON`].
#[must_use]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Assert two floats are equal within [`EPSILON`].
///
/// # Panics
///
/// Panics with both values if they differ.
#[track_caller]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        approx_eq(actual, expected),
        "expected {expected}, got {actual} (diff {})",
        (actual - expected).abs()
    );
}

/// Tag map from `(name, stacks)` pairs.
#[must_use]
pub fn tag_map(entries: &[(&str, u32)]) -> TagMap {
    entries
        .iter()
        .map(|&(tag, stacks)| (tag.to_string(), stacks))
        .collect()
}

/// `hp` clamped to `[0, hp]` plus a `mana` pool.
#[must_use]
pub fn fighter_defs(hp: f64, mana: f64) -> Vec<AttributeDef> {
    vec![
        AttributeDef::new("hp", hp).with_bounds(Some(0.0), Some(hp)),
        AttributeDef::new("mana", mana).with_bounds(Some(0.0), None),
    ]
}

/// Current value of `attribute` on `actor`.
///
/// # Panics
///
/// Panics if the actor or attribute does not exist.
#[must_use]
#[track_caller]
pub fn current(world: &World, actor: ActorId, attribute: &str) -> f64 {
    world
        .actor(actor)
        .expect("actor exists")
        .attributes()
        .current_value(attribute)
        .expect("attribute exists")
}

/// Empty world with the default configuration.
///
/// # Panics
///
/// Panics if the default configuration is rejected.
#[must_use]
pub fn world() -> World {
    World::new(EngineConfig::default()).expect("default config is valid")
}

/// Empty world with the given depth bound.
///
/// # Panics
///
/// Panics if `max_depth` is zero.
#[must_use]
pub fn world_with_depth(max_depth: usize) -> World {
    World::new(EngineConfig::default().with_max_depth(max_depth)).expect("depth bound is valid")
}

/// Ability that strikes back at whoever damages its owner.
#[must_use]
pub fn thorns(amount: f64) -> Ability {
    Ability::new("thorns").with_component(
        GameEventComponent::new(vec![EventKind::Damage], EventFilter::OwnerIsTarget).with_action(
            EmitDamage {
                to: Recipient::EventSource,
                amount,
                damage_type: "thorns".to_string(),
            },
        ),
    )
}

/// Gated strike on the owner's last attacker: costs `mana` and a cooldown.
#[must_use]
pub fn strike(damage: f64, mana: f64, cooldown_ms: u64) -> Ability {
    Ability::new("strike").with_component(
        ActiveUseComponent::new("strike", 300)
            .with_cost(AttributeCost {
                attribute: "mana".to_string(),
                amount: mana,
            })
            .with_cost(CooldownCost {
                tag: "cd.strike".to_string(),
                duration_ms: cooldown_ms,
            })
            .with_action(EmitDamage {
                to: Recipient::Owner,
                amount: damage,
                damage_type: "physical".to_string(),
            }),
    )
}

/// Ability that re-emits a custom event of `kind` every time it sees one.
/// Used to drive unbounded cascades.
#[must_use]
pub fn echo(kind: &str) -> Ability {
    Ability::new("echo").with_component(
        GameEventComponent::new(vec![EventKind::custom(kind)], EventFilter::Any).with_action(
            FnAction::new("echo", move |ctx| {
                let GameEvent::Custom(event) = ctx.event else {
                    return Ok(());
                };
                let again = event.clone();
                ctx.emit(GameEvent::Custom(again));
                Ok(())
            }),
        ),
    )
}

/// Shared call record for closure handlers.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Pre-handler that records its name into `calls` and returns `intent`.
pub fn recording_handler(
    name: &str,
    calls: &CallLog,
    intent: impl Fn(&PreHandlerContext<'_>) -> Intent + 'static,
) -> FnPreHandler {
    let calls = Rc::clone(calls);
    let label = name.to_string();
    FnPreHandler::new(
        name,
        move |_: &MutableEvent, ctx: &PreHandlerContext<'_>| -> Result<Intent, HandlerError> {
            calls.borrow_mut().push(label.clone());
            Ok(intent(ctx))
        },
    )
}

/// Two fighters, the second with thorns. Returns `(world, attacker,
/// defender, thorns id)`.
///
/// # Panics
///
/// Panics if the fixture cannot be built.
#[must_use]
pub fn duel() -> (World, ActorId, ActorId, AbilityId) {
    let mut world = world();
    let attacker = world
        .spawn_actor("attacker", &fighter_defs(100.0, 50.0))
        .expect("valid defs");
    let defender = world
        .spawn_actor("defender", &fighter_defs(100.0, 50.0))
        .expect("valid defs");
    let thorns = world.grant_ability(defender, thorns(2.0)).expect("grant");
    (world, attacker, defender, thorns)
}

/// One round of the duel: attacker hits defender, then time advances.
pub fn duel_round(world: &mut World, attacker: ActorId, defender: ActorId) {
    world.dispatch(GameEvent::damage(attacker, defender, 3.0));
    world.tick(100);
}

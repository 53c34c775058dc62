//! Grant, revoke, activation and pre-phase interception through the world.

use ability_core::ability::components::{
    ActiveUseComponent, DurationComponent, EffectHandler, GameEventComponent, PreEffect,
    PreEventComponent, StatModifierComponent, TagComponent,
};
use ability_core::ability::{
    Ability, AddLooseTag, AttributeCost, ConditionContext, CooldownCost, Cost, CostContext,
    EmitDamage, EventFilter, FnAction, FnCondition, LacksTag, Recipient,
};
use ability_core::error::HandlerError;
use ability_core::attribute::{ModifierLayer, ModifierSpec};
use ability_core::event::{EventKind, GameEvent};
use ability_core::record::{EngineEvent, RevokeReason};
use ability_test_utils::fixtures::{assert_close, current, fighter_defs, tag_map, world};

fn tag_ability(name: &str, tag: &str, stacks: u32) -> Ability {
    Ability::new(name).with_component(TagComponent::new(tag_map(&[(tag, stacks)])))
}

fn pre_effect(name: &str, filter: EventFilter, effect: PreEffect) -> Ability {
    Ability::new(name).with_component(PreEventComponent::new(
        EventKind::Damage,
        EffectHandler::new(name, filter, effect),
    ))
}

#[test]
fn test_revoke_symmetry_with_shared_tag() {
    let mut world = world();
    let id = world.spawn_actor("target", &fighter_defs(50.0, 0.0)).unwrap();
    world.actor_mut(id).unwrap().tags_mut().add_loose_tag("poison", 1);
    world.grant_ability(id, tag_ability("weak_poison", "poison", 2)).unwrap();
    let before = world.actor(id).unwrap().tags().tag_stacks("poison");
    assert_eq!(before, 3);

    let strong = world.grant_ability(id, tag_ability("strong_poison", "poison", 3)).unwrap();
    assert_eq!(world.actor(id).unwrap().tags().tag_stacks("poison"), 6);

    world.revoke_ability(id, strong).unwrap();
    assert_eq!(world.actor(id).unwrap().tags().tag_stacks("poison"), before);
}

#[test]
fn test_revoke_leaves_no_modifiers() {
    let mut world = world();
    let id = world.spawn_actor("knight", &fighter_defs(100.0, 0.0)).unwrap();
    let blessing = Ability::new("blessing").with_component(
        StatModifierComponent::new()
            .with_modifier("mana", ModifierSpec::new(ModifierLayer::AddBase, 20.0))
            .with_modifier("mana", ModifierSpec::new(ModifierLayer::MulFinal, 0.5)),
    );
    let ability = world.grant_ability(id, blessing).unwrap();
    assert_close(current(&world, id, "mana"), 30.0);

    world.revoke_ability(id, ability).unwrap();
    let breakdown = world.actor(id).unwrap().attributes().breakdown("mana").unwrap();
    assert_close(breakdown.add_base_sum, 0.0);
    assert_close(breakdown.mul_final_product, 1.0);
    assert_close(current(&world, id, "mana"), 0.0);
    assert!(world.actor(id).unwrap().abilities().is_empty());
}

#[test]
fn test_pre_event_merge_follows_grant_order() {
    let mut world = world();
    let attacker = world.spawn_actor("attacker", &fighter_defs(100.0, 0.0)).unwrap();
    let defender = world.spawn_actor("defender", &fighter_defs(100.0, 0.0)).unwrap();
    // Multiply granted first; adds still resolve before multiplies.
    world
        .grant_ability(
            defender,
            pre_effect(
                "resist",
                EventFilter::OwnerIsTarget,
                PreEffect::Multiply {
                    field: "amount".to_string(),
                    value: 0.7,
                },
            ),
        )
        .unwrap();
    let armor = world
        .grant_ability(
            defender,
            pre_effect(
                "armor",
                EventFilter::OwnerIsTarget,
                PreEffect::Add {
                    field: "amount".to_string(),
                    value: -10.0,
                },
            ),
        )
        .unwrap();

    let resolution = world.dispatch(GameEvent::damage(attacker, defender, 100.0));
    let GameEvent::Damage(hit) = &resolution.event else {
        panic!("damage stays damage");
    };
    assert_close(hit.amount, 63.0);
    assert_eq!(resolution.modifications.len(), 2);
    assert_eq!(resolution.modifications[0].source_name, "resist");
    assert_close(current(&world, defender, "hp"), 37.0);

    world.revoke_ability(defender, armor).unwrap();
    assert_eq!(world.processor().registry().len(), 1);
    let resolution = world.dispatch(GameEvent::damage(attacker, defender, 10.0));
    assert_close(resolution.event.field("amount").unwrap(), 7.0);

    // The filter keeps the handler away from damage dealt by the owner.
    let outgoing = world.dispatch(GameEvent::damage(defender, attacker, 10.0));
    assert_close(outgoing.event.field("amount").unwrap(), 10.0);
}

#[test]
fn test_cancelled_event_has_no_effect_and_no_broadcast() {
    let mut world = world();
    let attacker = world.spawn_actor("attacker", &fighter_defs(100.0, 0.0)).unwrap();
    let defender = world.spawn_actor("defender", &fighter_defs(100.0, 0.0)).unwrap();
    world
        .grant_ability(
            defender,
            pre_effect(
                "shield",
                EventFilter::OwnerIsTarget,
                PreEffect::Cancel {
                    reason: "shielded".to_string(),
                },
            ),
        )
        .unwrap();
    world
        .grant_ability(
            defender,
            pre_effect(
                "never",
                EventFilter::Any,
                PreEffect::Set {
                    field: "amount".to_string(),
                    value: 999.0,
                },
            ),
        )
        .unwrap();
    world
        .grant_ability(
            defender,
            Ability::new("flinch").with_component(
                GameEventComponent::new(vec![EventKind::Damage], EventFilter::OwnerIsTarget).with_action(
                    AddLooseTag {
                        tag: "flinched".to_string(),
                        stacks: 1,
                    },
                ),
            ),
        )
        .unwrap();

    let resolution = world.dispatch(GameEvent::damage(attacker, defender, 40.0));
    assert!(resolution.cancelled);
    assert!(resolution.cancelled_by.is_some());
    assert_eq!(resolution.cancel_reason.as_deref(), Some("shielded"));
    assert!(resolution.modifications.is_empty());
    assert_close(current(&world, defender, "hp"), 100.0);
    assert!(!world.actor(defender).unwrap().tags().has_tag("flinched"));
    assert_eq!(world.processor().broadcasts(), 0);
}

#[test]
fn test_activation_records_cost_before_effects() {
    let mut world = world();
    let caster = world.spawn_actor("caster", &fighter_defs(100.0, 80.0)).unwrap();
    let fireball = Ability::new("fireball").with_component(
        ActiveUseComponent::new("cast_fireball", 800)
            .with_condition(LacksTag {
                tag: "silenced".to_string(),
            })
            .with_cost(AttributeCost {
                attribute: "mana".to_string(),
                amount: 30.0,
            })
            .with_cost(CooldownCost {
                tag: "cd.fireball".to_string(),
                duration_ms: 5_000,
            })
            .with_action(EmitDamage {
                to: Recipient::Owner,
                amount: 12.0,
                damage_type: "fire".to_string(),
            }),
    );
    let fireball = world.grant_ability(caster, fireball).unwrap();
    world.log().clear();

    world.activate(caster, fireball).unwrap();
    let log = world.log().drain();
    let position = |pred: &dyn Fn(&EngineEvent) -> bool| log.iter().position(pred).unwrap();
    let mana = position(&|e| matches!(e, EngineEvent::AttributeChanged { attribute, .. } if attribute == "mana"));
    let cooldown = position(&|e| matches!(e, EngineEvent::TagChanged { tag, .. } if tag == "cd.fireball"));
    let activated = position(&|e| matches!(e, EngineEvent::ExecutionActivated { timeline_id, .. } if timeline_id == "cast_fireball"));
    let burned = position(&|e| matches!(e, EngineEvent::EventResolved { event: GameEvent::Damage(_), .. }));
    assert!(mana < cooldown);
    assert!(cooldown < activated);
    assert!(activated < burned);
    assert_close(current(&world, caster, "mana"), 50.0);
    assert_close(current(&world, caster, "hp"), 88.0);
    assert_eq!(world.actor(caster).unwrap().abilities().active_executions().len(), 1);

    // Cooldown blocks a second cast; nothing is paid.
    world.activate(caster, fireball).unwrap();
    let log = world.log().drain();
    assert!(matches!(
        log.as_slice(),
        [EngineEvent::EventResolved { .. }, EngineEvent::ActivationFailed { reason, .. }]
            if reason.contains("cd.fireball")
    ));
    assert_close(current(&world, caster, "mana"), 50.0);

    world.tick(800);
    assert!(world.actor(caster).unwrap().abilities().active_executions().is_empty());
    assert!(world
        .log()
        .drain()
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionCompleted { .. })));

    world.tick(4_200);
    world.actor_mut(caster).unwrap().tags_mut().add_loose_tag("silenced", 1);
    world.activate(caster, fireball).unwrap();
    assert!(world.log().drain().iter().any(
        |e| matches!(e, EngineEvent::ActivationFailed { reason, .. } if reason.contains("silenced"))
    ));
}

#[test]
fn test_activation_ignores_other_abilities() {
    let mut world = world();
    let caster = world.spawn_actor("caster", &fighter_defs(100.0, 50.0)).unwrap();
    let first = world
        .grant_ability(caster, Ability::new("a").with_component(ActiveUseComponent::new("a", 0)))
        .unwrap();
    world
        .grant_ability(caster, Ability::new("b").with_component(ActiveUseComponent::new("b", 0)))
        .unwrap();
    world.log().clear();

    world.activate(caster, first).unwrap();
    let activations: Vec<_> = world
        .log()
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::ExecutionActivated { ability, timeline_id, .. } => Some((ability, timeline_id)),
            _ => None,
        })
        .collect();
    assert_eq!(activations, vec![(first, "a".to_string())]);
}

#[test]
fn test_trigger_records_ability_triggered() {
    let mut world = world();
    let a = world.spawn_actor("a", &fighter_defs(100.0, 0.0)).unwrap();
    let b = world.spawn_actor("b", &fighter_defs(100.0, 0.0)).unwrap();
    let flinch = world
        .grant_ability(
            b,
            Ability::new("flinch").with_component(
                GameEventComponent::new(vec![EventKind::Damage], EventFilter::OwnerIsTarget).with_action(
                    AddLooseTag {
                        tag: "flinched".to_string(),
                        stacks: 1,
                    },
                ),
            ),
        )
        .unwrap();

    world.dispatch(GameEvent::damage(a, b, 1.0));
    world.dispatch(GameEvent::damage(b, a, 1.0));

    let triggered: Vec<_> = world
        .log()
        .drain()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::AbilityTriggered { .. }))
        .collect();
    assert_eq!(triggered.len(), 1);
    assert!(matches!(&triggered[0], EngineEvent::AbilityTriggered { ability, .. } if *ability == flinch));
    assert_eq!(world.actor(b).unwrap().tags().tag_stacks("flinched"), 1);
}

#[test]
fn test_expiry_unregisters_pre_handlers() {
    let mut world = world();
    let a = world.spawn_actor("a", &fighter_defs(100.0, 0.0)).unwrap();
    let b = world.spawn_actor("b", &fighter_defs(100.0, 0.0)).unwrap();
    let ward = Ability::new("ward")
        .with_component(PreEventComponent::new(
            EventKind::Damage,
            EffectHandler::new(
                "ward",
                EventFilter::OwnerIsTarget,
                PreEffect::Set {
                    field: "amount".to_string(),
                    value: 0.0,
                },
            ),
        ))
        .with_component(DurationComponent::new(1_000));
    let ward = world.grant_ability(b, ward).unwrap();

    world.dispatch(GameEvent::damage(a, b, 25.0));
    assert_close(current(&world, b, "hp"), 100.0);

    assert_eq!(world.tick(1_000), vec![(b, ward)]);
    assert!(world.processor().registry().is_empty());
    world.dispatch(GameEvent::damage(a, b, 25.0));
    assert_close(current(&world, b, "hp"), 75.0);
}

#[test]
fn test_despawn_releases_everything() {
    let mut world = world();
    let ids: Vec<_> = (0..3)
        .map(|i| world.spawn_actor(&format!("unit{i}"), &fighter_defs(10.0, 0.0)).unwrap())
        .collect();
    for &id in &ids {
        world.grant_ability(id, tag_ability("mark", "marked", 1)).unwrap();
        world
            .grant_ability(
                id,
                pre_effect(
                    "guard",
                    EventFilter::OwnerIsTarget,
                    PreEffect::Add {
                        field: "amount".to_string(),
                        value: -1.0,
                    },
                ),
            )
            .unwrap();
    }
    assert_eq!(world.live_subscriptions(), 6);
    assert_eq!(world.processor().registry().len(), 3);

    for &id in &ids {
        world.despawn_actor(id).unwrap();
    }
    assert_eq!(world.live_subscriptions(), 0);
    assert!(world.processor().registry().is_empty());
    let revoked = world
        .log()
        .drain()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                EngineEvent::AbilityRevoked {
                    reason: RevokeReason::ActorDespawned,
                    ..
                }
            )
        })
        .count();
    assert_eq!(revoked, 6);
}

#[test]
fn test_failing_action_does_not_stop_siblings() {
    let mut world = world();
    let attacker = world.spawn_actor("attacker", &fighter_defs(100.0, 0.0)).unwrap();
    let defender = world.spawn_actor("defender", &fighter_defs(100.0, 0.0)).unwrap();
    world
        .grant_ability(
            defender,
            Ability::new("bruise").with_component(
                GameEventComponent::new(vec![EventKind::Damage], EventFilter::OwnerIsTarget)
                    .with_action(FnAction::new("explode", |_| Err(HandlerError::failed("boom"))))
                    .with_action(AddLooseTag {
                        tag: "bruised".to_string(),
                        stacks: 1,
                    }),
            ),
        )
        .unwrap();

    world.dispatch(GameEvent::damage(attacker, defender, 5.0));
    assert_eq!(world.actor(defender).unwrap().tags().tag_stacks("bruised"), 1);
    assert_close(current(&world, defender, "hp"), 95.0);
}

#[test]
fn test_erroring_condition_denies_activation() {
    let mut world = world();
    let caster = world.spawn_actor("caster", &fighter_defs(100.0, 50.0)).unwrap();
    let ability = world
        .grant_ability(
            caster,
            Ability::new("unstable").with_component(
                ActiveUseComponent::new("unstable", 100)
                    .with_condition(FnCondition::new("broken", |_| Err(HandlerError::failed("oops"))))
                    .with_cost(AttributeCost {
                        attribute: "mana".to_string(),
                        amount: 10.0,
                    })
                    .with_action(AddLooseTag {
                        tag: "cast".to_string(),
                        stacks: 1,
                    }),
            ),
        )
        .unwrap();
    world.log().clear();

    world.activate(caster, ability).unwrap();
    let log = world.log().drain();
    assert!(log.iter().any(
        |e| matches!(e, EngineEvent::ActivationFailed { reason, .. } if reason == "broken: oops")
    ));
    assert!(!log.iter().any(|e| matches!(e, EngineEvent::ExecutionActivated { .. })));
    assert!(!world.actor(caster).unwrap().tags().has_tag("cast"));
    assert_close(current(&world, caster, "mana"), 50.0);
}

struct BrokenLedger;

impl Cost for BrokenLedger {
    fn can_pay(&self, _ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Err(HandlerError::failed("ledger offline"))
    }

    fn pay(&self, _ctx: &mut CostContext<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn fail_reason(&self) -> String {
        "ledger".to_string()
    }
}

#[test]
fn test_erroring_cost_denies_without_paying_others() {
    let mut world = world();
    let caster = world.spawn_actor("caster", &fighter_defs(100.0, 50.0)).unwrap();
    let ability = world
        .grant_ability(
            caster,
            Ability::new("tithe").with_component(
                ActiveUseComponent::new("tithe", 100)
                    .with_cost(AttributeCost {
                        attribute: "mana".to_string(),
                        amount: 10.0,
                    })
                    .with_cost(BrokenLedger),
            ),
        )
        .unwrap();
    world.log().clear();

    world.activate(caster, ability).unwrap();
    let log = world.log().drain();
    assert!(log.iter().any(
        |e| matches!(e, EngineEvent::ActivationFailed { reason, .. } if reason == "ledger: ledger offline")
    ));
    assert!(!log.iter().any(|e| matches!(e, EngineEvent::ExecutionActivated { .. })));
    assert_close(current(&world, caster, "mana"), 50.0);
    assert!(world.actor(caster).unwrap().abilities().active_executions().is_empty());
}

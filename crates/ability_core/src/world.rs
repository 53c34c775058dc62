//! World root: actors, clock, ids, processor and recording log.
//!
//! The [`World`] is the one object a game loop talks to. It owns every
//! actor and advances them together, so two worlds fed the same calls in
//! the same order end in the same state.
//!
//! # Determinism
//!
//! - Time is a [`LogicalClock`] advanced only by [`World::tick`].
//! - Ids come from the world's own [`IdGenerator`].
//! - Broadcasts visit actors in ascending id order; abilities run in grant
//!   order; pre-handlers run in registration order.
//!
//! # Example
//!
//! ```
//! use ability_core::ability::components::TagComponent;
//! use ability_core::ability::Ability;
//! use ability_core::attribute::AttributeDef;
//! use ability_core::config::EngineConfig;
//! use ability_core::event::GameEvent;
//! use ability_core::world::World;
//!
//! let mut world = World::new(EngineConfig::default()).unwrap();
//! let knight = world.spawn_actor("knight", &[AttributeDef::new("hp", 100.0)]).unwrap();
//! let goblin = world.spawn_actor("goblin", &[AttributeDef::new("hp", 30.0)]).unwrap();
//!
//! let stun = Ability::new("stun").with_component(TagComponent::new(
//!     [("stunned".to_string(), 1)].into_iter().collect(),
//! ));
//! world.grant_ability(goblin, stun).unwrap();
//!
//! world.dispatch(GameEvent::damage(knight, goblin, 12.0));
//! assert_eq!(world.actor(goblin).unwrap().attributes().current_value("hp").unwrap(), 18.0);
//! assert!(world.actor(goblin).unwrap().tags().has_tag("stunned"));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ability::{Ability, AbilityScope, DispatchScope};
use crate::actor::{Actor, ActorRegistry, ActorSnapshot, WorldView};
use crate::attribute::{AttributeDef, AttributeSet, ModifierTarget};
use crate::config::EngineConfig;
use crate::data::{AbilityRegistry, ActorTemplate};
use crate::effects::{EffectApplier, StandardEffects};
use crate::error::{EngineError, Result};
use crate::event::{GameEvent, MutableEvent};
use crate::ids::{AbilityId, ActorId, IdGenerator, LogicalClock};
use crate::processor::{Broadcast, EventProcessor, Resolution};
use crate::record::{EventLog, RevokeReason};
use crate::tags::TagContainer;

/// Shared state the processor needs while resolving events.
#[derive(Debug)]
pub struct WorldState {
    pub(crate) actors: ActorRegistry,
    pub(crate) ids: IdGenerator,
    pub(crate) clock: LogicalClock,
    pub(crate) log: EventLog,
}

impl WorldState {
    /// Empty state seeded from `config`.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            actors: ActorRegistry::new(),
            ids: IdGenerator::new(config.id_seed),
            clock: LogicalClock::default(),
            log: EventLog::new(),
        }
    }

    /// Read-only view over every actor.
    #[must_use]
    pub fn view(&self) -> WorldView<'_> {
        WorldView::new(&self.actors, self.clock.now())
    }

    /// Logical time.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Recording log.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Live actors.
    #[must_use]
    pub const fn actors(&self) -> &ActorRegistry {
        &self.actors
    }

    /// Deliver `event` to one actor's abilities and return what they
    /// emitted. `None` if the actor is gone.
    ///
    /// The actor is checked out of the registry for the call, so its
    /// abilities see every other actor through a [`WorldView`] while holding
    /// exclusive access to their owner.
    pub(crate) fn dispatch_to_actor(&mut self, id: ActorId, event: &GameEvent) -> Option<Vec<GameEvent>> {
        let mut actor = self.actors.remove(id)?;
        let mut emitted = Vec::new();
        {
            let view = WorldView::new(&self.actors, self.clock.now());
            let mut scope = DispatchScope {
                attributes: &mut actor.attributes,
                tags: &mut actor.tags,
                state: &view,
                ids: &mut self.ids,
                log: &self.log,
                now: self.clock.now(),
                emitted: &mut emitted,
            };
            actor.abilities.dispatch_event(event, &mut scope);
        }
        self.actors.insert(actor);
        Some(emitted)
    }
}

/// Serializable state of a whole world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Configuration the world ran with.
    pub config: EngineConfig,
    /// Logical time.
    pub now: u64,
    /// Id generator state.
    pub ids: IdGenerator,
    /// Actors in id order.
    pub actors: Vec<ActorSnapshot>,
}

impl WorldSnapshot {
    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EngineError::InvalidSnapshot(e.to_string()))
    }

    /// Decode bytes produced by [`WorldSnapshot::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| EngineError::InvalidSnapshot(e.to_string()))
    }
}

/// The simulation root.
pub struct World {
    config: EngineConfig,
    state: WorldState,
    processor: EventProcessor,
    effects: Box<dyn EffectApplier>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("processor", &self.processor)
            .finish_non_exhaustive()
    }
}

impl World {
    /// Empty world. Damage and heals change `config.health_attribute`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: WorldState::new(&config),
            processor: EventProcessor::new(&config),
            effects: Box::new(StandardEffects::new(config.health_attribute.clone())),
            config,
        })
    }

    /// Builder method to replace the effect applier.
    #[must_use]
    pub fn with_effects(mut self, effects: impl EffectApplier + 'static) -> Self {
        self.effects = Box::new(effects);
        self
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Logical time.
    #[must_use]
    pub const fn now(&self) -> u64 {
        self.state.now()
    }

    /// Recording log.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.state.log
    }

    /// Live actors.
    #[must_use]
    pub const fn actors(&self) -> &ActorRegistry {
        &self.state.actors
    }

    /// Actor by id.
    #[must_use]
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.state.actors.get(id)
    }

    /// Mutable actor by id.
    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.state.actors.get_mut(id)
    }

    /// Event processor.
    #[must_use]
    pub const fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    /// Mutable event processor, for registering free-standing pre-handlers.
    pub fn processor_mut(&mut self) -> &mut EventProcessor {
        &mut self.processor
    }

    /// Spawn an actor with the given attributes and no abilities.
    pub fn spawn_actor(&mut self, name: &str, attributes: &[AttributeDef]) -> Result<ActorId> {
        let attributes = AttributeSet::from_defs(attributes)?;
        let id = self.state.ids.next_actor();
        let mut actor = Actor::new(id, name, attributes, TagContainer::starting_at(self.now()));
        actor.attach_log(&self.state.log);
        self.state.actors.insert(actor);
        debug!(actor = %id, name, "Spawned actor");
        Ok(id)
    }

    /// Spawn an actor from a template and grant its abilities in order.
    pub fn spawn_from_template(&mut self, template: &ActorTemplate, registry: &AbilityRegistry) -> Result<ActorId> {
        registry.check_template(template)?;
        let id = self.spawn_actor(&template.name, &template.attributes)?;
        for config_id in &template.abilities {
            self.grant_from_registry(id, registry, config_id)?;
        }
        Ok(id)
    }

    /// Revoke every ability of `id`, tear down its listeners and remove it.
    pub fn despawn_actor(&mut self, id: ActorId) -> Result<()> {
        let now = self.now();
        let mut actor = self.state.actors.remove(id).ok_or(EngineError::ActorNotFound(id))?;
        let mut scope = AbilityScope {
            attributes: &mut actor.attributes,
            tags: &mut actor.tags,
            handlers: self.processor.registry_mut(),
            log: &self.state.log,
            now,
        };
        let revoked = actor.abilities.revoke_all(RevokeReason::ActorDespawned, &mut scope);
        let removed = actor.detach_log();
        debug!(actor = %id, revoked, listeners = removed, "Despawned actor");
        Ok(())
    }

    /// Grant `ability` to `actor` under a fresh instance id.
    pub fn grant_ability(&mut self, actor: ActorId, ability: Ability) -> Result<AbilityId> {
        if !self.state.actors.contains(actor) {
            return Err(EngineError::ActorNotFound(actor));
        }
        let id = self.state.ids.next_ability();
        self.grant_with_id(actor, ability, id)
    }

    /// Build `config_id` from `registry` and grant it to `actor`.
    pub fn grant_from_registry(
        &mut self,
        actor: ActorId,
        registry: &AbilityRegistry,
        config_id: &str,
    ) -> Result<AbilityId> {
        let ability = registry.build(config_id)?;
        self.grant_ability(actor, ability)
    }

    fn grant_with_id(&mut self, actor_id: ActorId, ability: Ability, id: AbilityId) -> Result<AbilityId> {
        let now = self.now();
        let actor = self
            .state
            .actors
            .get_mut(actor_id)
            .ok_or(EngineError::ActorNotFound(actor_id))?;
        let mut scope = AbilityScope {
            attributes: &mut actor.attributes,
            tags: &mut actor.tags,
            handlers: self.processor.registry_mut(),
            log: &self.state.log,
            now,
        };
        actor.abilities.grant(ability, id, &mut scope)
    }

    /// Revoke one ability.
    pub fn revoke_ability(&mut self, actor_id: ActorId, ability: AbilityId) -> Result<()> {
        let now = self.now();
        let actor = self
            .state
            .actors
            .get_mut(actor_id)
            .ok_or(EngineError::ActorNotFound(actor_id))?;
        let mut scope = AbilityScope {
            attributes: &mut actor.attributes,
            tags: &mut actor.tags,
            handlers: self.processor.registry_mut(),
            log: &self.state.log,
            now,
        };
        actor.abilities.revoke(ability, RevokeReason::Manual, &mut scope)
    }

    /// Advance time by `dt_ms`: purge expired tag layers, tick abilities and
    /// executions, and revoke expired abilities. Returns what expired.
    pub fn tick(&mut self, dt_ms: u64) -> Vec<(ActorId, AbilityId)> {
        let now = self.state.clock.advance(dt_ms);
        let mut expired = Vec::new();
        for actor in self.state.actors.iter_mut() {
            actor.tags.advance_to(now);
            let owner = actor.id();
            let mut scope = AbilityScope {
                attributes: &mut actor.attributes,
                tags: &mut actor.tags,
                handlers: self.processor.registry_mut(),
                log: &self.state.log,
                now,
            };
            expired.extend(
                actor
                    .abilities
                    .tick(dt_ms, &mut scope)
                    .into_iter()
                    .map(|ability| (owner, ability)),
            );
        }
        expired
    }

    /// Run only the pre phase. Nothing is applied or broadcast.
    pub fn pre(&mut self, event: GameEvent) -> MutableEvent {
        self.processor.process_pre_event(event, &self.state.view())
    }

    /// Broadcast a finalized event to every actor.
    pub fn post(&mut self, event: &GameEvent) -> bool {
        self.processor.process_post_event(event, &mut self.state, self.effects.as_ref())
    }

    /// Broadcast a finalized event to the actors it names.
    pub fn post_related(&mut self, event: &GameEvent) -> bool {
        self.processor
            .process_post_event_related(event, &mut self.state, self.effects.as_ref())
    }

    /// Resolve `event` through pre, apply and post, broadcasting to every
    /// actor.
    pub fn dispatch(&mut self, event: GameEvent) -> Resolution {
        self.processor
            .resolve(event, &mut self.state, self.effects.as_ref(), Broadcast::All)
    }

    /// Request activation of a gated ability on its owner.
    ///
    /// The request is broadcast only to the owner. Whether the ability
    /// actually activated shows up in the log as `ExecutionActivated` or
    /// `ActivationFailed`.
    pub fn activate(&mut self, actor: ActorId, ability: AbilityId) -> Result<Resolution> {
        let owner = self.state.actors.get(actor).ok_or(EngineError::ActorNotFound(actor))?;
        if owner.abilities().get(ability).is_none() {
            return Err(EngineError::AbilityNotFound { actor, ability });
        }
        Ok(self.processor.resolve(
            GameEvent::activate(ability, actor),
            &mut self.state,
            self.effects.as_ref(),
            Broadcast::Related,
        ))
    }

    /// Listeners registered across all actors. Zero after every actor is
    /// despawned.
    #[must_use]
    pub fn live_subscriptions(&self) -> usize {
        self.state.actors.iter().map(Actor::listener_count).sum()
    }

    /// Plain data copy of the world.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            config: self.config.clone(),
            now: self.now(),
            ids: self.state.ids.clone(),
            actors: self.state.actors.iter().map(Actor::snapshot).collect(),
        }
    }

    /// Rebuild a world from a snapshot.
    ///
    /// Abilities are rebuilt from `registry` by config id and granted again
    /// under their saved instance ids, then their component states and
    /// running executions are reloaded. Abilities built in code rather than
    /// from data cannot be restored and fail with `UnknownAbility`.
    /// Free-standing pre-handlers are not part of the snapshot.
    pub fn restore(snapshot: &WorldSnapshot, registry: &AbilityRegistry) -> Result<Self> {
        let mut world = Self::new(snapshot.config.clone())?;
        world.state.clock = LogicalClock::starting_at(snapshot.now);

        let mut grants = Vec::new();
        for saved in &snapshot.actors {
            let attributes = AttributeSet::restore(&saved.attributes)?;
            let tags = TagContainer::restore(&saved.tags);
            let mut actor = Actor::new(saved.id, saved.name.clone(), attributes, tags);

            // Regranting adds these back.
            for ability in &saved.abilities.abilities {
                actor
                    .attributes
                    .modifier_target()
                    .remove_modifiers_by_source(&ability.id.to_string());
                actor.tags.remove_component_tags(ability.id);
                grants.push((ability.id, saved.id, ability.config_id.as_str()));
            }
            world.state.actors.insert(actor);
        }

        // Ability ids are issued in grant order, so regranting by id keeps
        // pre-handlers registered in their original order across actors.
        grants.sort_unstable_by_key(|&(ability, _, _)| ability);
        for (ability, owner, config_id) in grants {
            let built = registry.build(config_id)?;
            let actor = world
                .state
                .actors
                .get_mut(owner)
                .ok_or(EngineError::ActorNotFound(owner))?;
            let mut scope = AbilityScope {
                attributes: &mut actor.attributes,
                tags: &mut actor.tags,
                handlers: world.processor.registry_mut(),
                log: &world.state.log,
                now: snapshot.now,
            };
            actor.abilities.grant(built, ability, &mut scope)?;
        }

        for saved in &snapshot.actors {
            if let Some(actor) = world.state.actors.get_mut(saved.id) {
                actor.abilities.restore_state(&saved.abilities);
                actor.attach_log(&world.state.log);
            }
        }

        world.state.ids = snapshot.ids.clone();
        world.state.log.clear();
        info!(actors = world.state.actors.len(), now = snapshot.now, "Restored world");
        Ok(world)
    }

    /// Deterministic hash of clock, attributes, tags and abilities.
    ///
    /// Two worlds fed the same calls produce the same hash.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.now().hash(&mut hasher);
        self.state.actors.len().hash(&mut hasher);
        for actor in self.state.actors.iter() {
            actor.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

//! Actors and the registry that owns them.
//!
//! An actor is an id plus three state containers: attributes, tags and
//! granted abilities. Actors never hold references to each other; cross-actor
//! reads go through a [`StateProvider`] keyed by [`ActorId`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ability::{AbilitySet, AbilitySetSnapshot};
use crate::attribute::{AttributeSet, AttributeSetSnapshot};
use crate::ids::ActorId;
use crate::observer::Subscription;
use crate::record::{EngineEvent, EventLog};
use crate::tags::{TagContainer, TagContainerSnapshot};

/// Read-only lookup of actor state by id.
pub trait StateProvider {
    /// Granted abilities of `actor`.
    fn ability_set(&self, actor: ActorId) -> Option<&AbilitySet>;

    /// Attributes of `actor`.
    fn attributes(&self, actor: ActorId) -> Option<&AttributeSet>;

    /// Tags of `actor`.
    fn tags(&self, actor: ActorId) -> Option<&TagContainer>;

    /// Logical time.
    fn now(&self) -> u64;
}

/// [`StateProvider`] over an [`ActorRegistry`].
///
/// During a per-actor dispatch the dispatched actor is checked out of the
/// registry, so it is not visible through the view it receives.
#[derive(Debug, Clone, Copy)]
pub struct WorldView<'a> {
    actors: &'a ActorRegistry,
    now: u64,
}

impl<'a> WorldView<'a> {
    /// View over `actors` at time `now`.
    #[must_use]
    pub const fn new(actors: &'a ActorRegistry, now: u64) -> Self {
        Self { actors, now }
    }
}

impl StateProvider for WorldView<'_> {
    fn ability_set(&self, actor: ActorId) -> Option<&AbilitySet> {
        self.actors.get(actor).map(Actor::abilities)
    }

    fn attributes(&self, actor: ActorId) -> Option<&AttributeSet> {
        self.actors.get(actor).map(Actor::attributes)
    }

    fn tags(&self, actor: ActorId) -> Option<&TagContainer> {
        self.actors.get(actor).map(Actor::tags)
    }

    fn now(&self) -> u64 {
        self.now
    }
}

/// A participant in the simulation.
#[derive(Debug)]
pub struct Actor {
    id: ActorId,
    name: String,
    pub(crate) attributes: AttributeSet,
    pub(crate) tags: TagContainer,
    pub(crate) abilities: AbilitySet,
    log_subscriptions: Option<(Subscription, Subscription)>,
}

impl Actor {
    /// Actor with the given state and no granted abilities.
    pub fn new(id: ActorId, name: impl Into<String>, attributes: AttributeSet, tags: TagContainer) -> Self {
        Self {
            id,
            name: name.into(),
            attributes,
            tags,
            abilities: AbilitySet::new(id),
            log_subscriptions: None,
        }
    }

    /// Actor id.
    #[must_use]
    pub const fn id(&self) -> ActorId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes.
    #[must_use]
    pub const fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Mutable attributes, for direct base-value changes.
    pub fn attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.attributes
    }

    /// Tags.
    #[must_use]
    pub const fn tags(&self) -> &TagContainer {
        &self.tags
    }

    /// Mutable tags, for loose and timed tags.
    pub fn tags_mut(&mut self) -> &mut TagContainer {
        &mut self.tags
    }

    /// Granted abilities.
    #[must_use]
    pub const fn abilities(&self) -> &AbilitySet {
        &self.abilities
    }

    /// Forward attribute and tag changes into `log`. Replaces any earlier
    /// forwarding.
    pub fn attach_log(&mut self, log: &EventLog) {
        self.detach_log();
        let id = self.id;

        let sink = log.clone();
        let attributes = self.attributes.subscribe(move |change| {
            sink.push(EngineEvent::AttributeChanged {
                actor: id,
                attribute: change.attribute.clone(),
                old_value: change.old_value,
                new_value: change.new_value,
            });
        });

        let sink = log.clone();
        let tags = self.tags.subscribe(move |change| {
            sink.push(EngineEvent::TagChanged {
                actor: id,
                tag: change.tag.clone(),
                old_stacks: change.old_stacks,
                new_stacks: change.new_stacks,
            });
        });

        self.log_subscriptions = Some((attributes, tags));
    }

    /// Stop forwarding changes. Returns the number of listeners removed.
    pub fn detach_log(&mut self) -> usize {
        let Some((attributes, tags)) = self.log_subscriptions.take() else {
            return 0;
        };
        usize::from(self.attributes.unsubscribe(attributes)) + usize::from(self.tags.unsubscribe(tags))
    }

    /// Listeners currently registered on this actor's containers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.attributes.listener_count() + self.tags.listener_count()
    }

    /// Plain data copy of the actor.
    #[must_use]
    pub fn snapshot(&self) -> ActorSnapshot {
        ActorSnapshot {
            id: self.id,
            name: self.name.clone(),
            attributes: self.attributes.snapshot(),
            tags: self.tags.snapshot(),
            abilities: self.abilities.snapshot(),
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut impl std::hash::Hasher) {
        use std::hash::Hash;
        self.id.hash(hasher);
        self.name.hash(hasher);
        self.attributes.hash_into(hasher);
        self.tags.hash_into(hasher);
        self.abilities.hash_into(hasher);
    }
}

/// Serializable state of one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    /// Actor id.
    pub id: ActorId,
    /// Display name.
    pub name: String,
    /// Attribute state.
    pub attributes: AttributeSetSnapshot,
    /// Tag state.
    pub tags: TagContainerSnapshot,
    /// Granted abilities and running executions.
    pub abilities: AbilitySetSnapshot,
}

/// Live actors keyed by id. Iteration is always in ascending id order.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: BTreeMap<ActorId, Actor>,
}

impl ActorRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actors: BTreeMap::new(),
        }
    }

    /// Actor by id.
    #[must_use]
    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    /// Mutable actor by id.
    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    /// Whether `id` is live.
    #[must_use]
    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    /// Live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    /// Actors in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }

    /// Number of live actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Whether no actor is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub(crate) fn insert(&mut self, actor: Actor) -> Option<Actor> {
        self.actors.insert(actor.id(), actor)
    }

    pub(crate) fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.actors.clear();
    }
}

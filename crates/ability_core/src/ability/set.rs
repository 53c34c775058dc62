//! Per-actor container of granted abilities.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::component::{ComponentState, EventContext, LifecycleContext};
use super::Ability;
use crate::actor::StateProvider;
use crate::attribute::AttributeSet;
use crate::error::{EngineError, Result};
use crate::event::GameEvent;
use crate::ids::{AbilityId, ActorId, ExecutionId, IdGenerator};
use crate::processor::PreHandlerRegistry;
use crate::record::{EngineEvent, EventLog, RevokeReason};
use crate::tags::TagContainer;

/// A running instance of a gated activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityExecution {
    /// Execution id.
    pub id: ExecutionId,
    /// Ability that started it.
    pub ability_id: AbilityId,
    /// Timeline for presentation playback.
    pub timeline_id: String,
    /// Time run so far.
    pub elapsed_ms: u64,
    /// Total length.
    pub duration_ms: u64,
}

impl AbilityExecution {
    /// Whether the execution has run its full length.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.elapsed_ms >= self.duration_ms
    }
}

/// Owner state needed to attach, detach or tick abilities.
pub struct AbilityScope<'a> {
    /// Owner's attributes.
    pub attributes: &'a mut AttributeSet,
    /// Owner's tags.
    pub tags: &'a mut TagContainer,
    /// Pre-phase handler registry.
    pub handlers: &'a mut PreHandlerRegistry,
    /// Outbound recording stream.
    pub log: &'a EventLog,
    /// Logical time.
    pub now: u64,
}

/// Owner state needed to dispatch a broadcast event.
pub struct DispatchScope<'a> {
    /// Owner's attributes.
    pub attributes: &'a mut AttributeSet,
    /// Owner's tags.
    pub tags: &'a mut TagContainer,
    /// Read access to the other actors.
    pub state: &'a dyn StateProvider,
    /// World id generator.
    pub ids: &'a mut IdGenerator,
    /// Outbound recording stream.
    pub log: &'a EventLog,
    /// Logical time.
    pub now: u64,
    /// Events emitted by triggered actions.
    pub emitted: &'a mut Vec<GameEvent>,
}

/// Serializable state of one ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitySnapshot {
    /// Instance id.
    pub id: AbilityId,
    /// Template id used to rebuild it.
    pub config_id: String,
    /// Component states in order.
    pub components: Vec<ComponentState>,
}

/// Serializable state of an [`AbilitySet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilitySetSnapshot {
    /// Abilities in grant order.
    pub abilities: Vec<AbilitySnapshot>,
    /// Running executions.
    pub executions: Vec<AbilityExecution>,
}

/// Abilities granted to one actor, in grant order.
#[derive(Debug)]
pub struct AbilitySet {
    owner: ActorId,
    abilities: Vec<Ability>,
    executions: Vec<AbilityExecution>,
}

impl AbilitySet {
    /// Empty set for `owner`.
    #[must_use]
    pub const fn new(owner: ActorId) -> Self {
        Self {
            owner,
            abilities: Vec::new(),
            executions: Vec::new(),
        }
    }

    /// Owning actor.
    #[must_use]
    pub const fn owner(&self) -> ActorId {
        self.owner
    }

    /// Number of granted abilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    /// Whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }

    /// Ability by instance id.
    #[must_use]
    pub fn get(&self, id: AbilityId) -> Option<&Ability> {
        self.abilities.iter().find(|a| a.id() == id)
    }

    /// Granted abilities in grant order.
    pub fn iter(&self) -> impl Iterator<Item = &Ability> {
        self.abilities.iter()
    }

    /// Instance ids of abilities built from `config_id`.
    #[must_use]
    pub fn find_by_config(&self, config_id: &str) -> Vec<AbilityId> {
        self.abilities
            .iter()
            .filter(|a| a.config_id() == config_id)
            .map(Ability::id)
            .collect()
    }

    /// Running executions.
    #[must_use]
    pub fn active_executions(&self) -> &[AbilityExecution] {
        &self.executions
    }

    /// Attach `ability` under instance id `id`.
    pub fn grant(&mut self, mut ability: Ability, id: AbilityId, scope: &mut AbilityScope<'_>) -> Result<AbilityId> {
        if self.get(id).is_some() {
            return Err(EngineError::InvalidState(format!(
                "{id} already granted to {}",
                self.owner
            )));
        }

        {
            let mut writer = scope.attributes.modifier_target();
            let mut ctx = LifecycleContext {
                owner: self.owner,
                ability_id: id,
                modifiers: &mut writer,
                tags: &mut *scope.tags,
                handlers: &mut *scope.handlers,
                now: scope.now,
            };
            ability.attach(id, &mut ctx)?;
        }

        debug!(owner = %self.owner, ability = %id, config = ability.config_id(), "Granted ability");
        scope.log.push(EngineEvent::AbilityGranted {
            actor: self.owner,
            ability: id,
            config_id: ability.config_id().to_string(),
        });
        self.abilities.push(ability);
        Ok(id)
    }

    /// Detach and drop an ability, together with its running executions.
    pub fn revoke(&mut self, id: AbilityId, reason: RevokeReason, scope: &mut AbilityScope<'_>) -> Result<()> {
        let position = self
            .abilities
            .iter()
            .position(|a| a.id() == id)
            .ok_or(EngineError::AbilityNotFound {
                actor: self.owner,
                ability: id,
            })?;
        let mut ability = self.abilities.remove(position);

        {
            let mut writer = scope.attributes.modifier_target();
            let mut ctx = LifecycleContext {
                owner: self.owner,
                ability_id: id,
                modifiers: &mut writer,
                tags: &mut *scope.tags,
                handlers: &mut *scope.handlers,
                now: scope.now,
            };
            ability.detach(&mut ctx);
        }
        self.executions.retain(|e| e.ability_id != id);

        debug!(owner = %self.owner, ability = %id, ?reason, "Revoked ability");
        scope.log.push(EngineEvent::AbilityRevoked {
            actor: self.owner,
            ability: id,
            reason,
        });
        Ok(())
    }

    /// Revoke everything, most recently granted first.
    pub fn revoke_all(&mut self, reason: RevokeReason, scope: &mut AbilityScope<'_>) -> usize {
        let ids: Vec<AbilityId> = self.abilities.iter().rev().map(Ability::id).collect();
        ids.iter()
            .filter(|&&id| self.revoke(id, reason, scope).is_ok())
            .count()
    }

    /// Advance abilities and executions by `dt_ms`.
    ///
    /// Finished executions are recorded and dropped; abilities reporting
    /// expiry are revoked. Returns the expired ability ids.
    pub fn tick(&mut self, dt_ms: u64, scope: &mut AbilityScope<'_>) -> Vec<AbilityId> {
        for ability in &mut self.abilities {
            ability.tick(dt_ms);
        }

        let owner = self.owner;
        self.executions.retain_mut(|execution| {
            execution.elapsed_ms = execution.elapsed_ms.saturating_add(dt_ms);
            if !execution.is_complete() {
                return true;
            }
            scope.log.push(EngineEvent::ExecutionCompleted {
                actor: owner,
                ability: execution.ability_id,
                execution: execution.id,
            });
            false
        });

        let expired: Vec<AbilityId> = self
            .abilities
            .iter()
            .filter(|a| a.is_expired())
            .map(Ability::id)
            .collect();
        for &id in &expired {
            // The id was just read from the set, so revoke cannot miss.
            let _ = self.revoke(id, RevokeReason::Expired, scope);
        }
        expired
    }

    /// Deliver a broadcast event to every active ability in grant order.
    pub fn dispatch_event(&mut self, event: &GameEvent, scope: &mut DispatchScope<'_>) {
        for ability in &mut self.abilities {
            if !ability.is_active() {
                continue;
            }
            let mut ctx = EventContext {
                owner: self.owner,
                ability_id: ability.id(),
                attributes: &mut *scope.attributes,
                tags: &mut *scope.tags,
                state: scope.state,
                ids: &mut *scope.ids,
                log: scope.log,
                now: scope.now,
                emitted: &mut *scope.emitted,
                executions: &mut self.executions,
            };
            ability.on_event(event, &mut ctx);
        }
    }

    /// Plain data copy of the set.
    #[must_use]
    pub fn snapshot(&self) -> AbilitySetSnapshot {
        AbilitySetSnapshot {
            abilities: self
                .abilities
                .iter()
                .map(|a| AbilitySnapshot {
                    id: a.id(),
                    config_id: a.config_id().to_string(),
                    components: a.component_states(),
                })
                .collect(),
            executions: self.executions.clone(),
        }
    }

    /// Reload component states and executions after the abilities in
    /// `snapshot` were granted again.
    pub(crate) fn restore_state(&mut self, snapshot: &AbilitySetSnapshot) {
        for saved in &snapshot.abilities {
            if let Some(ability) = self.abilities.iter_mut().find(|a| a.id() == saved.id) {
                ability.restore_component_states(&saved.components);
            }
        }
        self.executions.clone_from(&snapshot.executions);
    }

    pub(crate) fn hash_into(&self, hasher: &mut impl std::hash::Hasher) {
        use std::hash::Hash;
        for ability in &self.abilities {
            ability.id().hash(hasher);
            ability.config_id().hash(hasher);
            ability.component_states().hash(hasher);
        }
        self.executions.hash(hasher);
    }
}

//! The component trait and the contexts components receive.

use serde::{Deserialize, Serialize};

use super::set::AbilityExecution;
use crate::actor::StateProvider;
use crate::attribute::{AttributeSet, ModifierTarget};
use crate::error::Result;
use crate::event::GameEvent;
use crate::ids::{AbilityId, ActorId, ExecutionId, IdGenerator};
use crate::processor::PreHandlerRegistry;
use crate::record::EventLog;
use crate::tags::{TagContainer, TagTarget};

/// Capabilities available while an ability attaches or detaches.
///
/// Modifiers and tags are reachable only through their narrow write
/// traits.
pub struct LifecycleContext<'a> {
    /// Owning actor.
    pub owner: ActorId,
    /// Ability being attached or detached.
    pub ability_id: AbilityId,
    /// Owner's attribute modifiers.
    pub modifiers: &'a mut dyn ModifierTarget,
    /// Owner's tags.
    pub tags: &'a mut dyn TagTarget,
    /// Pre-phase handler registry.
    pub handlers: &'a mut PreHandlerRegistry,
    /// Logical time.
    pub now: u64,
}

/// Capabilities available while an ability reacts to a broadcast event.
pub struct EventContext<'a> {
    /// Owning actor.
    pub owner: ActorId,
    /// Ability receiving the event.
    pub ability_id: AbilityId,
    /// Owner's attributes (base writes only).
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
    /// Events to resolve once this actor's dispatch finishes.
    pub emitted: &'a mut Vec<GameEvent>,
    /// Running executions of the owning ability set.
    pub executions: &'a mut Vec<AbilityExecution>,
}

impl EventContext<'_> {
    /// Context for running actions in response to `event`.
    pub fn execution<'c>(
        &'c mut self,
        event: &'c GameEvent,
        execution: Option<ExecutionId>,
    ) -> ExecutionContext<'c> {
        ExecutionContext {
            event,
            owner: self.owner,
            ability_id: self.ability_id,
            execution,
            attributes: &mut *self.attributes,
            tags: &mut *self.tags,
            state: self.state,
            emitted: &mut *self.emitted,
            now: self.now,
        }
    }
}

/// What an [`Action`](super::Action) runs against.
pub struct ExecutionContext<'a> {
    /// Triggering event.
    pub event: &'a GameEvent,
    /// Owning actor.
    pub owner: ActorId,
    /// Ability running the action.
    pub ability_id: AbilityId,
    /// Execution instance, for gated activations.
    pub execution: Option<ExecutionId>,
    /// Owner's attributes (base writes only).
    pub attributes: &'a mut AttributeSet,
    /// Owner's tags.
    pub tags: &'a mut TagContainer,
    /// Read access to the other actors.
    pub state: &'a dyn StateProvider,
    /// Scoped event buffer.
    pub emitted: &'a mut Vec<GameEvent>,
    /// Logical time.
    pub now: u64,
}

impl ExecutionContext<'_> {
    /// Queue an event for resolution after the current dispatch.
    pub fn emit(&mut self, event: GameEvent) {
        self.emitted.push(event);
    }
}

/// Persisted per-component state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Nothing beyond the definition.
    #[default]
    Stateless,
    /// Time accumulated by a duration component.
    Elapsed(u64),
}

/// One capability unit of an ability.
///
/// Every hook has a no-op default so components implement only what they
/// need.
pub trait AbilityComponent {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Attach side effects. An error rolls back earlier components.
    fn on_apply(&mut self, _ctx: &mut LifecycleContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Undo whatever `on_apply` did.
    fn on_remove(&mut self, _ctx: &mut LifecycleContext<'_>) {}

    /// Advance component time.
    fn on_tick(&mut self, _dt_ms: u64) {}

    /// React to a broadcast event.
    fn on_event(&mut self, _event: &GameEvent, _ctx: &mut EventContext<'_>) {}

    /// Whether the owning ability should be revoked.
    fn is_expired(&self) -> bool {
        false
    }

    /// State to persist in snapshots.
    fn state(&self) -> ComponentState {
        ComponentState::Stateless
    }

    /// Reload state persisted by [`AbilityComponent::state`].
    fn restore_state(&mut self, _state: ComponentState) {}
}

//! Abilities: instanced bundles of components with a small lifecycle.
//!
//! ```text
//! Unattached --grant--> Active --revoke/expire--> Revoked
//! ```
//!
//! Granting applies components in list order; revoking removes them in
//! reverse order, so later stacking effects are undone before earlier
//! ones. Revoked is terminal.

mod action;
mod component;
pub mod components;
mod condition;
mod filter;
mod set;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::GameEvent;
use crate::ids::AbilityId;

pub use action::{
    run_actions, Action, AddLooseTag, AddTimedTag, EmitCustom, EmitDamage, EmitHeal, FnAction,
    ModifyAttribute, Recipient, RemoveLooseTag,
};
pub use component::{
    AbilityComponent, ComponentState, EventContext, ExecutionContext, LifecycleContext,
};
pub use condition::{
    AttributeAtLeast, AttributeCost, Condition, ConditionContext, CooldownCost, Cost, CostContext,
    FnCondition, HasTag, LacksTag, TagStackCost,
};
pub use filter::EventFilter;
pub use set::{
    AbilityExecution, AbilityScope, AbilitySet, AbilitySetSnapshot, AbilitySnapshot, DispatchScope,
};

/// Lifecycle state of an [`Ability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityState {
    /// Built but not granted.
    Unattached,
    /// Granted; components are applied.
    Active,
    /// Revoked; components are removed. Terminal.
    Revoked,
}

/// A named, instanced bundle of components.
pub struct Ability {
    id: AbilityId,
    config_id: String,
    components: Vec<Box<dyn AbilityComponent>>,
    state: AbilityState,
}

impl Ability {
    /// Unattached ability built from template `config_id`.
    pub fn new(config_id: impl Into<String>) -> Self {
        Self {
            id: AbilityId(0),
            config_id: config_id.into(),
            components: Vec::new(),
            state: AbilityState::Unattached,
        }
    }

    /// Builder method to append a component.
    #[must_use]
    pub fn with_component(mut self, component: impl AbilityComponent + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    /// Append a boxed component. Only valid before the ability is granted.
    pub fn push_component(&mut self, component: Box<dyn AbilityComponent>) {
        debug_assert_eq!(self.state, AbilityState::Unattached);
        self.components.push(component);
    }

    /// Instance id. Zero until granted.
    #[must_use]
    pub const fn id(&self) -> AbilityId {
        self.id
    }

    /// Template id.
    #[must_use]
    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AbilityState {
        self.state
    }

    /// Whether the ability is granted and not revoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == AbilityState::Active
    }

    /// Component names in application order.
    #[must_use]
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Whether any component reports expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.components.iter().any(|c| c.is_expired())
    }

    /// Persisted state of each component, in order.
    #[must_use]
    pub fn component_states(&self) -> Vec<ComponentState> {
        self.components.iter().map(|c| c.state()).collect()
    }

    pub(crate) fn restore_component_states(&mut self, states: &[ComponentState]) {
        for (component, state) in self.components.iter_mut().zip(states) {
            component.restore_state(*state);
        }
    }

    /// Apply every component in order. On failure the components applied so
    /// far are removed again in reverse order and the ability stays
    /// unattached.
    pub(crate) fn attach(&mut self, id: AbilityId, ctx: &mut LifecycleContext<'_>) -> Result<()> {
        debug_assert_eq!(self.state, AbilityState::Unattached, "ability granted twice");
        self.id = id;
        for index in 0..self.components.len() {
            if let Err(err) = self.components[index].on_apply(ctx) {
                for applied in self.components[..index].iter_mut().rev() {
                    applied.on_remove(ctx);
                }
                return Err(err);
            }
        }
        self.state = AbilityState::Active;
        Ok(())
    }

    /// Remove every component in reverse order.
    pub(crate) fn detach(&mut self, ctx: &mut LifecycleContext<'_>) {
        debug_assert_eq!(self.state, AbilityState::Active, "detaching inactive ability");
        if self.state != AbilityState::Active {
            return;
        }
        for component in self.components.iter_mut().rev() {
            component.on_remove(ctx);
        }
        self.state = AbilityState::Revoked;
    }

    pub(crate) fn tick(&mut self, dt_ms: u64) {
        if !self.is_active() {
            return;
        }
        for component in &mut self.components {
            component.on_tick(dt_ms);
        }
    }

    pub(crate) fn on_event(&mut self, event: &GameEvent, ctx: &mut EventContext<'_>) {
        debug_assert_eq!(self.state, AbilityState::Active, "event sent to inactive ability");
        if !self.is_active() {
            return;
        }
        for component in &mut self.components {
            component.on_event(event, ctx);
        }
    }
}

impl std::fmt::Debug for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ability")
            .field("id", &self.id)
            .field("config_id", &self.config_id)
            .field("components", &self.component_names())
            .field("state", &self.state)
            .finish()
    }
}

//! Real-world effects of resolved events.
//!
//! The processor calls the world's [`EffectApplier`] between the pre and
//! post phases of every event that was not cancelled.

use crate::actor::ActorRegistry;
use crate::error::{EngineError, Result};
use crate::event::GameEvent;

/// Applies a finalized event to actor state.
pub trait EffectApplier {
    /// Apply `event`. Errors are logged by the caller and never abort the
    /// cascade.
    fn apply(&self, event: &GameEvent, actors: &mut ActorRegistry) -> Result<()>;
}

/// Damage lowers and heals raise one configured attribute on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardEffects {
    health_attribute: String,
}

impl StandardEffects {
    /// Applier working on `health_attribute`.
    pub fn new(health_attribute: impl Into<String>) -> Self {
        Self {
            health_attribute: health_attribute.into(),
        }
    }

    /// Attribute this applier changes.
    #[must_use]
    pub fn health_attribute(&self) -> &str {
        &self.health_attribute
    }
}

impl Default for StandardEffects {
    fn default() -> Self {
        Self::new("hp")
    }
}

impl EffectApplier for StandardEffects {
    fn apply(&self, event: &GameEvent, actors: &mut ActorRegistry) -> Result<()> {
        // Negative amounts never flip a damage into a heal or vice versa.
        let (target, delta) = match event {
            GameEvent::Damage(e) => (e.target_id, -e.amount.max(0.0)),
            GameEvent::Heal(e) => (e.target_id, e.amount.max(0.0)),
            GameEvent::AbilityActivate(_) | GameEvent::Custom(_) => return Ok(()),
        };

        let actor = actors
            .get_mut(target)
            .ok_or(EngineError::ActorNotFound(target))?;
        actor
            .attributes_mut()
            .modify_base(&self.health_attribute, delta)?;
        Ok(())
    }
}

/// Applier that changes nothing. Useful when the caller applies effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEffects;

impl EffectApplier for NoEffects {
    fn apply(&self, _event: &GameEvent, _actors: &mut ActorRegistry) -> Result<()> {
        Ok(())
    }
}

use tracing::warn;

use super::super::component::{AbilityComponent, LifecycleContext};
use crate::attribute::ModifierSpec;
use crate::error::Result;

/// Attaches modifiers to the owner while granted.
///
/// Every modifier is sourced with the ability id, so detaching removes
/// exactly what this ability added.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatModifierComponent {
    modifiers: Vec<(String, ModifierSpec)>,
}

impl StatModifierComponent {
    /// Component with no modifiers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            modifiers: Vec::new(),
        }
    }

    /// Builder method to add a modifier on `attribute`.
    #[must_use]
    pub fn with_modifier(mut self, attribute: impl Into<String>, spec: ModifierSpec) -> Self {
        self.modifiers.push((attribute.into(), spec));
        self
    }

    /// Modifiers attached on grant.
    #[must_use]
    pub fn modifiers(&self) -> &[(String, ModifierSpec)] {
        &self.modifiers
    }
}

impl AbilityComponent for StatModifierComponent {
    fn name(&self) -> &str {
        "stat_modifier"
    }

    fn on_apply(&mut self, ctx: &mut LifecycleContext<'_>) -> Result<()> {
        let source = ctx.ability_id.to_string();
        for (attribute, spec) in &self.modifiers {
            let sourced = spec.clone().with_source(source.clone());
            if let Err(err) = ctx.modifiers.add_modifier(attribute, sourced) {
                warn!(
                    owner = %ctx.owner,
                    ability = %ctx.ability_id,
                    attribute = attribute.as_str(),
                    error = %err,
                    "Modifier rejected"
                );
                ctx.modifiers.remove_modifiers_by_source(&source);
                return Err(err);
            }
        }
        Ok(())
    }

    fn on_remove(&mut self, ctx: &mut LifecycleContext<'_>) {
        ctx.modifiers
            .remove_modifiers_by_source(&ctx.ability_id.to_string());
    }
}

//! Effect actions run by trigger components.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::component::ExecutionContext;
use crate::error::HandlerError;
use crate::event::{CustomEvent, DamageEvent, GameEvent, HealEvent};
use crate::ids::ActorId;

/// One step of an ability's effect list.
pub trait Action {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run against the execution context.
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError>;
}

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run `actions` in order. A failing action is logged and skipped; its
/// siblings still run.
pub fn run_actions(actions: &[Box<dyn Action>], ctx: &mut ExecutionContext<'_>) -> usize {
    let mut failures = 0;
    for action in actions {
        if let Err(err) = action.execute(ctx) {
            failures += 1;
            warn!(
                action = action.name(),
                owner = %ctx.owner,
                ability = %ctx.ability_id,
                kind = %ctx.event.kind(),
                error = %err,
                "Ability action failed"
            );
        }
    }
    failures
}

/// Which actor an emitted event is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    /// The ability's owner.
    Owner,
    /// The triggering event's source.
    EventSource,
    /// The triggering event's target.
    EventTarget,
}

impl Recipient {
    /// Resolve against the triggering event.
    pub fn resolve(self, ctx: &ExecutionContext<'_>) -> Result<ActorId, HandlerError> {
        match self {
            Self::Owner => Ok(ctx.owner),
            Self::EventSource => ctx
                .event
                .source_id()
                .ok_or_else(|| HandlerError::failed("triggering event has no source")),
            Self::EventTarget => ctx
                .event
                .target_id()
                .ok_or_else(|| HandlerError::failed("triggering event has no target")),
        }
    }
}

/// Add `delta` to the owner's base value of `attribute`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyAttribute {
    /// Attribute name.
    pub attribute: String,
    /// Amount added to the base.
    pub delta: f64,
}

impl Action for ModifyAttribute {
    fn name(&self) -> &str {
        "modify_attribute"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        ctx.attributes.modify_base(&self.attribute, self.delta)?;
        Ok(())
    }
}

/// Add loose stacks to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLooseTag {
    /// Tag name.
    pub tag: String,
    /// Stacks to add.
    pub stacks: u32,
}

impl Action for AddLooseTag {
    fn name(&self) -> &str {
        "add_loose_tag"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        ctx.tags.add_loose_tag(&self.tag, self.stacks);
        Ok(())
    }
}

/// Remove loose stacks from the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveLooseTag {
    /// Tag name.
    pub tag: String,
    /// Stacks to remove.
    pub stacks: u32,
}

impl Action for RemoveLooseTag {
    fn name(&self) -> &str {
        "remove_loose_tag"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        ctx.tags.remove_loose_tag(&self.tag, self.stacks);
        Ok(())
    }
}

/// Add one timed tag layer to the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTimedTag {
    /// Tag name.
    pub tag: String,
    /// Layer lifetime.
    pub duration_ms: u64,
}

impl Action for AddTimedTag {
    fn name(&self) -> &str {
        "add_timed_tag"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        ctx.tags.add_auto_duration_tag(&self.tag, self.duration_ms);
        Ok(())
    }
}

/// Emit damage from the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitDamage {
    /// Who takes the damage.
    pub to: Recipient,
    /// Amount.
    pub amount: f64,
    /// Damage category.
    pub damage_type: String,
}

impl Action for EmitDamage {
    fn name(&self) -> &str {
        "emit_damage"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        let target_id = self.to.resolve(ctx)?;
        ctx.emit(GameEvent::Damage(DamageEvent {
            source_id: ctx.owner,
            target_id,
            amount: self.amount,
            damage_type: self.damage_type.clone(),
        }));
        Ok(())
    }
}

/// Emit a heal from the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitHeal {
    /// Who is healed.
    pub to: Recipient,
    /// Amount.
    pub amount: f64,
}

impl Action for EmitHeal {
    fn name(&self) -> &str {
        "emit_heal"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        let target_id = self.to.resolve(ctx)?;
        ctx.emit(GameEvent::Heal(HealEvent {
            source_id: ctx.owner,
            target_id,
            amount: self.amount,
        }));
        Ok(())
    }
}

/// Emit a custom event from the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct EmitCustom {
    /// Kind name.
    pub kind: String,
    /// Optional target.
    pub to: Option<Recipient>,
    /// Numeric payload.
    pub fields: BTreeMap<String, f64>,
}

impl Action for EmitCustom {
    fn name(&self) -> &str {
        "emit_custom"
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        let target_id = self.to.map(|r| r.resolve(ctx)).transpose()?;
        let mut event = CustomEvent::new(self.kind.as_str())
            .map_err(|err| HandlerError::failed(err.to_string()))?
            .with_source(ctx.owner);
        event.target_id = target_id;
        event.fields.clone_from(&self.fields);
        ctx.emit(GameEvent::Custom(event));
        Ok(())
    }
}

type ActionFn = dyn Fn(&mut ExecutionContext<'_>) -> Result<(), HandlerError>;

/// Closure-backed action.
pub struct FnAction {
    name: String,
    run: Box<ActionFn>,
}

impl FnAction {
    /// Wrap a closure.
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(&mut ExecutionContext<'_>) -> Result<(), HandlerError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), HandlerError> {
        (self.run)(ctx)
    }
}

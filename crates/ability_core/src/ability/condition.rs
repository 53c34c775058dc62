//! Activation conditions and costs.

use std::fmt;

use crate::actor::StateProvider;
use crate::attribute::AttributeSet;
use crate::error::HandlerError;
use crate::event::GameEvent;
use crate::ids::{AbilityId, ActorId};
use crate::tags::TagContainer;

/// Read-only view used to evaluate conditions and cost payability.
pub struct ConditionContext<'a> {
    /// Owning actor.
    pub owner: ActorId,
    /// Ability being activated.
    pub ability_id: AbilityId,
    /// Activation event.
    pub event: &'a GameEvent,
    /// Owner's attributes.
    pub attributes: &'a AttributeSet,
    /// Owner's tags.
    pub tags: &'a TagContainer,
    /// Read access to the other actors.
    pub state: &'a dyn StateProvider,
    /// Logical time.
    pub now: u64,
}

/// Write view used to pay costs.
pub struct CostContext<'a> {
    /// Owning actor.
    pub owner: ActorId,
    /// Ability being activated.
    pub ability_id: AbilityId,
    /// Owner's attributes.
    pub attributes: &'a mut AttributeSet,
    /// Owner's tags.
    pub tags: &'a mut TagContainer,
    /// Logical time.
    pub now: u64,
}

/// Gate on a gated activation. All conditions must pass.
pub trait Condition {
    /// Whether activation may proceed.
    fn check(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError>;

    /// Human readable reason reported when `check` denies.
    fn fail_reason(&self) -> String;
}

/// Resource consumed by a gated activation.
pub trait Cost {
    /// Whether the owner can afford the cost right now.
    fn can_pay(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError>;

    /// Consume the cost. Only called after every cost reported payable.
    fn pay(&self, ctx: &mut CostContext<'_>) -> Result<(), HandlerError>;

    /// Human readable reason reported when `can_pay` denies.
    fn fail_reason(&self) -> String;
}

/// Passes while the owner carries `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasTag {
    /// Tag name.
    pub tag: String,
}

impl Condition for HasTag {
    fn check(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(ctx.tags.has_tag(&self.tag))
    }

    fn fail_reason(&self) -> String {
        format!("missing tag '{}'", self.tag)
    }
}

/// Passes while the owner does not carry `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LacksTag {
    /// Tag name.
    pub tag: String,
}

impl Condition for LacksTag {
    fn check(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(!ctx.tags.has_tag(&self.tag))
    }

    fn fail_reason(&self) -> String {
        format!("blocked by tag '{}'", self.tag)
    }
}

/// Passes while the owner's current value of `attribute` is at least
/// `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAtLeast {
    /// Attribute name.
    pub attribute: String,
    /// Threshold.
    pub value: f64,
}

impl Condition for AttributeAtLeast {
    fn check(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(ctx.attributes.current_value(&self.attribute)? >= self.value)
    }

    fn fail_reason(&self) -> String {
        format!("{} below {}", self.attribute, self.value)
    }
}

type ConditionFn = dyn Fn(&ConditionContext<'_>) -> Result<bool, HandlerError>;

/// Closure-backed condition.
pub struct FnCondition {
    reason: String,
    check: Box<ConditionFn>,
}

impl FnCondition {
    /// Wrap a closure; `reason` is reported when it denies.
    pub fn new(
        reason: impl Into<String>,
        check: impl Fn(&ConditionContext<'_>) -> Result<bool, HandlerError> + 'static,
    ) -> Self {
        Self {
            reason: reason.into(),
            check: Box::new(check),
        }
    }
}

impl fmt::Debug for FnCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCondition").field("reason", &self.reason).finish()
    }
}

impl Condition for FnCondition {
    fn check(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        (self.check)(ctx)
    }

    fn fail_reason(&self) -> String {
        self.reason.clone()
    }
}

/// Cooldown: payable while `tag` is absent; paying adds a timed layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownCost {
    /// Cooldown tag.
    pub tag: String,
    /// Cooldown length.
    pub duration_ms: u64,
}

impl Cost for CooldownCost {
    fn can_pay(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(!ctx.tags.has_tag(&self.tag))
    }

    fn pay(&self, ctx: &mut CostContext<'_>) -> Result<(), HandlerError> {
        ctx.tags.add_auto_duration_tag(&self.tag, self.duration_ms);
        Ok(())
    }

    fn fail_reason(&self) -> String {
        format!("on cooldown '{}'", self.tag)
    }
}

/// Resource cost: payable while the current value covers `amount`; paying
/// lowers the base.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeCost {
    /// Attribute name.
    pub attribute: String,
    /// Amount consumed.
    pub amount: f64,
}

impl Cost for AttributeCost {
    fn can_pay(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(ctx.attributes.current_value(&self.attribute)? >= self.amount)
    }

    fn pay(&self, ctx: &mut CostContext<'_>) -> Result<(), HandlerError> {
        ctx.attributes.modify_base(&self.attribute, -self.amount)?;
        Ok(())
    }

    fn fail_reason(&self) -> String {
        format!("not enough {} (need {})", self.attribute, self.amount)
    }
}

/// Consumes loose stacks of `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagStackCost {
    /// Tag name.
    pub tag: String,
    /// Stacks consumed.
    pub stacks: u32,
}

impl Cost for TagStackCost {
    fn can_pay(&self, ctx: &ConditionContext<'_>) -> Result<bool, HandlerError> {
        Ok(ctx.tags.loose_stacks(&self.tag) >= self.stacks)
    }

    fn pay(&self, ctx: &mut CostContext<'_>) -> Result<(), HandlerError> {
        ctx.tags.remove_loose_tag(&self.tag, self.stacks);
        Ok(())
    }

    fn fail_reason(&self) -> String {
        format!("needs {} stacks of '{}'", self.stacks, self.tag)
    }
}

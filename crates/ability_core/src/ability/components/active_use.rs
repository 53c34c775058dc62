use std::fmt;

use tracing::{debug, error, warn};

use super::super::action::{run_actions, Action};
use super::super::component::{AbilityComponent, EventContext};
use super::super::condition::{Condition, ConditionContext, Cost, CostContext};
use super::super::set::AbilityExecution;
use crate::event::GameEvent;
use crate::record::EngineEvent;

/// Gated activation: the "use skill" entry point.
///
/// Reacts only to [`GameEvent::AbilityActivate`] naming its own ability.
/// On activation:
///
/// 1. every condition must pass (first failure denies),
/// 2. every cost must be payable (first failure denies),
/// 3. every cost is paid,
/// 4. `ExecutionActivated` is recorded and an execution starts,
/// 5. the actions run.
///
/// Cost side effects are therefore observable before the activation
/// record and before any action effect.
pub struct ActiveUseComponent {
    timeline_id: String,
    duration_ms: u64,
    conditions: Vec<Box<dyn Condition>>,
    costs: Vec<Box<dyn Cost>>,
    actions: Vec<Box<dyn Action>>,
}

impl ActiveUseComponent {
    /// Activation playing `timeline_id` for `duration_ms`.
    pub fn new(timeline_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            timeline_id: timeline_id.into(),
            duration_ms,
            conditions: Vec::new(),
            costs: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Builder method to add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Builder method to add a cost.
    #[must_use]
    pub fn with_cost(mut self, cost: impl Cost + 'static) -> Self {
        self.costs.push(Box::new(cost));
        self
    }

    /// Builder method to add an action run on activation.
    #[must_use]
    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Append a boxed condition.
    pub fn push_condition(&mut self, condition: Box<dyn Condition>) {
        self.conditions.push(condition);
    }

    /// Append a boxed cost.
    pub fn push_cost(&mut self, cost: Box<dyn Cost>) {
        self.costs.push(cost);
    }

    /// Append a boxed action.
    pub fn push_action(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    /// Timeline id recorded on activation.
    #[must_use]
    pub fn timeline_id(&self) -> &str {
        &self.timeline_id
    }

    /// First condition or cost that denies activation. A failing check
    /// denies.
    fn denial(&self, ctx: &ConditionContext<'_>) -> Option<String> {
        for condition in &self.conditions {
            match condition.check(ctx) {
                Ok(true) => {}
                Ok(false) => return Some(condition.fail_reason()),
                Err(err) => {
                    warn!(owner = %ctx.owner, ability = %ctx.ability_id, error = %err, "Condition failed; denying");
                    return Some(format!("{}: {err}", condition.fail_reason()));
                }
            }
        }
        for cost in &self.costs {
            match cost.can_pay(ctx) {
                Ok(true) => {}
                Ok(false) => return Some(cost.fail_reason()),
                Err(err) => {
                    warn!(owner = %ctx.owner, ability = %ctx.ability_id, error = %err, "Cost check failed; denying");
                    return Some(format!("{}: {err}", cost.fail_reason()));
                }
            }
        }
        None
    }
}

impl fmt::Debug for ActiveUseComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveUseComponent")
            .field("timeline_id", &self.timeline_id)
            .field("duration_ms", &self.duration_ms)
            .field("conditions", &self.conditions.len())
            .field("costs", &self.costs.len())
            .field("actions", &self.actions)
            .finish()
    }
}

impl AbilityComponent for ActiveUseComponent {
    fn name(&self) -> &str {
        "active_use"
    }

    fn on_event(&mut self, event: &GameEvent, ctx: &mut EventContext<'_>) {
        let GameEvent::AbilityActivate(request) = event else {
            return;
        };
        if request.ability_id != ctx.ability_id {
            return;
        }

        let denial = self.denial(&ConditionContext {
            owner: ctx.owner,
            ability_id: ctx.ability_id,
            event,
            attributes: &*ctx.attributes,
            tags: &*ctx.tags,
            state: ctx.state,
            now: ctx.now,
        });
        if let Some(reason) = denial {
            debug!(owner = %ctx.owner, ability = %ctx.ability_id, %reason, "Activation denied");
            ctx.log.push(EngineEvent::ActivationFailed {
                actor: ctx.owner,
                ability: ctx.ability_id,
                reason,
            });
            return;
        }

        let mut payment = CostContext {
            owner: ctx.owner,
            ability_id: ctx.ability_id,
            attributes: &mut *ctx.attributes,
            tags: &mut *ctx.tags,
            now: ctx.now,
        };
        for cost in &self.costs {
            if let Err(err) = cost.pay(&mut payment) {
                error!(
                    owner = %ctx.owner,
                    ability = %ctx.ability_id,
                    error = %err,
                    "Cost reported payable but failed to pay"
                );
            }
        }

        let execution = ctx.ids.next_execution();
        ctx.log.push(EngineEvent::ExecutionActivated {
            actor: ctx.owner,
            ability: ctx.ability_id,
            execution,
            timeline_id: self.timeline_id.clone(),
        });
        ctx.executions.push(AbilityExecution {
            id: execution,
            ability_id: ctx.ability_id,
            timeline_id: self.timeline_id.clone(),
            elapsed_ms: 0,
            duration_ms: self.duration_ms,
        });

        let mut exec = ctx.execution(event, Some(execution));
        run_actions(&self.actions, &mut exec);
    }
}

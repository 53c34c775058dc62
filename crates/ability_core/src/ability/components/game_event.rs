use super::super::action::{run_actions, Action};
use super::super::component::{AbilityComponent, EventContext};
use super::super::filter::EventFilter;
use crate::event::{EventKind, GameEvent};
use crate::record::EngineEvent;

/// Unconditional trigger: runs its actions for every matching event.
#[derive(Debug)]
pub struct GameEventComponent {
    kinds: Vec<EventKind>,
    filter: EventFilter,
    actions: Vec<Box<dyn Action>>,
}

impl GameEventComponent {
    /// React to `kinds` when `filter` matches.
    #[must_use]
    pub fn new(kinds: Vec<EventKind>, filter: EventFilter) -> Self {
        Self {
            kinds,
            filter,
            actions: Vec::new(),
        }
    }

    /// Builder method to append an action.
    #[must_use]
    pub fn with_action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Append a boxed action.
    pub fn push_action(&mut self, action: Box<dyn Action>) {
        self.actions.push(action);
    }

    fn wants(&self, event: &GameEvent, ctx: &EventContext<'_>) -> bool {
        self.kinds.iter().any(|kind| event.is(kind))
            && self.filter.matches(event, ctx.owner, Some(&*ctx.tags))
    }
}

impl AbilityComponent for GameEventComponent {
    fn name(&self) -> &str {
        "game_event"
    }

    fn on_event(&mut self, event: &GameEvent, ctx: &mut EventContext<'_>) {
        if !self.wants(event, ctx) {
            return;
        }
        ctx.log.push(EngineEvent::AbilityTriggered {
            actor: ctx.owner,
            ability: ctx.ability_id,
            event_kind: event.kind().to_string(),
        });
        let mut exec = ctx.execution(event, None);
        run_actions(&self.actions, &mut exec);
    }
}

//! Two-phase event resolution.
//!
//! `pre` collects intents from every matching pre-handler and folds them
//! into a [`MutableEvent`]. `post` broadcasts a finalized event to actors,
//! whose trigger components may emit follow-up events; those go through
//! the full pipeline again. A depth counter shared by both phases bounds
//! the cascade. Reaching the bound truncates work and logs a warning; it is
//! never an error.

mod registry;
mod trace;

use std::cell::Cell;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::actor::StateProvider;
use crate::config::EngineConfig;
use crate::effects::EffectApplier;
use crate::event::{GameEvent, Intent, Modification, MutableEvent};
use crate::ids::{ActorId, HandlerId};
use crate::record::EngineEvent;
use crate::world::WorldState;

pub use registry::{FnPreHandler, PreHandler, PreHandlerContext, PreHandlerRegistry};
pub use trace::{HandlerTrace, Phase, TraceLevel, TraceRecord};

/// Which actors a post broadcast reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Broadcast {
    /// Every live actor in id order.
    #[default]
    All,
    /// Only actors named by the event's participant fields.
    Related,
}

/// Outcome of a full pre/apply/post pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Final event, or the original if cancelled.
    pub event: GameEvent,
    /// Whether a pre-handler cancelled the event.
    pub cancelled: bool,
    /// Cancelling handler.
    pub cancelled_by: Option<HandlerId>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
    /// Modifications collected in the pre phase.
    pub modifications: Vec<Modification>,
}

/// Increments the shared depth on creation and decrements it on drop.
struct DepthGuard {
    depth: Rc<Cell<usize>>,
}

impl DepthGuard {
    fn enter(depth: &Rc<Cell<usize>>) -> Self {
        depth.set(depth.get() + 1);
        Self {
            depth: Rc::clone(depth),
        }
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Event coordinator: pre-handler registry plus cascade bookkeeping.
#[derive(Debug)]
pub struct EventProcessor {
    max_depth: usize,
    trace_level: TraceLevel,
    depth: Rc<Cell<usize>>,
    registry: PreHandlerRegistry,
    traces: Vec<TraceRecord>,
    truncations: u64,
    broadcasts: u64,
}

impl EventProcessor {
    /// Processor using `config`'s depth bound and trace level.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            trace_level: config.trace_level,
            depth: Rc::new(Cell::new(0)),
            registry: PreHandlerRegistry::new(),
            traces: Vec::new(),
            truncations: 0,
            broadcasts: 0,
        }
    }

    /// Current nesting depth. Zero outside any call.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Configured depth bound.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of calls cut short by the depth bound.
    #[must_use]
    pub const fn truncations(&self) -> u64 {
        self.truncations
    }

    /// Number of post broadcasts that ran.
    #[must_use]
    pub const fn broadcasts(&self) -> u64 {
        self.broadcasts
    }

    /// Registered pre-handlers.
    #[must_use]
    pub const fn registry(&self) -> &PreHandlerRegistry {
        &self.registry
    }

    /// Mutable access to the pre-handler registry.
    pub fn registry_mut(&mut self) -> &mut PreHandlerRegistry {
        &mut self.registry
    }

    /// Change the trace level.
    pub fn set_trace_level(&mut self, level: TraceLevel) {
        self.trace_level = level;
    }

    /// Recorded traces, oldest first.
    #[must_use]
    pub fn traces(&self) -> &[TraceRecord] {
        &self.traces
    }

    /// Remove and return recorded traces.
    pub fn take_traces(&mut self) -> Vec<TraceRecord> {
        std::mem::take(&mut self.traces)
    }

    fn record(&mut self, record: TraceRecord) {
        if self.trace_level != TraceLevel::Off {
            self.traces.push(record);
        }
    }

    fn truncate(&mut self, phase: Phase, event: &GameEvent) {
        let depth = self.depth.get();
        warn!(
            kind = %event.kind(),
            depth,
            max_depth = self.max_depth,
            ?phase,
            "Event depth limit reached; truncating"
        );
        self.truncations += 1;
        let mut record = TraceRecord::new(phase, event.kind().to_string(), depth);
        record.truncated = true;
        self.record(record);
    }

    /// Collect intents for `event` from every matching pre-handler.
    ///
    /// Handlers run in registration order. The first cancel stops the
    /// phase; modifications are accumulated, not applied. A failing handler
    /// counts as a pass. At the depth bound the event is returned unchanged.
    pub fn process_pre_event(&mut self, event: GameEvent, state: &dyn StateProvider) -> MutableEvent {
        let mut mutable = MutableEvent::new(event);
        let depth = self.depth.get();
        if depth >= self.max_depth {
            self.truncate(Phase::Pre, mutable.original());
            return mutable;
        }
        let _guard = DepthGuard::enter(&self.depth);

        let kind = mutable.original().kind();
        let detailed = self.trace_level == TraceLevel::Detailed;
        let mut handler_traces = Vec::new();

        for entry in self.registry.entries_mut() {
            if entry.kind != kind {
                continue;
            }
            let ctx = PreHandlerContext {
                owner: entry.owner,
                ability_id: entry.ability_id,
                handler_id: entry.id,
                state,
                depth,
            };
            if !entry.handler.filter(&mutable, &ctx) {
                continue;
            }

            let (intent, error) = match entry.handler.handle(&mutable, &ctx) {
                Ok(intent) => (intent, None),
                Err(err) => {
                    warn!(
                        handler = %entry.id,
                        name = entry.handler.name(),
                        owner = %entry.owner,
                        kind = %kind,
                        error = %err,
                        "Pre-handler failed; treating as pass"
                    );
                    (Intent::Pass, Some(err.to_string()))
                }
            };

            if let Intent::Cancel { handler_id, .. } | Intent::Modify { handler_id, .. } = &intent {
                if *handler_id != entry.id {
                    debug!(
                        handler = %entry.id,
                        claimed = %handler_id,
                        intent = intent.label(),
                        "Intent names another handler; crediting the registered one"
                    );
                }
            }

            if detailed {
                handler_traces.push(HandlerTrace {
                    handler_id: entry.id,
                    name: entry.handler.name().to_string(),
                    owner: entry.owner,
                    intent: intent.clone(),
                    error,
                });
            }

            match intent {
                Intent::Pass => {}
                Intent::Cancel { reason, .. } => {
                    debug!(handler = %entry.id, %reason, kind = %kind, "Event cancelled");
                    mutable.cancel(entry.id, reason);
                    break;
                }
                Intent::Modify { modifications, .. } => {
                    for change in modifications {
                        mutable.push(Modification::from_change(
                            change,
                            entry.id,
                            entry.handler.name(),
                        ));
                    }
                }
            }
        }

        if self.trace_level != TraceLevel::Off {
            let mut record = TraceRecord::new(Phase::Pre, kind.to_string(), depth);
            record.handlers = handler_traces;
            record.original_values = mutable.original().numeric_fields();
            record.final_values = mutable.final_values();
            record.cancelled_by = mutable.cancelled_by();
            record.cancel_reason = mutable.cancel_reason().map(str::to_string);
            self.record(record);
        }
        mutable
    }

    /// Broadcast `event` to every actor in id order.
    ///
    /// Returns `false` if the depth bound prevented the broadcast.
    pub fn process_post_event(
        &mut self,
        event: &GameEvent,
        world: &mut WorldState,
        effects: &dyn EffectApplier,
    ) -> bool {
        let targets = world.actors.ids();
        self.broadcast(event, targets, world, effects)
    }

    /// Broadcast `event` only to the actors it names.
    pub fn process_post_event_related(
        &mut self,
        event: &GameEvent,
        world: &mut WorldState,
        effects: &dyn EffectApplier,
    ) -> bool {
        let targets = event
            .participants()
            .into_iter()
            .filter(|id| world.actors.contains(*id))
            .collect();
        self.broadcast(event, targets, world, effects)
    }

    fn broadcast(
        &mut self,
        event: &GameEvent,
        targets: Vec<ActorId>,
        world: &mut WorldState,
        effects: &dyn EffectApplier,
    ) -> bool {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            self.truncate(Phase::Post, event);
            return false;
        }
        let _guard = DepthGuard::enter(&self.depth);
        self.broadcasts += 1;
        debug!(kind = %event.kind(), depth, actors = targets.len(), "Broadcasting event");

        let mut reached = 0;
        for id in targets {
            let Some(emitted) = world.dispatch_to_actor(id, event) else {
                continue;
            };
            reached += 1;
            for follow_up in emitted {
                self.resolve_nested(follow_up, world, effects);
            }
        }

        let mut record = TraceRecord::new(Phase::Post, event.kind().to_string(), depth);
        record.actors_reached = reached;
        self.record(record);
        true
    }

    /// Resolve an event emitted during a broadcast.
    ///
    /// At the depth bound the event is dropped entirely rather than applied
    /// without its pre and post phases.
    fn resolve_nested(&mut self, event: GameEvent, world: &mut WorldState, effects: &dyn EffectApplier) {
        if self.depth.get() >= self.max_depth {
            self.truncate(Phase::Pre, &event);
            return;
        }
        self.resolve(event, world, effects, Broadcast::All);
    }

    /// Full pipeline: pre, cancelled check, apply, post.
    pub fn resolve(
        &mut self,
        event: GameEvent,
        world: &mut WorldState,
        effects: &dyn EffectApplier,
        broadcast: Broadcast,
    ) -> Resolution {
        let mutable = self.process_pre_event(event, &world.view());

        if mutable.is_cancelled() {
            world.log.push(EngineEvent::EventResolved {
                event: mutable.original().clone(),
                cancelled: true,
                cancelled_by: mutable.cancelled_by(),
            });
            return Resolution {
                event: mutable.original().clone(),
                cancelled: true,
                cancelled_by: mutable.cancelled_by(),
                cancel_reason: mutable.cancel_reason().map(str::to_string),
                modifications: mutable.modifications().to_vec(),
            };
        }

        let event = mutable.finalize();
        if let Err(err) = effects.apply(&event, &mut world.actors) {
            warn!(kind = %event.kind(), error = %err, "Failed to apply event effect");
        }
        world.log.push(EngineEvent::EventResolved {
            event: event.clone(),
            cancelled: false,
            cancelled_by: None,
        });

        match broadcast {
            Broadcast::All => self.process_post_event(&event, world, effects),
            Broadcast::Related => self.process_post_event_related(&event, world, effects),
        };

        Resolution {
            event,
            cancelled: false,
            cancelled_by: None,
            cancel_reason: None,
            modifications: mutable.modifications().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, FieldChange};
    use crate::error::HandlerError;
    use crate::ids::AbilityId;
    use std::cell::RefCell;

    struct Empty;

    impl StateProvider for Empty {
        fn ability_set(&self, _: ActorId) -> Option<&crate::ability::AbilitySet> {
            None
        }
        fn attributes(&self, _: ActorId) -> Option<&crate::attribute::AttributeSet> {
            None
        }
        fn tags(&self, _: ActorId) -> Option<&crate::tags::TagContainer> {
            None
        }
        fn now(&self) -> u64 {
            0
        }
    }

    fn processor() -> EventProcessor {
        EventProcessor::new(&EngineConfig::default().with_trace_level(TraceLevel::Detailed))
    }

    fn register(
        processor: &mut EventProcessor,
        name: &str,
        handle: impl FnMut(&MutableEvent, &PreHandlerContext<'_>) -> Result<Intent, HandlerError> + 'static,
    ) -> HandlerId {
        processor.registry_mut().register(
            ActorId(1),
            AbilityId(1),
            EventKind::Damage,
            Box::new(FnPreHandler::new(name, handle)),
        )
    }

    #[test]
    fn test_registration_order_decides_merge() {
        let mut processor = processor();
        register(&mut processor, "armor", |_, ctx| {
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::add("amount", -10.0)]))
        });
        register(&mut processor, "resist", |_, ctx| {
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::multiply("amount", 0.7)]))
        });

        let event = GameEvent::damage(ActorId(2), ActorId(1), 100.0);
        let result = processor.process_pre_event(event, &Empty);
        let amount = result.current_value("amount").unwrap();
        assert!((amount - 63.0).abs() < 1e-9);
        assert_eq!(result.modifications()[0].source_name, "armor");
        assert_eq!(processor.depth(), 0);
    }

    #[test]
    fn test_cancel_short_circuits() {
        let mut processor = processor();
        let called = Rc::new(Cell::new(false));
        let blocker = register(&mut processor, "block", |_, ctx| {
            Ok(Intent::cancel(ctx.handler_id, "blocked"))
        });
        let seen = Rc::clone(&called);
        register(&mut processor, "late", move |_, ctx| {
            seen.set(true);
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::set("amount", 999.0)]))
        });

        let result = processor.process_pre_event(GameEvent::damage(ActorId(2), ActorId(1), 5.0), &Empty);
        assert!(result.is_cancelled());
        assert_eq!(result.cancelled_by(), Some(blocker));
        assert!(!called.get());
        assert_eq!(result.final_values().get("amount"), Some(&5.0));
    }

    #[test]
    fn test_failing_handler_is_pass() {
        let mut processor = processor();
        register(&mut processor, "broken", |_, _| Err(HandlerError::failed("boom")));
        register(&mut processor, "double", |_, ctx| {
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::multiply("amount", 2.0)]))
        });

        let result = processor.process_pre_event(GameEvent::damage(ActorId(2), ActorId(1), 4.0), &Empty);
        assert_eq!(result.current_value("amount"), Some(8.0));

        let trace = &processor.traces()[0];
        assert_eq!(trace.handlers.len(), 2);
        assert_eq!(trace.handlers[0].error.as_deref(), Some("boom"));
        assert_eq!(trace.handlers[0].intent, Intent::Pass);
        assert_eq!(
            trace.handlers[1].intent,
            Intent::modify(trace.handlers[1].handler_id, vec![FieldChange::multiply("amount", 2.0)])
        );
    }

    #[test]
    fn test_changes_credited_to_registered_handler() {
        let mut processor = processor();
        let bogus = HandlerId(777);
        let halver = register(&mut processor, "halve", move |_, _| {
            Ok(Intent::modify(bogus, vec![FieldChange::multiply("amount", 0.5)]))
        });
        let blocker = register(&mut processor, "block", move |_, _| Ok(Intent::cancel(bogus, "blocked")));

        let result = processor.process_pre_event(GameEvent::damage(ActorId(2), ActorId(1), 10.0), &Empty);
        assert_eq!(result.modifications()[0].source_id, halver);
        assert_eq!(result.cancelled_by(), Some(blocker));
    }

    #[test]
    fn test_detailed_trace_keeps_returned_intents() {
        let mut processor = processor();
        register(&mut processor, "armor", |_, ctx| {
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::add("amount", -3.0)]))
        });
        let blocker = register(&mut processor, "ward", |_, ctx| Ok(Intent::cancel(ctx.handler_id, "warded")));

        processor.process_pre_event(GameEvent::damage(ActorId(2), ActorId(1), 10.0), &Empty);
        let trace = &processor.traces()[0];
        assert!(matches!(
            &trace.handlers[0].intent,
            Intent::Modify { modifications, .. } if modifications == &vec![FieldChange::add("amount", -3.0)]
        ));
        assert_eq!(trace.handlers[1].intent, Intent::cancel(blocker, "warded"));
        assert_eq!(trace.cancel_reason.as_deref(), Some("warded"));

        let json = trace.to_json().unwrap();
        assert!(json.contains("warded"));
    }

    #[test]
    fn test_other_kinds_ignored() {
        let mut processor = processor();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        register(&mut processor, "count", move |_, _| {
            *counter.borrow_mut() += 1;
            Ok(Intent::Pass)
        });
        processor.process_pre_event(GameEvent::heal(ActorId(1), ActorId(1), 1.0), &Empty);
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn test_depth_guard_fails_open() {
        let mut processor = EventProcessor::new(&EngineConfig::default().with_max_depth(1));
        register(&mut processor, "zero", |_, ctx| {
            Ok(Intent::modify(ctx.handler_id, vec![FieldChange::set("amount", 0.0)]))
        });

        let _outer = DepthGuard::enter(&processor.depth);
        let result = processor.process_pre_event(GameEvent::damage(ActorId(2), ActorId(1), 9.0), &Empty);
        assert_eq!(result.current_value("amount"), Some(9.0));
        assert_eq!(processor.truncations(), 1);
    }

    #[test]
    fn test_post_without_actors() {
        let mut processor = processor();
        let mut world = WorldState::new(&EngineConfig::default());
        let applied = processor.process_post_event(
            &GameEvent::heal(ActorId(1), ActorId(1), 1.0),
            &mut world,
            &crate::effects::StandardEffects::default(),
        );
        assert!(applied);
        assert_eq!(processor.broadcasts(), 1);
        assert_eq!(processor.traces()[0].actors_reached, 0);
    }
}

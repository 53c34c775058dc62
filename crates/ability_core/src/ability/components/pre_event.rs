use serde::{Deserialize, Serialize};

use super::super::component::{AbilityComponent, LifecycleContext};
use super::super::filter::EventFilter;
use crate::error::{EngineError, HandlerError, Result};
use crate::event::{EventKind, FieldChange, Intent, MutableEvent};
use crate::ids::HandlerId;
use crate::processor::{PreHandler, PreHandlerContext};

/// Registers a pre-phase handler while the ability is granted.
///
/// The handler moves into the processor's registry on apply and comes back
/// on remove, so the component can be granted again after a failed attach.
pub struct PreEventComponent {
    kind: EventKind,
    handler: Option<Box<dyn PreHandler>>,
    registered: Option<HandlerId>,
}

impl PreEventComponent {
    /// Intercept events of `kind` with `handler`.
    pub fn new(kind: EventKind, handler: impl PreHandler + 'static) -> Self {
        Self::boxed(kind, Box::new(handler))
    }

    /// Intercept events of `kind` with a boxed handler.
    #[must_use]
    pub fn boxed(kind: EventKind, handler: Box<dyn PreHandler>) -> Self {
        Self {
            kind,
            handler: Some(handler),
            registered: None,
        }
    }

    /// Registration id while granted.
    #[must_use]
    pub const fn handler_id(&self) -> Option<HandlerId> {
        self.registered
    }
}

impl std::fmt::Debug for PreEventComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreEventComponent")
            .field("kind", &self.kind)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

impl AbilityComponent for PreEventComponent {
    fn name(&self) -> &str {
        "pre_event"
    }

    fn on_apply(&mut self, ctx: &mut LifecycleContext<'_>) -> Result<()> {
        let handler = self.handler.take().ok_or_else(|| {
            EngineError::InvalidState(format!(
                "pre-handler of {} is already registered",
                ctx.ability_id
            ))
        })?;
        let id = ctx
            .handlers
            .register(ctx.owner, ctx.ability_id, self.kind.clone(), handler);
        self.registered = Some(id);
        Ok(())
    }

    fn on_remove(&mut self, ctx: &mut LifecycleContext<'_>) {
        if let Some(id) = self.registered.take() {
            self.handler = ctx.handlers.unregister(id);
        }
    }
}

/// Declarative pre-phase effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreEffect {
    /// Replace a field.
    Set {
        /// Field name.
        field: String,
        /// New value.
        value: f64,
    },
    /// Add to a field.
    Add {
        /// Field name.
        field: String,
        /// Amount.
        value: f64,
    },
    /// Multiply a field.
    Multiply {
        /// Field name.
        field: String,
        /// Factor.
        value: f64,
    },
    /// Cancel the event.
    Cancel {
        /// Reason recorded on the event.
        reason: String,
    },
}

/// [`PreHandler`] applying a [`PreEffect`] when its filter matches.
#[derive(Debug)]
pub struct EffectHandler {
    name: String,
    filter: EventFilter,
    effect: PreEffect,
}

impl EffectHandler {
    /// Apply `effect` to events passing `filter`.
    pub fn new(name: impl Into<String>, filter: EventFilter, effect: PreEffect) -> Self {
        Self {
            name: name.into(),
            filter,
            effect,
        }
    }
}

impl PreHandler for EffectHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn filter(&self, event: &MutableEvent, ctx: &PreHandlerContext<'_>) -> bool {
        self.filter
            .matches(event.original(), ctx.owner, ctx.state.tags(ctx.owner))
    }

    fn handle(
        &mut self,
        event: &MutableEvent,
        ctx: &PreHandlerContext<'_>,
    ) -> std::result::Result<Intent, HandlerError> {
        let change = match &self.effect {
            PreEffect::Cancel { reason } => return Ok(Intent::cancel(ctx.handler_id, reason.clone())),
            PreEffect::Set { field, value } => FieldChange::set(field.clone(), *value),
            PreEffect::Add { field, value } => FieldChange::add(field.clone(), *value),
            PreEffect::Multiply { field, value } => FieldChange::multiply(field.clone(), *value),
        };
        if change.op != crate::event::ModOp::Set && event.current_value(&change.field).is_none() {
            return Err(HandlerError::failed(format!(
                "event {} has no field '{}'",
                event.original().kind(),
                change.field
            )));
        }
        Ok(Intent::modify(ctx.handler_id, vec![change]))
    }
}

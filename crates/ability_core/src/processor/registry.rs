//! Pre-phase handler trait and registry.

use std::fmt;

use crate::actor::StateProvider;
use crate::error::HandlerError;
use crate::event::{EventKind, Intent, MutableEvent};
use crate::ids::{AbilityId, ActorId, HandlerId};

/// What a pre-handler can see besides the event.
pub struct PreHandlerContext<'a> {
    /// Actor owning the ability that registered the handler.
    pub owner: ActorId,
    /// Registering ability.
    pub ability_id: AbilityId,
    /// This handler's registration id. Use it when building intents.
    pub handler_id: HandlerId,
    /// Read access to every actor.
    pub state: &'a dyn StateProvider,
    /// Processor depth at the time of the call.
    pub depth: usize,
}

/// Pre-phase interceptor.
///
/// Handlers inspect the in-flight event and answer with an [`Intent`]; they
/// never mutate the event directly.
pub trait PreHandler {
    /// Name recorded on modifications and in traces.
    fn name(&self) -> &str;

    /// Cheap pre-check; returning `false` skips the handler.
    fn filter(&self, _event: &MutableEvent, _ctx: &PreHandlerContext<'_>) -> bool {
        true
    }

    /// Produce an intent for `event`.
    fn handle(
        &mut self,
        event: &MutableEvent,
        ctx: &PreHandlerContext<'_>,
    ) -> Result<Intent, HandlerError>;
}

type HandlerFn = dyn FnMut(&MutableEvent, &PreHandlerContext<'_>) -> Result<Intent, HandlerError>;

/// Closure-backed [`PreHandler`].
pub struct FnPreHandler {
    name: String,
    handle: Box<HandlerFn>,
}

impl FnPreHandler {
    /// Wrap a closure.
    pub fn new(
        name: impl Into<String>,
        handle: impl FnMut(&MutableEvent, &PreHandlerContext<'_>) -> Result<Intent, HandlerError> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            handle: Box::new(handle),
        }
    }
}

impl fmt::Debug for FnPreHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPreHandler").field("name", &self.name).finish()
    }
}

impl PreHandler for FnPreHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(
        &mut self,
        event: &MutableEvent,
        ctx: &PreHandlerContext<'_>,
    ) -> Result<Intent, HandlerError> {
        (self.handle)(event, ctx)
    }
}

/// A registered handler and its ownership.
pub(crate) struct Registration {
    pub(crate) id: HandlerId,
    pub(crate) owner: ActorId,
    pub(crate) ability_id: AbilityId,
    pub(crate) kind: EventKind,
    pub(crate) handler: Box<dyn PreHandler>,
}

/// Pre-handlers in registration order.
///
/// Append and remove only; never touched while a pre phase iterates it.
pub struct PreHandlerRegistry {
    entries: Vec<Registration>,
    next_id: u64,
}

impl PreHandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register `handler` for `kind`. Later registrations run later.
    pub fn register(
        &mut self,
        owner: ActorId,
        ability_id: AbilityId,
        kind: EventKind,
        handler: Box<dyn PreHandler>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        tracing::debug!(
            handler = %id,
            name = handler.name(),
            owner = %owner,
            kind = %kind,
            "Registered pre-handler"
        );
        self.entries.push(Registration {
            id,
            owner,
            ability_id,
            kind,
            handler,
        });
        id
    }

    /// Remove a handler and hand it back.
    pub fn unregister(&mut self, id: HandlerId) -> Option<Box<dyn PreHandler>> {
        let position = self.entries.iter().position(|r| r.id == id)?;
        Some(self.entries.remove(position).handler)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: HandlerId) -> bool {
        self.entries.iter().any(|r| r.id == id)
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handlers owned by `owner`.
    #[must_use]
    pub fn owned_by(&self, owner: ActorId) -> Vec<HandlerId> {
        self.entries
            .iter()
            .filter(|r| r.owner == owner)
            .map(|r| r.id)
            .collect()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut Registration> {
        self.entries.iter_mut()
    }
}

impl Default for PreHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PreHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|r| (r.id, r.handler.name(), &r.kind)))
            .finish()
    }
}

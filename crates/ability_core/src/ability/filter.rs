//! Predicates deciding whether a trigger reacts to an event.

use std::fmt;

use crate::event::GameEvent;
use crate::ids::ActorId;
use crate::tags::TagContainer;

type FilterFn = dyn Fn(&GameEvent, ActorId) -> bool;

/// Event predicate evaluated relative to the ability's owner.
#[derive(Default)]
pub enum EventFilter {
    /// Every event of the registered kinds.
    #[default]
    Any,
    /// Events whose target is the owner.
    OwnerIsTarget,
    /// Events whose source is the owner.
    OwnerIsSource,
    /// Only while the owner carries the tag.
    OwnerHasTag(String),
    /// Arbitrary predicate.
    Custom(Box<FilterFn>),
}

impl EventFilter {
    /// Closure-backed filter.
    pub fn custom(predicate: impl Fn(&GameEvent, ActorId) -> bool + 'static) -> Self {
        Self::Custom(Box::new(predicate))
    }

    /// Evaluate. `owner_tags` is `None` when the owner's tags are unknown,
    /// which fails `OwnerHasTag`.
    #[must_use]
    pub fn matches(&self, event: &GameEvent, owner: ActorId, owner_tags: Option<&TagContainer>) -> bool {
        match self {
            Self::Any => true,
            Self::OwnerIsTarget => event.target_id() == Some(owner),
            Self::OwnerIsSource => event.source_id() == Some(owner),
            Self::OwnerHasTag(tag) => owner_tags.is_some_and(|tags| tags.has_tag(tag)),
            Self::Custom(predicate) => predicate(event, owner),
        }
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::OwnerIsTarget => f.write_str("OwnerIsTarget"),
            Self::OwnerIsSource => f.write_str("OwnerIsSource"),
            Self::OwnerHasTag(tag) => f.debug_tuple("OwnerHasTag").field(tag).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

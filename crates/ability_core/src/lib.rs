//! # Ability Core
//!
//! Deterministic gameplay ability and event resolution engine.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No wall-clock time (a logical clock is advanced explicitly)
//! - No system randomness
//! - No threads; every call runs to completion before returning
//!
//! This separation enables:
//! - Replays that reproduce the exact event sequence
//! - Headless simulation and content validation
//! - Determinism testing via [`world::World::state_hash`]
//!
//! ## Crate Structure
//!
//! - [`attribute`] - Layered attribute/modifier calculator
//! - [`tags`] - Tag stacks from loose, timed and component sources
//! - [`ability`] - Abilities, components, actions, conditions and costs
//! - [`event`] - Game events and the pre-phase mutation model
//! - [`processor`] - Two-phase (pre/post) event resolution
//! - [`world`] - Simulation root owning actors, clock and ids
//! - [`data`] - RON-driven ability and actor content

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ability;
pub mod actor;
pub mod attribute;
pub mod config;
pub mod data;
pub mod effects;
pub mod error;
pub mod event;
pub mod ids;
pub mod observer;
pub mod processor;
pub mod record;
pub mod tags;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ability::components::{
        ActiveUseComponent, DurationComponent, GameEventComponent, PreEventComponent,
        StatModifierComponent, TagComponent,
    };
    pub use crate::ability::{
        Ability, AbilityComponent, Action, Condition, Cost, EventFilter, FnAction, FnCondition,
        Recipient,
    };
    pub use crate::actor::{Actor, ActorRegistry, StateProvider};
    pub use crate::attribute::{AttributeDef, AttributeSet, ModifierLayer, ModifierSpec};
    pub use crate::config::EngineConfig;
    pub use crate::data::{AbilityData, AbilityRegistry, ActorTemplate};
    pub use crate::error::{ConfigError, EngineError, HandlerError, Result};
    pub use crate::event::{EventKind, FieldChange, GameEvent, Intent, MutableEvent};
    pub use crate::ids::{AbilityId, ActorId, ExecutionId, HandlerId, IdGenerator};
    pub use crate::processor::{
        Broadcast, EventProcessor, FnPreHandler, PreHandler, PreHandlerContext, Resolution,
        TraceLevel,
    };
    pub use crate::record::{EngineEvent, EventLog, RevokeReason};
    pub use crate::tags::{TagContainer, TagMap};
    pub use crate::world::{World, WorldSnapshot};
}

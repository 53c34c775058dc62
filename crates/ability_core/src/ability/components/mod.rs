//! Built-in ability components.

mod active_use;
mod duration;
mod game_event;
mod modifier;
mod pre_event;
mod tags;

pub use active_use::ActiveUseComponent;
pub use duration::DurationComponent;
pub use game_event::GameEventComponent;
pub use modifier::StatModifierComponent;
pub use pre_event::{EffectHandler, PreEffect, PreEventComponent};
pub use tags::TagComponent;

//! Layered attribute calculator.
//!
//! An [`AttributeSet`] stores a base value per named attribute plus the
//! modifiers attached to it, and derives the current value on every read
//! using a fixed four-layer formula. See [`ModifierLayer`] for the formula.

mod modifier;
mod set;

pub use modifier::{Modifier, ModifierLayer, ModifierSpec, ModifierTarget};
pub use set::{
    AttributeBreakdown, AttributeChange, AttributeDef, AttributeKey, AttributeSet,
    AttributeSetSnapshot, AttributeSnapshot, ModifierWriter,
};

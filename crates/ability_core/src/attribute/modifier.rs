//! Modifiers and the write capability used to attach them.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::ModifierId;

/// Calculation layer a modifier contributes to.
///
/// ```text
/// body    = (base + Σ AddBase) × Π(1 + MulBase)
/// current = clamp((body + Σ AddFinal) × Π(1 + MulFinal), min, max)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModifierLayer {
    /// Added to the base before base multipliers.
    AddBase,
    /// Multiplies the base sum by `1 + value`.
    MulBase,
    /// Added after base multipliers.
    AddFinal,
    /// Multiplies the final sum by `1 + value`.
    MulFinal,
}

impl ModifierLayer {
    /// Short lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddBase => "add_base",
            Self::MulBase => "mul_base",
            Self::AddFinal => "add_final",
            Self::MulFinal => "mul_final",
        }
    }
}

/// Definition of a modifier before it is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierSpec {
    /// Target layer.
    pub layer: ModifierLayer,
    /// Amount (a fraction for the multiplicative layers: `0.5` is +50%).
    pub value: f64,
    /// Optional source label used for bulk removal.
    #[serde(default)]
    pub source: Option<String>,
}

impl ModifierSpec {
    /// Unsourced modifier.
    #[must_use]
    pub const fn new(layer: ModifierLayer, value: f64) -> Self {
        Self {
            layer,
            value,
            source: None,
        }
    }

    /// Builder method to tag the modifier with a source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A modifier attached to one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Id unique within the owning attribute set.
    pub id: ModifierId,
    /// Target layer.
    pub layer: ModifierLayer,
    /// Amount.
    pub value: f64,
    /// Source label, if any.
    pub source: Option<String>,
}

impl Modifier {
    pub(crate) fn from_spec(id: ModifierId, spec: ModifierSpec) -> Self {
        Self {
            id,
            layer: spec.layer,
            value: spec.value,
            source: spec.source,
        }
    }
}

/// Narrow write capability over an attribute store.
///
/// Ability components receive this instead of the full attribute set; it is
/// the only way modifiers get created or destroyed.
pub trait ModifierTarget {
    /// Attach a modifier to `attribute` and return its id.
    fn add_modifier(&mut self, attribute: &str, spec: ModifierSpec) -> Result<ModifierId>;

    /// Detach one modifier by id. Returns `false` if it was not attached.
    fn remove_modifier(&mut self, id: ModifierId) -> bool;

    /// Detach every modifier carrying `source`. Returns how many were removed.
    fn remove_modifiers_by_source(&mut self, source: &str) -> usize;

    /// Modifiers attached to `attribute`, in insertion order.
    fn modifiers(&self, attribute: &str) -> Result<Vec<Modifier>>;

    /// Whether a modifier with this id is attached anywhere in the set.
    fn has_modifier(&self, id: ModifierId) -> bool;
}

//! Game events and the pre-phase mutation model.
//!
//! A [`GameEvent`] is immutable once built. Pre-phase handlers never touch
//! it directly; they return an [`Intent`], and the processor accumulates
//! the resulting [`Modification`]s on a [`MutableEvent`] that can report
//! the resolved value of every field along with where it came from.

mod mutable;

use std::collections::BTreeMap;
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::ids::{AbilityId, ActorId};

pub use mutable::{FieldChange, Intent, ModOp, Modification, MutableEvent};

/// Discriminator of a [`GameEvent`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// [`AbilityActivateEvent`].
    AbilityActivate,
    /// [`DamageEvent`].
    Damage,
    /// [`HealEvent`].
    Heal,
    /// [`CustomEvent`] with the given kind name.
    Custom(String),
}

impl EventKind {
    /// Names of the built-in families. Custom events may not use them.
    pub const RESERVED: [&'static str; 3] = ["ability_activate", "damage", "heal"];

    /// Whether `name` belongs to a built-in family.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        Self::RESERVED.contains(&name)
    }

    /// Custom kind by name.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Name used in logs and trace output.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::AbilityActivate => "ability_activate",
            Self::Damage => "damage",
            Self::Heal => "heal",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical request to use a gated ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityActivateEvent {
    /// Ability instance to activate.
    pub ability_id: AbilityId,
    /// Actor that requests the activation.
    pub source_id: ActorId,
}

/// One actor damaging another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Attacker.
    pub source_id: ActorId,
    /// Defender.
    pub target_id: ActorId,
    /// Damage amount; field name `"amount"`.
    pub amount: f64,
    /// Free-form damage category.
    #[serde(default)]
    pub damage_type: String,
}

/// One actor restoring another's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealEvent {
    /// Healer.
    pub source_id: ActorId,
    /// Recipient.
    pub target_id: ActorId,
    /// Heal amount; field name `"amount"`.
    pub amount: f64,
}

/// Extension event with a caller-defined kind and numeric payload.
///
/// The kind never names a built-in family; construction and
/// deserialization both reject [`EventKind::RESERVED`] names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    #[serde(deserialize_with = "deserialize_custom_kind")]
    kind: String,
    /// Originating actor, if any.
    #[serde(default)]
    pub source_id: Option<ActorId>,
    /// Affected actor, if any.
    #[serde(default)]
    pub target_id: Option<ActorId>,
    /// Numeric payload.
    #[serde(default)]
    pub fields: BTreeMap<String, f64>,
}

fn deserialize_custom_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let kind = String::deserialize(deserializer)?;
    if EventKind::is_reserved(&kind) {
        return Err(de::Error::custom(ConfigError::ReservedEventKind(kind)));
    }
    Ok(kind)
}

impl CustomEvent {
    /// Event with no participants and no fields.
    pub fn new(kind: impl Into<String>) -> Result<Self, ConfigError> {
        let kind = kind.into();
        if EventKind::is_reserved(&kind) {
            return Err(ConfigError::ReservedEventKind(kind));
        }
        Ok(Self {
            kind,
            source_id: None,
            target_id: None,
            fields: BTreeMap::new(),
        })
    }

    /// Kind name.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Builder method to set the source actor.
    #[must_use]
    pub const fn with_source(mut self, source: ActorId) -> Self {
        self.source_id = Some(source);
        self
    }

    /// Builder method to set the target actor.
    #[must_use]
    pub const fn with_target(mut self, target: ActorId) -> Self {
        self.target_id = Some(target);
        self
    }

    /// Builder method to set a numeric field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Closed set of event families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// Gated ability activation request.
    AbilityActivate(AbilityActivateEvent),
    /// Damage.
    Damage(DamageEvent),
    /// Heal.
    Heal(HealEvent),
    /// Extension point.
    Custom(CustomEvent),
}

impl GameEvent {
    /// Activation request for `ability_id` on behalf of `source_id`.
    #[must_use]
    pub const fn activate(ability_id: AbilityId, source_id: ActorId) -> Self {
        Self::AbilityActivate(AbilityActivateEvent {
            ability_id,
            source_id,
        })
    }

    /// Untyped damage.
    #[must_use]
    pub const fn damage(source_id: ActorId, target_id: ActorId, amount: f64) -> Self {
        Self::Damage(DamageEvent {
            source_id,
            target_id,
            amount,
            damage_type: String::new(),
        })
    }

    /// Heal.
    #[must_use]
    pub const fn heal(source_id: ActorId, target_id: ActorId, amount: f64) -> Self {
        Self::Heal(HealEvent {
            source_id,
            target_id,
            amount,
        })
    }

    /// Discriminator.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AbilityActivate(_) => EventKind::AbilityActivate,
            Self::Damage(_) => EventKind::Damage,
            Self::Heal(_) => EventKind::Heal,
            Self::Custom(event) => EventKind::Custom(event.kind.clone()),
        }
    }

    /// Whether this event has the given kind.
    #[must_use]
    pub fn is(&self, kind: &EventKind) -> bool {
        match (self, kind) {
            (Self::AbilityActivate(_), EventKind::AbilityActivate)
            | (Self::Damage(_), EventKind::Damage)
            | (Self::Heal(_), EventKind::Heal) => true,
            (Self::Custom(event), EventKind::Custom(name)) => event.kind == *name,
            _ => false,
        }
    }

    /// Originating actor.
    #[must_use]
    pub const fn source_id(&self) -> Option<ActorId> {
        match self {
            Self::AbilityActivate(e) => Some(e.source_id),
            Self::Damage(e) => Some(e.source_id),
            Self::Heal(e) => Some(e.source_id),
            Self::Custom(e) => e.source_id,
        }
    }

    /// Affected actor.
    #[must_use]
    pub const fn target_id(&self) -> Option<ActorId> {
        match self {
            Self::AbilityActivate(_) => None,
            Self::Damage(e) => Some(e.target_id),
            Self::Heal(e) => Some(e.target_id),
            Self::Custom(e) => e.target_id,
        }
    }

    /// Actor ids referenced by the event, deduplicated, source first.
    #[must_use]
    pub fn participants(&self) -> Vec<ActorId> {
        let mut ids = Vec::with_capacity(2);
        for id in [self.source_id(), self.target_id()].into_iter().flatten() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Value of a numeric field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<f64> {
        match (self, name) {
            (Self::Damage(e), "amount") => Some(e.amount),
            (Self::Heal(e), "amount") => Some(e.amount),
            (Self::Custom(e), _) => e.fields.get(name).copied(),
            _ => None,
        }
    }

    /// Every numeric field by name.
    #[must_use]
    pub fn numeric_fields(&self) -> BTreeMap<String, f64> {
        match self {
            Self::AbilityActivate(_) => BTreeMap::new(),
            Self::Damage(e) => BTreeMap::from([("amount".to_string(), e.amount)]),
            Self::Heal(e) => BTreeMap::from([("amount".to_string(), e.amount)]),
            Self::Custom(e) => e.fields.clone(),
        }
    }

    /// Copy with one numeric field replaced.
    ///
    /// Custom events accept new fields; unknown fields on the fixed event
    /// families are ignored.
    #[must_use]
    pub fn with_field(&self, name: &str, value: f64) -> Self {
        let mut event = self.clone();
        match (&mut event, name) {
            (Self::Damage(e), "amount") => e.amount = value,
            (Self::Heal(e), "amount") => e.amount = value,
            (Self::Custom(e), _) => {
                e.fields.insert(name.to_string(), value);
            }
            _ => {}
        }
        event
    }
}

impl From<CustomEvent> for GameEvent {
    fn from(event: CustomEvent) -> Self {
        Self::Custom(event)
    }
}

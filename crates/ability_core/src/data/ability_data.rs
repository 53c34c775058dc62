//! Ability definitions for data-driven abilities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ability::components::{
    ActiveUseComponent, DurationComponent, EffectHandler, GameEventComponent, PreEffect,
    PreEventComponent, StatModifierComponent, TagComponent,
};
use crate::ability::{
    Ability, AbilityComponent, Action, AddLooseTag, AddTimedTag, AttributeAtLeast, AttributeCost,
    Condition, CooldownCost, Cost, EmitCustom, EmitDamage, EmitHeal, EventFilter, HasTag, LacksTag,
    ModifyAttribute, Recipient, RemoveLooseTag, TagStackCost,
};
use crate::attribute::{ModifierLayer, ModifierSpec};
use crate::error::ConfigError;
use crate::event::EventKind;
use crate::tags::TagMap;

/// Data-driven ability definition.
///
/// Components are applied in list order when the ability is granted.
///
/// # Example RON
///
/// ```ron
/// AbilityData(
///     id: "fireball",
///     description: "Spend mana to burn the caster's target.",
///     components: [
///         ActiveUse(
///             timeline_id: "cast_fireball",
///             duration_ms: 800,
///             costs: [Attribute(attribute: "mana", amount: 30.0), Cooldown(tag: "cd.fireball", duration_ms: 5000)],
///             actions: [EmitDamage(to: Owner, amount: 40.0, damage_type: "fire")],
///         ),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityData {
    /// Unique template id.
    pub id: String,

    /// Free-form description for tooling.
    #[serde(default)]
    pub description: String,

    /// Components in application order.
    pub components: Vec<ComponentData>,
}

/// One component of an [`AbilityData`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ComponentData {
    /// Component-keyed tags held while granted.
    Tags {
        /// Tag stacks.
        tags: TagMap,
    },
    /// Expires the ability after a fixed time.
    Duration {
        /// Lifetime.
        duration_ms: u64,
    },
    /// Attribute modifiers held while granted.
    StatModifiers {
        /// Modifiers in attach order.
        modifiers: Vec<ModifierData>,
    },
    /// Reacts to broadcast events.
    GameEvent {
        /// Event kind names.
        kinds: Vec<String>,
        /// Owner-relative filter.
        #[serde(default)]
        filter: FilterData,
        /// Actions run on each match.
        actions: Vec<ActionData>,
    },
    /// Gated activation.
    ActiveUse {
        /// Presentation timeline id.
        timeline_id: String,
        /// Execution length.
        #[serde(default)]
        duration_ms: u64,
        /// Checks that must pass.
        #[serde(default)]
        conditions: Vec<ConditionData>,
        /// Costs checked then paid.
        #[serde(default)]
        costs: Vec<CostData>,
        /// Actions run on activation.
        #[serde(default)]
        actions: Vec<ActionData>,
    },
    /// Intercepts events in the pre phase.
    PreEvent {
        /// Event kind name.
        kind: String,
        /// Handler name used in traces. Defaults to the ability id.
        #[serde(default)]
        name: Option<String>,
        /// Owner-relative filter.
        #[serde(default)]
        filter: FilterData,
        /// Effect on matching events.
        effect: PreEffect,
    },
}

/// One modifier of a [`ComponentData::StatModifiers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierData {
    /// Target attribute.
    pub attribute: String,
    /// Formula layer.
    pub layer: ModifierLayer,
    /// Amount.
    pub value: f64,
}

/// Serializable subset of [`EventFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterData {
    /// Every event.
    #[default]
    Any,
    /// Owner is the target.
    OwnerIsTarget,
    /// Owner is the source.
    OwnerIsSource,
    /// Owner carries the tag.
    OwnerHasTag(String),
}

/// Serializable action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionData {
    /// See [`ModifyAttribute`].
    ModifyAttribute {
        /// Attribute name.
        attribute: String,
        /// Base delta.
        delta: f64,
    },
    /// See [`AddLooseTag`].
    AddLooseTag {
        /// Tag name.
        tag: String,
        /// Stacks added.
        #[serde(default = "one")]
        stacks: u32,
    },
    /// See [`RemoveLooseTag`].
    RemoveLooseTag {
        /// Tag name.
        tag: String,
        /// Stacks removed.
        #[serde(default = "one")]
        stacks: u32,
    },
    /// See [`AddTimedTag`].
    AddTimedTag {
        /// Tag name.
        tag: String,
        /// Layer lifetime.
        duration_ms: u64,
    },
    /// See [`EmitDamage`].
    EmitDamage {
        /// Recipient.
        to: Recipient,
        /// Amount.
        amount: f64,
        /// Damage category.
        #[serde(default)]
        damage_type: String,
    },
    /// See [`EmitHeal`].
    EmitHeal {
        /// Recipient.
        to: Recipient,
        /// Amount.
        amount: f64,
    },
    /// See [`EmitCustom`].
    EmitCustom {
        /// Kind name.
        kind: String,
        /// Optional recipient.
        #[serde(default)]
        to: Option<Recipient>,
        /// Numeric payload.
        #[serde(default)]
        fields: BTreeMap<String, f64>,
    },
}

/// Serializable condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionData {
    /// See [`HasTag`].
    HasTag(String),
    /// See [`LacksTag`].
    LacksTag(String),
    /// See [`AttributeAtLeast`].
    AttributeAtLeast {
        /// Attribute name.
        attribute: String,
        /// Threshold.
        value: f64,
    },
}

/// Serializable cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CostData {
    /// See [`CooldownCost`].
    Cooldown {
        /// Cooldown tag.
        tag: String,
        /// Length.
        duration_ms: u64,
    },
    /// See [`AttributeCost`].
    Attribute {
        /// Attribute name.
        attribute: String,
        /// Amount consumed.
        amount: f64,
    },
    /// See [`TagStackCost`].
    TagStacks {
        /// Tag name.
        tag: String,
        /// Stacks consumed.
        stacks: u32,
    },
}

const fn one() -> u32 {
    1
}

/// Parse an event kind name. Unknown names are custom kinds.
#[must_use]
pub fn parse_event_kind(name: &str) -> EventKind {
    match name {
        "ability_activate" => EventKind::AbilityActivate,
        "damage" => EventKind::Damage,
        "heal" => EventKind::Heal,
        other => EventKind::custom(other),
    }
}

impl AbilityData {
    /// Check the definition for content bugs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::InvalidComponent {
                ability: String::new(),
                index: 0,
                message: "ability id must not be empty".to_string(),
            });
        }
        for (index, component) in self.components.iter().enumerate() {
            component.validate().map_err(|message| ConfigError::InvalidComponent {
                ability: self.id.clone(),
                index,
                message,
            })?;
        }
        Ok(())
    }

    /// Build an unattached [`Ability`].
    pub fn build(&self) -> Result<Ability, ConfigError> {
        self.validate()?;
        let mut ability = Ability::new(self.id.clone());
        for component in &self.components {
            ability.push_component(component.build(&self.id));
        }
        Ok(ability)
    }
}

impl ComponentData {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Tags { tags } => {
                if tags.is_empty() {
                    return Err("tag component has no tags".to_string());
                }
                if let Some((tag, _)) = tags.iter().find(|&(_, &stacks)| stacks == 0) {
                    return Err(format!("tag '{tag}' has zero stacks"));
                }
            }
            Self::Duration { duration_ms } => {
                if *duration_ms == 0 {
                    return Err("duration must be positive".to_string());
                }
            }
            Self::StatModifiers { modifiers } => {
                if let Some(m) = modifiers.iter().find(|m| !m.value.is_finite()) {
                    return Err(format!("modifier on '{}' is not finite", m.attribute));
                }
            }
            Self::GameEvent { kinds, actions, .. } => {
                if kinds.is_empty() {
                    return Err("game event trigger lists no event kinds".to_string());
                }
                validate_actions(actions)?;
            }
            Self::ActiveUse {
                timeline_id,
                costs,
                actions,
                ..
            } => {
                if timeline_id.is_empty() {
                    return Err("timeline_id must not be empty".to_string());
                }
                for cost in costs {
                    if let CostData::Cooldown { tag, duration_ms: 0 } = cost {
                        return Err(format!("cooldown '{tag}' has zero duration"));
                    }
                }
                validate_actions(actions)?;
            }
            Self::PreEvent { kind, effect, .. } => {
                if kind.is_empty() {
                    return Err("pre-event kind must not be empty".to_string());
                }
                let value = match effect {
                    PreEffect::Set { value, .. }
                    | PreEffect::Add { value, .. }
                    | PreEffect::Multiply { value, .. } => *value,
                    PreEffect::Cancel { .. } => 0.0,
                };
                if !value.is_finite() {
                    return Err("pre-event effect value is not finite".to_string());
                }
            }
        }
        Ok(())
    }

    fn build(&self, ability_id: &str) -> Box<dyn AbilityComponent> {
        match self {
            Self::Tags { tags } => Box::new(TagComponent::new(tags.clone())),
            Self::Duration { duration_ms } => Box::new(DurationComponent::new(*duration_ms)),
            Self::StatModifiers { modifiers } => Box::new(modifiers.iter().fold(
                StatModifierComponent::new(),
                |component, m| {
                    component.with_modifier(m.attribute.clone(), ModifierSpec::new(m.layer, m.value))
                },
            )),
            Self::GameEvent {
                kinds,
                filter,
                actions,
            } => {
                let kinds = kinds.iter().map(|k| parse_event_kind(k)).collect();
                let mut component = GameEventComponent::new(kinds, filter.build());
                for action in actions {
                    component.push_action(action.build());
                }
                Box::new(component)
            }
            Self::ActiveUse {
                timeline_id,
                duration_ms,
                conditions,
                costs,
                actions,
            } => {
                let mut component = ActiveUseComponent::new(timeline_id.clone(), *duration_ms);
                for condition in conditions {
                    component.push_condition(condition.build());
                }
                for cost in costs {
                    component.push_cost(cost.build());
                }
                for action in actions {
                    component.push_action(action.build());
                }
                Box::new(component)
            }
            Self::PreEvent {
                kind,
                name,
                filter,
                effect,
            } => {
                let name = name.clone().unwrap_or_else(|| ability_id.to_string());
                Box::new(PreEventComponent::new(
                    parse_event_kind(kind),
                    EffectHandler::new(name, filter.build(), effect.clone()),
                ))
            }
        }
    }
}

fn validate_actions(actions: &[ActionData]) -> Result<(), String> {
    for action in actions {
        match action {
            ActionData::EmitDamage { amount, .. } | ActionData::EmitHeal { amount, .. }
                if !amount.is_finite() =>
            {
                return Err("emitted amount is not finite".to_string());
            }
            ActionData::EmitCustom { kind, .. } if kind.is_empty() => {
                return Err("custom event kind must not be empty".to_string());
            }
            ActionData::EmitCustom { kind, .. } if EventKind::is_reserved(kind) => {
                return Err(format!("custom event kind '{kind}' is reserved"));
            }
            ActionData::AddTimedTag { tag, duration_ms: 0 } => {
                return Err(format!("timed tag '{tag}' has zero duration"));
            }
            _ => {}
        }
    }
    Ok(())
}

impl FilterData {
    fn build(&self) -> EventFilter {
        match self {
            Self::Any => EventFilter::Any,
            Self::OwnerIsTarget => EventFilter::OwnerIsTarget,
            Self::OwnerIsSource => EventFilter::OwnerIsSource,
            Self::OwnerHasTag(tag) => EventFilter::OwnerHasTag(tag.clone()),
        }
    }
}

impl ActionData {
    fn build(&self) -> Box<dyn Action> {
        match self.clone() {
            Self::ModifyAttribute { attribute, delta } => Box::new(ModifyAttribute { attribute, delta }),
            Self::AddLooseTag { tag, stacks } => Box::new(AddLooseTag { tag, stacks }),
            Self::RemoveLooseTag { tag, stacks } => Box::new(RemoveLooseTag { tag, stacks }),
            Self::AddTimedTag { tag, duration_ms } => Box::new(AddTimedTag { tag, duration_ms }),
            Self::EmitDamage {
                to,
                amount,
                damage_type,
            } => Box::new(EmitDamage {
                to,
                amount,
                damage_type,
            }),
            Self::EmitHeal { to, amount } => Box::new(EmitHeal { to, amount }),
            Self::EmitCustom { kind, to, fields } => Box::new(EmitCustom { kind, to, fields }),
        }
    }
}

impl ConditionData {
    fn build(&self) -> Box<dyn Condition> {
        match self.clone() {
            Self::HasTag(tag) => Box::new(HasTag { tag }),
            Self::LacksTag(tag) => Box::new(LacksTag { tag }),
            Self::AttributeAtLeast { attribute, value } => Box::new(AttributeAtLeast { attribute, value }),
        }
    }
}

impl CostData {
    fn build(&self) -> Box<dyn Cost> {
        match self.clone() {
            Self::Cooldown { tag, duration_ms } => Box::new(CooldownCost { tag, duration_ms }),
            Self::Attribute { attribute, amount } => Box::new(AttributeCost { attribute, amount }),
            Self::TagStacks { tag, stacks } => Box::new(TagStackCost { tag, stacks }),
        }
    }
}

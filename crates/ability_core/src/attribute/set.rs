//! Attribute storage and the derived-value formula.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::modifier::{Modifier, ModifierLayer, ModifierSpec, ModifierTarget};
use crate::error::{ConfigError, EngineError, Result};
use crate::ids::ModifierId;
use crate::observer::{Observers, Subscription};

/// Static definition of one attribute.
///
/// # Example RON
///
/// ```ron
/// AttributeDef(name: "hp", base: 100.0, min: Some(0.0), max: None)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Unique name within the owning set.
    pub name: String,
    /// Initial base value.
    pub base: f64,
    /// Lower clamp bound.
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper clamp bound.
    #[serde(default)]
    pub max: Option<f64>,
}

impl AttributeDef {
    /// Unbounded attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, base: f64) -> Self {
        Self {
            name: name.into(),
            base,
            min: None,
            max: None,
        }
    }

    /// Builder method to set clamp bounds.
    #[must_use]
    pub const fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }
}

/// Current value change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// Attribute name.
    pub attribute: String,
    /// Current value before the change.
    pub old_value: f64,
    /// Current value after the change.
    pub new_value: f64,
}

/// Every intermediate value of the formula, for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeBreakdown {
    /// Stored base.
    pub base: f64,
    /// Σ AddBase.
    pub add_base_sum: f64,
    /// Π(1 + MulBase).
    pub mul_base_product: f64,
    /// `(base + add_base_sum) × mul_base_product`.
    pub body_value: f64,
    /// Σ AddFinal.
    pub add_final_sum: f64,
    /// Π(1 + MulFinal).
    pub mul_final_product: f64,
    /// Value before clamping.
    pub unclamped: f64,
    /// Clamped current value.
    pub current: f64,
}

/// Index of an attribute resolved once by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey(usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Attribute {
    name: String,
    base: f64,
    min: Option<f64>,
    max: Option<f64>,
    modifiers: Vec<Modifier>,
}

impl Attribute {
    fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }

    fn breakdown(&self) -> AttributeBreakdown {
        let mut add_base_sum = 0.0;
        let mut mul_base_product = 1.0;
        let mut add_final_sum = 0.0;
        let mut mul_final_product = 1.0;

        for modifier in &self.modifiers {
            match modifier.layer {
                ModifierLayer::AddBase => add_base_sum += modifier.value,
                ModifierLayer::MulBase => mul_base_product *= 1.0 + modifier.value,
                ModifierLayer::AddFinal => add_final_sum += modifier.value,
                ModifierLayer::MulFinal => mul_final_product *= 1.0 + modifier.value,
            }
        }

        let body_value = (self.base + add_base_sum) * mul_base_product;
        let unclamped = (body_value + add_final_sum) * mul_final_product;

        AttributeBreakdown {
            base: self.base,
            add_base_sum,
            mul_base_product,
            body_value,
            add_final_sum,
            mul_final_product,
            unclamped,
            current: self.clamp(unclamped),
        }
    }

    fn current(&self) -> f64 {
        self.breakdown().current
    }
}

/// Named attributes owned by exactly one actor.
///
/// Current values are recomputed on every read; nothing is cached, since
/// modifiers can change at any point inside a tick.
#[derive(Debug, Default)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
    index: BTreeMap<String, usize>,
    next_modifier: u64,
    observers: Observers<AttributeChange>,
}

impl AttributeSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_modifier: 1,
            ..Self::default()
        }
    }

    /// Build a set from definitions, rejecting duplicates and inverted bounds.
    pub fn from_defs(defs: &[AttributeDef]) -> std::result::Result<Self, ConfigError> {
        let mut set = Self::new();
        for def in defs {
            set.define(def.clone())?;
        }
        Ok(set)
    }

    /// Add one attribute definition.
    pub fn define(&mut self, def: AttributeDef) -> std::result::Result<AttributeKey, ConfigError> {
        if self.index.contains_key(&def.name) {
            return Err(ConfigError::DuplicateAttribute(def.name));
        }
        if let (Some(min), Some(max)) = (def.min, def.max) {
            if min > max {
                return Err(ConfigError::InvertedBounds {
                    name: def.name,
                    min,
                    max,
                });
            }
        }

        let mut attribute = Attribute {
            name: def.name.clone(),
            base: def.base,
            min: def.min,
            max: def.max,
            modifiers: Vec::new(),
        };
        attribute.base = attribute.clamp(attribute.base);

        let slot = self.attributes.len();
        self.attributes.push(attribute);
        self.index.insert(def.name, slot);
        Ok(AttributeKey(slot))
    }

    /// Resolve a name to a key for repeated reads.
    #[must_use]
    pub fn key(&self, name: &str) -> Option<AttributeKey> {
        self.index.get(name).copied().map(AttributeKey)
    }

    /// Whether the attribute exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownAttribute(name.to_string()))
    }

    /// Stored base value.
    pub fn base(&self, name: &str) -> Result<f64> {
        Ok(self.attributes[self.slot(name)?].base)
    }

    /// Base value by key.
    #[must_use]
    pub fn base_of(&self, key: AttributeKey) -> f64 {
        self.attributes[key.0].base
    }

    /// Derived current value.
    pub fn current_value(&self, name: &str) -> Result<f64> {
        Ok(self.attributes[self.slot(name)?].current())
    }

    /// Derived current value by key.
    #[must_use]
    pub fn current(&self, key: AttributeKey) -> f64 {
        self.attributes[key.0].current()
    }

    /// Every intermediate layer value for `name`.
    pub fn breakdown(&self, name: &str) -> Result<AttributeBreakdown> {
        Ok(self.attributes[self.slot(name)?].breakdown())
    }

    /// Replace the base value (clamped). Returns the new current value.
    pub fn set_base(&mut self, name: &str, value: f64) -> Result<f64> {
        let slot = self.slot(name)?;
        Ok(self.mutate(slot, |attr| attr.base = attr.clamp(value)))
    }

    /// Add `delta` to the base value (clamped). Returns the new current value.
    pub fn modify_base(&mut self, name: &str, delta: f64) -> Result<f64> {
        let slot = self.slot(name)?;
        Ok(self.mutate(slot, |attr| attr.base = attr.clamp(attr.base + delta)))
    }

    /// Subscribe to current value changes.
    pub fn subscribe(&mut self, listener: impl FnMut(&AttributeChange) + 'static) -> Subscription {
        self.observers.subscribe(listener)
    }

    /// Remove a change listener.
    pub fn unsubscribe(&mut self, handle: Subscription) -> bool {
        self.observers.unsubscribe(handle)
    }

    /// Number of live change listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.observers.len()
    }

    /// Write capability handed to ability components.
    pub(crate) fn modifier_target(&mut self) -> ModifierWriter<'_> {
        ModifierWriter { set: self }
    }

    /// Apply `change` to one attribute and notify if the current value moved.
    fn mutate(&mut self, slot: usize, change: impl FnOnce(&mut Attribute)) -> f64 {
        let attribute = &mut self.attributes[slot];
        let old_value = attribute.current();
        change(attribute);
        let new_value = attribute.current();

        #[allow(clippy::float_cmp)]
        if old_value != new_value {
            let change = AttributeChange {
                attribute: attribute.name.clone(),
                old_value,
                new_value,
            };
            self.observers.notify(&change);
        }
        new_value
    }

    /// Plain data copy of the set, sufficient to rebuild it.
    #[must_use]
    pub fn snapshot(&self) -> AttributeSetSnapshot {
        AttributeSetSnapshot {
            attributes: self
                .attributes
                .iter()
                .map(|a| AttributeSnapshot {
                    name: a.name.clone(),
                    base: a.base,
                    min: a.min,
                    max: a.max,
                    modifiers: a.modifiers.clone(),
                })
                .collect(),
            next_modifier: self.next_modifier,
        }
    }

    /// Rebuild a set from a snapshot. Listeners are not part of a snapshot.
    pub fn restore(snapshot: &AttributeSetSnapshot) -> Result<Self> {
        let mut set = Self::new();
        for attr in &snapshot.attributes {
            set.define(AttributeDef {
                name: attr.name.clone(),
                base: attr.base,
                min: attr.min,
                max: attr.max,
            })?;
            let slot = set.slot(&attr.name)?;
            set.attributes[slot].modifiers = attr.modifiers.clone();
        }
        set.next_modifier = snapshot.next_modifier.max(1);
        Ok(set)
    }

    /// Feed attribute state into a hasher in deterministic order.
    pub(crate) fn hash_into(&self, hasher: &mut impl std::hash::Hasher) {
        use std::hash::Hash;
        for (name, &slot) in &self.index {
            let attribute = &self.attributes[slot];
            name.hash(hasher);
            attribute.base.to_bits().hash(hasher);
            attribute.current().to_bits().hash(hasher);
            attribute.modifiers.len().hash(hasher);
        }
    }
}

/// Serializable state of a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSnapshot {
    /// Attribute name.
    pub name: String,
    /// Stored base.
    pub base: f64,
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
    /// Attached modifiers in insertion order.
    pub modifiers: Vec<Modifier>,
}

/// Serializable state of an [`AttributeSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSetSnapshot {
    /// Attributes in definition order.
    pub attributes: Vec<AttributeSnapshot>,
    /// Next modifier id to issue.
    pub next_modifier: u64,
}

/// [`ModifierTarget`] implementation over an [`AttributeSet`].
///
/// Only obtainable inside the crate; components see it as
/// `&mut dyn ModifierTarget`.
pub struct ModifierWriter<'a> {
    set: &'a mut AttributeSet,
}

impl ModifierTarget for ModifierWriter<'_> {
    fn add_modifier(&mut self, attribute: &str, spec: ModifierSpec) -> Result<ModifierId> {
        let slot = self.set.slot(attribute)?;
        let id = ModifierId(self.set.next_modifier);
        self.set.next_modifier += 1;

        tracing::trace!(
            attribute,
            modifier = %id,
            layer = spec.layer.as_str(),
            value = spec.value,
            "Attaching modifier"
        );
        self.set
            .mutate(slot, |attr| attr.modifiers.push(Modifier::from_spec(id, spec)));
        Ok(id)
    }

    fn remove_modifier(&mut self, id: ModifierId) -> bool {
        let Some(slot) = self
            .set
            .attributes
            .iter()
            .position(|a| a.modifiers.iter().any(|m| m.id == id))
        else {
            return false;
        };
        self.set
            .mutate(slot, |attr| attr.modifiers.retain(|m| m.id != id));
        true
    }

    fn remove_modifiers_by_source(&mut self, source: &str) -> usize {
        let mut removed = 0;
        for slot in 0..self.set.attributes.len() {
            let count = self.set.attributes[slot]
                .modifiers
                .iter()
                .filter(|m| m.source.as_deref() == Some(source))
                .count();
            if count == 0 {
                continue;
            }
            removed += count;
            self.set.mutate(slot, |attr| {
                attr.modifiers.retain(|m| m.source.as_deref() != Some(source));
            });
        }
        removed
    }

    fn modifiers(&self, attribute: &str) -> Result<Vec<Modifier>> {
        let slot = self.set.slot(attribute)?;
        Ok(self.set.attributes[slot].modifiers.clone())
    }

    fn has_modifier(&self, id: ModifierId) -> bool {
        self.set
            .attributes
            .iter()
            .any(|a| a.modifiers.iter().any(|m| m.id == id))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn single(name: &str, base: f64) -> AttributeSet {
        AttributeSet::from_defs(&[AttributeDef::new(name, base)]).unwrap()
    }

    #[test]
    fn test_four_layer_formula() {
        let mut set = single("attack", 100.0);
        let mut target = set.modifier_target();
        target
            .add_modifier("attack", ModifierSpec::new(ModifierLayer::AddBase, 20.0))
            .unwrap();
        target
            .add_modifier("attack", ModifierSpec::new(ModifierLayer::MulBase, 0.5))
            .unwrap();
        target
            .add_modifier("attack", ModifierSpec::new(ModifierLayer::AddFinal, 50.0))
            .unwrap();
        target
            .add_modifier("attack", ModifierSpec::new(ModifierLayer::MulFinal, -0.2))
            .unwrap();

        let breakdown = set.breakdown("attack").unwrap();
        assert!(close(breakdown.body_value, 180.0));
        assert!(close(breakdown.current, 184.0));
        assert!(close(set.current_value("attack").unwrap(), 184.0));
    }

    #[test]
    fn test_formula_ignores_insertion_order() {
        let specs = [
            ModifierSpec::new(ModifierLayer::MulFinal, -0.2),
            ModifierSpec::new(ModifierLayer::AddFinal, 50.0),
            ModifierSpec::new(ModifierLayer::MulBase, 0.5),
            ModifierSpec::new(ModifierLayer::AddBase, 20.0),
        ];
        let mut set = single("attack", 100.0);
        for spec in specs {
            set.modifier_target().add_modifier("attack", spec).unwrap();
        }
        assert!(close(set.current_value("attack").unwrap(), 184.0));
    }

    #[test]
    fn test_add_base_aggregation() {
        for order in [[10.0, 5.0], [5.0, 10.0]] {
            let mut set = single("str", 100.0);
            for value in order {
                set.modifier_target()
                    .add_modifier("str", ModifierSpec::new(ModifierLayer::AddBase, value))
                    .unwrap();
            }
            let breakdown = set.breakdown("str").unwrap();
            assert!(close(breakdown.add_base_sum, 15.0));
            assert!(close(breakdown.current, 115.0));
        }
    }

    #[test]
    fn test_remove_by_source() {
        let mut set = single("atk", 100.0);
        let mut target = set.modifier_target();
        target
            .add_modifier(
                "atk",
                ModifierSpec::new(ModifierLayer::AddBase, 10.0).with_source("skill"),
            )
            .unwrap();
        target
            .add_modifier(
                "atk",
                ModifierSpec::new(ModifierLayer::AddBase, 20.0).with_source("skill"),
            )
            .unwrap();
        target
            .add_modifier(
                "atk",
                ModifierSpec::new(ModifierLayer::AddBase, 30.0).with_source("item"),
            )
            .unwrap();
        assert!(close(set.current_value("atk").unwrap(), 160.0));

        assert_eq!(set.modifier_target().remove_modifiers_by_source("skill"), 2);
        assert!(close(set.current_value("atk").unwrap(), 130.0));
        assert_eq!(set.modifier_target().modifiers("atk").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_single_modifier() {
        let mut set = single("def", 10.0);
        let id = set
            .modifier_target()
            .add_modifier("def", ModifierSpec::new(ModifierLayer::AddFinal, 5.0))
            .unwrap();
        assert!(set.modifier_target().has_modifier(id));
        assert!(set.modifier_target().remove_modifier(id));
        assert!(!set.modifier_target().remove_modifier(id));
        assert!(close(set.current_value("def").unwrap(), 10.0));
    }

    #[test]
    fn test_clamping() {
        let mut set =
            AttributeSet::from_defs(&[AttributeDef::new("hp", 50.0).with_bounds(Some(0.0), Some(100.0))])
                .unwrap();
        set.modify_base("hp", -80.0).unwrap();
        assert!(close(set.base("hp").unwrap(), 0.0));
        set.set_base("hp", 250.0).unwrap();
        assert!(close(set.current_value("hp").unwrap(), 100.0));

        set.modifier_target()
            .add_modifier("hp", ModifierSpec::new(ModifierLayer::AddFinal, 40.0))
            .unwrap();
        assert!(close(set.current_value("hp").unwrap(), 100.0));
        assert!(close(set.breakdown("hp").unwrap().unclamped, 140.0));
    }

    #[test]
    fn test_change_notification_suppresses_zero_delta() {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let mut set = single("mp", 30.0);
        let sink = Rc::clone(&changes);
        let handle = set.subscribe(move |c| sink.borrow_mut().push(c.clone()));

        set.set_base("mp", 30.0).unwrap();
        set.modify_base("mp", 0.0).unwrap();
        assert!(changes.borrow().is_empty());

        set.modify_base("mp", -10.0).unwrap();
        set.modifier_target()
            .add_modifier("mp", ModifierSpec::new(ModifierLayer::MulFinal, 0.0))
            .unwrap();
        let seen = changes.borrow();
        assert_eq!(seen.len(), 1);
        assert!(close(seen[0].old_value, 30.0));
        assert!(close(seen[0].new_value, 20.0));
        drop(seen);

        assert!(set.unsubscribe(handle));
        assert_eq!(set.listener_count(), 0);
    }

    #[test]
    fn test_unknown_attribute() {
        let mut set = single("hp", 1.0);
        assert!(matches!(
            set.current_value("mana"),
            Err(EngineError::UnknownAttribute(_))
        ));
        assert!(set
            .modifier_target()
            .add_modifier("mana", ModifierSpec::new(ModifierLayer::AddBase, 1.0))
            .is_err());
    }

    #[test]
    fn test_config_errors() {
        let dup = AttributeSet::from_defs(&[AttributeDef::new("a", 1.0), AttributeDef::new("a", 2.0)]);
        assert_eq!(dup.unwrap_err(), ConfigError::DuplicateAttribute("a".into()));

        let inverted =
            AttributeSet::from_defs(&[AttributeDef::new("a", 1.0).with_bounds(Some(5.0), Some(1.0))]);
        assert!(matches!(inverted, Err(ConfigError::InvertedBounds { .. })));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut set = AttributeSet::from_defs(&[
            AttributeDef::new("hp", 80.0).with_bounds(Some(0.0), Some(120.0)),
            AttributeDef::new("atk", 12.0),
        ])
        .unwrap();
        set.modifier_target()
            .add_modifier(
                "atk",
                ModifierSpec::new(ModifierLayer::MulBase, 0.25).with_source("buff"),
            )
            .unwrap();

        let restored = AttributeSet::restore(&set.snapshot()).unwrap();
        for name in ["hp", "atk"] {
            assert!(close(
                restored.current_value(name).unwrap(),
                set.current_value(name).unwrap()
            ));
        }

        // Ids keep counting from where the original left off.
        let mut restored = restored;
        let id = restored
            .modifier_target()
            .add_modifier("hp", ModifierSpec::new(ModifierLayer::AddBase, 1.0))
            .unwrap();
        assert_eq!(id, ModifierId(2));
    }

    #[test]
    fn test_keys() {
        let set = single("speed", 7.0);
        let key = set.key("speed").unwrap();
        assert!(close(set.current(key), 7.0));
        assert!(close(set.base_of(key), 7.0));
        assert!(set.key("nope").is_none());
    }
}

//! Data structures for ability and actor content.
//!
//! Everything here deserializes from RON. Content is validated when it is
//! loaded, so a malformed definition fails loudly before any world uses it.

mod ability_data;
mod actor_data;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::error::ConfigError;

pub use ability_data::{
    parse_event_kind, AbilityData, ActionData, ComponentData, ConditionData, CostData, FilterData,
    ModifierData,
};
pub use actor_data::ActorTemplate;

/// Ability definitions keyed by template id.
///
/// # Example RON
///
/// ```ron
/// AbilityRegistry(
///     abilities: [
///         AbilityData(id: "burning", components: [Tags(tags: {"burning": 1}), Duration(duration_ms: 3000)]),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityRegistry {
    abilities: Vec<AbilityData>,
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

impl AbilityRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from definitions, validating each.
    pub fn from_definitions(definitions: Vec<AbilityData>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for data in definitions {
            registry.insert(data)?;
        }
        Ok(registry)
    }

    /// Parse and validate a RON document. `label` names the source in errors.
    pub fn from_ron_str(source: &str, label: &str) -> Result<Self, ConfigError> {
        let parsed: Self = ron::from_str(source).map_err(|e| ConfigError::Parse {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        Self::from_definitions(parsed.abilities)
    }

    /// Load and validate a RON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron_str(&source, &path.display().to_string())
    }

    /// Add one validated definition.
    pub fn insert(&mut self, data: AbilityData) -> Result<(), ConfigError> {
        data.validate()?;
        if self.index.contains_key(&data.id) {
            return Err(ConfigError::DuplicateAbility(data.id));
        }
        self.index.insert(data.id.clone(), self.abilities.len());
        self.abilities.push(data);
        Ok(())
    }

    /// Definition by template id.
    #[must_use]
    pub fn get(&self, config_id: &str) -> Option<&AbilityData> {
        self.index.get(config_id).map(|&i| &self.abilities[i])
    }

    /// Whether `config_id` is registered.
    #[must_use]
    pub fn contains(&self, config_id: &str) -> bool {
        self.index.contains_key(config_id)
    }

    /// Template ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.abilities.iter().map(|a| a.id.as_str())
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.abilities.len()
    }

    /// Whether no definition is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.abilities.is_empty()
    }

    /// Build a fresh unattached ability from `config_id`.
    pub fn build(&self, config_id: &str) -> Result<Ability, ConfigError> {
        self.get(config_id)
            .ok_or_else(|| ConfigError::UnknownAbility(config_id.to_string()))?
            .build()
    }

    /// Check that every ability a template grants is registered.
    pub fn check_template(&self, template: &ActorTemplate) -> Result<(), ConfigError> {
        match template.abilities.iter().find(|id| !self.contains(id)) {
            Some(missing) => Err(ConfigError::UnknownAbility(missing.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = r#"
        AbilityRegistry(
            abilities: [
                AbilityData(id: "burning", components: [Tags(tags: {"burning": 1}), Duration(duration_ms: 3000)]),
                AbilityData(id: "thorns", components: [
                    GameEvent(kinds: ["damage"], filter: OwnerIsTarget, actions: [EmitDamage(to: EventSource, amount: 2.0)]),
                ]),
            ],
        )
    "#;

    #[test]
    fn test_load_registry() {
        let registry = AbilityRegistry::from_ron_str(CONTENT, "inline").unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["burning", "thorns"]);
        let ability = registry.build("burning").unwrap();
        assert_eq!(ability.component_names(), vec!["tags", "duration"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let data: AbilityData =
            ron::from_str(r#"AbilityData(id: "a", components: [Duration(duration_ms: 1)])"#).unwrap();
        let err = AbilityRegistry::from_definitions(vec![data.clone(), data]).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateAbility("a".to_string()));
    }

    #[test]
    fn test_unknown_build() {
        let registry = AbilityRegistry::new();
        assert!(matches!(
            registry.build("nope"),
            Err(ConfigError::UnknownAbility(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = AbilityRegistry::from_ron_str("AbilityRegistry(", "broken.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path, .. } if path == "broken.ron"));
    }

    #[test]
    fn test_template_check() {
        let registry = AbilityRegistry::from_ron_str(CONTENT, "inline").unwrap();
        let template = ActorTemplate {
            name: "imp".to_string(),
            attributes: Vec::new(),
            abilities: vec!["thorns".to_string(), "flight".to_string()],
        };
        assert!(template.grants("thorns"));
        assert_eq!(
            registry.check_template(&template),
            Err(ConfigError::UnknownAbility("flight".to_string()))
        );
    }
}

//! Scenario loading and validation.
//!
//! A scenario bundles everything a headless run needs: engine
//! configuration, ability definitions, actor templates and a script of
//! steps to play against the world.

use std::collections::BTreeSet;
use std::path::Path;

use ability_core::config::EngineConfig;
use ability_core::data::{AbilityData, AbilityRegistry, ActorTemplate};
use ability_core::error::{ConfigError, EngineError};
use ability_core::event::EventKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Content was rejected by the engine's validation.
    #[error("Invalid content: {0}")]
    Config(#[from] ConfigError),
    /// The engine refused a scripted operation.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    /// Two templates share a name.
    #[error("Duplicate actor name '{0}'")]
    DuplicateActor(String),
    /// A script step names an actor that no template spawns.
    #[error("Step {step}: unknown actor '{actor}'")]
    UnknownActor {
        /// Zero-based step index.
        step: usize,
        /// Name used by the step.
        actor: String,
    },
    /// A script step names an ability the actor does not hold.
    #[error("Step {step}: actor '{actor}' has no ability '{ability}'")]
    MissingAbility {
        /// Zero-based step index.
        step: usize,
        /// Actor name.
        actor: String,
        /// Ability config id.
        ability: String,
    },
}

/// One scripted operation. Actors are named by template name and
/// abilities by config id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScriptStep {
    /// Advance the clock.
    Tick(u64),
    /// Request activation of the actor's first ability with this id.
    Activate {
        /// Actor name.
        actor: String,
        /// Ability config id.
        ability: String,
    },
    /// Dispatch a damage event.
    Damage {
        /// Dealing actor.
        source: String,
        /// Receiving actor.
        target: String,
        /// Amount before pre-phase changes.
        amount: f64,
        /// Damage category.
        #[serde(default)]
        damage_type: String,
    },
    /// Dispatch a heal event.
    Heal {
        /// Healing actor.
        source: String,
        /// Healed actor.
        target: String,
        /// Amount before pre-phase changes.
        amount: f64,
    },
    /// Dispatch a custom event.
    Custom {
        /// Kind name.
        kind: String,
        /// Optional source actor.
        #[serde(default)]
        source: Option<String>,
        /// Optional target actor.
        #[serde(default)]
        target: Option<String>,
        /// Numeric payload.
        #[serde(default)]
        fields: std::collections::BTreeMap<String, f64>,
    },
    /// Grant a registered ability.
    Grant {
        /// Actor name.
        actor: String,
        /// Ability config id.
        ability: String,
    },
    /// Revoke the actor's first ability with this id.
    Revoke {
        /// Actor name.
        actor: String,
        /// Ability config id.
        ability: String,
    },
}

impl ScriptStep {
    /// Actor names the step refers to.
    #[must_use]
    pub fn actors(&self) -> Vec<&str> {
        match self {
            Self::Tick(_) => Vec::new(),
            Self::Activate { actor, .. } | Self::Grant { actor, .. } | Self::Revoke { actor, .. } => {
                vec![actor.as_str()]
            }
            Self::Damage { source, target, .. } | Self::Heal { source, target, .. } => {
                vec![source.as_str(), target.as_str()]
            }
            Self::Custom { source, target, .. } => source
                .iter()
                .chain(target.iter())
                .map(String::as_str)
                .collect(),
        }
    }
}

/// A complete scenario.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "duel",
///     config: (max_depth: 8),
///     abilities: [
///         AbilityData(id: "thorns", components: [
///             GameEvent(kinds: ["damage"], filter: OwnerIsTarget, actions: [EmitDamage(to: EventSource, amount: 2.0)]),
///         ]),
///     ],
///     actors: [
///         ActorTemplate(name: "knight", attributes: [(name: "hp", base: 50.0)], abilities: ["thorns"]),
///         ActorTemplate(name: "goblin", attributes: [(name: "hp", base: 20.0)]),
///     ],
///     script: [
///         Damage(source: "goblin", target: "knight", amount: 5.0),
///         Tick(100),
///     ],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Engine configuration.
    #[serde(default)]
    pub config: EngineConfig,
    /// Ability definitions available to templates and `Grant` steps.
    #[serde(default)]
    pub abilities: Vec<AbilityData>,
    /// Actors spawned in order before the script runs.
    pub actors: Vec<ActorTemplate>,
    /// Steps played in order.
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Validated ability registry for this scenario.
    pub fn registry(&self) -> Result<AbilityRegistry, ConfigError> {
        AbilityRegistry::from_definitions(self.abilities.clone())
    }

    /// Check configuration, content and script references without running
    /// anything.
    pub fn validate(&self) -> Result<AbilityRegistry, ScenarioError> {
        self.config.validate()?;
        let registry = self.registry()?;

        let mut names = BTreeSet::new();
        for template in &self.actors {
            registry.check_template(template)?;
            if !names.insert(template.name.as_str()) {
                return Err(ScenarioError::DuplicateActor(template.name.clone()));
            }
        }

        for (step, entry) in self.script.iter().enumerate() {
            if let Some(actor) = entry.actors().into_iter().find(|a| !names.contains(a)) {
                return Err(ScenarioError::UnknownActor {
                    step,
                    actor: actor.to_string(),
                });
            }
            match entry {
                ScriptStep::Grant { ability, .. } if !registry.contains(ability) => {
                    return Err(ConfigError::UnknownAbility(ability.clone()).into());
                }
                ScriptStep::Custom { kind, .. } if EventKind::is_reserved(kind) => {
                    return Err(ConfigError::ReservedEventKind(kind.clone()).into());
                }
                _ => {}
            }
        }
        Ok(registry)
    }
}

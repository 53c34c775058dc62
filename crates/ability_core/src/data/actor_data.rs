//! Actor templates.

use serde::{Deserialize, Serialize};

use crate::attribute::AttributeDef;

/// Data-driven actor definition.
///
/// # Example RON
///
/// ```ron
/// ActorTemplate(
///     name: "knight",
///     attributes: [
///         (name: "hp", base: 120.0, min: Some(0.0), max: Some(120.0)),
///         (name: "armor", base: 10.0),
///     ],
///     abilities: ["shield_wall"],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorTemplate {
    /// Display name given to spawned actors.
    pub name: String,

    /// Attribute definitions.
    pub attributes: Vec<AttributeDef>,

    /// Ability template ids granted on spawn, in order.
    #[serde(default)]
    pub abilities: Vec<String>,
}

impl ActorTemplate {
    /// Check whether the template grants `config_id`.
    #[must_use]
    pub fn grants(&self, config_id: &str) -> bool {
        self.abilities.iter().any(|a| a == config_id)
    }
}

//! Engine configuration.
//!
//! # Example RON
//!
//! ```ron
//! EngineConfig(
//!     max_depth: 16,
//!     trace_level: Summary,
//!     health_attribute: "hp",
//!     id_seed: 1,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::processor::TraceLevel;

/// Default cascade depth bound.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Tunables of one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of pre/post calls. Deeper cascades are truncated.
    pub max_depth: usize,
    /// How much the processor records per call.
    pub trace_level: TraceLevel,
    /// Attribute reduced by damage and raised by heals.
    pub health_attribute: String,
    /// First id issued by the world's id generator.
    pub id_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            trace_level: TraceLevel::Off,
            health_attribute: "hp".to_string(),
            id_seed: 1,
        }
    }
}

impl EngineConfig {
    /// Builder method to set the depth bound.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Builder method to set the trace level.
    #[must_use]
    pub const fn with_trace_level(mut self, trace_level: TraceLevel) -> Self {
        self.trace_level = trace_level;
        self
    }

    /// Builder method to set the health attribute.
    #[must_use]
    pub fn with_health_attribute(mut self, name: impl Into<String>) -> Self {
        self.health_attribute = name.into();
        self
    }

    /// Builder method to set the id seed.
    #[must_use]
    pub const fn with_id_seed(mut self, seed: u64) -> Self {
        self.id_seed = seed;
        self
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidEngineConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.health_attribute.is_empty() {
            return Err(ConfigError::InvalidEngineConfig(
                "health_attribute must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a RON document. `label` names the source in errors.
    pub fn from_ron_str(source: &str, label: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source).map_err(|e| ConfigError::Parse {
            path: label.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
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
}

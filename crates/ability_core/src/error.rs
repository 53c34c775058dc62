//! Error types for the ability engine.
//!
//! Three families are kept apart:
//! - [`ConfigError`]: malformed attribute or ability content, raised at
//!   construction time and never swallowed.
//! - [`HandlerError`]: failures inside user supplied conditions, costs,
//!   actions and pre-handlers. Call sites always catch these, log them and
//!   fall back to the neutral outcome (`Pass`, deny).
//! - [`EngineError`]: the top-level error returned by fallible engine
//!   operations.

use thiserror::Error;

use crate::ids::{AbilityId, ActorId};

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Content or configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Attribute name not present in the owning set.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Actor reference does not resolve.
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    /// Ability reference does not resolve on the given actor.
    #[error("Ability {ability} not found on actor {actor}")]
    AbilityNotFound {
        /// Owner that was searched.
        actor: ActorId,
        /// Missing ability instance.
        ability: AbilityId,
    },

    /// Snapshot bytes or structure could not be used.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Invalid engine state.
    #[error("Invalid engine state: {0}")]
    InvalidState(String),
}

/// Configuration errors. These indicate a content bug, not a runtime
/// condition, and are surfaced loudly at load or construction time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Two attributes with the same name in one set.
    #[error("Duplicate attribute '{0}'")]
    DuplicateAttribute(String),

    /// Attribute bounds are inverted.
    #[error("Attribute '{name}' has min {min} greater than max {max}")]
    InvertedBounds {
        /// Attribute name.
        name: String,
        /// Configured lower bound.
        min: f64,
        /// Configured upper bound.
        max: f64,
    },

    /// Two ability definitions share an id.
    #[error("Duplicate ability definition '{0}'")]
    DuplicateAbility(String),

    /// Ability config id not registered.
    #[error("Unknown ability definition '{0}'")]
    UnknownAbility(String),

    /// A component definition is invalid.
    #[error("Ability '{ability}' component {index}: {message}")]
    InvalidComponent {
        /// Owning ability config id.
        ability: String,
        /// Position of the component in the definition.
        index: usize,
        /// What is wrong with it.
        message: String,
    },

    /// A custom event uses the name of a built-in event family.
    #[error("Event kind '{0}' is reserved for a built-in event")]
    ReservedEventKind(String),

    /// Engine configuration value out of range.
    #[error("Invalid engine config: {0}")]
    InvalidEngineConfig(String),

    /// RON source failed to parse.
    #[error("Failed to parse '{path}': {message}")]
    Parse {
        /// Path or label of the source.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Source file could not be read.
    #[error("Failed to read '{path}': {message}")]
    Io {
        /// Path of the file.
        path: String,
        /// IO error message.
        message: String,
    },
}

/// Failure raised by user supplied gameplay logic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler referenced an attribute its owner does not have.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// The handler referenced an actor that does not exist.
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    /// Generic failure with a message.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<EngineError> for HandlerError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownAttribute(name) => Self::UnknownAttribute(name),
            EngineError::ActorNotFound(id) => Self::ActorNotFound(id),
            other => Self::Failed(other.to_string()),
        }
    }
}

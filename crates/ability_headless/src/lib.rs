//! Headless scenario runner for content testing and CI verification.
//!
//! This crate plays RON scenarios against an [`ability_core::world::World`]
//! without any frontend. This enables:
//!
//! - **Content testing**: Ability data can be exercised end to end
//! - **CI verification**: Scripted runs must end in the same state hash
//! - **Debugging**: The full outbound event stream, optionally with
//!   processor traces, is available as JSON lines
//!
//! # Output
//!
//! - **stdout**: One JSON object per line ([`runner::OutputLine`])
//! - **stderr**: Logs (human-readable)
//!
//! # Example
//!
//! ```bash
//! # Run a scenario and print its event stream
//! cargo run -p ability_headless -- run --scenario scenarios/duel.ron
//!
//! # Validate an ability data file
//! cargo run -p ability_headless -- validate --abilities content/abilities.ron
//!
//! # Verify determinism
//! cargo run -p ability_headless -- verify --scenario scenarios/duel.ron --runs 10
//! ```

pub mod runner;
pub mod scenario;

pub use runner::{OutputLine, RunSummary, ScenarioRunner, VerifyReport};
pub use scenario::{Scenario, ScenarioError, ScriptStep};

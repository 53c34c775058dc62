//! Headless ability scenario runner.
//!
//! Plays scenarios without any frontend and prints the engine's outbound
//! event stream as JSON lines. Designed for content checks, CI testing and
//! determinism verification.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario
//! cargo run -p ability_headless -- run --scenario scenarios/duel.ron
//!
//! # Include processor trace records in the stream
//! cargo run -p ability_headless -- run --scenario scenarios/duel.ron --trace
//!
//! # Validate ability data
//! cargo run -p ability_headless -- validate --abilities abilities.ron
//!
//! # Verify determinism
//! cargo run -p ability_headless -- verify --scenario scenarios/duel.ron --runs 10
//! ```
//!
//! # Output
//!
//! Output (stdout): JSON lines, one per engine record
//! Logs (stderr): Debug information

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ability_core::data::AbilityRegistry;
use ability_headless::{OutputLine, Scenario, ScenarioError, ScenarioRunner};

#[derive(Parser)]
#[command(name = "ability_headless")]
#[command(about = "Headless ability scenario runner for content testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print its event stream
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Also print processor trace records
        #[arg(long)]
        trace: bool,
    },

    /// Load and validate an ability data file
    Validate {
        /// Ability registry RON file
        #[arg(short, long)]
        abilities: PathBuf,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Scenario to test
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for the event stream)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run { scenario, trace } => cmd_run(&scenario, trace),
        Commands::Validate { abilities } => cmd_validate(&abilities),
        Commands::Verify { scenario, runs } => cmd_verify(&scenario, runs),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("FATAL: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run a scenario, streaming JSON lines to stdout.
fn cmd_run(path: &Path, trace: bool) -> Result<ExitCode, ScenarioError> {
    tracing::info!(scenario = %path.display(), trace, "Running scenario");
    let runner = ScenarioRunner::new(Scenario::load(path)?)?.with_trace(trace);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut write_error = None;
    runner.run_with(|line: OutputLine| {
        if write_error.is_some() {
            return;
        }
        let written = serde_json::to_string(&line)
            .map_err(io::Error::from)
            .and_then(|json| writeln!(out, "{json}"));
        if let Err(e) = written {
            write_error = Some(e);
        }
    })?;

    match write_error {
        Some(e) => Err(e.into()),
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Validate an ability data file.
fn cmd_validate(path: &Path) -> Result<ExitCode, ScenarioError> {
    let registry = AbilityRegistry::load_file(path)?;
    tracing::info!(abilities = registry.len(), path = %path.display(), "Ability data is valid");
    for id in registry.ids() {
        eprintln!("  ok  {id}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Verify determinism by running the scenario `runs` times.
fn cmd_verify(path: &Path, runs: usize) -> Result<ExitCode, ScenarioError> {
    tracing::info!(scenario = %path.display(), runs, "Verifying determinism");
    let runner = ScenarioRunner::new(Scenario::load(path)?)?;
    let report = runner.verify(runs)?;

    if report.is_deterministic() {
        eprintln!("Determinism verified: {runs} runs produced identical state");
        if let Some(hash) = report.hashes.first() {
            eprintln!("  hash: {hash:016x}");
        }
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Determinism FAILED: runs produced different state");
        if let Some(run) = report.first_divergence() {
            eprintln!("  first divergent run: {run}");
        }
        for (run, hash) in report.hashes.iter().enumerate() {
            eprintln!("  run {run}: {hash:016x}");
        }
        Ok(ExitCode::FAILURE)
    }
}

//! Scripted scenario execution.
//!
//! The runner spawns the scenario's actors, plays its script step by step
//! and streams every recorded [`EngineEvent`] to a caller-supplied sink.

use std::collections::BTreeMap;

use ability_core::data::AbilityRegistry;
use ability_core::event::{CustomEvent, DamageEvent, GameEvent};
use ability_core::ids::{AbilityId, ActorId};
use ability_core::processor::{TraceLevel, TraceRecord};
use ability_core::record::EngineEvent;
use ability_core::world::World;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scenario::{Scenario, ScenarioError, ScriptStep};

/// One line of the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum OutputLine {
    /// An engine record.
    Event(EngineEvent),
    /// A processor trace record (only with tracing enabled).
    Trace(TraceRecord),
    /// Final line of a run.
    Summary(RunSummary),
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Script steps played.
    pub steps: usize,
    /// Engine records emitted.
    pub events: usize,
    /// Logical time at the end.
    pub now: u64,
    /// Post broadcasts performed.
    pub broadcasts: u64,
    /// Calls cut short by the depth bound.
    pub truncations: u64,
    /// Final state hash.
    pub state_hash: u64,
}

/// Result of [`ScenarioRunner::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Final hash of every run, in run order.
    pub hashes: Vec<u64>,
}

impl VerifyReport {
    /// Whether every run ended in the same state.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Index of the first run that disagrees with the first.
    #[must_use]
    pub fn first_divergence(&self) -> Option<usize> {
        let first = *self.hashes.first()?;
        self.hashes.iter().position(|&h| h != first)
    }
}

/// Plays a validated scenario against fresh worlds.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    registry: AbilityRegistry,
    trace: bool,
}

impl ScenarioRunner {
    /// Validate `scenario` and prepare to run it.
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        let registry = scenario.validate()?;
        Ok(Self {
            scenario,
            registry,
            trace: false,
        })
    }

    /// Builder method to also emit processor trace records.
    #[must_use]
    pub const fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// The scenario being run.
    #[must_use]
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Fresh world with every template spawned, plus the name to id map.
    pub fn build_world(&self) -> Result<(World, BTreeMap<String, ActorId>), ScenarioError> {
        let mut config = self.scenario.config.clone();
        if self.trace && config.trace_level == TraceLevel::Off {
            config = config.with_trace_level(TraceLevel::Summary);
        }
        let mut world = World::new(config)?;
        let mut actors = BTreeMap::new();
        for template in &self.scenario.actors {
            let id = world.spawn_from_template(template, &self.registry)?;
            actors.insert(template.name.clone(), id);
        }
        Ok((world, actors))
    }

    /// Run the script, handing every output line to `sink` as it is
    /// produced. Ends with a [`OutputLine::Summary`].
    pub fn run_with(&self, mut sink: impl FnMut(OutputLine)) -> Result<RunSummary, ScenarioError> {
        let (mut world, actors) = self.build_world()?;
        let mut events = 0;

        let mut flush = |world: &mut World, sink: &mut dyn FnMut(OutputLine)| {
            for event in world.log().drain() {
                events += 1;
                sink(OutputLine::Event(event));
            }
            for record in world.processor_mut().take_traces() {
                sink(OutputLine::Trace(record));
            }
        };
        flush(&mut world, &mut sink);

        for (index, step) in self.scenario.script.iter().enumerate() {
            debug!(step = index, ?step, "Playing script step");
            self.play(&mut world, &actors, index, step)?;
            flush(&mut world, &mut sink);
        }

        let summary = RunSummary {
            scenario: self.scenario.name.clone(),
            steps: self.scenario.script.len(),
            events,
            now: world.now(),
            broadcasts: world.processor().broadcasts(),
            truncations: world.processor().truncations(),
            state_hash: world.state_hash(),
        };
        info!(
            scenario = %summary.scenario,
            steps = summary.steps,
            events = summary.events,
            hash = summary.state_hash,
            "Scenario finished"
        );
        sink(OutputLine::Summary(summary.clone()));
        Ok(summary)
    }

    /// Run the script and collect the output.
    pub fn run(&self) -> Result<Vec<OutputLine>, ScenarioError> {
        let mut lines = Vec::new();
        self.run_with(|line| lines.push(line))?;
        Ok(lines)
    }

    /// Run the script `runs` times and compare the final state hashes.
    pub fn verify(&self, runs: usize) -> Result<VerifyReport, ScenarioError> {
        let mut hashes = Vec::with_capacity(runs);
        for run in 0..runs {
            let summary = self.run_with(|_| {})?;
            debug!(run, hash = summary.state_hash, "Verification run complete");
            hashes.push(summary.state_hash);
        }
        Ok(VerifyReport { hashes })
    }

    fn play(
        &self,
        world: &mut World,
        actors: &BTreeMap<String, ActorId>,
        index: usize,
        step: &ScriptStep,
    ) -> Result<(), ScenarioError> {
        let actor = |name: &str| {
            actors
                .get(name)
                .copied()
                .ok_or_else(|| ScenarioError::UnknownActor {
                    step: index,
                    actor: name.to_string(),
                })
        };

        match step {
            ScriptStep::Tick(dt) => {
                for (owner, ability) in world.tick(*dt) {
                    debug!(actor = %owner, %ability, "Ability expired");
                }
            }
            ScriptStep::Activate { actor: name, ability } => {
                let owner = actor(name)?;
                let id = held_ability(world, owner, name, ability, index)?;
                world.activate(owner, id)?;
            }
            ScriptStep::Damage {
                source,
                target,
                amount,
                damage_type,
            } => {
                world.dispatch(GameEvent::Damage(DamageEvent {
                    source_id: actor(source)?,
                    target_id: actor(target)?,
                    amount: *amount,
                    damage_type: damage_type.clone(),
                }));
            }
            ScriptStep::Heal {
                source,
                target,
                amount,
            } => {
                world.dispatch(GameEvent::heal(actor(source)?, actor(target)?, *amount));
            }
            ScriptStep::Custom {
                kind,
                source,
                target,
                fields,
            } => {
                let mut event = CustomEvent::new(kind.as_str())?;
                if let Some(name) = source {
                    event = event.with_source(actor(name)?);
                }
                if let Some(name) = target {
                    event = event.with_target(actor(name)?);
                }
                event.fields.clone_from(fields);
                world.dispatch(event.into());
            }
            ScriptStep::Grant { actor: name, ability } => {
                world.grant_from_registry(actor(name)?, &self.registry, ability)?;
            }
            ScriptStep::Revoke { actor: name, ability } => {
                let owner = actor(name)?;
                let id = held_ability(world, owner, name, ability, index)?;
                world.revoke_ability(owner, id)?;
            }
        }
        Ok(())
    }
}

fn held_ability(
    world: &World,
    owner: ActorId,
    name: &str,
    config_id: &str,
    step: usize,
) -> Result<AbilityId, ScenarioError> {
    world
        .actor(owner)
        .and_then(|a| a.abilities().find_by_config(config_id).first().copied())
        .ok_or_else(|| ScenarioError::MissingAbility {
            step,
            actor: name.to_string(),
            ability: config_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIRMISH: &str = r#"
        Scenario(
            name: "skirmish",
            abilities: [
                AbilityData(id: "thorns", components: [
                    GameEvent(kinds: ["damage"], filter: OwnerIsTarget, actions: [EmitDamage(to: EventSource, amount: 2.0)]),
                ]),
                AbilityData(id: "rally", components: [
                    ActiveUse(
                        timeline_id: "rally",
                        costs: [Cooldown(tag: "cd.rally", duration_ms: 1000)],
                        actions: [EmitHeal(to: Owner, amount: 10.0)],
                    ),
                ]),
                AbilityData(id: "haste", components: [Tags(tags: {"haste": 1}), Duration(duration_ms: 500)]),
            ],
            actors: [
                ActorTemplate(name: "knight", attributes: [(name: "hp", base: 50.0, max: Some(50.0))], abilities: ["thorns", "rally"]),
                ActorTemplate(name: "goblin", attributes: [(name: "hp", base: 20.0)]),
            ],
            script: [
                Damage(source: "goblin", target: "knight", amount: 15.0),
                Activate(actor: "knight", ability: "rally"),
                Activate(actor: "knight", ability: "rally"),
                Grant(actor: "goblin", ability: "haste"),
                Tick(500),
                Revoke(actor: "knight", ability: "thorns"),
                Damage(source: "goblin", target: "knight", amount: 1.0),
            ],
        )
    "#;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(Scenario::from_ron_str(SKIRMISH).unwrap()).unwrap()
    }

    fn hp(world: &World, id: ActorId) -> f64 {
        world.actor(id).unwrap().attributes().current_value("hp").unwrap()
    }

    #[test]
    fn test_run_produces_events_and_summary() {
        let lines = runner().run().unwrap();
        let Some(OutputLine::Summary(summary)) = lines.last() else {
            panic!("last line is the summary");
        };
        assert_eq!(summary.steps, 7);
        assert_eq!(summary.now, 500);
        assert_eq!(summary.events, lines.len() - 1);

        let failed = lines
            .iter()
            .filter(|l| matches!(l, OutputLine::Event(EngineEvent::ActivationFailed { .. })))
            .count();
        assert_eq!(failed, 1);
        assert!(lines.iter().any(|l| matches!(
            l,
            OutputLine::Event(EngineEvent::AbilityRevoked { .. })
        )));
    }

    #[test]
    fn test_script_effects() {
        let runner = runner();
        let (mut world, actors) = runner.build_world().unwrap();
        for (index, step) in runner.scenario().script.iter().enumerate() {
            runner.play(&mut world, &actors, index, step).unwrap();
        }
        let knight = actors["knight"];
        let goblin = actors["goblin"];
        // Thorns reflected the first hit only; the second rally was on cooldown.
        assert!((hp(&world, knight) - 44.0).abs() < 1e-9);
        assert!((hp(&world, goblin) - 18.0).abs() < 1e-9);
        assert!(!world.actor(goblin).unwrap().tags().has_tag("haste"));
    }

    #[test]
    fn test_trace_lines_only_when_enabled() {
        let plain = runner().run().unwrap();
        assert!(!plain.iter().any(|l| matches!(l, OutputLine::Trace(_))));
        let traced = runner().with_trace(true).run().unwrap();
        assert!(traced.iter().any(|l| matches!(l, OutputLine::Trace(_))));
    }

    #[test]
    fn test_verify_is_deterministic() {
        let report = runner().verify(4).unwrap();
        assert_eq!(report.hashes.len(), 4);
        assert!(report.is_deterministic());
        assert_eq!(report.first_divergence(), None);
    }

    #[test]
    fn test_revoke_of_missing_ability_fails() {
        let mut scenario = Scenario::from_ron_str(SKIRMISH).unwrap();
        scenario.script.push(ScriptStep::Revoke {
            actor: "goblin".to_string(),
            ability: "thorns".to_string(),
        });
        let err = ScenarioRunner::new(scenario).unwrap().run().unwrap_err();
        assert!(matches!(err, ScenarioError::MissingAbility { step: 7, .. }));
    }

    #[test]
    fn test_bundled_duel_scenario() {
        let scenario =
            Scenario::load(concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/duel.ron")).unwrap();
        let runner = ScenarioRunner::new(scenario).unwrap();
        let lines = runner.run().unwrap();
        assert!(lines.iter().any(|l| matches!(
            l,
            OutputLine::Event(EngineEvent::ExecutionActivated { timeline_id, .. }) if timeline_id == "bash"
        )));
        assert!(runner.verify(3).unwrap().is_deterministic());
    }

    #[test]
    fn test_output_line_json_shape() {
        let line = OutputLine::Event(EngineEvent::TagChanged {
            actor: ActorId(1),
            tag: "haste".to_string(),
            old_stacks: 0,
            new_stacks: 1,
        });
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["stream"], "event");
        assert_eq!(json["type"], "TagChanged");
        assert_eq!(json["tag"], "haste");
    }
}

/// Quest sequencer — runs search rounds and commits each winning quest
/// into the persistent world state.

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::evolution::{
    EvolutionError, GenerationStats, PlanningOracle, QuestGenerator,
};
use crate::core::operators::{Crossover, Mutation, Selection};
use crate::core::planning::{Planner, PlanningBridge};
use crate::core::state::overlay;
use crate::core::tension::TensionScorer;
use crate::schema::fact::State;
use crate::schema::trace::ActionTrace;
use crate::schema::world::WorldDefinition;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("quest search failed: {0}")]
    Search(#[from] EvolutionError),
    #[error("effect replay: action '{0}' is not defined in the world")]
    UnknownAction(String),
    #[error("effect replay: action '{action}' takes {expected} arguments, planner gave {got}")]
    ArityMismatch {
        action: String,
        expected: usize,
        got: usize,
    },
    #[error("effect replay: action '{action}' has an effect that cannot be grounded")]
    Ungroundable { action: String },
    #[error("effect replay: action '{action}' removes {fact}, which does not hold")]
    MissingFact { action: String, fact: String },
    #[error("history persistence failed: {0}")]
    History(#[from] HistoryError),
}

/// Everything recorded about one accepted quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestRecord {
    pub round: usize,
    pub initial_delta: State,
    pub goal: State,
    pub fitness: f64,
    pub actions: ActionTrace,
    /// World state after the quest was committed.
    pub world_state: State,
    pub stats: Vec<GenerationStats>,
}

/// Append-only destination for quest records.
pub trait HistorySink {
    fn append(&mut self, record: &QuestRecord) -> Result<(), HistoryError>;
}

impl HistorySink for Vec<QuestRecord> {
    fn append(&mut self, record: &QuestRecord) -> Result<(), HistoryError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Rewrites the whole history as a JSON array after every round, so a run
/// that dies midway still leaves every completed round on disk.
#[derive(Debug)]
pub struct JsonHistoryFile {
    path: PathBuf,
    records: Vec<QuestRecord>,
}

impl JsonHistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[QuestRecord] {
        &self.records
    }

    /// Read a history file written by a previous run.
    pub fn load(path: &Path) -> Result<Vec<QuestRecord>, HistoryError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl HistorySink for JsonHistoryFile {
    fn append(&mut self, record: &QuestRecord) -> Result<(), HistoryError> {
        self.records.push(record.clone());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Replay a trace's effects onto `state`, in order. Negated effects remove
/// their fact, which must be present; positive effects add theirs if absent.
pub fn apply_trace(
    mut state: State,
    trace: &ActionTrace,
    world: &WorldDefinition,
) -> Result<State, SequencerError> {
    for action in trace {
        let schema = world
            .action(&action.name)
            .ok_or_else(|| SequencerError::UnknownAction(action.name.clone()))?;
        if schema.parameters.len() != action.args.len() {
            return Err(SequencerError::ArityMismatch {
                action: action.name.clone(),
                expected: schema.parameters.len(),
                got: action.args.len(),
            });
        }
        for effect in &schema.effects {
            let fact = schema
                .ground(effect, &action.args)
                .ok_or_else(|| SequencerError::Ungroundable {
                    action: action.name.clone(),
                })?;
            if effect.negated {
                let pos = state.iter().position(|f| *f == fact).ok_or_else(|| {
                    SequencerError::MissingFact {
                        action: action.to_string(),
                        fact: fact.to_string(),
                    }
                })?;
                state.remove(pos);
            } else if !state.contains(&fact) {
                state.push(fact);
            }
        }
    }
    Ok(state)
}

/// Owns the persistent world state and drives quest rounds.
pub struct QuestSequencer<'w, P, C, M, S> {
    world: &'w WorldDefinition,
    bridge: PlanningBridge<'w, P>,
    scorer: TensionScorer,
    generator: QuestGenerator<C, M, S>,
    current_state: State,
    round: usize,
}

impl<'w, P, C, M, S> QuestSequencer<'w, P, C, M, S>
where
    P: Planner,
    C: Crossover,
    M: Mutation,
    S: Selection,
{
    /// Start from the world's initial facts.
    pub fn new(
        world: &'w WorldDefinition,
        planner: P,
        scorer: TensionScorer,
        generator: QuestGenerator<C, M, S>,
    ) -> Self {
        Self {
            world,
            bridge: PlanningBridge::new(world, planner),
            scorer,
            generator,
            current_state: world.initial_state().clone(),
            round: 0,
        }
    }

    /// Resume from a previously committed world state.
    pub fn with_world_state(mut self, state: State) -> Self {
        self.current_state = state;
        self
    }

    pub fn current_state(&self) -> &State {
        &self.current_state
    }

    pub fn rounds_completed(&self) -> usize {
        self.round
    }

    /// Search for a quest, replay its plan, commit the new world state and
    /// append the round to `sink`. On error the world state is unchanged.
    pub fn run_round<H: HistorySink>(
        &mut self,
        sink: &mut H,
        rng: &mut StdRng,
    ) -> Result<QuestRecord, SequencerError> {
        let outcome = {
            let oracle = PlanningOracle::new(&self.bridge, &self.scorer, &self.current_state);
            self.generator.run(self.world, &oracle, rng)?
        };
        let best = outcome.best;

        let trace = self.bridge.plan(&self.current_state, &best);
        if trace.is_empty() {
            warn!(round = self.round, "committing quest without a plan");
        }
        let start = overlay(&self.current_state, &best.initial_delta, self.world);
        let next_state = apply_trace(start, &trace, self.world)?;

        let record = QuestRecord {
            round: self.round + 1,
            initial_delta: best.initial_delta,
            goal: best.goal,
            fitness: best.fitness.unwrap_or(0.0),
            actions: trace,
            world_state: next_state,
            stats: outcome.stats,
        };
        sink.append(&record)?;
        self.current_state = record.world_state.clone();
        self.round = record.round;
        info!(
            round = record.round,
            fitness = record.fitness,
            actions = record.actions.len(),
            facts = record.world_state.len(),
            "quest committed"
        );
        Ok(record)
    }

    /// Run `n_quests` rounds back to back, stopping at the first error.
    pub fn run<H: HistorySink>(
        &mut self,
        n_quests: usize,
        sink: &mut H,
        rng: &mut StdRng,
    ) -> Result<Vec<QuestRecord>, SequencerError> {
        let mut records = Vec::with_capacity(n_quests);
        for _ in 0..n_quests {
            records.push(self.run_round(sink, rng)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fact::Fact;
    use crate::schema::trace::GroundedAction;

    const WORLD: &str = r#"World(
        objects: [
            (name: "hero", kind: "person"),
            (name: "tavern", kind: "place"),
            (name: "forest", kind: "place"),
        ],
        relations: [(predicate: "at", args: ["hero", "tavern"])],
        predicates: [(name: "at", parameters: [(kind: "person", unique: true), (kind: "place")])],
        operators: [(
            name: "travel",
            parameters: [(name: "p", kind: "person"), (name: "from", kind: "place"), (name: "to", kind: "place")],
            preconditions: [(predicate: "at", args: ["p", "from"])],
            effects: [
                (predicate: "at", args: ["p", "from"], negated: true),
                (predicate: "at", args: ["p", "to"]),
            ],
        )],
    )"#;

    fn world() -> WorldDefinition {
        WorldDefinition::parse_ron(WORLD).unwrap()
    }

    #[test]
    fn apply_trace_replays_effects_in_order() {
        let world = world();
        let trace = vec![
            GroundedAction::new("travel", ["hero", "tavern", "forest"]),
            GroundedAction::new("travel", ["hero", "forest", "tavern"]),
            GroundedAction::new("travel", ["hero", "tavern", "forest"]),
        ];
        let state = apply_trace(world.initial_state().clone(), &trace, &world).unwrap();
        assert_eq!(state, vec![Fact::new("at", ["hero", "forest"])]);
    }

    #[test]
    fn removing_an_absent_fact_is_fatal() {
        let world = world();
        let trace = vec![GroundedAction::new("travel", ["hero", "forest", "tavern"])];
        assert!(matches!(
            apply_trace(world.initial_state().clone(), &trace, &world),
            Err(SequencerError::MissingFact { fact, .. }) if fact == "(at hero forest)"
        ));
    }

    #[test]
    fn unknown_action_and_bad_arity_are_fatal() {
        let world = world();
        let unknown = vec![GroundedAction::new("fly", ["hero"])];
        assert!(matches!(
            apply_trace(Vec::new(), &unknown, &world),
            Err(SequencerError::UnknownAction(name)) if name == "fly"
        ));
        let short = vec![GroundedAction::new("travel", ["hero", "tavern"])];
        assert!(matches!(
            apply_trace(Vec::new(), &short, &world),
            Err(SequencerError::ArityMismatch { expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn empty_trace_leaves_state_untouched() {
        let world = world();
        let state = apply_trace(world.initial_state().clone(), &Vec::new(), &world).unwrap();
        assert_eq!(&state, world.initial_state());
    }

    #[test]
    fn json_history_rewrites_every_round() {
        let dir = std::env::temp_dir().join(format!("quest-engine-history-{}", uuid::Uuid::new_v4()));
        let path = dir.join("history.json");
        let mut sink = JsonHistoryFile::new(&path);
        let record = QuestRecord {
            round: 1,
            initial_delta: vec![],
            goal: vec![Fact::new("at", ["hero", "forest"])],
            fitness: 1.5,
            actions: vec![GroundedAction::new("travel", ["hero", "tavern", "forest"])],
            world_state: vec![Fact::new("at", ["hero", "forest"])],
            stats: vec![],
        };
        sink.append(&record).unwrap();
        assert_eq!(JsonHistoryFile::load(&path).unwrap(), vec![record.clone()]);

        let second = QuestRecord { round: 2, ..record.clone() };
        sink.append(&second).unwrap();
        let loaded = JsonHistoryFile::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].round, 2);
        assert_eq!(sink.records().len(), 2);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

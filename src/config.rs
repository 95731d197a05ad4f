/// Run configuration — the RON document that drives a quest run.
///
/// Example:
///
/// ```ron
/// RunConfig(
///     parser_args: (world_path: "world_data/tavern/world.ron"),
///     world_model_args: (initial_state_n: 6, final_state_n: 3, best_pattern: [1, 1, 1, -1]),
///     quest_generator_args: (
///         population_size: 20, epochs: 10, tournament_size: 3,
///         crossover_probability: 0.5, mutation_probability: 0.2, hall_of_fame_size: 10,
///     ),
///     planner_args: (binary: "./hsp-planners/hsp2-1.0/bin/hsp2", time_limit: 5000),
///     n_quests: 3,
///     path: "history.json",
///     seed: Some(42),
/// )
/// ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::evolution::{EvolutionError, QuestGenerator, SearchParams};
use crate::core::planning::{HspPlanner, DEFAULT_SEARCH, DEFAULT_TIME_LIMIT};
use crate::core::tension::{TensionError, TensionScorer, DEFAULT_PATTERN};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("search parameters: {0}")]
    Search(#[from] EvolutionError),
    #[error("tension pattern: {0}")]
    Tension(#[from] TensionError),
}

/// Where the world definition comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserArgs {
    pub world_path: PathBuf,
}

fn default_pattern() -> Vec<i64> {
    DEFAULT_PATTERN.to_vec()
}

/// Candidate sampling bounds and the target tension arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldModelArgs {
    /// Upper bound on sampled initial-delta length.
    pub initial_state_n: usize,
    /// Upper bound on sampled goal length.
    pub final_state_n: usize,
    #[serde(default = "default_pattern")]
    pub best_pattern: Vec<i64>,
}

fn default_binary() -> PathBuf {
    PathBuf::from("./hsp-planners/hsp2-1.0/bin/hsp2")
}

fn default_search() -> String {
    DEFAULT_SEARCH.to_string()
}

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerArgs {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_search")]
    pub search: String,
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

impl Default for PlannerArgs {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            search: default_search(),
            time_limit: default_time_limit(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "RunConfig")]
pub struct RunConfig {
    pub parser_args: ParserArgs,
    pub world_model_args: WorldModelArgs,
    pub quest_generator_args: SearchParams,
    #[serde(default)]
    pub planner_args: PlannerArgs,
    pub n_quests: usize,
    /// History output file.
    pub path: PathBuf,
    /// Seed for the run RNG; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl RunConfig {
    /// Load and validate a run configuration from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<RunConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a run configuration from a RON string.
    pub fn parse_ron(input: &str) -> Result<RunConfig, ConfigError> {
        let config: RunConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generator()?;
        self.scorer()?;
        Ok(())
    }

    pub fn generator(&self) -> Result<QuestGenerator, ConfigError> {
        Ok(QuestGenerator::new(
            self.quest_generator_args.clone(),
            self.world_model_args.initial_state_n,
            self.world_model_args.final_state_n,
        )?)
    }

    pub fn scorer(&self) -> Result<TensionScorer, ConfigError> {
        Ok(TensionScorer::new(&self.world_model_args.best_pattern)?)
    }

    /// The run RNG: seeded when `seed` is set, from entropy otherwise.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn planner(&self) -> HspPlanner {
        HspPlanner::new(&self.planner_args.binary)
            .search(&self.planner_args.search)
            .time_limit(self.planner_args.time_limit)
            .tmp_dir(&self.planner_args.tmp_dir)
    }
}

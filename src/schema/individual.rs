use serde::{Deserialize, Serialize};

use super::fact::State;

/// A quest candidate: facts hypothesised to already hold on top of the
/// persistent world state, and facts the quest should bring about.
///
/// Fitness is computed lazily and cached; any edit to either state must
/// clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub initial_delta: State,
    pub goal: State,
    #[serde(default)]
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(initial_delta: State, goal: State) -> Self {
        Self {
            initial_delta,
            goal,
            fitness: None,
        }
    }

    /// Cached fitness, or 0.0 if the individual was never evaluated.
    pub fn fitness_or_zero(&self) -> f64 {
        self.fitness.unwrap_or(0.0)
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// Drop the cached fitness so the next evaluation pass recomputes it.
    pub fn invalidate(&mut self) {
        self.fitness = None;
    }
}

/// Evolutionary search loop — generational GA over quest candidates.
///
/// One run is a small state machine:
/// `Init → {Evaluate → Select → Vary → Evaluate …} × epochs → Finalize`.
/// Selection, crossover and mutation are injected strategies; fitness
/// comes from a [`FitnessOracle`]. Given the same RNG stream and a
/// deterministic oracle, a run is fully reproducible.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::operators::{
    Crossover, DeltaMutation, Mutation, Selection, SplicingCrossover, TournamentSelection,
};
use crate::core::planning::{PlanningBridge, Planner};
use crate::core::state::sample_individual;
use crate::core::tension::TensionScorer;
use crate::schema::fact::Fact;
use crate::schema::individual::Individual;
use crate::schema::world::{WorldDefinition, WorldError};

#[derive(Debug, Error)]
pub enum EvolutionError {
    #[error("world error: {0}")]
    World(#[from] WorldError),
    #[error("invalid search parameters: {0}")]
    InvalidParams(String),
    #[error("search finished with an empty hall of fame")]
    EmptyHallOfFame,
}

fn default_hall_of_fame_size() -> usize {
    10
}

/// Knobs of the generational loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub population_size: usize,
    pub epochs: usize,
    pub tournament_size: usize,
    pub crossover_probability: f64,
    pub mutation_probability: f64,
    #[serde(default = "default_hall_of_fame_size")]
    pub hall_of_fame_size: usize,
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size == 0 {
            return Err(EvolutionError::InvalidParams(
                "population_size must be at least 1".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(EvolutionError::InvalidParams(
                "tournament_size must be at least 1".to_string(),
            ));
        }
        if self.hall_of_fame_size == 0 {
            return Err(EvolutionError::InvalidParams(
                "hall_of_fame_size must be at least 1".to_string(),
            ));
        }
        for (name, p) in [
            ("crossover_probability", self.crossover_probability),
            ("mutation_probability", self.mutation_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(EvolutionError::InvalidParams(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

/// Computes fitness for one individual.
pub trait FitnessOracle {
    fn evaluate(&self, individual: &Individual) -> f64;
}

/// Fitness from planning against a fixed world state and scoring the
/// resulting trace by tension.
pub struct PlanningOracle<'a, 'w, P> {
    bridge: &'a PlanningBridge<'w, P>,
    scorer: &'a TensionScorer,
    world_state: &'a [Fact],
}

impl<'a, 'w, P: Planner> PlanningOracle<'a, 'w, P> {
    pub fn new(
        bridge: &'a PlanningBridge<'w, P>,
        scorer: &'a TensionScorer,
        world_state: &'a [Fact],
    ) -> Self {
        Self {
            bridge,
            scorer,
            world_state,
        }
    }
}

impl<P: Planner> FitnessOracle for PlanningOracle<'_, '_, P> {
    fn evaluate(&self, individual: &Individual) -> f64 {
        let trace = self.bridge.plan(self.world_state, individual);
        self.scorer.score(&trace, self.bridge.world())
    }
}

/// Fitness summary of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    /// Individuals evaluated this generation (cache misses).
    pub evaluations: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Wall time since the start of the run.
    pub elapsed_secs: f64,
}

impl GenerationStats {
    fn compute(
        generation: usize,
        evaluations: usize,
        population: &[Individual],
        elapsed_secs: f64,
    ) -> Self {
        let values: Vec<f64> = population.iter().map(Individual::fitness_or_zero).collect();
        if values.is_empty() {
            return Self {
                generation,
                evaluations,
                mean: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                elapsed_secs,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            generation,
            evaluations,
            mean,
            std_dev: variance.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            elapsed_secs,
        }
    }
}

/// Best distinct individuals seen during a run, sorted by descending
/// fitness. Among equal fitness, earlier arrivals stay ahead.
#[derive(Debug, Clone)]
pub struct HallOfFame {
    capacity: usize,
    members: Vec<Individual>,
}

impl HallOfFame {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: Vec::with_capacity(capacity),
        }
    }

    /// Merge a population in, keeping at most `capacity` members. A
    /// candidate with the same states as a member is skipped.
    pub fn update(&mut self, population: &[Individual]) {
        for candidate in population {
            if self.contains(candidate) {
                continue;
            }
            let fitness = candidate.fitness_or_zero();
            if self.members.len() >= self.capacity {
                match self.members.last() {
                    Some(worst) if fitness > worst.fitness_or_zero() => {
                        self.members.pop();
                    }
                    _ => continue,
                }
            }
            let pos = self
                .members
                .iter()
                .position(|m| m.fitness_or_zero() < fitness)
                .unwrap_or(self.members.len());
            self.members.insert(pos, candidate.clone());
        }
    }

    fn contains(&self, candidate: &Individual) -> bool {
        self.members
            .iter()
            .any(|m| m.initial_delta == candidate.initial_delta && m.goal == candidate.goal)
    }

    pub fn best(&self) -> Option<&Individual> {
        self.members.first()
    }

    pub fn members(&self) -> &[Individual] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of one search run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best: Individual,
    pub hall_of_fame: HallOfFame,
    /// One entry for the initial population and one per epoch.
    pub stats: Vec<GenerationStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Evaluate,
    Select,
    Vary,
    Finalize,
}

/// The generational loop with pluggable variation and selection.
#[derive(Debug, Clone)]
pub struct QuestGenerator<C = SplicingCrossover, M = DeltaMutation, S = TournamentSelection> {
    params: SearchParams,
    initial_state_n: usize,
    final_state_n: usize,
    crossover: C,
    mutation: M,
    selection: S,
}

impl QuestGenerator {
    /// A generator with the default operators: splicing crossover, delta
    /// mutation and tournament selection.
    pub fn new(
        params: SearchParams,
        initial_state_n: usize,
        final_state_n: usize,
    ) -> Result<Self, EvolutionError> {
        params.validate()?;
        if initial_state_n == 0 || final_state_n == 0 {
            return Err(EvolutionError::InvalidParams(
                "state lengths must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            selection: TournamentSelection {
                tournament_size: params.tournament_size,
            },
            params,
            initial_state_n,
            final_state_n,
            crossover: SplicingCrossover,
            mutation: DeltaMutation,
        })
    }
}

impl<C: Crossover, M: Mutation, S: Selection> QuestGenerator<C, M, S> {
    /// Swap in different strategies, keeping the parameters.
    pub fn with_strategies<C2, M2, S2>(
        self,
        crossover: C2,
        mutation: M2,
        selection: S2,
    ) -> QuestGenerator<C2, M2, S2> {
        QuestGenerator {
            params: self.params,
            initial_state_n: self.initial_state_n,
            final_state_n: self.final_state_n,
            crossover,
            mutation,
            selection,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Run the full search and return the best individual ever seen.
    pub fn run<O: FitnessOracle>(
        &self,
        world: &WorldDefinition,
        oracle: &O,
        rng: &mut StdRng,
    ) -> Result<SearchOutcome, EvolutionError> {
        let started = Instant::now();
        let mut phase = Phase::Init;
        let mut population: Vec<Individual> = Vec::new();
        let mut pool: Vec<Individual> = Vec::new();
        let mut generation = 0;
        let mut hall_of_fame = HallOfFame::new(self.params.hall_of_fame_size);
        let mut stats = Vec::with_capacity(self.params.epochs + 1);

        while phase != Phase::Finalize {
            phase = match phase {
                Phase::Init => {
                    population = self.initial_population(world, rng)?;
                    Phase::Evaluate
                }
                Phase::Evaluate => {
                    let evaluations = evaluate(&mut population, oracle);
                    hall_of_fame.update(&population);
                    let record = GenerationStats::compute(
                        generation,
                        evaluations,
                        &population,
                        started.elapsed().as_secs_f64(),
                    );
                    info!(
                        generation,
                        evaluations,
                        mean = record.mean,
                        max = record.max,
                        elapsed_secs = record.elapsed_secs,
                        "generation evaluated"
                    );
                    stats.push(record);
                    if generation >= self.params.epochs {
                        Phase::Finalize
                    } else {
                        generation += 1;
                        Phase::Select
                    }
                }
                Phase::Select => {
                    pool = self
                        .selection
                        .select(&population, self.params.population_size, rng);
                    Phase::Vary
                }
                Phase::Vary => {
                    population = self.vary(std::mem::take(&mut pool), world, rng)?;
                    Phase::Evaluate
                }
                Phase::Finalize => Phase::Finalize,
            };
        }

        let best = hall_of_fame
            .best()
            .cloned()
            .ok_or(EvolutionError::EmptyHallOfFame)?;
        debug!(
            fitness = best.fitness_or_zero(),
            hall_of_fame = hall_of_fame.len(),
            "search finished"
        );
        Ok(SearchOutcome {
            best,
            hall_of_fame,
            stats,
        })
    }

    fn initial_population(
        &self,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> Result<Vec<Individual>, EvolutionError> {
        let mut population = Vec::with_capacity(self.params.population_size);
        for _ in 0..self.params.population_size {
            population.push(sample_individual(
                world,
                self.initial_state_n,
                self.final_state_n,
                rng,
            )?);
        }
        Ok(population)
    }

    /// Crossover on consecutive pairs, then independent mutation of every
    /// offspring. Both operators return unevaluated individuals.
    fn vary(
        &self,
        mut offspring: Vec<Individual>,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> Result<Vec<Individual>, EvolutionError> {
        for i in (1..offspring.len()).step_by(2) {
            if rng.gen::<f64>() < self.params.crossover_probability {
                let (a, b) = self
                    .crossover
                    .crossover(&offspring[i - 1], &offspring[i], world, rng);
                offspring[i - 1] = a;
                offspring[i] = b;
            }
        }
        for i in 0..offspring.len() {
            if rng.gen::<f64>() < self.params.mutation_probability {
                offspring[i] = self.mutation.mutate(&offspring[i], world, rng)?;
            }
        }
        Ok(offspring)
    }
}

/// Evaluate every individual without a cached fitness. Returns how many
/// were evaluated.
fn evaluate<O: FitnessOracle>(population: &mut [Individual], oracle: &O) -> usize {
    let mut evaluations = 0;
    for individual in population.iter_mut().filter(|i| !i.is_evaluated()) {
        individual.fitness = Some(oracle.evaluate(individual));
        evaluations += 1;
    }
    evaluations
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::cell::Cell;

    const WORLD: &str = r#"World(
        objects: [(name: "hero", kind: "person"), (name: "rival", kind: "person")],
        predicates: [(name: "angry", parameters: [(kind: "person")])],
        operators: [(
            name: "provoke",
            parameters: [(name: "p", kind: "person")],
            effects: [(predicate: "angry", args: ["p"])],
        )],
        tension: { "provoke": Rise },
    )"#;

    /// Fitness = number of goal facts, counting calls.
    struct GoalSize {
        calls: Cell<usize>,
    }

    impl FitnessOracle for GoalSize {
        fn evaluate(&self, individual: &Individual) -> f64 {
            self.calls.set(self.calls.get() + 1);
            individual.goal.len() as f64
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            population_size: 6,
            epochs: 3,
            tournament_size: 2,
            crossover_probability: 0.5,
            mutation_probability: 0.3,
            hall_of_fame_size: 3,
        }
    }

    fn scored(fitness: f64, tag: &str) -> Individual {
        let mut ind = Individual::new(vec![Fact::new(tag, Vec::<String>::new())], vec![]);
        ind.fitness = Some(fitness);
        ind
    }

    #[test]
    fn hall_of_fame_keeps_best_sorted() {
        let mut hof = HallOfFame::new(2);
        hof.update(&[scored(1.0, "a"), scored(3.0, "b"), scored(2.0, "c")]);
        let fitness: Vec<f64> = hof.members().iter().map(Individual::fitness_or_zero).collect();
        assert_eq!(fitness, vec![3.0, 2.0]);
        hof.update(&[scored(0.5, "d")]);
        assert_eq!(hof.len(), 2);
        assert_eq!(hof.best().unwrap().fitness, Some(3.0));
    }

    #[test]
    fn hall_of_fame_ties_keep_earlier_discovery() {
        let mut hof = HallOfFame::new(2);
        hof.update(&[scored(2.0, "first")]);
        hof.update(&[scored(2.0, "second"), scored(2.0, "third")]);
        let names: Vec<&str> = hof
            .members()
            .iter()
            .map(|i| i.initial_delta[0].name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn hall_of_fame_skips_repeated_individuals() {
        let mut hof = HallOfFame::new(3);
        let elite = scored(4.0, "elite");
        hof.update(&[elite.clone()]);
        hof.update(&[elite.clone(), elite.clone()]);
        assert_eq!(hof.len(), 1);

        let mut rescored = elite.clone();
        rescored.fitness = Some(9.0);
        hof.update(&[rescored, scored(1.0, "other")]);
        assert_eq!(hof.len(), 2);
        assert_eq!(hof.best(), Some(&elite));
    }

    #[test]
    fn stats_use_population_deviation() {
        let population = vec![scored(1.0, "a"), scored(3.0, "b")];
        let stats = GenerationStats::compute(0, 2, &population, 0.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.std_dev, 1.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
    }

    #[test]
    fn evaluate_only_scores_uncached_individuals() {
        let oracle = GoalSize { calls: Cell::new(0) };
        let mut population = vec![scored(7.0, "cached"), Individual::new(vec![], vec![])];
        assert_eq!(evaluate(&mut population, &oracle), 1);
        assert_eq!(oracle.calls.get(), 1);
        assert_eq!(population[0].fitness, Some(7.0));
        assert_eq!(population[1].fitness, Some(0.0));
    }

    #[test]
    fn run_records_initial_generation_and_every_epoch() {
        let world = WorldDefinition::parse_ron(WORLD).unwrap();
        let generator = QuestGenerator::new(params(), 3, 3).unwrap();
        let oracle = GoalSize { calls: Cell::new(0) };
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = generator.run(&world, &oracle, &mut rng).unwrap();

        assert_eq!(outcome.stats.len(), 4);
        for (i, s) in outcome.stats.iter().enumerate() {
            assert_eq!(s.generation, i);
            assert!(s.min <= s.mean && s.mean <= s.max);
        }
        assert_eq!(outcome.stats[0].evaluations, 6);
        let total: usize = outcome.stats.iter().map(|s| s.evaluations).sum();
        assert_eq!(total, oracle.calls.get());
    }

    #[test]
    fn best_is_at_least_as_fit_as_every_generation() {
        let world = WorldDefinition::parse_ron(WORLD).unwrap();
        let generator = QuestGenerator::new(params(), 3, 3).unwrap();
        let oracle = GoalSize { calls: Cell::new(0) };
        let mut rng = StdRng::seed_from_u64(9);
        let outcome = generator.run(&world, &oracle, &mut rng).unwrap();
        let best = outcome.best.fitness_or_zero();
        assert!(outcome.stats.iter().all(|s| s.max <= best));
        assert!(outcome.hall_of_fame.len() <= 3);
        assert_eq!(outcome.hall_of_fame.best(), Some(&outcome.best));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut p = params();
        p.population_size = 0;
        assert!(QuestGenerator::new(p, 3, 3).is_err());

        let mut p = params();
        p.crossover_probability = 1.5;
        assert!(matches!(p.validate(), Err(EvolutionError::InvalidParams(_))));

        assert!(QuestGenerator::new(params(), 0, 3).is_err());
    }

    #[test]
    fn hall_of_fame_size_defaults_to_ten() {
        let p: SearchParams = ron::from_str(
            "(population_size: 4, epochs: 1, tournament_size: 2, crossover_probability: 0.5, mutation_probability: 0.2)",
        )
        .unwrap();
        assert_eq!(p.hall_of_fame_size, 10);
    }
}

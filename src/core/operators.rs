/// Genome operators — crossover, mutation and selection strategies.
///
/// The search loop only sees the three traits below, so any strategy can be
/// swapped in. The default implementations splice and perturb the two fact
/// sequences of an individual and repair the result.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::state::{repair_individual, sample_fact};
use crate::schema::fact::{Fact, State};
use crate::schema::individual::Individual;
use crate::schema::world::{WorldDefinition, WorldError};

/// Removal fires below this draw.
const REMOVE_BELOW: f64 = 2.0 / 3.0;
/// Addition fires above this draw. Overlaps with removal: a draw in
/// `(1/3, 2/3)` replaces an element.
const ADD_ABOVE: f64 = 1.0 / 3.0;

/// Recombines two parents into two children.
pub trait Crossover {
    fn crossover(
        &self,
        a: &Individual,
        b: &Individual,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> (Individual, Individual);
}

/// Produces a perturbed copy of an individual.
pub trait Mutation {
    fn mutate(
        &self,
        individual: &Individual,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> Result<Individual, WorldError>;
}

/// Picks `k` parents (with replacement) from an evaluated population.
pub trait Selection {
    fn select(&self, population: &[Individual], k: usize, rng: &mut StdRng) -> Vec<Individual>;
}

/// Single-point crossover on each chromosome, with independent cut points.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplicingCrossover;

impl Crossover for SplicingCrossover {
    fn crossover(
        &self,
        a: &Individual,
        b: &Individual,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> (Individual, Individual) {
        let (first, second) = splice(a, b, rng);
        (
            repair_individual(&first, world),
            repair_individual(&second, world),
        )
    }
}

/// Remove, add or replace one fact in one chromosome.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaMutation;

impl Mutation for DeltaMutation {
    fn mutate(
        &self,
        individual: &Individual,
        world: &WorldDefinition,
        rng: &mut StdRng,
    ) -> Result<Individual, WorldError> {
        let mutant = perturb(individual, rng, |rng| sample_fact(world, rng))?;
        Ok(repair_individual(&mutant, world))
    }
}

/// Tournament selection: each pick is the fittest of `tournament_size`
/// uniformly drawn aspirants. The first aspirant wins ties.
#[derive(Debug, Clone, Copy)]
pub struct TournamentSelection {
    pub tournament_size: usize,
}

impl Selection for TournamentSelection {
    fn select(&self, population: &[Individual], k: usize, rng: &mut StdRng) -> Vec<Individual> {
        let mut chosen = Vec::with_capacity(k);
        for _ in 0..k {
            let mut winner: Option<&Individual> = None;
            for _ in 0..self.tournament_size.max(1) {
                let Some(aspirant) = population.choose(rng) else {
                    return chosen;
                };
                if winner.map_or(true, |w| aspirant.fitness_or_zero() > w.fitness_or_zero()) {
                    winner = Some(aspirant);
                }
            }
            if let Some(winner) = winner {
                chosen.push(winner.clone());
            }
        }
        chosen
    }
}

/// Cut point in `[1, len]`, or 0 for an empty chromosome.
fn cut_point(len: usize, rng: &mut StdRng) -> usize {
    if len == 0 {
        0
    } else {
        rng.gen_range(1..=len)
    }
}

fn join(head: &[Fact], tail: &[Fact]) -> State {
    let mut state = Vec::with_capacity(head.len() + tail.len());
    state.extend_from_slice(head);
    state.extend_from_slice(tail);
    state
}

/// Unrepaired single-point crossover. Every fact of the parents ends up in
/// exactly one child, per chromosome.
pub fn splice(a: &Individual, b: &Individual, rng: &mut StdRng) -> (Individual, Individual) {
    let ia = cut_point(a.initial_delta.len(), rng);
    let ib = cut_point(b.initial_delta.len(), rng);
    let ga = cut_point(a.goal.len(), rng);
    let gb = cut_point(b.goal.len(), rng);

    (
        Individual::new(
            join(&a.initial_delta[..ia], &b.initial_delta[ib..]),
            join(&a.goal[..ga], &b.goal[gb..]),
        ),
        Individual::new(
            join(&b.initial_delta[..ib], &a.initial_delta[ia..]),
            join(&b.goal[..gb], &a.goal[ga..]),
        ),
    )
}

/// Unrepaired mutation of a copy of `individual`, drawing new facts from
/// `sample`. One chromosome is picked at random; a removal never empties
/// it unless an addition refills it.
pub fn perturb<F, E>(individual: &Individual, rng: &mut StdRng, mut sample: F) -> Result<Individual, E>
where
    F: FnMut(&mut StdRng) -> Result<Fact, E>,
{
    let mut mutant = Individual::new(individual.initial_delta.clone(), individual.goal.clone());
    let mutate_initial = rng.gen::<f64>() < 0.5;
    let x = rng.gen::<f64>();
    let remove = x < REMOVE_BELOW;
    let add = x > ADD_ABOVE;

    let chromosome = if mutate_initial {
        &mut mutant.initial_delta
    } else {
        &mut mutant.goal
    };

    if remove && !chromosome.is_empty() && (chromosome.len() > 1 || add) {
        let idx = rng.gen_range(0..chromosome.len());
        chromosome.remove(idx);
    }
    if add {
        chromosome.push(sample(rng)?);
    }

    Ok(mutant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::convert::Infallible;

    fn letters(names: &[&str]) -> State {
        names
            .iter()
            .map(|n| Fact::new(n, Vec::<String>::new()))
            .collect()
    }

    fn sorted(mut state: State) -> State {
        state.sort();
        state
    }

    #[test]
    fn splice_conserves_facts_per_chromosome() {
        let a = Individual::new(letters(&["a", "b", "c"]), letters(&["c", "d"]));
        let b = Individual::new(letters(&["x", "y"]), letters(&["z", "y"]));
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (c, d) = splice(&a, &b, &mut rng);
            assert_eq!(
                sorted(join(&c.initial_delta, &d.initial_delta)),
                sorted(join(&a.initial_delta, &b.initial_delta))
            );
            assert_eq!(
                sorted(join(&c.goal, &d.goal)),
                sorted(join(&a.goal, &b.goal))
            );
        }
    }

    #[test]
    fn splice_children_start_with_parent_prefix() {
        let a = Individual::new(letters(&["a", "b", "c"]), letters(&["c", "d"]));
        let b = Individual::new(letters(&["x", "y"]), letters(&["z", "y"]));
        let mut rng = StdRng::seed_from_u64(13);
        let (c, d) = splice(&a, &b, &mut rng);
        assert_eq!(c.initial_delta[0], a.initial_delta[0]);
        assert_eq!(d.initial_delta[0], b.initial_delta[0]);
        assert_eq!(c.goal[0], a.goal[0]);
        assert_eq!(d.goal[0], b.goal[0]);
    }

    #[test]
    fn perturb_drifts_by_at_most_one_in_one_chromosome() {
        let a = Individual::new(letters(&["a", "b", "c"]), letters(&["c", "d"]));
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let b = perturb(&a, &mut rng, |_| Ok::<_, Infallible>(Fact::new("a", Vec::<String>::new())))
                .unwrap();
            assert!(a.initial_delta == b.initial_delta || a.goal == b.goal);
            assert!(a.initial_delta.len().abs_diff(b.initial_delta.len()) <= 1);
            assert!(a.goal.len().abs_diff(b.goal.len()) <= 1);
            let initial_changed = a.initial_delta.len() != b.initial_delta.len();
            let goal_changed = a.goal.len() != b.goal.len();
            assert!(!(initial_changed && goal_changed));
        }
    }

    #[test]
    fn perturb_never_empties_a_chromosome() {
        let a = Individual::new(letters(&["a"]), letters(&["b"]));
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let b = perturb(&a, &mut rng, |_| Ok::<_, Infallible>(Fact::new("n", Vec::<String>::new())))
                .unwrap();
            assert!(!b.initial_delta.is_empty());
            assert!(!b.goal.is_empty());
        }
    }

    #[test]
    fn perturb_leaves_the_original_untouched() {
        let a = Individual::new(letters(&["a", "b"]), letters(&["c"]));
        let before = a.clone();
        let mut rng = StdRng::seed_from_u64(5);
        let _ = perturb(&a, &mut rng, |_| Ok::<_, Infallible>(Fact::new("n", Vec::<String>::new())));
        assert_eq!(a, before);
    }

    #[test]
    fn perturb_propagates_sampler_errors() {
        let a = Individual::new(letters(&["a", "b"]), letters(&["c", "d"]));
        let mut failed = false;
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            if perturb(&a, &mut rng, |_| Err("no objects")).is_err() {
                failed = true;
            }
        }
        assert!(failed, "Expected at least one addition to hit the failing sampler");
    }

    #[test]
    fn tournament_prefers_fitter_individuals() {
        let mut weak = Individual::new(letters(&["w"]), letters(&["w"]));
        weak.fitness = Some(0.0);
        let mut strong = Individual::new(letters(&["s"]), letters(&["s"]));
        strong.fitness = Some(5.0);
        let population = vec![weak, strong.clone()];

        let selection = TournamentSelection { tournament_size: 8 };
        let mut rng = StdRng::seed_from_u64(1);
        let pool = selection.select(&population, 50, &mut rng);
        assert_eq!(pool.len(), 50);
        let strong_count = pool.iter().filter(|i| **i == strong).count();
        assert!(strong_count >= 45, "Expected mostly strong picks, got {}", strong_count);
    }

    #[test]
    fn tournament_on_empty_population_selects_nothing() {
        let selection = TournamentSelection { tournament_size: 3 };
        let mut rng = StdRng::seed_from_u64(1);
        assert!(selection.select(&[], 4, &mut rng).is_empty());
    }
}

/// State model — fact sampling and predicate-conflict repair.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rustc_hash::FxHashSet;

use crate::schema::fact::{Fact, State};
use crate::schema::individual::Individual;
use crate::schema::world::{WorldDefinition, WorldError};

/// Sample one fact: a uniformly chosen predicate schema filled with
/// uniformly chosen objects of the required types.
pub fn sample_fact(world: &WorldDefinition, rng: &mut StdRng) -> Result<Fact, WorldError> {
    let schema = world
        .predicates()
        .choose(rng)
        .ok_or(WorldError::NoPredicates)?;

    let mut args = Vec::with_capacity(schema.parameters.len());
    for parameter in &schema.parameters {
        let object = world
            .objects_of(&parameter.kind)
            .choose(rng)
            .ok_or_else(|| WorldError::EmptyTypePool {
                predicate: schema.name.clone(),
                kind: parameter.kind.clone(),
            })?;
        args.push(object.clone());
    }

    Ok(Fact {
        name: schema.name.clone(),
        args,
    })
}

/// Sample between 1 and `n_max` independent facts. Duplicates and
/// conflicts are possible until the state is repaired.
pub fn sample_state(
    world: &WorldDefinition,
    n_max: usize,
    rng: &mut StdRng,
) -> Result<State, WorldError> {
    let n = rng.gen_range(1..=n_max.max(1));
    let mut state = Vec::with_capacity(n);
    for _ in 0..n {
        state.push(sample_fact(world, rng)?);
    }
    Ok(state)
}

/// Sample a repaired individual.
pub fn sample_individual(
    world: &WorldDefinition,
    initial_state_n: usize,
    final_state_n: usize,
    rng: &mut StdRng,
) -> Result<Individual, WorldError> {
    let initial_delta = sample_state(world, initial_state_n, rng)?;
    let goal = sample_state(world, final_state_n, rng)?;
    Ok(repair_individual(&Individual::new(initial_delta, goal), world))
}

/// Remove duplicates and semantic conflicts from a state.
///
/// Single greedy pass in order; earlier facts always win. A fact is dropped
/// when the same fact was already kept, when its declared opposite was kept
/// with the same arguments, or when one of its unique parameter positions is
/// already bound to the same object by a kept fact of the same signature.
/// Facts without a schema are kept unconditionally.
pub fn repair(state: &[Fact], world: &WorldDefinition) -> State {
    let mut kept = Vec::with_capacity(state.len());
    let mut present: FxHashSet<(&str, &[String])> = FxHashSet::default();
    let mut bound: FxHashSet<(String, usize, &str)> = FxHashSet::default();

    for fact in state {
        let Some(signature) = world.signature_of(fact) else {
            kept.push(fact.clone());
            continue;
        };
        let Some(schema) = world.predicate(&signature) else {
            kept.push(fact.clone());
            continue;
        };

        if present.contains(&(fact.name.as_str(), fact.args.as_slice())) {
            continue;
        }
        if let Some(opposite) = schema.opposite.as_deref() {
            if present.contains(&(opposite, fact.args.as_slice())) {
                continue;
            }
        }
        let unique_positions: Vec<usize> = schema
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.unique)
            .map(|(i, _)| i)
            .collect();
        let taken = unique_positions.iter().any(|&i| {
            fact.args
                .get(i)
                .is_some_and(|object| bound.contains(&(signature.clone(), i, object.as_str())))
        });
        if taken {
            continue;
        }

        present.insert((fact.name.as_str(), fact.args.as_slice()));
        for &i in &unique_positions {
            if let Some(object) = fact.args.get(i) {
                bound.insert((signature.clone(), i, object.as_str()));
            }
        }
        kept.push(fact.clone());
    }

    kept
}

/// Repair both states of an individual. The result is unevaluated.
pub fn repair_individual(individual: &Individual, world: &WorldDefinition) -> Individual {
    Individual::new(
        repair(&individual.initial_delta, world),
        repair(&individual.goal, world),
    )
}

/// The state a quest starts from: the world state extended by the
/// individual's hypothesised delta, repaired. The world state wins ties.
pub fn overlay(world_state: &[Fact], delta: &[Fact], world: &WorldDefinition) -> State {
    let mut combined = Vec::with_capacity(world_state.len() + delta.len());
    combined.extend_from_slice(world_state);
    combined.extend_from_slice(delta);
    repair(&combined, world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rustc_hash::FxHashMap;

    use crate::schema::world::{Object, ParameterSpec, PredicateSchema};

    fn make_world() -> WorldDefinition {
        let objects = ["x", "y"]
            .iter()
            .map(|n| Object {
                name: n.to_string(),
                kind: "object".to_string(),
            })
            .chain(["room1", "room2", "room3"].iter().map(|n| Object {
                name: n.to_string(),
                kind: "location".to_string(),
            }))
            .collect();
        let predicates = vec![
            PredicateSchema {
                name: "at".to_string(),
                parameters: vec![
                    ParameterSpec {
                        kind: "object".to_string(),
                        unique: true,
                    },
                    ParameterSpec {
                        kind: "location".to_string(),
                        unique: false,
                    },
                ],
                opposite: Some("not_at".to_string()),
            },
            PredicateSchema {
                name: "not_at".to_string(),
                parameters: vec![
                    ParameterSpec {
                        kind: "object".to_string(),
                        unique: false,
                    },
                    ParameterSpec {
                        kind: "location".to_string(),
                        unique: false,
                    },
                ],
                opposite: None,
            },
        ];
        WorldDefinition::new(
            "rooms".to_string(),
            objects,
            Vec::new(),
            predicates,
            Vec::new(),
            FxHashMap::default(),
        )
        .unwrap()
    }

    fn is_conflict_free(state: &[Fact], world: &WorldDefinition) -> bool {
        for (i, a) in state.iter().enumerate() {
            let Some(schema) = world.signature_of(a).and_then(|s| world.predicate(&s)) else {
                continue;
            };
            for b in &state[..i] {
                if a == b {
                    return false;
                }
                if schema.opposite.as_deref() == Some(b.name.as_str()) && a.args == b.args {
                    return false;
                }
                for (pos, p) in schema.parameters.iter().enumerate() {
                    if p.unique
                        && a.name == b.name
                        && world.signature_of(a) == world.signature_of(b)
                        && a.args[pos] == b.args[pos]
                    {
                        return false;
                    }
                }
            }
        }
        true
    }

    #[test]
    fn repair_resolves_unique_and_opposite_conflicts() {
        let world = make_world();
        let state = vec![
            Fact::new("at", ["x", "room1"]),
            Fact::new("at", ["x", "room2"]),
            Fact::new("not_at", ["x", "room1"]),
        ];
        assert_eq!(repair(&state, &world), vec![Fact::new("at", ["x", "room1"])]);
    }

    #[test]
    fn repair_removes_duplicates_preserving_order() {
        let world = make_world();
        let state = vec![
            Fact::new("not_at", ["y", "room3"]),
            Fact::new("at", ["x", "room1"]),
            Fact::new("not_at", ["y", "room3"]),
            Fact::new("at", ["y", "room2"]),
        ];
        assert_eq!(
            repair(&state, &world),
            vec![
                Fact::new("not_at", ["y", "room3"]),
                Fact::new("at", ["x", "room1"]),
                Fact::new("at", ["y", "room2"]),
            ]
        );
    }

    #[test]
    fn repair_keeps_facts_without_schema() {
        let world = make_world();
        let state = vec![
            Fact::new("glowing", ["x"]),
            Fact::new("glowing", ["x"]),
            Fact::new("at", ["ghost", "room1"]),
        ];
        assert_eq!(repair(&state, &world), state);
    }

    #[test]
    fn unique_position_allows_other_objects() {
        let world = make_world();
        let state = vec![Fact::new("at", ["x", "room1"]), Fact::new("at", ["y", "room1"])];
        assert_eq!(repair(&state, &world), state);
    }

    #[test]
    fn repair_is_idempotent_and_conflict_free() {
        let world = make_world();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let state = sample_state(&world, 12, &mut rng).unwrap();
            let once = repair(&state, &world);
            assert_eq!(repair(&once, &world), once, "seed {}", seed);
            assert!(is_conflict_free(&once, &world), "seed {}: {:?}", seed, once);
        }
    }

    #[test]
    fn sample_state_respects_length_bounds() {
        let world = make_world();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let state = sample_state(&world, 4, &mut rng).unwrap();
            assert!((1..=4).contains(&state.len()));
        }
    }

    #[test]
    fn sampled_facts_use_objects_of_the_right_type() {
        let world = make_world();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let fact = sample_fact(&world, &mut rng).unwrap();
            assert_eq!(world.type_of(&fact.args[0]), Some("object"));
            assert_eq!(world.type_of(&fact.args[1]), Some("location"));
        }
    }

    #[test]
    fn sample_individual_is_repaired_and_unevaluated() {
        let world = make_world();
        let mut rng = StdRng::seed_from_u64(11);
        let ind = sample_individual(&world, 10, 5, &mut rng).unwrap();
        assert!(!ind.is_evaluated());
        assert!(!ind.initial_delta.is_empty());
        assert!(!ind.goal.is_empty());
        assert!(is_conflict_free(&ind.initial_delta, &world));
        assert!(is_conflict_free(&ind.goal, &world));
    }

    #[test]
    fn overlay_lets_world_state_win() {
        let world = make_world();
        let world_state = vec![Fact::new("at", ["x", "room1"])];
        let delta = vec![Fact::new("at", ["x", "room2"]), Fact::new("at", ["y", "room2"])];
        assert_eq!(
            overlay(&world_state, &delta, &world),
            vec![Fact::new("at", ["x", "room1"]), Fact::new("at", ["y", "room2"])]
        );
    }
}

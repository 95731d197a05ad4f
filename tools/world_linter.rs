/// World Linter — validates a world definition and flags unused parts.
///
/// Usage: world_linter <world.ron>

use quest_engine::core::state::repair;
use quest_engine::schema::world::WorldDefinition;
use std::collections::BTreeSet;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: world_linter <world.ron>");
        process::exit(0);
    }

    let world_path = Path::new(&args[1]);
    if !world_path.is_file() {
        eprintln!("ERROR: Path '{}' does not exist", args[1]);
        process::exit(1);
    }

    let world = match WorldDefinition::load_from_ron(world_path) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("ERROR: Failed to load world file: {}", e);
            process::exit(1);
        }
    };

    println!(
        "Loaded world '{}': {} objects, {} predicates, {} operators",
        world.name(),
        world.objects().len(),
        world.predicates().len(),
        world.actions().len()
    );

    let (errors, warnings) = lint_world(&world);

    println!("\n=== World Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint_world(world: &WorldDefinition) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Initial relations must already satisfy uniqueness and opposites
    let repaired = repair(world.initial_state(), world);
    for fact in world.initial_state() {
        if !repaired.contains(fact) {
            errors.push(format!(
                "Initial relation {} conflicts with an earlier relation",
                fact
            ));
        }
    }

    for fact in world.initial_state() {
        let declared = world
            .signature_of(fact)
            .and_then(|sig| world.predicate(&sig))
            .is_some();
        if !declared {
            warnings.push(format!(
                "Initial relation {} matches no predicate schema and is never constrained",
                fact
            ));
        }
    }

    let used: BTreeSet<&str> = world
        .actions()
        .values()
        .flat_map(|a| a.preconditions.iter().chain(&a.effects))
        .map(|l| l.predicate.as_str())
        .collect();
    for predicate in world.predicates() {
        if !used.contains(predicate.name.as_str()) {
            warnings.push(format!(
                "Predicate '{}' is never used by any operator",
                predicate.signature()
            ));
        }
    }

    for (name, action) in world.actions() {
        if !world.tension_table().contains_key(name) {
            warnings.push(format!(
                "Operator '{}' has no tension entry (treated as Hold)",
                name
            ));
        }
        if action.effects.is_empty() {
            warnings.push(format!("Operator '{}' has no effects", name));
        }
    }

    let mut stale: Vec<&String> = world
        .tension_table()
        .keys()
        .filter(|name| world.action(name).is_none())
        .collect();
    stale.sort();
    for name in stale {
        warnings.push(format!(
            "Tension entry '{}' does not match any operator",
            name
        ));
    }

    let predicate_types: BTreeSet<&str> = world
        .predicates()
        .iter()
        .flat_map(|p| p.parameters.iter())
        .map(|p| p.kind.as_str())
        .collect();
    for object in world.objects() {
        if !predicate_types.contains(object.kind.as_str()) {
            warnings.push(format!(
                "Object '{}' has type '{}' which no predicate accepts",
                object.name, object.kind
            ));
        }
    }

    (errors, warnings)
}

/// Quest Runner — generates a sequence of quests from a run configuration.
///
/// Usage: quest_runner run <config.ron>
///
/// Log verbosity follows RUST_LOG (default: info).

use quest_engine::config::RunConfig;
use quest_engine::core::sequencer::{JsonHistoryFile, QuestRecord, QuestSequencer};
use quest_engine::schema::world::WorldDefinition;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        process::exit(0);
    }

    if args[1] != "run" || args.len() != 3 {
        eprintln!("Unknown arguments: {}", args[1..].join(" "));
        print_usage();
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match RunConfig::load_from_ron(Path::new(&args[2])) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: Failed to load config '{}': {}", args[2], e);
            process::exit(1);
        }
    };

    let world = match WorldDefinition::load_from_ron(&config.parser_args.world_path) {
        Ok(world) => world,
        Err(e) => {
            eprintln!(
                "ERROR: Failed to load world '{}': {}",
                config.parser_args.world_path.display(),
                e
            );
            process::exit(1);
        }
    };

    println!(
        "Loaded world '{}': {} objects, {} predicates, {} operators, {} initial facts",
        world.name(),
        world.objects().len(),
        world.predicates().len(),
        world.actions().len(),
        world.initial_state().len()
    );

    // Both already checked by load_from_ron
    let (scorer, generator) = match (config.scorer(), config.generator()) {
        (Ok(scorer), Ok(generator)) => (scorer, generator),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("ERROR: Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let mut rng = config.rng();
    let mut history = JsonHistoryFile::new(&config.path);
    let mut sequencer = QuestSequencer::new(&world, config.planner(), scorer, generator);

    for _ in 0..config.n_quests {
        match sequencer.run_round(&mut history, &mut rng) {
            Ok(record) => print_quest(&record),
            Err(e) => {
                eprintln!(
                    "ERROR: Quest {} failed: {}",
                    sequencer.rounds_completed() + 1,
                    e
                );
                process::exit(1);
            }
        }
    }

    println!(
        "\nGenerated {} quests, history written to {}",
        sequencer.rounds_completed(),
        history.path().display()
    );
}

fn print_usage() {
    println!("Usage: quest_runner run <config.ron>");
}

fn print_quest(record: &QuestRecord) {
    println!("\n=== Quest {} (fitness {:.3}) ===", record.round, record.fitness);
    println!("Initial delta:");
    for fact in &record.initial_delta {
        println!("  {}", fact);
    }
    println!("Goal:");
    for fact in &record.goal {
        println!("  {}", fact);
    }
    println!("Actions:");
    if record.actions.is_empty() {
        println!("  (no plan found)");
    }
    for (i, action) in record.actions.iter().enumerate() {
        println!("  {}. {}", i + 1, action);
    }
    println!("World state: {} facts", record.world_state.len());
}

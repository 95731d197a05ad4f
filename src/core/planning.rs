/// Planning bridge — turns an individual into a planning problem, runs the
/// external planner and reads back its action trace.
///
/// The planner is a text-in/text-out oracle behind the [`Planner`] trait.
/// Any failure on that side (spawn error, bad output, no solution) degrades
/// to an empty trace, which the scorer turns into fitness 0.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::core::state::overlay;
use crate::schema::fact::{Fact, State};
use crate::schema::individual::Individual;
use crate::schema::trace::{ActionTrace, GroundedAction};
use crate::schema::world::{Literal, WorldDefinition};

/// Prefix of planner output lines that carry the solution.
pub const PLAN_MARKER: &str = "QUESTS";

/// Default search mode handed to the planner: backward search with the
/// h1plus heuristic.
pub const DEFAULT_SEARCH: &str = "backward,h1plus";

/// Default planner time limit.
pub const DEFAULT_TIME_LIMIT: u64 = 5000;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("planner output is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// An external classical planner.
pub trait Planner {
    /// Solve the given domain/problem pair and return the planner's raw
    /// standard output.
    fn invoke(&self, domain: &str, problem: &str) -> Result<String, PlannerError>;
}

/// A start state and goal conjunction over a world, ready to serialize.
#[derive(Debug, Clone)]
pub struct PlanningProblem<'w> {
    pub world: &'w WorldDefinition,
    pub start: State,
    pub goal: State,
}

/// Build the problem for an individual against the current world state.
/// The world state is only read.
pub fn build_problem<'w>(
    world_state: &[Fact],
    individual: &Individual,
    world: &'w WorldDefinition,
) -> PlanningProblem<'w> {
    PlanningProblem {
        world,
        start: overlay(world_state, &individual.initial_delta, world),
        goal: individual.goal.clone(),
    }
}

impl PlanningProblem<'_> {
    /// Domain and problem text, in that order.
    pub fn serialize(&self) -> (String, String) {
        (self.domain_pddl(), self.problem_pddl())
    }

    /// Predicate arities: the widest use across all operators, plus any
    /// predicate that only appears in the start or goal facts.
    fn predicate_arities(&self) -> BTreeMap<&str, usize> {
        let mut arities: BTreeMap<&str, usize> = BTreeMap::new();
        for action in self.world.actions().values() {
            for literal in action.preconditions.iter().chain(&action.effects) {
                let arity = arities.entry(literal.predicate.as_str()).or_insert(0);
                *arity = (*arity).max(literal.args.len());
            }
        }
        for fact in self.start.iter().chain(&self.goal) {
            arities.entry(fact.name.as_str()).or_insert(fact.arity());
        }
        arities
    }

    pub fn domain_pddl(&self) -> String {
        let negative_preconditions = self
            .world
            .actions()
            .values()
            .any(|a| a.preconditions.iter().any(|l| l.negated));

        let mut domain = String::from("(define (domain world)\n");
        if negative_preconditions {
            domain.push_str("  (:requirements :typing :negative-preconditions)\n");
        } else {
            domain.push_str("  (:requirements :typing)\n");
        }
        let types: Vec<&str> = self.world.objects_by_type().keys().map(String::as_str).collect();
        domain.push_str(&format!("  (:types {})\n", types.join(" ")));

        domain.push_str("  (:predicates\n");
        for (name, arity) in self.predicate_arities() {
            let params: Vec<String> = (0..arity).map(|i| format!("?{}", placeholder(i))).collect();
            if params.is_empty() {
                domain.push_str(&format!("    ({})\n", name));
            } else {
                domain.push_str(&format!("    ({} {})\n", name, params.join(" ")));
            }
        }
        domain.push_str("  )\n");

        for action in self.world.actions().values() {
            let parameters: Vec<String> = action
                .parameters
                .iter()
                .map(|p| format!("?{} - {}", p.name, p.kind))
                .collect();
            let preconditions: Vec<String> = action.preconditions.iter().map(literal_pddl).collect();
            let effects: Vec<String> = action.effects.iter().map(literal_pddl).collect();

            domain.push_str(&format!("(:action {}\n", action.name));
            domain.push_str(&format!("\t:parameters ({})\n", parameters.join(" ")));
            domain.push_str(&format!("\t:precondition (and {})\n", preconditions.join(" ")));
            domain.push_str(&format!("\t:effect (and {})\n", effects.join(" ")));
            domain.push_str(")\n");
        }
        domain.push_str("\n)");
        domain
    }

    pub fn problem_pddl(&self) -> String {
        let mut problem = String::from("(define (problem quests)\n");
        problem.push_str("  (:domain world)\n");
        problem.push_str("  (:objects\n");
        for (kind, objects) in self.world.objects_by_type() {
            problem.push_str(&format!("    {} - {}\n", objects.join(" "), kind));
        }
        problem.push_str("  )\n");

        problem.push_str("  (:init\n");
        for fact in &self.start {
            problem.push_str(&format!("    {}\n", fact));
        }
        problem.push_str("  )\n");

        problem.push_str("  (:goal (and\n");
        for fact in &self.goal {
            problem.push_str(&format!("    {}\n", fact));
        }
        problem.push_str("  ))\n");
        problem.push(')');
        problem
    }
}

/// Synthesized predicate parameter names: `a`, `b`, ... then `p26`, `p27`, ...
fn placeholder(i: usize) -> String {
    if i < 26 {
        ((b'a' + i as u8) as char).to_string()
    } else {
        format!("p{}", i)
    }
}

fn literal_pddl(literal: &Literal) -> String {
    let mut atom = format!("({}", literal.predicate);
    for arg in &literal.args {
        atom.push_str(" ?");
        atom.push_str(arg);
    }
    atom.push(')');
    if literal.negated {
        format!("(not {})", atom)
    } else {
        atom
    }
}

/// Read the action trace out of raw planner output.
///
/// Only lines starting with [`PLAN_MARKER`] are examined. Each comma
/// separated, parenthesised token is one action, lower-cased and split on
/// whitespace into name and arguments. No marker line means no plan.
pub fn parse_plan(raw: &str) -> ActionTrace {
    let mut trace = Vec::new();
    for line in raw.lines() {
        let Some(rest) = line.strip_prefix(PLAN_MARKER) else {
            continue;
        };
        let rest = rest.trim_start_matches(':');
        for token in rest.split(',') {
            let token = token.trim();
            let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) else {
                continue;
            };
            let lowered = inner.to_lowercase();
            let mut words = lowered.split_whitespace();
            if let Some(name) = words.next() {
                trace.push(GroundedAction {
                    name: name.to_string(),
                    args: words.map(str::to_string).collect(),
                });
            }
        }
    }
    trace
}

/// Domain and problem files for one invocation. Removed on drop, whether or
/// not the planner succeeded.
struct TempPddlFiles {
    domain: PathBuf,
    problem: PathBuf,
}

impl TempPddlFiles {
    fn new(dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            domain: dir.join(format!("{}_domain.pddl", id)),
            problem: dir.join(format!("{}_problem.pddl", id)),
        }
    }
}

impl Drop for TempPddlFiles {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.domain);
        let _ = std::fs::remove_file(&self.problem);
    }
}

/// The HSP2 planner run as a child process.
#[derive(Debug, Clone)]
pub struct HspPlanner {
    binary: PathBuf,
    search: String,
    time_limit: u64,
    tmp_dir: PathBuf,
}

impl HspPlanner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            search: DEFAULT_SEARCH.to_string(),
            time_limit: DEFAULT_TIME_LIMIT,
            tmp_dir: PathBuf::from("tmp"),
        }
    }

    pub fn search(mut self, search: &str) -> Self {
        self.search = search.to_string();
        self
    }

    pub fn time_limit(mut self, time_limit: u64) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }
}

impl Planner for HspPlanner {
    fn invoke(&self, domain: &str, problem: &str) -> Result<String, PlannerError> {
        std::fs::create_dir_all(&self.tmp_dir)?;
        let files = TempPddlFiles::new(&self.tmp_dir);
        std::fs::write(&files.domain, domain)?;
        std::fs::write(&files.problem, problem)?;

        let output = Command::new(&self.binary)
            .arg("-S")
            .arg(format!("[{},{}]", self.search, self.time_limit))
            .arg(&files.problem)
            .arg(&files.domain)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        debug!(status = ?output.status, bytes = output.stdout.len(), "planner finished");

        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Runs the planner for individuals against a world.
pub struct PlanningBridge<'w, P> {
    world: &'w WorldDefinition,
    planner: P,
}

impl<'w, P: Planner> PlanningBridge<'w, P> {
    pub fn new(world: &'w WorldDefinition, planner: P) -> Self {
        Self { world, planner }
    }

    pub fn world(&self) -> &'w WorldDefinition {
        self.world
    }

    /// Plan from `world_state` extended by the individual's delta to the
    /// individual's goal. Planner failures yield an empty trace.
    pub fn plan(&self, world_state: &[Fact], individual: &Individual) -> ActionTrace {
        let problem = build_problem(world_state, individual, self.world);
        let (domain, problem) = problem.serialize();
        match self.planner.invoke(&domain, &problem) {
            Ok(raw) => parse_plan(&raw),
            Err(e) => {
                debug!(error = %e, "planner failed, treating as no plan");
                Vec::new()
            }
        }
    }
}

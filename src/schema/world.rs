/// World definition — objects, predicate and action schemas, tension table.
///
/// The engine only reads a `WorldDefinition`; it is built once at startup,
/// either from parts or from a RON document, and validated fail-fast.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use super::fact::{Fact, State};

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("world defines no predicates")]
    NoPredicates,
    #[error("object '{0}' is declared more than once")]
    DuplicateObject(String),
    #[error("predicate '{predicate}' needs objects of type '{kind}' but none exist")]
    EmptyTypePool { predicate: String, kind: String },
    #[error("predicate '{predicate}' declares unknown opposite '{opposite}'")]
    UnknownOpposite { predicate: String, opposite: String },
    #[error("operator '{action}' references predicate '{predicate}' which has no schema")]
    MissingPredicate { action: String, predicate: String },
    #[error("operator '{action}' uses undeclared parameter '{parameter}'")]
    UnknownParameter { action: String, parameter: String },
    #[error("operator '{action}' parameter '{parameter}' has type '{kind}' with no objects")]
    UnknownType {
        action: String,
        parameter: String,
        kind: String,
    },
    #[error("initial relation '{predicate}' names unknown object '{object}'")]
    UnknownObject { predicate: String, object: String },
    #[error("{what} name '{name}' must be lowercase to match planner output")]
    NotLowercase { what: &'static str, name: String },
}

/// A named entity in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub name: String,
    pub kind: String,
}

/// One typed parameter slot of a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub kind: String,
    /// At most one fact of this predicate may bind a given object here.
    #[serde(default)]
    pub unique: bool,
}

/// Typed template for facts. Predicates may be overloaded by parameter
/// types, so schemas are keyed by [`PredicateSchema::signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateSchema {
    pub name: String,
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub opposite: Option<String>,
}

impl PredicateSchema {
    /// `name` followed by `_<type>` for every parameter, e.g. `at_person_place`.
    pub fn signature(&self) -> String {
        signature(&self.name, self.parameters.iter().map(|p| p.kind.as_str()))
    }
}

fn signature<'a>(name: &str, kinds: impl Iterator<Item = &'a str>) -> String {
    let mut key = name.to_string();
    for kind in kinds {
        key.push('_');
        key.push_str(kind);
    }
    key
}

/// A typed operator parameter, referenced by name inside literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub name: String,
    pub kind: String,
}

/// A partially-grounded predicate inside an operator: arguments are
/// parameter names, not objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub predicate: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub negated: bool,
}

/// A planning operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub name: String,
    pub parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub preconditions: Vec<Literal>,
    #[serde(default)]
    pub effects: Vec<Literal>,
}

impl ActionSchema {
    /// Ground a literal of this action against bound argument objects.
    /// Returns `None` when the literal names a parameter that is not bound.
    pub fn ground(&self, literal: &Literal, bound: &[String]) -> Option<Fact> {
        let mut args = Vec::with_capacity(literal.args.len());
        for arg in &literal.args {
            let pos = self.parameters.iter().position(|p| &p.name == arg)?;
            args.push(bound.get(pos)?.clone());
        }
        Some(Fact {
            name: literal.predicate.clone(),
            args,
        })
    }
}

/// Direction in which an action moves narrative tension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tension {
    Rise,
    Hold,
    Fall,
}

impl Tension {
    pub fn value(&self) -> i64 {
        match self {
            Self::Rise => 1,
            Self::Hold => 0,
            Self::Fall => -1,
        }
    }
}

/// The read-only world every other component consults.
#[derive(Debug, Clone)]
pub struct WorldDefinition {
    name: String,
    objects: Vec<Object>,
    objects_by_type: BTreeMap<String, Vec<String>>,
    type_by_object: FxHashMap<String, String>,
    initial_state: State,
    predicates: Vec<PredicateSchema>,
    predicate_index: FxHashMap<String, usize>,
    actions: BTreeMap<String, ActionSchema>,
    tension: FxHashMap<String, Tension>,
}

// RON deserialization helpers: relations are written as
// `(predicate: .., args: [..])` rather than as bare facts.

#[derive(Debug, Deserialize)]
struct RonRelation {
    predicate: String,
    args: Vec<String>,
}

fn default_world_name() -> String {
    "world".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename = "World")]
struct RonWorld {
    #[serde(default = "default_world_name")]
    name: String,
    objects: Vec<Object>,
    #[serde(default)]
    relations: Vec<RonRelation>,
    predicates: Vec<PredicateSchema>,
    operators: Vec<ActionSchema>,
    #[serde(default)]
    tension: HashMap<String, Tension>,
}

impl WorldDefinition {
    /// Load a world definition from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<WorldDefinition, WorldError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a world definition from a RON string.
    pub fn parse_ron(input: &str) -> Result<WorldDefinition, WorldError> {
        let raw: RonWorld = ron::from_str(input)?;
        let initial_state = raw
            .relations
            .into_iter()
            .map(|r| Fact {
                name: r.predicate,
                args: r.args,
            })
            .collect();
        Self::new(
            raw.name,
            raw.objects,
            initial_state,
            raw.predicates,
            raw.operators,
            raw.tension.into_iter().collect(),
        )
    }

    /// Build and validate a world definition.
    pub fn new(
        name: String,
        objects: Vec<Object>,
        initial_state: State,
        mut predicates: Vec<PredicateSchema>,
        actions: Vec<ActionSchema>,
        tension: FxHashMap<String, Tension>,
    ) -> Result<WorldDefinition, WorldError> {
        if predicates.is_empty() {
            return Err(WorldError::NoPredicates);
        }

        let mut objects_by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut type_by_object = FxHashMap::default();
        for object in &objects {
            ensure_lowercase("object", &object.name)?;
            if type_by_object
                .insert(object.name.clone(), object.kind.clone())
                .is_some()
            {
                return Err(WorldError::DuplicateObject(object.name.clone()));
            }
            objects_by_type
                .entry(object.kind.clone())
                .or_default()
                .push(object.name.clone());
        }

        for predicate in &predicates {
            for parameter in &predicate.parameters {
                if !objects_by_type.contains_key(&parameter.kind) {
                    return Err(WorldError::EmptyTypePool {
                        predicate: predicate.name.clone(),
                        kind: parameter.kind.clone(),
                    });
                }
            }
        }

        close_opposites(&mut predicates)?;

        let predicate_index = predicates
            .iter()
            .enumerate()
            .map(|(i, p)| (p.signature(), i))
            .collect();

        let mut action_map = BTreeMap::new();
        for action in actions {
            ensure_lowercase("operator", &action.name)?;
            validate_action(&action, &predicates, &objects_by_type)?;
            action_map.insert(action.name.clone(), action);
        }

        for fact in &initial_state {
            if let Some(object) = fact.args.iter().find(|a| !type_by_object.contains_key(*a)) {
                return Err(WorldError::UnknownObject {
                    predicate: fact.name.clone(),
                    object: object.clone(),
                });
            }
        }

        Ok(WorldDefinition {
            name,
            objects,
            objects_by_type,
            type_by_object,
            initial_state,
            predicates,
            predicate_index,
            actions: action_map,
            tension,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    pub fn objects_by_type(&self) -> &BTreeMap<String, Vec<String>> {
        &self.objects_by_type
    }

    /// Objects of the given type; empty when the type is unknown.
    pub fn objects_of(&self, kind: &str) -> &[String] {
        self.objects_by_type
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn type_of(&self, object: &str) -> Option<&str> {
        self.type_by_object.get(object).map(String::as_str)
    }

    /// Facts that hold before the first quest.
    pub fn initial_state(&self) -> &State {
        &self.initial_state
    }

    pub fn predicates(&self) -> &[PredicateSchema] {
        &self.predicates
    }

    /// Look up a predicate schema by signature.
    pub fn predicate(&self, signature: &str) -> Option<&PredicateSchema> {
        self.predicate_index
            .get(signature)
            .map(|&i| &self.predicates[i])
    }

    /// Signature of a fact, derived from the types of its arguments.
    /// `None` if any argument is not a known object.
    pub fn signature_of(&self, fact: &Fact) -> Option<String> {
        let kinds: Option<Vec<&str>> = fact.args.iter().map(|a| self.type_of(a)).collect();
        Some(signature(&fact.name, kinds?.into_iter()))
    }

    pub fn actions(&self) -> &BTreeMap<String, ActionSchema> {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.get(name)
    }

    pub fn tension_table(&self) -> &FxHashMap<String, Tension> {
        &self.tension
    }

    /// Tension of an action; actions missing from the table hold tension.
    pub fn tension_of(&self, action: &str) -> Tension {
        self.tension.get(action).copied().unwrap_or(Tension::Hold)
    }
}

/// Make opposites symmetric: a schema named as another's opposite (with the
/// same parameter types) declares it back, unless it already names one.
fn close_opposites(predicates: &mut [PredicateSchema]) -> Result<(), WorldError> {
    let mut back_links = Vec::new();
    for (i, predicate) in predicates.iter().enumerate() {
        let Some(opposite) = &predicate.opposite else {
            continue;
        };
        if !predicates.iter().any(|p| &p.name == opposite) {
            return Err(WorldError::UnknownOpposite {
                predicate: predicate.name.clone(),
                opposite: opposite.clone(),
            });
        }
        for (j, other) in predicates.iter().enumerate() {
            if i != j
                && &other.name == opposite
                && other.opposite.is_none()
                && other.parameters.iter().map(|p| &p.kind).eq(predicate.parameters.iter().map(|p| &p.kind))
            {
                back_links.push((j, predicate.name.clone()));
            }
        }
    }
    for (j, name) in back_links {
        predicates[j].opposite.get_or_insert(name);
    }
    Ok(())
}

/// Planner output is lower-cased before parsing, so names that must match
/// it cannot carry uppercase letters.
fn ensure_lowercase(what: &'static str, name: &str) -> Result<(), WorldError> {
    if name.chars().any(char::is_uppercase) {
        return Err(WorldError::NotLowercase {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_action(
    action: &ActionSchema,
    predicates: &[PredicateSchema],
    objects_by_type: &BTreeMap<String, Vec<String>>,
) -> Result<(), WorldError> {
    for parameter in &action.parameters {
        if !objects_by_type.contains_key(&parameter.kind) {
            return Err(WorldError::UnknownType {
                action: action.name.clone(),
                parameter: parameter.name.clone(),
                kind: parameter.kind.clone(),
            });
        }
    }
    for literal in action.preconditions.iter().chain(&action.effects) {
        if !predicates.iter().any(|p| p.name == literal.predicate) {
            return Err(WorldError::MissingPredicate {
                action: action.name.clone(),
                predicate: literal.predicate.clone(),
            });
        }
        if let Some(arg) = literal
            .args
            .iter()
            .find(|a| !action.parameters.iter().any(|p| &p.name == *a))
        {
            return Err(WorldError::UnknownParameter {
                action: action.name.clone(),
                parameter: arg.clone(),
            });
        }
    }
    Ok(())
}

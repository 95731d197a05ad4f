use serde::{Deserialize, Serialize};
use std::fmt;

/// A grounded predicate instance: a predicate name applied to concrete
/// object names, e.g. `at(hero, tavern)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub args: Vec<String>,
}

/// An ordered sequence of facts. Order only matters for conflict
/// resolution, where earlier facts win.
pub type State = Vec<Fact>;

impl Fact {
    pub fn new<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of arguments the fact binds.
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_creation() {
        let fact = Fact::new("at", ["hero", "tavern"]);
        assert_eq!(fact.name, "at");
        assert_eq!(fact.args, vec!["hero".to_string(), "tavern".to_string()]);
        assert_eq!(fact.arity(), 2);
    }

    #[test]
    fn facts_compare_by_value() {
        assert_eq!(Fact::new("at", ["hero", "tavern"]), Fact::new("at", ["hero", "tavern"]));
        assert_ne!(Fact::new("at", ["hero", "tavern"]), Fact::new("at", ["tavern", "hero"]));
    }

    #[test]
    fn display_uses_planner_syntax() {
        assert_eq!(Fact::new("at", ["hero", "tavern"]).to_string(), "(at hero tavern)");
        assert_eq!(Fact::new("night", Vec::<String>::new()).to_string(), "(night)");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a plan: an action name with the objects bound to its
/// parameters, in parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundedAction {
    pub name: String,
    pub args: Vec<String>,
}

/// The ordered action sequence a planner returned. Empty means no plan.
pub type ActionTrace = Vec<GroundedAction>;

impl GroundedAction {
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
}

impl fmt::Display for GroundedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

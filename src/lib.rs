//! Quest Engine — procedural quest generation for games.
//!
//! Evolves pairs of symbolic world states (a hypothesised starting delta and
//! a goal), hands each pair to a classical planner, and scores the resulting
//! action trace by how closely its cumulative tension follows a target
//! dramatic arc. Winning quests are replayed into a persistent world state.

pub mod config;
pub mod core;
pub mod schema;

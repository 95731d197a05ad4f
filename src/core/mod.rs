//! The quest generation engine: state repair, variation operators,
//! planning bridge, tension scoring, evolutionary search and sequencing.

pub mod evolution;
pub mod operators;
pub mod planning;
pub mod sequencer;
pub mod state;
pub mod tension;

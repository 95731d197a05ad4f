//! Data types shared by every stage of quest generation.

pub mod fact;
pub mod individual;
pub mod trace;
pub mod world;

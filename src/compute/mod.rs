//! Compute module - Reference simulation, cost model and evolutionary search.

mod context;
mod costs;
mod generator;
mod scenarios;
mod traces;

pub mod evolution;

pub use context::*;
pub use costs::*;
pub use generator::*;
pub use scenarios::*;
pub use traces::*;

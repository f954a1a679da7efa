//! Schema module - Configuration, scenario and result types for optimisation runs.

mod config;
mod evolution;
mod scenario;

pub use config::*;
pub use evolution::*;
pub use scenario::*;

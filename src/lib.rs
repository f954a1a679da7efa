//! gridmix-evolve - Evolutionary capacity optimisation for electricity generation mixes.
//!
//! This crate searches generator capacities with CMA-ES to minimise the cost
//! of meeting demand, with constraint violations folded into the objective
//! as penalties.
//!
//! # Architecture
//!
//! - `schema`: Configuration, scenario and result types
//! - `compute`: Reference simulation, cost model and the evolutionary search
//! - `summary`: Narration-to-table reporting for finished runs
//! - `run`: End-to-end orchestration used by the command line tool
//!
//! # Example
//!
//! ```rust,no_run
//! use gridmix_evolve::{run, schema::RunConfig};
//!
//! let config = RunConfig::default();
//! let mut stdout = std::io::stdout();
//! let (bundle, result) = run::run(&config, &mut stdout).unwrap();
//!
//! println!("Best score {:.2} $/MWh after {} generations",
//!     bundle.score, result.stats.generations);
//! ```

pub mod compute;
pub mod error;
pub mod run;
pub mod schema;
pub mod summary;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, FitnessEvaluator};
pub use compute::{Simulation, SimulationContext, SimulationResult};
pub use error::Error;
pub use schema::{ResultBundle, RunConfig};

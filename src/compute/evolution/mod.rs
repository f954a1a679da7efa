//! Evolutionary search over generator capacities.
//!
//! # Overview
//!
//! - **Codec** (`codec`): maps gene vectors onto simulation capacity slots
//! - **Penalties** (`penalty`): constraint checks and the violation-reason bitmask
//! - **Fitness** (`fitness`): simulation, cost model and penalties combined into one value
//! - **Trace** (`trace`): optional append-only record of every evaluation
//! - **Dispatch** (`dispatcher`): sequential or parallel, order-preserving evaluation
//! - **CMA-ES** (`cmaes`): the sampling distribution and its update
//! - **Search** (`search`): the generational loop, hall of fame and verification
//! - **Emitter** (`emitter`): result bundle and run narration
//!
//! # Example
//!
//! ```rust,no_run
//! use gridmix_evolve::compute::build_context;
//! use gridmix_evolve::compute::evolution::{
//!     EvolutionEngine, FitnessEvaluator, SequentialDispatcher,
//! };
//! use gridmix_evolve::schema::RunConfig;
//!
//! let config = RunConfig::default();
//! let context = build_context(&config.scenario).unwrap();
//! let evaluator = FitnessEvaluator::new(context, &config.costs, &config.constraints);
//! let mut engine = EvolutionEngine::new(
//!     config.search.clone(),
//!     evaluator,
//!     Box::new(SequentialDispatcher::new(true)),
//! );
//! let result = engine.run_with_callback(|progress| {
//!     println!("Generation {}: best fitness = {:.3}",
//!         progress.generation, progress.best_fitness);
//! }).unwrap();
//! println!("Stopped: {:?}", result.stats.stop_reason);
//! ```

mod cmaes;
mod codec;
mod dispatcher;
mod emitter;
mod fitness;
mod penalty;
mod search;
mod trace;

pub use cmaes::{CmaState, default_lambda};
pub use codec::ChromosomeCodec;
pub use dispatcher::{
    DispatchError, Dispatcher, EvaluateFn, ParallelDispatcher, SequentialDispatcher,
    dispatcher_for,
};
pub use emitter::{EmitError, ResultEmitter, narrate};
pub use fitness::{Evaluation, EvaluationError, FitnessEvaluator};
pub use penalty::{ConstraintKind, PenaltyRegistry, Reasons};
pub use search::{EvolutionEngine, EvolutionResult, HallOfFame, Verification};
pub use trace::{TRACE_HEADER, TraceRecord, TraceWriter};

//! Progress, history and result types produced by the evolutionary search.

use serde::{Deserialize, Serialize};

use super::RunConfig;

/// Progress update delivered after each completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Generations completed so far.
    pub generation: usize,
    /// Total generations planned.
    pub total_generations: usize,
    /// Evaluations performed so far.
    pub evaluations: u64,
    /// Best fitness seen so far (lower is better).
    pub best_fitness: f64,
    /// Minimum fitness in the latest generation.
    pub generation_best: f64,
    /// Current step size.
    pub sigma: f64,
    /// Generations since the hall of fame last improved.
    pub stagnation_count: usize,
}

/// Per-generation statistics for plotting or logging.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Minimum fitness per generation.
    pub min_fitness: Vec<f64>,
    /// Mean fitness per generation.
    pub avg_fitness: Vec<f64>,
    /// Step size after each generation's update.
    pub sigma: Vec<f64>,
}

impl EvolutionHistory {
    /// Number of recorded generations.
    pub fn len(&self) -> usize {
        self.min_fitness.len()
    }

    /// No generation has completed.
    pub fn is_empty(&self) -> bool {
        self.min_fitness.is_empty()
    }
}

/// Statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Fully completed generations.
    pub generations: usize,
    /// Evaluations merged into the search state.
    pub total_evaluations: u64,
    /// Best fitness achieved.
    pub best_fitness: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Evaluations per second.
    pub evaluations_per_second: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the configured generation count.
    MaxGenerations,
    /// Cancelled from outside the engine.
    Cancelled,
}

/// Final structured record of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBundle {
    /// Full configuration snapshot.
    pub options: RunConfig,
    /// Best gene vector with every value clamped to be non-negative.
    pub parameters: Vec<f64>,
    /// Normalised cost of the best candidate ($/MWh).
    pub score: f64,
    /// Normalised constraint penalty of the best candidate.
    pub penalty: f64,
    /// Labels of every violated constraint.
    pub constraints_violated: Vec<String>,
}

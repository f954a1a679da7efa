//! Mapping from gene vectors to simulation capacities.

use crate::compute::Simulation;
use crate::schema::ConfigError;

/// Maps genes to capacity slots in registration order. One gene is one GW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromosomeCodec {
    dimension: usize,
}

impl ChromosomeCodec {
    /// Fix the dimensionality from a simulation's capacity slots.
    pub fn for_simulation<S: Simulation>(simulation: &S) -> Self {
        Self {
            dimension: simulation.capacity_slots(),
        }
    }

    /// Number of genes.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Apply `genes` to the simulation's capacity setters, unclamped.
    pub fn apply<S>(&self, genes: &[f64], simulation: &mut S) -> Result<(), ConfigError>
    where
        S: Simulation,
    {
        if genes.len() != self.dimension {
            return Err(ConfigError::DimensionMismatch {
                expected: self.dimension,
                got: genes.len(),
            });
        }
        for (slot, &gene) in genes.iter().enumerate() {
            simulation.set_capacity(slot, gene);
        }
        Ok(())
    }
}

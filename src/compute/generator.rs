//! Generator models used by the reference simulation.

use std::sync::Arc;

use crate::schema::{Region, Technology};

/// Emissions intensity (t CO2 per MWh sent out).
pub fn emission_intensity(technology: Technology) -> f64 {
    match technology {
        Technology::Coal => 0.8,
        Technology::Ccgt => 0.4,
        Technology::Ocgt => 0.7,
        _ => 0.0,
    }
}

/// Energy storage attached to a generator.
#[derive(Debug, Clone)]
struct Storage {
    /// Storage duration at full output (hours).
    hours: f64,
    /// Round trip efficiency applied when storing.
    efficiency: f64,
    /// Current stored energy (MWh).
    level: f64,
}

#[derive(Debug, Clone)]
enum Behaviour {
    /// Follows dispatch up to nameplate.
    Dispatchable,
    /// Output limited by an hourly capacity-factor trace.
    Variable(Arc<Vec<f64>>),
    /// Discharges stored energy and absorbs spilled energy.
    Storage(Storage),
}

/// A generating unit in the simulated fleet.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Technology type.
    pub technology: Technology,
    /// Region the unit is located in.
    pub region: Region,
    /// Nameplate capacity (MW).
    pub capacity: f64,
    /// Whether the search adjusts this unit's capacity.
    pub adjustable: bool,
    behaviour: Behaviour,
    power: Vec<f64>,
}

impl Generator {
    fn with_behaviour(technology: Technology, region: Region, behaviour: Behaviour) -> Self {
        Self {
            technology,
            region,
            capacity: 0.0,
            adjustable: true,
            behaviour,
            power: Vec::new(),
        }
    }

    /// Plant that can follow demand up to its capacity.
    pub fn dispatchable(technology: Technology, region: Region) -> Self {
        Self::with_behaviour(technology, region, Behaviour::Dispatchable)
    }

    /// Weather-driven plant following a capacity-factor trace.
    pub fn variable(technology: Technology, region: Region, trace: Vec<f64>) -> Self {
        Self::with_behaviour(technology, region, Behaviour::Variable(Arc::new(trace)))
    }

    /// Storage plant with the given duration and round trip efficiency.
    pub fn storage(technology: Technology, region: Region, hours: f64, efficiency: f64) -> Self {
        Self::with_behaviour(
            technology,
            region,
            Behaviour::Storage(Storage {
                hours,
                efficiency,
                level: 0.0,
            }),
        )
    }

    /// Fix the capacity (MW) and exclude it from the search.
    pub fn fixed(mut self, capacity: f64) -> Self {
        self.capacity = capacity;
        self.adjustable = false;
        self
    }

    /// Set capacity from a gene value in GW. Negative values mean no plant.
    pub fn set_capacity_gw(&mut self, gigawatts: f64) {
        self.capacity = gigawatts.max(0.0) * 1000.0;
    }

    /// Whether this unit can absorb spilled energy.
    pub fn is_storage(&self) -> bool {
        matches!(self.behaviour, Behaviour::Storage(_))
    }

    /// Maximum stored energy (MWh).
    fn max_storage(&self) -> f64 {
        match &self.behaviour {
            Behaviour::Storage(storage) => self.capacity * storage.hours,
            _ => 0.0,
        }
    }

    /// Clear per-run state before a simulation. Storage starts half full.
    pub fn reset(&mut self, hours: usize) {
        self.power.clear();
        self.power.resize(hours, 0.0);
        let half = self.max_storage() / 2.0;
        if let Behaviour::Storage(storage) = &mut self.behaviour {
            storage.level = half;
        }
    }

    /// Dispatch for one hour against `demand`. Returns (generation, spill) in MWh.
    pub fn step(&mut self, hour: usize, demand: f64) -> (f64, f64) {
        let demand = demand.max(0.0);
        let (generation, spill) = match &mut self.behaviour {
            Behaviour::Dispatchable => (self.capacity.min(demand), 0.0),
            Behaviour::Variable(trace) => {
                let available = self.capacity * trace.get(hour).copied().unwrap_or(0.0);
                let generation = available.min(demand);
                (generation, available - generation)
            }
            Behaviour::Storage(storage) => {
                let generation = self.capacity.min(storage.level).min(demand);
                storage.level -= generation;
                (generation, 0.0)
            }
        };
        self.power[hour] = generation;
        (generation, spill)
    }

    /// Offer `energy` MWh of surplus to this unit. Returns the energy taken.
    pub fn store(&mut self, hour: usize, energy: f64) -> f64 {
        let max_storage = self.max_storage();
        let capacity = self.capacity;
        // a unit already generating this hour cannot also pump
        let idle = self.power.get(hour).copied().unwrap_or(0.0) <= 0.0;
        match &mut self.behaviour {
            Behaviour::Storage(storage) if idle && energy > 0.0 => {
                let headroom = (max_storage - storage.level).max(0.0) / storage.efficiency;
                let taken = energy.min(capacity).min(headroom);
                storage.level += taken * storage.efficiency;
                taken
            }
            _ => 0.0,
        }
    }

    /// Generation in each hour of the last run (MWh).
    pub fn power(&self) -> &[f64] {
        &self.power
    }

    /// Unused capacity in an hour of the last run (MW).
    pub fn headroom(&self, hour: usize) -> f64 {
        (self.capacity - self.power.get(hour).copied().unwrap_or(0.0)).max(0.0)
    }
}

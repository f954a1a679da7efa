//! Reference simulation: hourly merit-order dispatch over a generator fleet.

use std::fmt;

use serde::Serialize;

use super::generator::{Generator, emission_intensity};
use super::traces::RegionalDemand;
use crate::schema::{Region, Technology};

/// Hours in a (non-leap) year.
pub const HOURS_PER_YEAR: f64 = 8760.0;

/// Unserved energy below this is treated as rounding noise (MWh).
const UNSERVED_TOLERANCE: f64 = 1e-6;

/// A deterministic simulation driven by a vector of capacities.
///
/// Implementations must be cheap to clone: every evaluation works on its own
/// copy so that evaluations can run on any worker.
pub trait Simulation: Clone + Send + Sync {
    /// Number of adjustable capacity parameters, in registration order.
    fn capacity_slots(&self) -> usize;

    /// Set the capacity (GW) of the adjustable parameter at `slot`.
    fn set_capacity(&mut self, slot: usize, gigawatts: f64);

    /// Run the simulation with the current capacities.
    fn run(&mut self) -> Result<SimulationResult, SimulationError>;
}

/// Simulation failures.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Scenario has zero total demand")]
    ZeroDemand,
    #[error("Simulation failed: {0}")]
    Failed(String),
}

/// Aggregates for one generator after a run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorSummary {
    pub technology: Technology,
    pub region: Region,
    /// Nameplate capacity (MW).
    pub capacity: f64,
    /// Energy supplied (MWh).
    pub energy: f64,
    /// Surplus that could not be stored (MWh).
    pub spilled: f64,
    /// Emissions (t CO2).
    pub emissions: f64,
}

impl GeneratorSummary {
    /// Delivered energy over the theoretical maximum for the period.
    pub fn capacity_factor(&self, hours: usize) -> Option<f64> {
        let max = self.capacity * hours as f64;
        (max > 0.0).then(|| self.energy / max)
    }
}

/// Immutable snapshot of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// Number of simulated hours.
    pub timesteps: usize,
    /// Total demand (MWh).
    pub demand: f64,
    /// Per-generator aggregates in dispatch order.
    pub generators: Vec<GeneratorSummary>,
    /// Hourly reserve: headroom on fuelled plant plus unstored spill (MW).
    pub reserve_margin: Vec<f64>,
    /// Unserved energy (MWh).
    pub unserved: f64,
    /// Hours with unserved energy.
    pub unserved_hours: usize,
    /// Runs of consecutive hours with unserved energy.
    pub unserved_events: usize,
    /// Smallest non-zero hourly shortfall (MW), zero when all demand is met.
    pub min_shortfall: f64,
    /// Largest hourly shortfall (MW).
    pub max_shortfall: f64,
    /// Demand per region (MWh), indexed by `Region::index()`.
    pub regional_demand: RegionalDemand,
    /// Generation located in each region (MWh).
    pub regional_generation: RegionalDemand,
    /// Surplus energy that no storage could absorb (MWh).
    pub surplus: f64,
}

impl SimulationResult {
    /// Simulated period in years.
    pub fn years(&self) -> f64 {
        self.timesteps as f64 / HOURS_PER_YEAR
    }

    /// Unserved energy as a percentage of demand (NaN for zero demand).
    pub fn unserved_percent(&self) -> f64 {
        if self.demand > 0.0 {
            self.unserved / self.demand * 100.0
        } else {
            f64::NAN
        }
    }

    /// Total emissions (t CO2).
    pub fn emissions(&self) -> f64 {
        self.generators.iter().map(|g| g.emissions).sum()
    }

    /// Energy supplied by generators matching `predicate` (MWh).
    pub fn energy_where<P>(&self, predicate: P) -> f64
    where
        P: Fn(Technology) -> bool,
    {
        self.generators
            .iter()
            .filter(|g| predicate(g.technology))
            .map(|g| g.energy)
            .sum()
    }

    /// Narration that also warns when unserved energy exceeds
    /// `reliability_std` (% of demand).
    pub fn report(&self, reliability_std: f64) -> Report<'_> {
        Report {
            result: self,
            reliability_std: Some(reliability_std),
        }
    }
}

/// Run narration, optionally checked against a reliability standard.
pub struct Report<'a> {
    result: &'a SimulationResult,
    reliability_std: Option<f64>,
}

impl fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = Report {
            result: self,
            reliability_std: None,
        };
        fmt::Display::fmt(&report, f)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        writeln!(f, "Timesteps: {} h", result.timesteps)?;
        writeln!(f, "Demand energy: {}", format_energy(result.demand))?;
        writeln!(f, "Generators:")?;
        for g in &result.generators {
            writeln!(
                f,
                "\t{} ({}) {}",
                g.technology,
                g.region,
                format_power(g.capacity)
            )?;
            match g.capacity_factor(result.timesteps) {
                Some(cf) => writeln!(
                    f,
                    "\t   supplied {}, CF {:.1}%",
                    format_energy(g.energy),
                    cf * 100.0
                )?,
                None => writeln!(f, "\t   supplied {}", format_energy(g.energy))?,
            }
        }
        writeln!(f, "Unstored surplus energy: {}", format_energy(result.surplus))?;
        writeln!(f, "Emissions: {:.3} Mt CO2", result.emissions() / 1e6)?;
        if result.unserved > 0.0 {
            let percent = result.unserved_percent();
            writeln!(f, "Unserved energy: {percent:.3}%")?;
            if self.reliability_std.is_some_and(|std| percent > std) {
                writeln!(f, "WARNING: reliability standard exceeded")?;
            }
            writeln!(f, "Unserved total hours: {}", result.unserved_hours)?;
            writeln!(
                f,
                "Number of unserved energy events: {}",
                result.unserved_events
            )?;
            write!(
                f,
                "Shortfalls (min, max): ({:.2} MW, {:.2} MW)",
                result.min_shortfall, result.max_shortfall
            )
        } else {
            write!(f, "No unserved energy")
        }
    }
}

/// Format power with a magnitude suffix.
pub fn format_power(megawatts: f64) -> String {
    if megawatts.abs() >= 1000.0 {
        format!("{:.2} GW", megawatts / 1000.0)
    } else {
        format!("{:.2} MW", megawatts)
    }
}

/// Format energy with a magnitude suffix.
pub fn format_energy(megawatt_hours: f64) -> String {
    let magnitude = megawatt_hours.abs();
    if magnitude >= 1e6 {
        format!("{:.2} TWh", megawatt_hours / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.2} GWh", megawatt_hours / 1e3)
    } else {
        format!("{:.2} MWh", megawatt_hours)
    }
}

/// Generator fleet and demand for one scenario.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    name: String,
    generators: Vec<Generator>,
    /// Indices of adjustable generators, in registration order.
    slots: Vec<usize>,
    demand: Vec<RegionalDemand>,
    nsp_limit: f64,
}

impl SimulationContext {
    /// Create an empty fleet for the given demand series.
    pub fn new(name: impl Into<String>, demand: Vec<RegionalDemand>, nsp_limit: f64) -> Self {
        Self {
            name: name.into(),
            generators: Vec::new(),
            slots: Vec::new(),
            demand,
            nsp_limit,
        }
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a generator. Dispatch follows registration order.
    pub fn add_generator(&mut self, generator: Generator) {
        if generator.adjustable {
            self.slots.push(self.generators.len());
        }
        self.generators.push(generator);
    }

    /// Registered generators.
    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    /// Hourly regional demand.
    pub fn demand(&self) -> &[RegionalDemand] {
        &self.demand
    }

    /// Mutable hourly regional demand, for demand modifiers.
    pub fn demand_mut(&mut self) -> &mut Vec<RegionalDemand> {
        &mut self.demand
    }

    /// Number of simulated hours.
    pub fn hours(&self) -> usize {
        self.demand.len()
    }

    /// Total demand over the period (MWh).
    pub fn total_demand(&self) -> f64 {
        self.demand.iter().flat_map(|h| h.iter()).sum()
    }

    /// Offer spilled energy to storage units other than `source`.
    fn store_spills(&mut self, hour: usize, source: usize, mut spill: f64) -> f64 {
        for (idx, other) in self.generators.iter_mut().enumerate() {
            if idx == source || !other.is_storage() {
                continue;
            }
            spill -= other.store(hour, spill);
            if spill <= UNSERVED_TOLERANCE {
                return 0.0;
            }
        }
        spill
    }
}

impl Simulation for SimulationContext {
    fn capacity_slots(&self) -> usize {
        self.slots.len()
    }

    fn set_capacity(&mut self, slot: usize, gigawatts: f64) {
        let idx = self.slots[slot];
        self.generators[idx].set_capacity_gw(gigawatts);
    }

    fn run(&mut self) -> Result<SimulationResult, SimulationError> {
        let hours = self.hours();
        let count = self.generators.len();
        for generator in &mut self.generators {
            generator.reset(hours);
        }

        let mut spilled = vec![0.0; count];
        let mut reserve_margin = vec![0.0; hours];
        let mut unserved = 0.0;
        let mut unserved_hours = 0;
        let mut unserved_events = 0;
        let mut min_shortfall = f64::INFINITY;
        let mut max_shortfall = 0.0f64;
        let mut in_event = false;

        for hour in 0..hours {
            let hour_demand: f64 = self.demand[hour].iter().sum();
            let mut residual = hour_demand;
            // non-synchronous generation above this share of demand is spilled
            let mut async_demand = residual * self.nsp_limit;

            for idx in 0..count {
                let synchronous = self.generators[idx].technology.is_synchronous();
                let target = if !synchronous && async_demand < residual {
                    async_demand
                } else {
                    residual
                };
                let (generation, spill) = self.generators[idx].step(hour, target);

                if !synchronous {
                    async_demand = (async_demand - generation).max(0.0);
                }
                residual = (residual - generation).max(0.0);

                if spill > 0.0 {
                    let unstored = self.store_spills(hour, idx, spill);
                    spilled[idx] += unstored;
                    reserve_margin[hour] += unstored;
                }
            }

            reserve_margin[hour] += self
                .generators
                .iter()
                .filter(|g| g.technology.provides_reserve())
                .map(|g| g.headroom(hour))
                .sum::<f64>();

            if residual > UNSERVED_TOLERANCE {
                unserved += residual;
                unserved_hours += 1;
                min_shortfall = min_shortfall.min(residual);
                max_shortfall = max_shortfall.max(residual);
                if !in_event {
                    unserved_events += 1;
                }
                in_event = true;
            } else {
                in_event = false;
            }
        }

        let mut regional_demand = [0.0; Region::COUNT];
        for hour in &self.demand {
            for (total, value) in regional_demand.iter_mut().zip(hour) {
                *total += value;
            }
        }

        let mut regional_generation = [0.0; Region::COUNT];
        let generators: Vec<GeneratorSummary> = self
            .generators
            .iter()
            .zip(&spilled)
            .map(|(g, &spilled)| {
                let energy: f64 = g.power().iter().sum();
                regional_generation[g.region.index()] += energy;
                GeneratorSummary {
                    technology: g.technology,
                    region: g.region,
                    capacity: g.capacity,
                    energy,
                    spilled,
                    emissions: energy * emission_intensity(g.technology),
                }
            })
            .collect();

        Ok(SimulationResult {
            timesteps: hours,
            demand: regional_demand.iter().sum(),
            generators,
            reserve_margin,
            unserved,
            unserved_hours,
            unserved_events,
            min_shortfall: if unserved_hours > 0 { min_shortfall } else { 0.0 },
            max_shortfall,
            regional_demand,
            regional_generation,
            surplus: spilled.iter().sum(),
        })
    }
}

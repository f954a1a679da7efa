//! Configuration types for an optimisation run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ScenarioConfig;

/// Top-level run configuration. Read once at startup and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Supply scenario and demand shaping.
    #[serde(default)]
    pub scenario: ScenarioConfig,
    /// Physical and regulatory constraints scored as penalties.
    #[serde(default)]
    pub constraints: ConstraintConfig,
    /// Cost model inputs.
    #[serde(default)]
    pub costs: CostConfig,
    /// Search strategy settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Optional per-evaluation trace file.
    #[serde(default)]
    pub trace_file: Option<PathBuf>,
    /// Where the result bundle is written.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            scenario: ScenarioConfig::default(),
            constraints: ConstraintConfig::default(),
            costs: CostConfig::default(),
            search: SearchConfig::default(),
            trace_file: None,
            output: default_output(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("results.json")
}

/// Constraint limits. A check only runs when its limit makes it active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintConfig {
    /// Allowed unserved energy as a percentage of demand.
    #[serde(default = "default_reliability_std")]
    pub reliability_std: f64,
    /// Annual emissions cap (Mt CO2-e per year).
    #[serde(default)]
    pub emissions_limit: Option<f64>,
    /// Maximum fraction of demand met by fossil generation (1.0 disables).
    #[serde(default = "default_fossil_limit")]
    pub fossil_limit: f64,
    /// Minimum fraction of each region's demand generated in that region.
    #[serde(default)]
    pub min_regional_generation: Option<f64>,
    /// Minimum hourly reserve headroom (MW, 0 disables).
    #[serde(default)]
    pub reserves: f64,
    /// Annual bioenergy cap (TWh per year).
    #[serde(default)]
    pub bioenergy_limit: Option<f64>,
    /// Annual conventional hydro cap (TWh per year).
    #[serde(default)]
    pub hydro_limit: Option<f64>,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            reliability_std: default_reliability_std(),
            emissions_limit: None,
            fossil_limit: default_fossil_limit(),
            min_regional_generation: None,
            reserves: 0.0,
            bioenergy_limit: None,
            hydro_limit: None,
        }
    }
}

fn default_reliability_std() -> f64 {
    0.002
}
fn default_fossil_limit() -> f64 {
    1.0
}

/// Inputs to the cost model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Real discount rate used to annualise capital.
    #[serde(default = "default_discount_rate")]
    pub discount_rate: f64,
    /// Carbon price ($/t CO2).
    #[serde(default = "default_carbon_price")]
    pub carbon_price: f64,
    /// Coal price ($/GJ).
    #[serde(default = "default_coal_price")]
    pub coal_price: f64,
    /// Gas price ($/GJ).
    #[serde(default = "default_gas_price")]
    pub gas_price: f64,
    /// Bioenergy fuel price ($/GJ).
    #[serde(default = "default_bioenergy_price")]
    pub bioenergy_price: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            discount_rate: default_discount_rate(),
            carbon_price: default_carbon_price(),
            coal_price: default_coal_price(),
            gas_price: default_gas_price(),
            bioenergy_price: default_bioenergy_price(),
        }
    }
}

fn default_discount_rate() -> f64 {
    0.05
}
fn default_carbon_price() -> f64 {
    25.0
}
fn default_coal_price() -> f64 {
    1.86
}
fn default_gas_price() -> f64 {
    11.0
}
fn default_bioenergy_price() -> f64 {
    12.0
}

/// CMA-ES and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Random seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Population size override (lambda). If None, uses the CMA-ES default.
    #[serde(default)]
    pub lambda: Option<usize>,
    /// Initial step size (sigma), in GW.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Number of generations to run.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Number of parallel evaluation workers (0 = one per core, 1 = sequential).
    #[serde(default)]
    pub workers: usize,
    /// Retry a failed evaluation once before giving up.
    #[serde(default = "default_retry")]
    pub retry_failed: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: None,
            lambda: None,
            sigma: default_sigma(),
            generations: default_generations(),
            workers: 0,
            retry_failed: default_retry(),
        }
    }
}

fn default_sigma() -> f64 {
    2.0
}
fn default_generations() -> usize {
    100
}
fn default_retry() -> bool {
    true
}

impl RunConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scenario = &self.scenario;
        if scenario.hours == 0 {
            return Err(ConfigError::InvalidHours);
        }
        if !scenario.peak_demand.is_finite() || scenario.peak_demand <= 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "scenario.peak_demand",
                value: scenario.peak_demand,
            });
        }
        check_fraction("scenario.nsp_limit", scenario.nsp_limit)?;

        let constraints = &self.constraints;
        check_non_negative("constraints.reliability_std", constraints.reliability_std)?;
        check_fraction("constraints.fossil_limit", constraints.fossil_limit)?;
        check_non_negative("constraints.reserves", constraints.reserves)?;
        if let Some(limit) = constraints.emissions_limit {
            check_non_negative("constraints.emissions_limit", limit)?;
        }
        if let Some(share) = constraints.min_regional_generation {
            check_fraction("constraints.min_regional_generation", share)?;
        }
        if let Some(limit) = constraints.bioenergy_limit {
            check_non_negative("constraints.bioenergy_limit", limit)?;
        }
        if let Some(limit) = constraints.hydro_limit {
            check_non_negative("constraints.hydro_limit", limit)?;
        }

        let costs = &self.costs;
        check_non_negative("costs.discount_rate", costs.discount_rate)?;
        check_non_negative("costs.carbon_price", costs.carbon_price)?;
        check_non_negative("costs.coal_price", costs.coal_price)?;
        check_non_negative("costs.gas_price", costs.gas_price)?;
        check_non_negative("costs.bioenergy_price", costs.bioenergy_price)?;

        let search = &self.search;
        if !search.sigma.is_finite() || search.sigma <= 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "search.sigma",
                value: search.sigma,
            });
        }
        if let Some(lambda) = search.lambda
            && lambda < 2
        {
            return Err(ConfigError::PopulationTooSmall(lambda));
        }

        Ok(())
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

/// Configuration errors. All of these are fatal before the search starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Simulated hours must be non-zero")]
    InvalidHours,
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f64 },
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Unknown supply scenario: {0}")]
    UnknownScenario(String),
    #[error("Unknown demand modifier: {0}")]
    UnknownModifier(String),
    #[error("Malformed demand modifier {spec:?}: {reason}")]
    MalformedModifier { spec: String, reason: String },
    #[error("Scenario {0} has no adjustable capacity")]
    EmptySearchSpace(String),
    #[error("Gene vector has {got} values but the scenario has {expected} capacity parameters")]
    DimensionMismatch { expected: usize, got: usize },
}

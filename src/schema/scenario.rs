//! Scenario description types: regions, technologies and the supply/demand setup.

use serde::{Deserialize, Serialize};

/// Market region a generator or a share of demand belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "NSW1")]
    Nsw1,
    #[serde(rename = "QLD1")]
    Qld1,
    #[serde(rename = "SA1")]
    Sa1,
    #[serde(rename = "TAS1")]
    Tas1,
    #[serde(rename = "VIC1")]
    Vic1,
}

impl Region {
    /// All regions in index order.
    pub const ALL: [Region; 5] = [
        Region::Nsw1,
        Region::Qld1,
        Region::Sa1,
        Region::Tas1,
        Region::Vic1,
    ];

    /// Number of regions.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-region arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Market code, e.g. `NSW1`.
    pub fn code(self) -> &'static str {
        match self {
            Region::Nsw1 => "NSW1",
            Region::Qld1 => "QLD1",
            Region::Sa1 => "SA1",
            Region::Tas1 => "TAS1",
            Region::Vic1 => "VIC1",
        }
    }

    /// Fraction of total demand located in this region.
    pub fn demand_share(self) -> f64 {
        match self {
            Region::Nsw1 => 0.35,
            Region::Qld1 => 0.28,
            Region::Sa1 => 0.08,
            Region::Tas1 => 0.05,
            Region::Vic1 => 0.24,
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Generating technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technology {
    Wind,
    Pv,
    Hydro,
    PumpedHydro,
    Coal,
    Ccgt,
    Biofuel,
    Ocgt,
}

impl Technology {
    /// Fixed merit order used when tabulating results.
    pub const MERIT_ORDER: [Technology; 8] = [
        Technology::Wind,
        Technology::Pv,
        Technology::Hydro,
        Technology::PumpedHydro,
        Technology::Coal,
        Technology::Ccgt,
        Technology::Biofuel,
        Technology::Ocgt,
    ];

    /// Short lowercase name as it appears in run narration.
    pub fn name(self) -> &'static str {
        match self {
            Technology::Wind => "wind",
            Technology::Pv => "pv",
            Technology::Hydro => "hydro",
            Technology::PumpedHydro => "pumped-hydro",
            Technology::Coal => "coal",
            Technology::Ccgt => "ccgt",
            Technology::Biofuel => "biofuel",
            Technology::Ocgt => "ocgt",
        }
    }

    /// Output follows a weather trace rather than dispatch instructions.
    pub fn is_variable(self) -> bool {
        matches!(self, Technology::Wind | Technology::Pv)
    }

    /// Synchronous machines are not subject to the non-synchronous limit.
    pub fn is_synchronous(self) -> bool {
        !self.is_variable()
    }

    /// Burns fossil fuel.
    pub fn is_fossil(self) -> bool {
        matches!(self, Technology::Coal | Technology::Ccgt | Technology::Ocgt)
    }

    /// Fuelled plant whose unused capacity counts as reserve headroom.
    pub fn provides_reserve(self) -> bool {
        matches!(
            self,
            Technology::Hydro
                | Technology::Coal
                | Technology::Ccgt
                | Technology::Biofuel
                | Technology::Ocgt
        )
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Supply scenario and demand shaping applied before the search starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Name of the supply scenario in the scenario registry.
    #[serde(default = "default_supply_scenario")]
    pub supply: String,
    /// Demand modifiers applied in order, e.g. `scale:10` or `roll:12`.
    #[serde(default)]
    pub demand_modifiers: Vec<String>,
    /// Number of simulated hours.
    #[serde(default = "default_hours")]
    pub hours: usize,
    /// Peak of the synthetic system demand curve (MW).
    #[serde(default = "default_peak_demand")]
    pub peak_demand: f64,
    /// Maximum share of hourly demand that non-synchronous plant may serve.
    #[serde(default = "default_nsp_limit")]
    pub nsp_limit: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            supply: default_supply_scenario(),
            demand_modifiers: Vec::new(),
            hours: default_hours(),
            peak_demand: default_peak_demand(),
            nsp_limit: default_nsp_limit(),
        }
    }
}

fn default_supply_scenario() -> String {
    "ccgt".to_string()
}
fn default_hours() -> usize {
    168
}
fn default_peak_demand() -> f64 {
    10_000.0
}
fn default_nsp_limit() -> f64 {
    0.75
}

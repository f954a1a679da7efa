//! Constraint penalties and the violation-reason bitmask.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::compute::SimulationResult;
use crate::schema::{ConstraintConfig, Region, Technology};

/// A constraint the search is penalised for violating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unserved,
    Emissions,
    Fossil,
    Bioenergy,
    Hydro,
    Reserves,
    MinRegional,
}

impl ConstraintKind {
    /// Every kind in evaluation order. Bit values follow this order.
    pub const ALL: [ConstraintKind; 7] = [
        ConstraintKind::Unserved,
        ConstraintKind::Emissions,
        ConstraintKind::Fossil,
        ConstraintKind::Bioenergy,
        ConstraintKind::Hydro,
        ConstraintKind::Reserves,
        ConstraintKind::MinRegional,
    ];

    /// Stable bit in the reason code.
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Label used in result bundles and narration.
    pub fn label(self) -> &'static str {
        match self {
            ConstraintKind::Unserved => "unserved",
            ConstraintKind::Emissions => "emissions",
            ConstraintKind::Fossil => "fossil",
            ConstraintKind::Bioenergy => "bioenergy",
            ConstraintKind::Hydro => "hydro",
            ConstraintKind::Reserves => "reserves",
            ConstraintKind::MinRegional => "min-regional",
        }
    }

    /// Whether the configuration enables this check.
    pub fn is_active(self, config: &ConstraintConfig) -> bool {
        match self {
            ConstraintKind::Unserved => true,
            ConstraintKind::Emissions => config.emissions_limit.is_some(),
            ConstraintKind::Fossil => config.fossil_limit < 1.0,
            ConstraintKind::Bioenergy => config.bioenergy_limit.is_some(),
            ConstraintKind::Hydro => config.hydro_limit.is_some(),
            ConstraintKind::Reserves => config.reserves > 0.0,
            ConstraintKind::MinRegional => config.min_regional_generation.is_some(),
        }
    }

    /// Unnormalised penalty for a simulation result. Zero means satisfied.
    pub fn assess(self, result: &SimulationResult, config: &ConstraintConfig) -> f64 {
        let years = result.years();
        match self {
            ConstraintKind::Unserved => {
                let allowed = result.demand * config.reliability_std / 100.0;
                cubed_excess(result.unserved - allowed)
            }
            ConstraintKind::Emissions => {
                let limit = config.emissions_limit.unwrap_or(f64::INFINITY) * 1e6 * years;
                cubed_excess(result.emissions() - limit)
            }
            ConstraintKind::Fossil => {
                let fossil = result.energy_where(Technology::is_fossil);
                cubed_excess(fossil - result.demand * config.fossil_limit)
            }
            ConstraintKind::Bioenergy => {
                let limit = twh_per_year(config.bioenergy_limit, years);
                let energy = result.energy_where(|t| t == Technology::Biofuel);
                cubed_excess(energy - limit)
            }
            ConstraintKind::Hydro => {
                let limit = twh_per_year(config.hydro_limit, years);
                let energy = result.energy_where(|t| t == Technology::Hydro);
                cubed_excess(energy - limit)
            }
            ConstraintKind::Reserves => result
                .reserve_margin
                .iter()
                .map(|&margin| cubed_excess(config.reserves - margin))
                .sum(),
            ConstraintKind::MinRegional => {
                let share = config.min_regional_generation.unwrap_or(0.0);
                Region::ALL
                    .iter()
                    .map(|r| r.index())
                    .filter(|&i| result.regional_demand[i] > 0.0)
                    .map(|i| {
                        cubed_excess(
                            share * result.regional_demand[i] - result.regional_generation[i],
                        )
                    })
                    .sum()
            }
        }
    }
}

fn cubed_excess(excess: f64) -> f64 {
    if excess > 0.0 { excess.powi(3) } else { 0.0 }
}

fn twh_per_year(limit: Option<f64>, years: f64) -> f64 {
    limit.unwrap_or(f64::INFINITY) * 1e6 * years
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bitmask of violated constraints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reasons(u32);

impl Reasons {
    /// No violations.
    pub const NONE: Reasons = Reasons(0);

    /// Raw bitmask value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from a raw bitmask.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, kind: ConstraintKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Violated kinds in declared order.
    pub fn kinds(self) -> impl Iterator<Item = ConstraintKind> {
        ConstraintKind::ALL
            .into_iter()
            .filter(move |&kind| self.contains(kind))
    }

    /// Labels of the violated constraints in declared order.
    pub fn labels(self) -> Vec<String> {
        self.kinds().map(|kind| kind.label().to_string()).collect()
    }
}

impl From<ConstraintKind> for Reasons {
    fn from(kind: ConstraintKind) -> Self {
        Self(kind.bit())
    }
}

impl BitOr for Reasons {
    type Output = Reasons;

    fn bitor(self, rhs: Reasons) -> Reasons {
        Reasons(self.0 | rhs.0)
    }
}

impl BitOrAssign for Reasons {
    fn bitor_assign(&mut self, rhs: Reasons) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Reasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of active constraint checks.
#[derive(Debug, Clone)]
pub struct PenaltyRegistry {
    config: ConstraintConfig,
    active: Vec<ConstraintKind>,
}

impl PenaltyRegistry {
    /// Enable the checks the configuration asks for.
    pub fn new(config: ConstraintConfig) -> Self {
        let active = ConstraintKind::ALL
            .into_iter()
            .filter(|kind| kind.is_active(&config))
            .collect();
        Self { config, active }
    }

    /// Active checks in evaluation order.
    pub fn active(&self) -> &[ConstraintKind] {
        &self.active
    }

    /// Sum of penalties and union of reasons.
    pub fn assess(&self, result: &SimulationResult) -> (f64, Reasons) {
        let mut total = 0.0;
        let mut reasons = Reasons::NONE;
        for &kind in &self.active {
            let penalty = kind.assess(result, &self.config);
            if penalty > 0.0 {
                total += penalty;
                reasons |= Reasons::from(kind);
            }
        }
        (total, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::GeneratorSummary;
    use proptest::prelude::*;

    fn summary(technology: Technology, energy: f64, emissions: f64) -> GeneratorSummary {
        GeneratorSummary {
            technology,
            region: Region::Nsw1,
            capacity: 100.0,
            energy,
            spilled: 0.0,
            emissions,
        }
    }

    fn result(generators: Vec<GeneratorSummary>, unserved: f64) -> SimulationResult {
        let mut regional_demand = [0.0; Region::COUNT];
        regional_demand[Region::Nsw1.index()] = 1000.0;
        let mut regional_generation = [0.0; Region::COUNT];
        regional_generation[Region::Nsw1.index()] = generators.iter().map(|g| g.energy).sum();
        SimulationResult {
            timesteps: 8760,
            demand: 1000.0,
            generators,
            reserve_margin: vec![50.0; 4],
            unserved,
            unserved_hours: 0,
            unserved_events: 0,
            min_shortfall: 0.0,
            max_shortfall: 0.0,
            regional_demand,
            regional_generation,
            surplus: 0.0,
        }
    }

    #[test]
    fn test_stable_bits() {
        let bits: Vec<u32> = ConstraintKind::ALL.iter().map(|k| k.bit()).collect();
        assert_eq!(bits, vec![1, 2, 4, 8, 16, 32, 64]);
    }

    #[test]
    fn test_default_registry_only_checks_unserved() {
        let registry = PenaltyRegistry::new(ConstraintConfig::default());
        assert_eq!(registry.active(), &[ConstraintKind::Unserved]);
    }

    #[test]
    fn test_unserved_penalty_is_cubic() {
        let registry = PenaltyRegistry::new(ConstraintConfig {
            reliability_std: 0.0,
            ..Default::default()
        });
        let (penalty, reasons) = registry.assess(&result(vec![], 2.0));
        assert_eq!(penalty, 8.0);
        assert_eq!(reasons, Reasons::from(ConstraintKind::Unserved));
    }

    #[test]
    fn test_within_standard_sets_no_bit() {
        let registry = PenaltyRegistry::new(ConstraintConfig {
            reliability_std: 1.0,
            ..Default::default()
        });
        let (penalty, reasons) = registry.assess(&result(vec![], 5.0));
        assert_eq!(penalty, 0.0);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_multiple_violations_combine() {
        let registry = PenaltyRegistry::new(ConstraintConfig {
            reliability_std: 0.0,
            emissions_limit: Some(0.0),
            fossil_limit: 0.5,
            reserves: 60.0,
            ..Default::default()
        });
        let res = result(vec![summary(Technology::Coal, 1000.0, 2.0)], 1.0);
        let (penalty, reasons) = registry.assess(&res);

        // unserved 1 + emissions 2^3 + fossil 500^3 + reserves 4 * 10^3
        assert_eq!(penalty, 1.0 + 8.0 + 125_000_000.0 + 4000.0);
        assert_eq!(
            reasons.labels(),
            vec!["unserved", "emissions", "fossil", "reserves"]
        );
        assert_eq!(reasons.bits(), 1 | 2 | 4 | 32);
    }

    #[test]
    fn test_energy_limits_and_regional_share() {
        let registry = PenaltyRegistry::new(ConstraintConfig {
            bioenergy_limit: Some(0.0),
            hydro_limit: Some(1.0),
            min_regional_generation: Some(0.9),
            ..Default::default()
        });
        let res = result(
            vec![
                summary(Technology::Biofuel, 3.0, 0.0),
                summary(Technology::PumpedHydro, 500.0, 0.0),
            ],
            0.0,
        );
        let (penalty, reasons) = registry.assess(&res);
        // bioenergy 3^3, pumped hydro is not hydro, regional 900 - 503
        assert_eq!(penalty, 27.0 + 397.0f64.powi(3));
        assert!(reasons.contains(ConstraintKind::Bioenergy));
        assert!(!reasons.contains(ConstraintKind::Hydro));
        assert!(reasons.contains(ConstraintKind::MinRegional));
    }

    proptest! {
        #[test]
        fn prop_reason_bits_injective(mask in 0u32..128) {
            let reasons = ConstraintKind::ALL
                .into_iter()
                .filter(|k| mask & k.bit() != 0)
                .fold(Reasons::NONE, |acc, k| acc | Reasons::from(k));
            prop_assert_eq!(reasons.bits(), mask);
            let decoded = reasons
                .kinds()
                .fold(Reasons::NONE, |acc, k| acc | Reasons::from(k));
            prop_assert_eq!(decoded, reasons);
        }
    }
}

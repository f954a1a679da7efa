//! Cost model: annualised capital, fixed and variable operating costs.

use super::context::SimulationResult;
use super::generator::emission_intensity;
use crate::schema::{CostConfig, Technology};

/// Cost coefficients for one technology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TechnologyCosts {
    /// Overnight capital cost ($/kW).
    pub capital: f64,
    /// Fixed operating cost ($/kW/year).
    pub fixed_om: f64,
    /// Variable operating cost ($/MWh).
    pub variable_om: f64,
    /// Fuel burned per unit of output (GJ/MWh).
    pub heat_rate: f64,
    /// Economic lifetime (years).
    pub lifetime: u32,
}

impl TechnologyCosts {
    const fn new(
        capital: f64,
        fixed_om: f64,
        variable_om: f64,
        heat_rate: f64,
        lifetime: u32,
    ) -> Self {
        Self {
            capital,
            fixed_om,
            variable_om,
            heat_rate,
            lifetime,
        }
    }

    /// Default coefficients for a technology.
    pub fn for_technology(technology: Technology) -> Self {
        match technology {
            Technology::Wind => Self::new(1800.0, 50.0, 0.0, 0.0, 25),
            Technology::Pv => Self::new(1100.0, 25.0, 0.0, 0.0, 25),
            // existing plant, sunk capital
            Technology::Hydro => Self::new(0.0, 0.0, 0.0, 0.0, 50),
            Technology::PumpedHydro => Self::new(2000.0, 15.0, 0.0, 0.0, 50),
            Technology::Coal => Self::new(3000.0, 50.0, 4.0, 10.0, 30),
            Technology::Ccgt => Self::new(1100.0, 10.0, 4.0, 7.0, 30),
            Technology::Biofuel => Self::new(800.0, 5.0, 10.0, 11.0, 30),
            Technology::Ocgt => Self::new(800.0, 5.0, 10.0, 11.0, 30),
        }
    }
}

/// Converts simulated operation into a total cost. Pure function of configuration.
#[derive(Debug, Clone)]
pub struct CostModel {
    config: CostConfig,
}

impl CostModel {
    /// Create a cost model from configuration.
    pub fn new(config: &CostConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Present value of $1/year over `years` at the configured discount rate.
    pub fn annuity_factor(&self, years: u32) -> f64 {
        let r = self.config.discount_rate;
        let n = years as f64;
        if r == 0.0 {
            n
        } else {
            (1.0 - (1.0 + r).powf(-n)) / r
        }
    }

    /// Fuel price for a technology ($/GJ).
    pub fn fuel_price(&self, technology: Technology) -> f64 {
        match technology {
            Technology::Coal => self.config.coal_price,
            Technology::Ccgt | Technology::Ocgt => self.config.gas_price,
            Technology::Biofuel => self.config.bioenergy_price,
            _ => 0.0,
        }
    }

    /// Cost of each MWh generated: variable O&M, fuel and carbon ($/MWh).
    pub fn marginal_cost(&self, technology: Technology) -> f64 {
        let costs = TechnologyCosts::for_technology(technology);
        costs.variable_om
            + costs.heat_rate * self.fuel_price(technology)
            + emission_intensity(technology) * self.config.carbon_price
    }

    /// Total cost of a simulated period ($).
    pub fn total_cost(&self, result: &SimulationResult) -> f64 {
        let years = result.years();
        result
            .generators
            .iter()
            .map(|g| {
                let costs = TechnologyCosts::for_technology(g.technology);
                let kilowatts = g.capacity * 1000.0;
                let capital = costs.capital * kilowatts / self.annuity_factor(costs.lifetime);
                let fixed = costs.fixed_om * kilowatts;
                (capital + fixed) * years + self.marginal_cost(g.technology) * g.energy
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::context::GeneratorSummary;
    use crate::schema::Region;

    fn result_with(generators: Vec<GeneratorSummary>, hours: usize) -> SimulationResult {
        SimulationResult {
            timesteps: hours,
            demand: 1.0,
            generators,
            reserve_margin: vec![0.0; hours],
            unserved: 0.0,
            unserved_hours: 0,
            unserved_events: 0,
            min_shortfall: 0.0,
            max_shortfall: 0.0,
            regional_demand: [0.0; Region::COUNT],
            regional_generation: [0.0; Region::COUNT],
            surplus: 0.0,
        }
    }

    #[test]
    fn test_annuity_factor() {
        let zero = CostModel::new(&CostConfig {
            discount_rate: 0.0,
            ..Default::default()
        });
        assert_eq!(zero.annuity_factor(30), 30.0);

        let model = CostModel::new(&CostConfig {
            discount_rate: 0.05,
            ..Default::default()
        });
        assert!((model.annuity_factor(1) - 1.0 / 1.05).abs() < 1e-12);
        assert!(model.annuity_factor(30) < 30.0);
    }

    #[test]
    fn test_marginal_cost_includes_fuel_and_carbon() {
        let model = CostModel::new(&CostConfig {
            carbon_price: 10.0,
            gas_price: 5.0,
            ..Default::default()
        });
        // 4 VOM + 7 GJ * $5 + 0.4 t * $10
        assert!((model.marginal_cost(Technology::Ccgt) - 43.0).abs() < 1e-12);
        assert_eq!(model.marginal_cost(Technology::Wind), 0.0);
    }

    #[test]
    fn test_total_cost_one_year() {
        let model = CostModel::new(&CostConfig {
            discount_rate: 0.0,
            carbon_price: 0.0,
            ..Default::default()
        });
        let wind = GeneratorSummary {
            technology: Technology::Wind,
            region: Region::Sa1,
            capacity: 1.0,
            energy: 1000.0,
            spilled: 0.0,
            emissions: 0.0,
        };
        let result = result_with(vec![wind], 8760);
        // 1 MW = 1000 kW: capital 1800 * 1000 / 25 plus fixed 50 * 1000
        let expected = 1800.0 * 1000.0 / 25.0 + 50.0 * 1000.0;
        assert!((model.total_cost(&result) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_capacity_costs_nothing() {
        let model = CostModel::new(&CostConfig::default());
        let idle = GeneratorSummary {
            technology: Technology::Coal,
            region: Region::Nsw1,
            capacity: 0.0,
            energy: 0.0,
            spilled: 0.0,
            emissions: 0.0,
        };
        assert_eq!(model.total_cost(&result_with(vec![idle], 168)), 0.0);
    }
}

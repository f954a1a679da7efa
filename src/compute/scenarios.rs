//! Supply scenarios and demand modifiers, resolved by name.

use std::collections::HashMap;

use super::context::{Simulation, SimulationContext};
use super::generator::Generator;
use super::traces::{RegionalDemand, demand_profile, pv_trace, wind_trace};
use crate::schema::{ConfigError, Region, ScenarioConfig, Technology};

/// Populates a context with its generator fleet.
pub type SupplyScenario = fn(&mut SimulationContext);

/// Reshapes the demand series. The argument is the text after the first `:`.
pub type DemandModifier = fn(&mut SimulationContext, Option<&str>) -> Result<(), ConfigError>;

/// Supply scenarios by name.
pub fn supply_scenarios() -> HashMap<&'static str, SupplyScenario> {
    let mut map: HashMap<&'static str, SupplyScenario> = HashMap::new();
    map.insert("ccgt", ccgt);
    map.insert("coal-ccgt", coal_ccgt);
    map.insert("re100", re100);
    map.insert("replacement", replacement);
    map
}

/// Demand modifiers by name.
pub fn demand_modifiers() -> HashMap<&'static str, DemandModifier> {
    let mut map: HashMap<&'static str, DemandModifier> = HashMap::new();
    map.insert("unchanged", unchanged);
    map.insert("scale", scale);
    map.insert("roll", roll);
    map.insert("shift", shift);
    map.insert("peaks", peaks);
    map
}

/// Build the simulation context described by a scenario configuration.
pub fn build_context(config: &ScenarioConfig) -> Result<SimulationContext, ConfigError> {
    let scenarios = supply_scenarios();
    let populate = scenarios
        .get(config.supply.as_str())
        .ok_or_else(|| ConfigError::UnknownScenario(config.supply.clone()))?;

    let demand = demand_profile(config.hours, config.peak_demand);
    let mut context = SimulationContext::new(config.supply.clone(), demand, config.nsp_limit);
    populate(&mut context);

    if context.capacity_slots() == 0 {
        return Err(ConfigError::EmptySearchSpace(config.supply.clone()));
    }

    let modifiers = demand_modifiers();
    for spec in &config.demand_modifiers {
        let (name, arg) = match spec.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (spec.as_str(), None),
        };
        let modify = modifiers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownModifier(spec.clone()))?;
        modify(&mut context, arg)?;
        log::debug!("Applied demand modifier {spec}");
    }

    log::info!(
        "Scenario {}: {} generators, {} capacity parameters, {} h",
        context.name(),
        context.generators().len(),
        context.capacity_slots(),
        context.hours()
    );
    Ok(context)
}

fn peak_demand(context: &SimulationContext) -> f64 {
    context
        .demand()
        .iter()
        .map(|hour| hour.iter().sum::<f64>())
        .fold(0.0, f64::max)
}

fn ccgt(context: &mut SimulationContext) {
    context.add_generator(Generator::dispatchable(Technology::Ccgt, Region::Nsw1));
    context.add_generator(Generator::dispatchable(Technology::Ocgt, Region::Nsw1));
}

fn coal_ccgt(context: &mut SimulationContext) {
    context.add_generator(Generator::dispatchable(Technology::Coal, Region::Nsw1));
    ccgt(context);
}

fn re100(context: &mut SimulationContext) {
    let hours = context.hours();
    let hydro = peak_demand(context) * 0.08;
    for region in [Region::Sa1, Region::Vic1] {
        context.add_generator(Generator::variable(
            Technology::Wind,
            region,
            wind_trace(hours, region),
        ));
    }
    for region in [Region::Qld1, Region::Nsw1] {
        context.add_generator(Generator::variable(
            Technology::Pv,
            region,
            pv_trace(hours, region),
        ));
    }
    context.add_generator(Generator::dispatchable(Technology::Hydro, Region::Tas1).fixed(hydro));
    context.add_generator(Generator::storage(
        Technology::PumpedHydro,
        Region::Nsw1,
        8.0,
        0.8,
    ));
    context.add_generator(Generator::dispatchable(Technology::Biofuel, Region::Nsw1));
}

fn replacement(context: &mut SimulationContext) {
    let hours = context.hours();
    let hydro = peak_demand(context) * 0.08;
    context.add_generator(Generator::variable(
        Technology::Wind,
        Region::Sa1,
        wind_trace(hours, Region::Sa1),
    ));
    context.add_generator(Generator::variable(
        Technology::Pv,
        Region::Qld1,
        pv_trace(hours, Region::Qld1),
    ));
    context.add_generator(Generator::dispatchable(Technology::Hydro, Region::Tas1).fixed(hydro));
    context.add_generator(Generator::dispatchable(Technology::Coal, Region::Nsw1));
    ccgt(context);
}

fn malformed(spec: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedModifier {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_number<T>(spec: &str, field: &str, text: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    text.trim()
        .parse()
        .map_err(|_| malformed(spec, format!("{field} {text:?} is not a number")))
}

fn parse_hour_of_day(spec: &str, field: &str, text: &str) -> Result<usize, ConfigError> {
    let hour: usize = parse_number(spec, field, text)?;
    if hour >= 24 {
        return Err(malformed(spec, format!("{field} must be in 0..24")));
    }
    Ok(hour)
}

fn require_arg<'a>(name: &str, arg: Option<&'a str>) -> Result<&'a str, ConfigError> {
    arg.ok_or_else(|| malformed(name, "missing argument"))
}

/// Add `delta` MW to an hour, split in proportion to the hour's regional mix.
fn adjust_hour(hour: &mut RegionalDemand, delta: f64) {
    let total: f64 = hour.iter().sum();
    for region in Region::ALL {
        let share = if total > 0.0 {
            hour[region.index()] / total
        } else {
            region.demand_share()
        };
        hour[region.index()] = (hour[region.index()] + delta * share).max(0.0);
    }
}

fn unchanged(_context: &mut SimulationContext, arg: Option<&str>) -> Result<(), ConfigError> {
    match arg {
        Some(arg) => Err(malformed(&format!("unchanged:{arg}"), "takes no argument")),
        None => Ok(()),
    }
}

/// `scale:<pct>`: scale all demand by a percentage change.
fn scale(context: &mut SimulationContext, arg: Option<&str>) -> Result<(), ConfigError> {
    let arg = require_arg("scale", arg)?;
    let spec = format!("scale:{arg}");
    let percent: f64 = parse_number(&spec, "percentage", arg)?;
    let factor = 1.0 + percent / 100.0;
    if factor < 0.0 {
        return Err(malformed(&spec, "demand cannot become negative"));
    }
    for hour in context.demand_mut().iter_mut() {
        for value in hour.iter_mut() {
            *value *= factor;
        }
    }
    Ok(())
}

/// `roll:<hours>`: rotate the demand series; positive values move demand later.
fn roll(context: &mut SimulationContext, arg: Option<&str>) -> Result<(), ConfigError> {
    let arg = require_arg("roll", arg)?;
    let hours: i64 = parse_number(&format!("roll:{arg}"), "hours", arg)?;
    let demand = context.demand_mut();
    let len = demand.len() as i64;
    if len == 0 {
        return Ok(());
    }
    let offset = hours.rem_euclid(len) as usize;
    demand.rotate_right(offset);
    Ok(())
}

/// `shift:<MW>:<from>:<to>`: move demand between hours of the day, every day.
fn shift(context: &mut SimulationContext, arg: Option<&str>) -> Result<(), ConfigError> {
    let arg = require_arg("shift", arg)?;
    let spec = format!("shift:{arg}");
    let fields: Vec<&str> = arg.split(':').collect();
    let [amount, from, to] = fields.as_slice() else {
        return Err(malformed(&spec, "expected <MW>:<from-hour>:<to-hour>"));
    };
    let amount: f64 = parse_number(&spec, "amount", amount)?;
    let from = parse_hour_of_day(&spec, "from-hour", from)?;
    let to = parse_hour_of_day(&spec, "to-hour", to)?;
    if amount < 0.0 {
        return Err(malformed(&spec, "amount must be non-negative"));
    }

    let demand = context.demand_mut();
    for day in (0..demand.len()).step_by(24) {
        let (src, dst) = (day + from, day + to);
        if src >= demand.len() || dst >= demand.len() {
            continue;
        }
        let available: f64 = demand[src].iter().sum();
        let moved = amount.min(available);
        adjust_hour(&mut demand[src], -moved);
        adjust_hour(&mut demand[dst], moved);
    }
    Ok(())
}

/// `peaks:<MW>:<threshold>`: add demand to every hour above a threshold.
fn peaks(context: &mut SimulationContext, arg: Option<&str>) -> Result<(), ConfigError> {
    let arg = require_arg("peaks", arg)?;
    let spec = format!("peaks:{arg}");
    let Some((amount, threshold)) = arg.split_once(':') else {
        return Err(malformed(&spec, "expected <MW>:<threshold-MW>"));
    };
    let amount: f64 = parse_number(&spec, "amount", amount)?;
    let threshold: f64 = parse_number(&spec, "threshold", threshold)?;

    for hour in context.demand_mut().iter_mut() {
        if hour.iter().sum::<f64>() > threshold {
            adjust_hour(hour, amount);
        }
    }
    Ok(())
}

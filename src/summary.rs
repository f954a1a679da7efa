//! Turns run narration into per-scenario capacity and energy tables.
//!
//! The parser reads narration line by line. Each `Done` line closes the
//! current scenario: its accumulator is rendered as a table and a fresh
//! accumulator starts for the next scenario.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufRead, Write};

use regex::Regex;

use crate::schema::Technology;

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

/// A value carried an unrecognised unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitParsingError {
    #[error("unknown capacity unit {0:?} (expected kW, MW or GW)")]
    Capacity(String),
    #[error("unknown energy unit {0:?} (expected MWh, GWh or TWh)")]
    Energy(String),
}

/// Summary failures.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("line {line}: {source}")]
    Unit {
        line: usize,
        #[source]
        source: UnitParsingError,
    },
    #[error("line {line}: malformed number {text:?}")]
    Number { line: usize, text: String },
    #[error("Invalid summary pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert a capacity to MW.
pub fn capacity_to_mw(value: f64, unit: &str) -> Result<f64, UnitParsingError> {
    match unit {
        "kW" => Ok(value / 1e3),
        "MW" => Ok(value),
        "GW" => Ok(value * 1e3),
        other => Err(UnitParsingError::Capacity(other.to_string())),
    }
}

/// Convert an energy to MWh.
pub fn energy_to_mwh(value: f64, unit: &str) -> Result<f64, UnitParsingError> {
    match unit {
        "MWh" => Ok(value),
        "GWh" => Ok(value * 1e3),
        "TWh" => Ok(value * 1e6),
        other => Err(UnitParsingError::Energy(other.to_string())),
    }
}

/// Capacity and energy of one technology within a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnologyTotals {
    pub name: String,
    /// Capacity (MW).
    pub capacity: f64,
    /// Energy supplied (MWh).
    pub energy: f64,
}

/// Everything gathered for one scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioAccumulator {
    technologies: Vec<TechnologyTotals>,
    index: HashMap<String, usize>,
    /// Technology the next `supplied` line belongs to.
    current: Option<usize>,
    pub timesteps: Option<usize>,
    /// Demand (MWh).
    pub demand: Option<f64>,
    /// Legacy per-generator spill total (MWh).
    pub spilled: f64,
    /// Unstored surplus total (MWh).
    pub surplus: f64,
    /// Emissions (Mt CO2).
    pub emissions: Option<f64>,
    /// Unserved energy (% of demand).
    pub unserved: Option<f64>,
    pub score: Option<f64>,
    pub penalty: Option<f64>,
    pub constraints: Vec<String>,
    pub parameters: Option<String>,
}

impl ScenarioAccumulator {
    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty() && self.score.is_none() && self.timesteps.is_none()
    }

    /// Add a generator's capacity (MW) under its technology name.
    pub fn add_capacity(&mut self, name: &str, megawatts: f64) {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.technologies.push(TechnologyTotals {
                    name: name.to_string(),
                    capacity: 0.0,
                    energy: 0.0,
                });
                self.index.insert(name.to_string(), self.technologies.len() - 1);
                self.technologies.len() - 1
            }
        };
        self.technologies[idx].capacity += megawatts;
        self.current = Some(idx);
    }

    /// Add energy (MWh) to the most recently seen generator.
    pub fn add_energy(&mut self, megawatt_hours: f64) {
        if let Some(idx) = self.current {
            self.technologies[idx].energy += megawatt_hours;
        } else {
            log::warn!("Energy line without a preceding generator, ignored");
        }
    }

    /// Technologies in merit order; unknown names follow in first-seen order.
    pub fn rows(&self) -> Vec<&TechnologyTotals> {
        let rank = |name: &str| {
            Technology::MERIT_ORDER
                .iter()
                .position(|t| t.name() == name)
                .unwrap_or(Technology::MERIT_ORDER.len())
        };
        let mut rows: Vec<&TechnologyTotals> = self.technologies.iter().collect();
        // stable sort keeps first-seen order among unknown names
        rows.sort_by_key(|row| rank(row.name.as_str()));
        rows
    }

    fn capacity_factor(&self, row: &TechnologyTotals) -> Option<f64> {
        let hours = self.timesteps? as f64;
        let max = row.capacity * hours;
        (max > 0.0).then(|| row.energy / max)
    }
}

fn share(part: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", part / total * 100.0)
    } else {
        "-".to_string()
    }
}

impl fmt::Display for ScenarioAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        let total_capacity: f64 = rows.iter().map(|r| r.capacity).sum();
        let total_energy: f64 = rows.iter().map(|r| r.energy).sum();

        writeln!(
            f,
            "{:<14}{:>14}{:>8}{:>14}{:>8}{:>8}",
            "technology", "capacity GW", "share", "energy TWh", "share", "CF"
        )?;
        for row in &rows {
            let cf = self
                .capacity_factor(row)
                .map_or_else(|| "-".to_string(), |cf| format!("{:.1}%", cf * 100.0));
            writeln!(
                f,
                "{:<14}{:>14.2}{:>8}{:>14.2}{:>8}{:>8}",
                row.name,
                row.capacity / 1e3,
                share(row.capacity, total_capacity),
                row.energy / 1e6,
                share(row.energy, total_energy),
                cf
            )?;
        }
        writeln!(
            f,
            "{:<14}{:>14.2}{:>8}{:>14.2}{:>8}",
            "total",
            total_capacity / 1e3,
            "",
            total_energy / 1e6,
            ""
        )?;

        if let Some(demand) = self.demand {
            writeln!(f, "Demand: {:.2} TWh", demand / 1e6)?;
        }
        if self.spilled > 0.0 {
            writeln!(f, "Spilled: {:.2} TWh", self.spilled / 1e6)?;
        }
        writeln!(f, "Unstored surplus: {:.2} TWh", self.surplus / 1e6)?;
        if let Some(emissions) = self.emissions {
            writeln!(f, "Emissions: {emissions:.3} Mt CO2")?;
        }
        if let Some(unserved) = self.unserved {
            writeln!(f, "Unserved: {unserved:.3}%")?;
        }
        if let Some(score) = self.score {
            writeln!(f, "Score: {score:.2} $/MWh")?;
        }
        if let Some(penalty) = self.penalty {
            writeln!(f, "Penalty: {penalty:.2} $/MWh")?;
        }
        if !self.constraints.is_empty() {
            writeln!(f, "Constraints violated: {}", self.constraints.join(" "))?;
        }
        if let Some(parameters) = &self.parameters {
            writeln!(f, "Parameters: {parameters}")?;
        }
        Ok(())
    }
}

/// Line classifier with its patterns compiled once.
pub struct SummaryParser {
    capacity: Regex,
    supplied: Regex,
    emissions: Regex,
    unserved: Regex,
    score: Regex,
    penalty: Regex,
    timesteps: Regex,
    demand: Regex,
    accumulator: ScenarioAccumulator,
    line: usize,
}

impl SummaryParser {
    pub fn new() -> Result<Self, SummaryError> {
        Ok(Self {
            capacity: Regex::new(&format!(
                r"^\s*([A-Za-z][\w-]*)(?:\s+\([^)]*\))?\s+({NUMBER})\s+(\S*W)\s*$"
            ))?,
            supplied: Regex::new(&format!(r"^\s*supplied\s+({NUMBER})\s+([A-Za-z]+)"))?,
            emissions: Regex::new(&format!(r"^\s*Emissions:\s+({NUMBER})\s+Mt CO2"))?,
            unserved: Regex::new(&format!(r"^\s*Unserved energy:\s+({NUMBER})%"))?,
            score: Regex::new(&format!(r"^\s*Score:\s+({NUMBER})"))?,
            penalty: Regex::new(&format!(r"^\s*Penalty:\s+({NUMBER})"))?,
            timesteps: Regex::new(r"^\s*Timesteps:\s+(\d+)")?,
            demand: Regex::new(&format!(r"^\s*Demand energy:\s+({NUMBER})\s+([A-Za-z]+)"))?,
            accumulator: ScenarioAccumulator::default(),
            line: 0,
        })
    }

    fn number(&self, text: &str) -> Result<f64, SummaryError> {
        text.parse().map_err(|_| SummaryError::Number {
            line: self.line,
            text: text.to_string(),
        })
    }

    fn unit_error(&self, source: UnitParsingError) -> SummaryError {
        SummaryError::Unit {
            line: self.line,
            source,
        }
    }

    fn energy(&self, value: &str, unit: &str) -> Result<f64, SummaryError> {
        let value = self.number(value)?;
        energy_to_mwh(value, unit).map_err(|e| self.unit_error(e))
    }

    /// Feed one line. Returns the finished scenario when the line is `Done`.
    pub fn feed(&mut self, line: &str) -> Result<Option<ScenarioAccumulator>, SummaryError> {
        self.line += 1;
        let trimmed = line.trim();
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();

        if trimmed == "Done" {
            return Ok(Some(std::mem::take(&mut self.accumulator)));
        }

        if let Some(caps) = self.capacity.captures(line) {
            let value = self.number(&caps[2])?;
            let megawatts = capacity_to_mw(value, &caps[3]).map_err(|e| self.unit_error(e))?;
            self.accumulator.add_capacity(&caps[1], megawatts);
        } else if let Some(caps) = self.supplied.captures(line) {
            let energy = self.energy(&caps[1], &caps[2])?;
            self.accumulator.add_energy(energy);
        } else if tokens.first() == Some(&"spilled") && tokens.len() >= 3 {
            let energy = self.energy(tokens[1], tokens[2].trim_end_matches(','))?;
            self.accumulator.spilled += energy;
        } else if trimmed.contains("surplus energy:") && tokens.len() >= 5 {
            let energy = self.energy(tokens[3], tokens[4].trim_end_matches(','))?;
            self.accumulator.surplus += energy;
        } else if let Some(caps) = self.emissions.captures(line) {
            self.accumulator.emissions = Some(self.number(&caps[1])?);
        } else if let Some(caps) = self.unserved.captures(line) {
            self.accumulator.unserved = Some(self.number(&caps[1])?);
        } else if trimmed == "No unserved energy" {
            self.accumulator.unserved = Some(0.0);
        } else if let Some(caps) = self.score.captures(line) {
            self.accumulator.score = Some(self.number(&caps[1])?);
        } else if let Some(caps) = self.penalty.captures(line) {
            self.accumulator.penalty = Some(self.number(&caps[1])?);
        } else if let Some(rest) = trimmed.strip_prefix("Constraints violated:") {
            self.accumulator.constraints = rest
                .split_whitespace()
                .filter(|label| *label != "none")
                .map(str::to_string)
                .collect();
        } else if let Some(caps) = self.timesteps.captures(line) {
            self.accumulator.timesteps = caps[1].parse().ok();
        } else if let Some(caps) = self.demand.captures(line) {
            self.accumulator.demand = Some(self.energy(&caps[1], &caps[2])?);
        } else if let Some(rest) = trimmed.strip_prefix("Parameters:") {
            self.accumulator.parameters = Some(rest.trim().to_string());
        }
        Ok(None)
    }

    /// Lines fed so far.
    pub fn lines(&self) -> usize {
        self.line
    }

    /// Data read since the last `Done`, if any.
    pub fn pending(&self) -> &ScenarioAccumulator {
        &self.accumulator
    }
}

/// Read narration from `input` and write one table per finished scenario.
/// Returns the number of scenarios written.
pub fn summarise<R: BufRead, W: Write>(input: R, output: &mut W) -> Result<usize, SummaryError> {
    let mut parser = SummaryParser::new()?;
    let mut scenarios = 0;
    for line in input.lines() {
        let line = line?;
        if let Some(scenario) = parser.feed(&line)? {
            if scenarios > 0 {
                writeln!(output)?;
            }
            write!(output, "{scenario}")?;
            scenarios += 1;
        }
    }
    if !parser.pending().is_empty() {
        log::warn!(
            "Input ended without Done after line {}, last scenario discarded",
            parser.lines()
        );
    }
    output.flush()?;
    Ok(scenarios)
}

//! Fitness evaluation: simulation, cost and constraint penalties.

use std::path::PathBuf;

use crate::compute::{CostModel, Simulation, SimulationError, SimulationResult};
use crate::schema::{ConfigError, ConstraintConfig, CostConfig};

use super::codec::ChromosomeCodec;
use super::penalty::{PenaltyRegistry, Reasons};
use super::trace::{TraceRecord, TraceWriter};

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Cost per unit of demand ($/MWh).
    pub score: f64,
    /// Constraint penalty per unit of demand.
    pub penalty: f64,
    /// Violated constraints.
    pub reasons: Reasons,
}

impl Evaluation {
    /// Value minimised by the search.
    pub fn fitness(&self) -> f64 {
        self.score + self.penalty
    }
}

/// Evaluation failures.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error("Failed to append to trace file {path:?}: {source}")]
    Trace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EvaluationError {
    /// Configuration errors fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EvaluationError::Config(_))
    }
}

/// Scores candidates against a template simulation.
///
/// The evaluator is shared read-only between workers: each evaluation
/// clones the template before applying genes.
pub struct FitnessEvaluator<S> {
    template: S,
    codec: ChromosomeCodec,
    costs: CostModel,
    penalties: PenaltyRegistry,
    trace: Option<TraceWriter>,
}

impl<S: Simulation> FitnessEvaluator<S> {
    /// Create an evaluator. Dimensionality is fixed by the template.
    pub fn new(template: S, costs: &CostConfig, constraints: &ConstraintConfig) -> Self {
        let codec = ChromosomeCodec::for_simulation(&template);
        Self {
            template,
            codec,
            costs: CostModel::new(costs),
            penalties: PenaltyRegistry::new(constraints.clone()),
            trace: None,
        }
    }

    /// Record every successful evaluation to a trace file.
    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Number of genes per candidate.
    pub fn dimension(&self) -> usize {
        self.codec.dimension()
    }

    fn simulate(&self, genes: &[f64]) -> Result<(Evaluation, SimulationResult), EvaluationError> {
        let mut simulation = self.template.clone();
        self.codec.apply(genes, &mut simulation)?;
        let result = simulation.run()?;
        if result.demand <= 0.0 {
            return Err(SimulationError::ZeroDemand.into());
        }

        let score = self.costs.total_cost(&result) / result.demand;
        let (penalty, reasons) = self.penalties.assess(&result);
        let evaluation = Evaluation {
            score,
            penalty: penalty / result.demand,
            reasons,
        };
        Ok((evaluation, result))
    }

    /// Evaluate a candidate, appending a trace row on success.
    pub fn evaluate(&self, genes: &[f64]) -> Result<Evaluation, EvaluationError> {
        let (evaluation, _) = self.simulate(genes)?;
        if let Some(trace) = &self.trace {
            let record = TraceRecord {
                score: evaluation.score,
                penalty: evaluation.penalty,
                reasons: evaluation.reasons,
                genes: genes.to_vec(),
            };
            trace
                .append(&record)
                .map_err(|source| EvaluationError::Trace {
                    path: trace.path().to_path_buf(),
                    source,
                })?;
        }
        Ok(evaluation)
    }

    /// Evaluate without tracing and keep the simulation result for reporting.
    pub fn verify(&self, genes: &[f64]) -> Result<(Evaluation, SimulationResult), EvaluationError> {
        self.simulate(genes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::build_context;
    use crate::compute::evolution::ConstraintKind;
    use crate::compute::evolution::trace::TRACE_HEADER;
    use crate::schema::ScenarioConfig;

    fn evaluator(modifiers: &[&str]) -> FitnessEvaluator<crate::compute::SimulationContext> {
        let scenario = ScenarioConfig {
            hours: 48,
            demand_modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        };
        let context = build_context(&scenario).unwrap();
        FitnessEvaluator::new(context, &CostConfig::default(), &ConstraintConfig::default())
    }

    #[test]
    fn test_deterministic() {
        let eval = evaluator(&[]);
        let a = eval.evaluate(&[6.0, 4.0]).unwrap();
        let b = eval.evaluate(&[6.0, 4.0]).unwrap();
        assert_eq!(a, b);
        assert!(a.score > 0.0);
    }

    #[test]
    fn test_no_capacity_violates_reliability() {
        let eval = evaluator(&[]);
        let result = eval.evaluate(&[-1.0, 0.0]).unwrap();
        assert_eq!(result.score, 0.0);
        assert!(result.penalty > 0.0);
        assert!(result.reasons.contains(ConstraintKind::Unserved));
        assert_eq!(result.fitness(), result.penalty);
    }

    #[test]
    fn test_ample_capacity_has_no_penalty() {
        let eval = evaluator(&[]);
        let result = eval.evaluate(&[12.0, 1.0]).unwrap();
        assert_eq!(result.penalty, 0.0);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_not_retryable() {
        let eval = evaluator(&[]);
        let err = eval.evaluate(&[1.0]).unwrap_err();
        assert!(matches!(err, EvaluationError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_zero_demand_is_simulation_error() {
        let eval = evaluator(&["scale:-100"]);
        let err = eval.evaluate(&[1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Simulation(SimulationError::ZeroDemand)
        ));
    }

    #[test]
    fn test_trace_written_by_evaluate_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let eval = evaluator(&[]).with_trace(TraceWriter::create(&path).unwrap());

        let first = eval.evaluate(&[6.0, 4.0]).unwrap();
        let (verified, result) = eval.verify(&[6.0, 4.0]).unwrap();
        assert_eq!(first, verified);
        assert_eq!(result.timesteps, 48);
        assert!(eval.evaluate(&[1.0]).is_err());

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], TRACE_HEADER);
        assert!(lines[1].ends_with(",6,4"));
    }
}

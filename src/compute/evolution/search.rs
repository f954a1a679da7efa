//! The generational search loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::compute::{Simulation, SimulationResult};
use crate::schema::{EvolutionHistory, EvolutionProgress, EvolutionStats, SearchConfig, StopReason};

use super::cmaes::CmaState;
use super::dispatcher::{DispatchError, Dispatcher};
use super::fitness::{Evaluation, EvaluationError, FitnessEvaluator};

/// Best candidate seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct HallOfFame {
    pub genes: Vec<f64>,
    pub evaluation: Evaluation,
    /// Generation (1-based) the candidate was sampled in.
    pub generation: usize,
}

impl HallOfFame {
    pub fn fitness(&self) -> f64 {
        self.evaluation.fitness()
    }
}

/// Outcome of a search run.
#[derive(Debug, Clone)]
pub struct EvolutionResult {
    /// Best candidate of all completed generations.
    pub best: Option<HallOfFame>,
    /// Distribution mean after the last completed generation.
    pub mean: Vec<f64>,
    pub history: EvolutionHistory,
    pub stats: EvolutionStats,
}

/// Re-evaluated best candidate, ready for reporting.
#[derive(Debug, Clone)]
pub struct Verification {
    pub genes: Vec<f64>,
    pub evaluation: Evaluation,
    pub result: SimulationResult,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<S> {
    config: SearchConfig,
    seed: u64,
    rng: StdRng,
    evaluator: FitnessEvaluator<S>,
    dispatcher: Box<dyn Dispatcher>,
    state: CmaState,
    hall_of_fame: Option<HallOfFame>,
    history: EvolutionHistory,
    evaluations: u64,
    stagnation_count: usize,
    cancelled: Arc<AtomicBool>,
}

impl<S: Simulation> EvolutionEngine<S> {
    /// Create an engine. The sampling generator is seeded once, here.
    pub fn new(
        config: SearchConfig,
        evaluator: FitnessEvaluator<S>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        if config.seed.is_none() {
            log::info!("No seed configured, using {seed}");
        }
        let state = CmaState::new(vec![0.0; evaluator.dimension()], config.sigma, config.lambda);
        log::info!(
            "CMA-ES: dimension {}, lambda {}, mu {}, sigma {}, seed {}",
            state.dimension(),
            state.lambda(),
            state.mu(),
            state.sigma(),
            seed
        );

        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            seed,
            evaluator,
            dispatcher,
            state,
            hall_of_fame: None,
            history: EvolutionHistory::default(),
            evaluations: 0,
            stagnation_count: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Seed used for the sampling generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn state(&self) -> &CmaState {
        &self.state
    }

    pub fn hall_of_fame(&self) -> Option<&HallOfFame> {
        self.hall_of_fame.as_ref()
    }

    pub fn history(&self) -> &EvolutionHistory {
        &self.history
    }

    pub fn evaluator(&self) -> &FitnessEvaluator<S> {
        &self.evaluator
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Run one generation. Returns `false` if it was cancelled mid-batch,
    /// in which case the batch is discarded and the state is untouched.
    pub fn step(&mut self) -> Result<bool, DispatchError> {
        let candidates = self.state.sample(&mut self.rng);
        let evaluator = &self.evaluator;
        let evaluate = |genes: &[f64]| evaluator.evaluate(genes);
        let evaluations = self.dispatcher.map(&evaluate, &candidates)?;
        if self.is_cancelled() {
            log::info!("Cancelled during generation {}", self.state.generation() + 1);
            return Ok(false);
        }

        let fitness: Vec<f64> = evaluations.iter().map(Evaluation::fitness).collect();
        self.evaluations += evaluations.len() as u64;
        let generation = self.state.generation() + 1;

        let best = (0..fitness.len()).min_by(|&a, &b| fitness[a].total_cmp(&fitness[b]));
        if let Some(idx) = best {
            let improved = self
                .hall_of_fame
                .as_ref()
                .is_none_or(|hof| fitness[idx] < hof.fitness());
            if improved {
                log::info!(
                    "Generation {generation}: new best {:.4} (score {:.4}, penalty {:.4})",
                    fitness[idx],
                    evaluations[idx].score,
                    evaluations[idx].penalty
                );
                self.hall_of_fame = Some(HallOfFame {
                    genes: candidates[idx].clone(),
                    evaluation: evaluations[idx],
                    generation,
                });
                self.stagnation_count = 0;
            } else {
                self.stagnation_count += 1;
            }
        }

        self.state.update(&candidates, &fitness);

        let min = best.map_or(f64::NAN, |idx| fitness[idx]);
        let avg = fitness.iter().sum::<f64>() / fitness.len().max(1) as f64;
        self.history.min_fitness.push(min);
        self.history.avg_fitness.push(avg);
        self.history.sigma.push(self.state.sigma());
        log::debug!(
            "Generation {generation}: min {min:.4}, mean {avg:.4}, sigma {:.4}",
            self.state.sigma()
        );
        Ok(true)
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.state.generation(),
            total_generations: self.config.generations,
            evaluations: self.evaluations,
            best_fitness: self
                .hall_of_fame
                .as_ref()
                .map_or(f64::INFINITY, HallOfFame::fitness),
            generation_best: self.history.min_fitness.last().copied().unwrap_or(f64::NAN),
            sigma: self.state.sigma(),
            stagnation_count: self.stagnation_count,
        }
    }

    /// Check if evolution should stop.
    fn should_stop(&self) -> Option<StopReason> {
        if self.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        if self.state.generation() >= self.config.generations {
            return Some(StopReason::MaxGenerations);
        }
        None
    }

    /// Run evolution, reporting progress after each completed generation.
    pub fn run_with_callback<F>(
        &mut self,
        mut callback: F,
    ) -> Result<EvolutionResult, DispatchError>
    where
        F: FnMut(&EvolutionProgress),
    {
        let start_time = Instant::now();

        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            if !self.step()? {
                break StopReason::Cancelled;
            }
            callback(&self.progress());
        };

        let elapsed = start_time.elapsed().as_secs_f64();
        let stats = EvolutionStats {
            generations: self.history.len(),
            total_evaluations: self.evaluations,
            best_fitness: self
                .hall_of_fame
                .as_ref()
                .map_or(f64::INFINITY, HallOfFame::fitness),
            elapsed_seconds: elapsed,
            evaluations_per_second: if elapsed > 0.0 {
                self.evaluations as f64 / elapsed
            } else {
                0.0
            },
            stop_reason,
        };
        log::info!(
            "Search stopped ({:?}) after {} generations, {} evaluations in {:.2}s",
            stats.stop_reason,
            stats.generations,
            stats.total_evaluations,
            stats.elapsed_seconds
        );

        Ok(EvolutionResult {
            best: self.hall_of_fame.clone(),
            mean: self.state.mean().to_vec(),
            history: self.history.clone(),
            stats,
        })
    }

    /// Run evolution (blocking).
    pub fn run(&mut self) -> Result<EvolutionResult, DispatchError> {
        self.run_with_callback(|_| {})
    }

    /// Re-evaluate the hall-of-fame candidate (or the mean if no generation
    /// completed) and confirm it reproduces the recorded fitness.
    pub fn finalize(&self) -> Result<Verification, EvaluationError> {
        let genes = match &self.hall_of_fame {
            Some(hof) => hof.genes.clone(),
            None => {
                log::warn!("No completed generation, verifying the distribution mean");
                self.state.mean().to_vec()
            }
        };
        let (evaluation, result) = self.evaluator.verify(&genes)?;

        if let Some(hof) = &self.hall_of_fame {
            let recorded = hof.fitness();
            let tolerance = 1e-9 * recorded.abs().max(1.0);
            if (evaluation.fitness() - recorded).abs() > tolerance {
                log::warn!(
                    "Verification mismatch: recorded fitness {recorded}, re-evaluated {}",
                    evaluation.fitness()
                );
            }
        }

        Ok(Verification {
            genes,
            evaluation,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::{ParallelDispatcher, SequentialDispatcher, TraceWriter};
    use crate::compute::{SimulationContext, build_context};
    use crate::schema::{ConstraintConfig, CostConfig, ScenarioConfig};

    fn evaluator() -> FitnessEvaluator<SimulationContext> {
        let scenario = ScenarioConfig {
            hours: 24,
            ..Default::default()
        };
        FitnessEvaluator::new(
            build_context(&scenario).unwrap(),
            &CostConfig::default(),
            &ConstraintConfig::default(),
        )
    }

    fn search(seed: u64, generations: usize) -> SearchConfig {
        SearchConfig {
            seed: Some(seed),
            generations,
            workers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_generation_evaluates_population_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let eval = evaluator().with_trace(TraceWriter::create(&path).unwrap());
        let mut engine = EvolutionEngine::new(
            search(42, 1),
            eval,
            Box::new(SequentialDispatcher::new(true)),
        );
        let lambda = engine.state().lambda();
        let result = engine.run().unwrap();

        assert_eq!(result.stats.generations, 1);
        assert_eq!(result.stats.total_evaluations, lambda as u64);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);

        let verified = engine.finalize().unwrap();
        assert_eq!(verified.genes.len(), 2);
        assert!(verified.evaluation.score.is_finite() && verified.evaluation.score >= 0.0);
        assert!(verified.evaluation.penalty.is_finite() && verified.evaluation.penalty >= 0.0);
        assert_eq!(
            verified.evaluation,
            result.best.as_ref().unwrap().evaluation
        );

        // verification is not traced
        let rows = std::fs::read_to_string(&path).unwrap().lines().count() - 1;
        assert_eq!(rows, lambda);
    }

    #[test]
    fn test_reproducible_with_seed() {
        let run = |dispatcher: Box<dyn Dispatcher>| {
            let mut engine = EvolutionEngine::new(search(7, 5), evaluator(), dispatcher);
            engine.run().unwrap()
        };
        let a = run(Box::new(SequentialDispatcher::new(true)));
        let b = run(Box::new(SequentialDispatcher::new(true)));
        let c = run(Box::new(ParallelDispatcher::new(3, true).unwrap()));
        assert_eq!(a.best, b.best);
        assert_eq!(a.history.min_fitness, b.history.min_fitness);
        assert_eq!(a.best, c.best);
    }

    #[test]
    fn test_best_fitness_never_increases() {
        let mut engine = EvolutionEngine::new(
            search(3, 10),
            evaluator(),
            Box::new(SequentialDispatcher::new(true)),
        );
        let mut best = Vec::new();
        engine.run_with_callback(|p| best.push(p.best_fitness)).unwrap();
        assert_eq!(best.len(), 10);
        assert!(best.windows(2).all(|w| w[1] <= w[0]));
        let min_seen = engine
            .history()
            .min_fitness
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(engine.hall_of_fame().unwrap().fitness(), min_seen);
    }

    #[test]
    fn test_cancellation() {
        let mut engine = EvolutionEngine::new(
            search(1, 100),
            evaluator(),
            Box::new(SequentialDispatcher::new(true)),
        );
        let cancel = engine.cancel_handle();

        // Cancel immediately
        cancel.store(true, Ordering::Relaxed);

        let result = engine.run().unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 0);
        assert!(result.best.is_none());

        // falls back to the mean
        let verified = engine.finalize().unwrap();
        assert_eq!(verified.genes, vec![0.0, 0.0]);
    }

    #[test]
    fn test_cancel_from_callback_keeps_completed_generations() {
        let mut engine = EvolutionEngine::new(
            search(5, 50),
            evaluator(),
            Box::new(SequentialDispatcher::new(true)),
        );
        let cancel = engine.cancel_handle();
        let result = engine
            .run_with_callback(|p| {
                if p.generation == 3 {
                    cancel.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 3);
        assert_eq!(engine.state().generation(), 3);
    }

    #[test]
    fn test_dispatch_failure_aborts() {
        let scenario = ScenarioConfig {
            hours: 24,
            demand_modifiers: vec!["scale:-100".to_string()],
            ..Default::default()
        };
        let eval = FitnessEvaluator::new(
            build_context(&scenario).unwrap(),
            &CostConfig::default(),
            &ConstraintConfig::default(),
        );
        let mut engine =
            EvolutionEngine::new(search(1, 2), eval, Box::new(SequentialDispatcher::new(true)));
        assert!(matches!(
            engine.run(),
            Err(DispatchError::Evaluation { attempts: 2, .. })
        ));
    }
}

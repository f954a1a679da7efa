//! Evaluation dispatch across a generation's candidates.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::schema::SearchConfig;

use super::fitness::{Evaluation, EvaluationError};

/// The evaluation function a dispatcher applies to each candidate.
pub type EvaluateFn<'a> = dyn Fn(&[f64]) -> Result<Evaluation, EvaluationError> + Sync + 'a;

/// Dispatch failures. Any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Candidate {index} failed after {attempts} attempt(s): {source}")]
    Evaluation {
        index: usize,
        attempts: usize,
        #[source]
        source: EvaluationError,
    },
    #[error("Candidate {index} panicked during evaluation: {message}")]
    WorkerPanicked { index: usize, message: String },
    #[error("Failed to start evaluation workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Applies an evaluation to every candidate of a generation.
///
/// Results are returned in candidate order regardless of completion order.
pub trait Dispatcher: Send + Sync {
    fn map(
        &self,
        evaluate: &EvaluateFn<'_>,
        candidates: &[Vec<f64>],
    ) -> Result<Vec<Evaluation>, DispatchError>;
}

/// Build the dispatcher the search configuration asks for.
pub fn dispatcher_for(config: &SearchConfig) -> Result<Box<dyn Dispatcher>, DispatchError> {
    if config.workers == 1 {
        log::info!("Evaluating candidates sequentially");
        Ok(Box::new(SequentialDispatcher::new(config.retry_failed)))
    } else {
        let dispatcher = ParallelDispatcher::new(config.workers, config.retry_failed)?;
        log::info!(
            "Evaluating candidates on {} worker threads",
            dispatcher.workers()
        );
        Ok(Box::new(dispatcher))
    }
}

/// Evaluates candidates one after another on the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct SequentialDispatcher {
    retry: bool,
}

impl SequentialDispatcher {
    pub fn new(retry: bool) -> Self {
        Self { retry }
    }
}

impl Dispatcher for SequentialDispatcher {
    fn map(
        &self,
        evaluate: &EvaluateFn<'_>,
        candidates: &[Vec<f64>],
    ) -> Result<Vec<Evaluation>, DispatchError> {
        candidates
            .iter()
            .enumerate()
            .map(|(index, genes)| evaluate_with_retry(evaluate, index, genes, self.retry))
            .collect()
    }
}

/// Evaluates candidates on a dedicated rayon pool.
pub struct ParallelDispatcher {
    pool: ThreadPool,
    retry: bool,
}

impl ParallelDispatcher {
    /// Create a pool with `workers` threads (0 = one per core).
    pub fn new(workers: usize, retry: bool) -> Result<Self, DispatchError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("evaluator-{i}"))
            .build()?;
        Ok(Self { pool, retry })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Dispatcher for ParallelDispatcher {
    fn map(
        &self,
        evaluate: &EvaluateFn<'_>,
        candidates: &[Vec<f64>],
    ) -> Result<Vec<Evaluation>, DispatchError> {
        self.pool.install(|| {
            candidates
                .par_iter()
                .enumerate()
                .map(|(index, genes)| evaluate_with_retry(evaluate, index, genes, self.retry))
                .collect()
        })
    }
}

/// Evaluate one candidate, retrying once on a retryable error or a panic.
fn evaluate_with_retry(
    evaluate: &EvaluateFn<'_>,
    index: usize,
    genes: &[f64],
    retry: bool,
) -> Result<Evaluation, DispatchError> {
    let max_attempts = if retry { 2 } else { 1 };
    let mut attempts = 0;
    loop {
        attempts += 1;
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| evaluate(genes))) {
            Ok(Ok(evaluation)) => return Ok(evaluation),
            Ok(Err(source)) => {
                let retryable = source.is_retryable();
                let failure = DispatchError::Evaluation {
                    index,
                    attempts,
                    source,
                };
                if !retryable {
                    return Err(failure);
                }
                failure
            }
            Err(payload) => DispatchError::WorkerPanicked {
                index,
                message: panic_message(payload.as_ref()),
            },
        };

        if attempts >= max_attempts {
            return Err(failure);
        }
        log::warn!("{failure}; retrying");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::SimulationError;
    use crate::compute::evolution::Reasons;
    use crate::schema::ConfigError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn score_first_gene(genes: &[f64]) -> Result<Evaluation, EvaluationError> {
        Ok(Evaluation {
            score: genes[0],
            penalty: 0.0,
            reasons: Reasons::NONE,
        })
    }

    fn candidates(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64, 0.0]).collect()
    }

    fn flaky() -> EvaluationError {
        SimulationError::Failed("flaky".into()).into()
    }

    #[test]
    fn test_parallel_preserves_order() {
        let dispatcher = ParallelDispatcher::new(4, true).unwrap();
        let out = dispatcher.map(&score_first_gene, &candidates(64)).unwrap();
        let scores: Vec<f64> = out.iter().map(|e| e.score).collect();
        let expected: Vec<f64> = (0..64).map(|i| i as f64).collect();
        assert_eq!(scores, expected);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let parallel = ParallelDispatcher::new(3, true).unwrap();
        let sequential = SequentialDispatcher::new(true);
        let c = candidates(10);
        assert_eq!(
            parallel.map(&score_first_gene, &c).unwrap(),
            sequential.map(&score_first_gene, &c).unwrap()
        );
    }

    #[test]
    fn test_retry_once_then_succeed() {
        let calls = AtomicUsize::new(0);
        let evaluate = |genes: &[f64]| {
            if genes[0] == 2.0 && calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(flaky());
            }
            score_first_gene(genes)
        };
        let out = SequentialDispatcher::new(true)
            .map(&evaluate, &candidates(4))
            .unwrap();
        assert_eq!(out[2].score, 2.0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_failure_is_fatal() {
        let evaluate = |genes: &[f64]| {
            if genes[0] == 1.0 {
                Err(flaky())
            } else {
                score_first_gene(genes)
            }
        };
        let err = ParallelDispatcher::new(2, true)
            .unwrap()
            .map(&evaluate, &candidates(4))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Evaluation {
                index: 1,
                attempts: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_no_retry_when_disabled() {
        let calls = AtomicUsize::new(0);
        let evaluate = |_: &[f64]| -> Result<Evaluation, EvaluationError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(flaky())
        };
        let err = SequentialDispatcher::new(false)
            .map(&evaluate, &candidates(1))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Evaluation { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_config_errors_not_retried() {
        let calls = AtomicUsize::new(0);
        let evaluate = |_: &[f64]| -> Result<Evaluation, EvaluationError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConfigError::DimensionMismatch {
                expected: 2,
                got: 1,
            }
            .into())
        };
        assert!(SequentialDispatcher::new(true)
            .map(&evaluate, &candidates(1))
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_is_captured_and_retried() {
        let calls = AtomicUsize::new(0);
        let evaluate = |genes: &[f64]| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("worker lost");
            }
            score_first_gene(genes)
        };
        let out = SequentialDispatcher::new(true)
            .map(&evaluate, &candidates(1))
            .unwrap();
        assert_eq!(out.len(), 1);

        let always = |_: &[f64]| -> Result<Evaluation, EvaluationError> { panic!("worker lost") };
        let err = SequentialDispatcher::new(true)
            .map(&always, &candidates(1))
            .unwrap_err();
        match err {
            DispatchError::WorkerPanicked { index, message } => {
                assert_eq!(index, 0);
                assert_eq!(message, "worker lost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

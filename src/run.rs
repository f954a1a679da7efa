//! End-to-end optimisation run: configuration to result bundle.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::compute::evolution::{
    EvolutionEngine, EvolutionResult, FitnessEvaluator, ResultEmitter, TraceWriter,
    dispatcher_for,
};
use crate::compute::{SimulationContext, build_context};
use crate::error::{Error, Result};
use crate::schema::{ResultBundle, RunConfig};

/// Read, parse and validate a JSON configuration file.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let text = fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RunConfig = serde_json::from_str(&text).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Build the scenario, evaluator and dispatcher described by `config`.
pub fn build_engine(config: &RunConfig) -> Result<EvolutionEngine<SimulationContext>> {
    config.validate()?;
    let context = build_context(&config.scenario)?;
    let mut evaluator = FitnessEvaluator::new(context, &config.costs, &config.constraints);
    if let Some(path) = &config.trace_file {
        let trace = TraceWriter::create(path).map_err(|source| Error::Trace {
            path: path.clone(),
            source,
        })?;
        log::info!("Tracing evaluations to {}", path.display());
        evaluator = evaluator.with_trace(trace);
    }
    let dispatcher = dispatcher_for(&config.search)?;
    Ok(EvolutionEngine::new(
        config.search.clone(),
        evaluator,
        dispatcher,
    ))
}

/// Run the search, verify the best candidate and emit the results.
///
/// Narration is written to `out`.
pub fn run<W: Write>(
    config: &RunConfig,
    out: &mut W,
) -> Result<(ResultBundle, EvolutionResult)> {
    let mut engine = build_engine(config)?;
    run_engine(&mut engine, config, out)
}

/// Drive an already built engine to completion. Used when the caller
/// needs the engine's cancel handle before the search starts.
///
/// The bundle records the seed actually used, so unseeded runs can be
/// replayed from their output.
pub fn run_engine<W: Write>(
    engine: &mut EvolutionEngine<SimulationContext>,
    config: &RunConfig,
    out: &mut W,
) -> Result<(ResultBundle, EvolutionResult)> {
    let result = engine.run_with_callback(|progress| {
        log::info!(
            "Generation {}/{}: best {:.4}, sigma {:.4}",
            progress.generation,
            progress.total_generations,
            progress.best_fitness,
            progress.sigma
        );
    })?;
    let verification = engine.finalize()?;
    let mut options = config.clone();
    options.search.seed = Some(engine.seed());
    let bundle = ResultEmitter::new(&config.output).emit(&options, &verification, out)?;
    Ok((bundle, result))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::thread;

    use super::*;
    use crate::schema::{ConfigError, SearchConfig, StopReason};
    use crate::summary::summarise;

    fn config(dir: &Path) -> RunConfig {
        let mut config = RunConfig {
            search: SearchConfig {
                seed: Some(42),
                generations: 1,
                workers: 2,
                ..Default::default()
            },
            trace_file: Some(dir.join("trace.csv")),
            output: dir.join("results.json"),
            ..Default::default()
        };
        config.scenario.hours = 24;
        config.constraints.reliability_std = 0.002;
        config
    }

    #[test]
    fn test_two_parameter_single_generation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut out = Vec::new();
        let (bundle, result) = run(&config, &mut out).unwrap();

        // λ = 4 + ⌊3 ln 2⌋
        assert_eq!(result.stats.total_evaluations, 6);
        assert_eq!(bundle.parameters.len(), 2);
        assert!(bundle.score.is_finite() && bundle.score >= 0.0);
        assert!(bundle.penalty.is_finite() && bundle.penalty >= 0.0);

        let trace = fs::read_to_string(dir.path().join("trace.csv")).unwrap();
        assert_eq!(trace.lines().count(), 1 + 6);

        let written: ResultBundle =
            serde_json::from_str(&fs::read_to_string(&config.output).unwrap()).unwrap();
        assert_eq!(written.parameters, bundle.parameters);
        assert_eq!(written.options.search.seed, Some(42));
    }

    #[test]
    fn test_narration_feeds_summary() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut out = Vec::new();
        run(&config, &mut out).unwrap();

        let mut table = Vec::new();
        let scenarios = summarise(out.as_slice(), &mut table).unwrap();
        assert_eq!(scenarios, 1);
        let table = String::from_utf8(table).unwrap();
        assert!(table.contains("ccgt"));
        assert!(table.contains("ocgt"));
    }

    #[test]
    fn test_unseeded_run_records_seed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.search.seed = None;
        let mut engine = build_engine(&config).unwrap();
        let (bundle, _) = run_engine(&mut engine, &config, &mut Vec::new()).unwrap();

        assert_eq!(bundle.options.search.seed, Some(engine.seed()));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&config.output).unwrap()).unwrap();
        assert_eq!(json["options"]["search"]["seed"], engine.seed());
    }

    #[test]
    fn test_interrupted_run_still_writes_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.search.generations = 50;
        let mut engine = build_engine(&config).unwrap();

        let cancel = engine.cancel_handle();
        thread::spawn(move || cancel.store(true, Ordering::Relaxed))
            .join()
            .unwrap();

        let mut out = Vec::new();
        let (bundle, result) = run_engine(&mut engine, &config, &mut out).unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert!(result.stats.generations < 50);

        let written: ResultBundle =
            serde_json::from_str(&fs::read_to_string(&config.output).unwrap()).unwrap();
        assert_eq!(written.parameters, bundle.parameters);
        assert!(String::from_utf8(out).unwrap().ends_with("Done\n"));
    }

    #[test]
    fn test_load_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"search": {"sigma": -1.0}}"#).unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::Config(ConfigError::InvalidValue { .. }))
        ));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(Error::Parse { .. })));

        assert!(matches!(
            load_config(&dir.path().join("missing.json")),
            Err(Error::Read { .. })
        ));
    }

    #[test]
    fn test_unknown_scenario_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.scenario.supply = "fusion".to_string();
        assert!(matches!(
            build_engine(&config),
            Err(Error::Config(ConfigError::UnknownScenario(_)))
        ));
    }
}

//! gridmix-evolve CLI - Run a capacity optimisation from JSON configuration.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use gridmix_evolve::{
    compute::evolution::EmitError,
    error::Error,
    run::{build_engine, load_config, run_engine},
    schema::RunConfig,
};

const NAME: &str = "gridmix-evolve";

fn print_usage() {
    eprintln!("Usage: {NAME} <config.json>");
    eprintln!();
    eprintln!("Search generator capacities for the cheapest mix that meets the constraints.");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.json  Path to run configuration file");
    eprintln!();
    eprintln!("Example configuration is generated with --example flag.");
    eprintln!("Log verbosity is controlled by RUST_LOG (e.g. RUST_LOG=info).");
}

fn print_example_config() -> Result<(), Error> {
    let config = RunConfig::default();
    let json = serde_json::to_string_pretty(&config).map_err(EmitError::from)?;
    println!("{json}");
    Ok(())
}

fn execute(path: PathBuf) -> Result<(), Error> {
    let config = load_config(&path)?;
    println!("Scenario: {}", config.scenario.supply);
    println!("Generations: {}", config.search.generations);
    println!();

    let mut engine = build_engine(&config)?;
    let cancel = engine.cancel_handle();
    ctrlc::set_handler(move || {
        eprintln!("Interrupted, finishing the current generation");
        cancel.store(true, Ordering::Relaxed);
    })?;

    let mut stdout = std::io::stdout().lock();
    let (bundle, result) = run_engine(&mut engine, &config, &mut stdout)?;
    log::info!(
        "Finished: {} violations, {:.1} evaluations/s",
        bundle.constraints_violated.len(),
        result.stats.evaluations_per_second
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let outcome = match args.get(1).map(String::as_str) {
        None => {
            print_usage();
            return ExitCode::FAILURE;
        }
        Some("--example") => print_example_config(),
        Some("-h" | "--help") => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Some(path) => execute(PathBuf::from(path)),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{NAME}: {e}");
            ExitCode::FAILURE
        }
    }
}

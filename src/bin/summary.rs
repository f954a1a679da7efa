//! gridmix-summary - Tabulate run narration read from stdin.

use std::io::{self, BufWriter};
use std::process::ExitCode;

use gridmix_evolve::summary::summarise;

fn main() -> ExitCode {
    env_logger::init();

    if std::env::args().nth(1).is_some_and(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: gridmix-evolve <config.json> | gridmix-summary");
        eprintln!();
        eprintln!("Reads run narration on stdin and prints one table per finished scenario.");
        return ExitCode::SUCCESS;
    }

    let stdin = io::stdin().lock();
    let mut stdout = BufWriter::new(io::stdout().lock());
    match summarise(stdin, &mut stdout) {
        Ok(scenarios) => {
            log::info!("Summarised {scenarios} scenario(s)");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("gridmix-summary: {e}");
            ExitCode::FAILURE
        }
    }
}

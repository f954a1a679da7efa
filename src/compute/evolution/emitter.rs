//! Result bundle serialization and run narration.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::schema::{ResultBundle, RunConfig};

use super::search::Verification;

/// Failures writing the final results.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("Failed to serialize result bundle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write narration: {0}")]
    Narration(#[source] io::Error),
}

impl ResultBundle {
    /// Bundle a verified candidate. Parameters are clamped to be non-negative.
    pub fn new(options: &RunConfig, verification: &Verification) -> Self {
        Self {
            options: options.clone(),
            parameters: verification.genes.iter().map(|g| g.max(0.0)).collect(),
            score: verification.evaluation.score,
            penalty: verification.evaluation.penalty,
            constraints_violated: verification.evaluation.reasons.labels(),
        }
    }
}

/// Writes the result bundle and prints the closing narration.
#[derive(Debug, Clone)]
pub struct ResultEmitter {
    output: PathBuf,
}

impl ResultEmitter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Write `bundle` as pretty JSON, replacing any existing file.
    pub fn write_bundle(&self, bundle: &ResultBundle) -> Result<(), EmitError> {
        let json = serde_json::to_string_pretty(bundle)?;
        fs::write(&self.output, json + "\n").map_err(|source| EmitError::Io {
            path: self.output.clone(),
            source,
        })?;
        log::info!("Wrote results to {}", self.output.display());
        Ok(())
    }

    /// Build the bundle, write it and narrate the verified run to `out`.
    pub fn emit<W: Write>(
        &self,
        options: &RunConfig,
        verification: &Verification,
        out: &mut W,
    ) -> Result<ResultBundle, EmitError> {
        let bundle = ResultBundle::new(options, verification);
        self.write_bundle(&bundle)?;
        narrate(out, verification, &bundle).map_err(EmitError::Narration)?;
        Ok(bundle)
    }
}

/// Print the simulation summary, score, penalty, violations and parameters.
pub fn narrate<W: Write>(
    out: &mut W,
    verification: &Verification,
    bundle: &ResultBundle,
) -> io::Result<()> {
    let reliability_std = bundle.options.constraints.reliability_std;
    writeln!(out, "{}", verification.result.report(reliability_std))?;
    writeln!(out, "Score: {:.2} $/MWh", bundle.score)?;
    writeln!(out, "Penalty: {:.2} $/MWh", bundle.penalty)?;
    if bundle.constraints_violated.is_empty() {
        writeln!(out, "Constraints violated: none")?;
    } else {
        writeln!(
            out,
            "Constraints violated: {}",
            bundle.constraints_violated.join(" ")
        )?;
    }
    let parameters: Vec<String> = bundle
        .parameters
        .iter()
        .map(|p| format!("{p:.3}"))
        .collect();
    writeln!(out, "Parameters: [{}]", parameters.join(", "))?;
    writeln!(out, "Done")?;
    out.flush()
}

//! Top-level error type used by the binaries.

use std::path::PathBuf;

use crate::compute::evolution::{DispatchError, EmitError, EvaluationError};
use crate::schema::ConfigError;
use crate::summary::SummaryError;

/// Any fatal error of a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to create trace file {path:?}: {source}")]
    Trace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Output error: {0}")]
    Emit(#[from] EmitError),
    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),
    #[error("Failed to install interrupt handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

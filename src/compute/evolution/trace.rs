//! Append-only per-evaluation trace file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::penalty::Reasons;

/// First line of every trace file.
pub const TRACE_HEADER: &str = "# score, penalty, reasoncode, parameter values";

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub score: f64,
    pub penalty: f64,
    pub reasons: Reasons,
    pub genes: Vec<f64>,
}

impl TraceRecord {
    /// Comma separated row without a trailing newline.
    pub fn to_row(&self) -> String {
        let mut row = format!("{},{},{}", self.score, self.penalty, self.reasons);
        for gene in &self.genes {
            row.push(',');
            row.push_str(&gene.to_string());
        }
        row
    }
}

/// Writes trace rows. Each row is written by its own open, append and close
/// cycle so that no file handle is shared between workers.
#[derive(Debug)]
pub struct TraceWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TraceWriter {
    /// Create (or truncate) the trace file and write the header.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = File::create(&path)?;
        writeln!(file, "{TRACE_HEADER}")?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn append(&self, record: &TraceRecord) -> io::Result<()> {
        let row = record.to_row();
        // a poisoned lock only means another writer panicked mid-row
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{row}")?;
        file.flush()
    }
}

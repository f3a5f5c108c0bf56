use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::identity::RunIdentity;
use crate::probe::OutcomeKind;

/// Counters kept while streaming a report. Never holds probe output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileSummary {
    pub identity: RunIdentity,
    pub output_path: Option<String>,
    pub started_at: String,
    pub finished_at: String,
    pub groups: usize,
    pub total_probes: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unavailable: usize,
}

impl CompileSummary {
    pub(crate) fn new(identity: RunIdentity, started_at: String) -> Self {
        Self {
            identity,
            output_path: None,
            started_at,
            finished_at: String::new(),
            groups: 0,
            total_probes: 0,
            succeeded: 0,
            failed: 0,
            unavailable: 0,
        }
    }

    pub(crate) fn record(&mut self, kind: OutcomeKind) {
        self.total_probes += 1;
        match kind {
            OutcomeKind::Success => self.succeeded += 1,
            OutcomeKind::Failure => self.failed += 1,
            OutcomeKind::Unavailable => self.unavailable += 1,
        }
    }
}

pub fn write_summary(summary: &CompileSummary, output_path: impl AsRef<Path>) -> Result<()> {
    let path = output_path.as_ref();
    let payload =
        serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write run summary to {}", path.display()))?;
    Ok(())
}

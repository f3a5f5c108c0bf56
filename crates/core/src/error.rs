use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The only ways a compile run can fail. Probe problems are never errors;
/// they are recorded in the report.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Output location rejected before any probe ran; nothing was written.
    #[error("cannot write report to {path}: {reason}")]
    SinkUnavailable { path: PathBuf, reason: String },
    /// The sink broke after writing started; the document is truncated.
    #[error("failed writing report: {0}")]
    Write(#[from] io::Error),
}

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`ProcessSource`](super::process::ProcessSource)
/// and the enumerator built on top of it.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("process {0} no longer exists")]
    ProcessNotFound(u32),

    #[error("access denied to process {0}")]
    AccessDenied(u32),

    #[error("unable to read socket table: {0}")]
    Enumeration(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running or has been stopped")]
    AlreadyStarted,

    #[error("monitor was never started")]
    NotStarted,

    #[error("sampling interval {0:?} is shorter than 1ms")]
    IntervalTooShort(Duration),

    #[error("failed to spawn sampler thread: {0}")]
    Spawn(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Error types for the scheduling loops.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// A cron schedule that is malformed or names an out-of-range value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid schedule `{schedule}`: {reason}")]
pub struct ScheduleSyntaxError {
    pub schedule: String,
    pub reason: String,
}

/// Errors reported by [`TickLoop`](crate::TickLoop) and
/// [`HeartbeatLoop`](crate::HeartbeatLoop) through their error handler.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Heartbeat job {job_id} has a bad schedule: {source}")]
    Schedule {
        job_id: String,
        #[source]
        source: ScheduleSyntaxError,
    },

    #[error("Failed to read heartbeat file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Heartbeat job {job_id} failed: {source}")]
    Job {
        job_id: String,
        #[source]
        source: cadence_core::Error,
    },

    #[error("Heartbeat job {job_id} panicked: {message}")]
    JobPanicked { job_id: String, message: String },

    #[error("Tick failed: {0}")]
    Tick(#[source] cadence_core::Error),

    #[error("Tick handler panicked: {0}")]
    TickPanicked(String),

    #[error("Interval must be a positive number of milliseconds, got {0}")]
    InvalidInterval(u64),
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Receives errors a loop caught and did not propagate.
pub type ErrorHandler = Arc<dyn Fn(WorkflowError) + Send + Sync>;

/// Reject a zero interval.
pub fn validate_interval_ms(ms: u64) -> Result<u64> {
    if ms == 0 {
        return Err(WorkflowError::InvalidInterval(ms));
    }
    Ok(ms)
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deliver `err` to `handler`, or log it when no handler is installed.
pub(crate) fn report(handler: Option<&ErrorHandler>, err: WorkflowError) {
    match handler {
        Some(handler) => handler(err),
        None => tracing::warn!(error = %err, "Scheduler error"),
    }
}

//! Cadence scheduling: decides when the agent acts.
//!
//! - [`cron`]: five-field cron matching (`minute hour day-of-month month day-of-week`)
//! - [`heartbeat_file`]: tolerant parser for the heartbeat job file
//! - [`HeartbeatLoop`]: polls the job file and runs due jobs, once per job per minute
//! - [`TickLoop`]: fixed-interval, non-overlapping tick callback
//!
//! Both loops are single tokio tasks; neither runs its body concurrently
//! with itself.

mod control;
pub mod cron;
pub mod error;
pub mod heartbeat;
pub mod heartbeat_file;
pub mod ticker;

pub use cron::{CronSchedule, matches};
pub use error::{ErrorHandler, Result, ScheduleSyntaxError, WorkflowError, validate_interval_ms};
pub use heartbeat::{Clock, HeartbeatLoop, JobRunner, PathSource, RunContext, minute_key};
pub use heartbeat_file::{HeartbeatConfig, HeartbeatJob, JobMode};
pub use ticker::{TickHandler, TickLoop};

//! Heartbeat loop: polls the heartbeat file and runs due jobs.
//!
//! Each poll re-reads and re-parses the file, matches every enabled job's
//! cron schedule against the current local minute, and runs matching jobs
//! one at a time. A job runs at most once per calendar minute.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::FutureExt;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::control::RunControl;
use crate::cron::CronSchedule;
use crate::error::{
    ErrorHandler, Result, WorkflowError, panic_message, report, validate_interval_ms,
};
use crate::heartbeat_file::{self, HeartbeatJob};

/// Source of "now" for the heartbeat loop.
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Resolves the heartbeat file location at every poll.
pub type PathSource = Arc<dyn Fn() -> PathBuf + Send + Sync>;

/// Timing details handed to a job when it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub now: DateTime<Local>,
    pub scheduled_for: DateTime<Local>,
    /// Local calendar minute, `YYYY-MM-DDTHH:MM`
    pub minute_key: String,
}

/// Executes a due heartbeat job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: HeartbeatJob, ctx: RunContext) -> cadence_core::Result<()>;
}

#[async_trait]
impl<F, Fut> JobRunner for F
where
    F: Fn(HeartbeatJob, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = cadence_core::Result<()>> + Send,
{
    async fn run(&self, job: HeartbeatJob, ctx: RunContext) -> cadence_core::Result<()> {
        self(job, ctx).await
    }
}

/// Format the dedup key for `at`.
pub fn minute_key(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

pub struct HeartbeatLoop {
    path: PathSource,
    runner: Arc<dyn JobRunner>,
    on_error: Option<ErrorHandler>,
    clock: Clock,
    poll_interval: watch::Sender<u64>,
    control: RunControl,
    busy: AtomicBool,
    /// job id -> minute key of its last run
    last_runs: Mutex<HashMap<String, String>>,
}

impl HeartbeatLoop {
    pub fn new(path: PathSource, runner: Arc<dyn JobRunner>, poll_interval_ms: u64) -> Result<Self> {
        Ok(Self {
            path,
            runner,
            on_error: None,
            clock: Arc::new(Local::now),
            poll_interval: watch::Sender::new(validate_interval_ms(poll_interval_ms)?),
            control: RunControl::new(),
            busy: AtomicBool::new(false),
            last_runs: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Replace the wall clock, e.g. with a fixed time in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Poll immediately, then every poll interval until stopped.
    ///
    /// No-op while already running. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let Some(epoch) = self.control.start() else {
            return;
        };
        info!(poll_interval_ms = self.poll_interval_ms(), "Heartbeat loop started");
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(epoch).await });
    }

    /// Cancel the pending timer. An in-flight poll runs to completion.
    pub fn stop(&self) {
        if self.control.stop() {
            info!("Heartbeat loop stopped");
        }
    }

    /// Change the poll interval. A running loop re-arms its timer from now.
    pub fn set_poll_interval_ms(&self, ms: u64) -> Result<()> {
        let ms = validate_interval_ms(ms)?;
        self.poll_interval.send_replace(ms);
        debug!(poll_interval_ms = ms, "Heartbeat poll interval updated");
        Ok(())
    }

    pub fn poll_interval_ms(&self) -> u64 {
        *self.poll_interval.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Run one poll cycle. Skipped if another cycle is still in progress.
    ///
    /// Never fails: every error is sent to the error handler.
    pub async fn poll(&self) {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!("Heartbeat poll already in progress, skipping");
            return;
        }
        let _busy = BusyGuard(&self.busy);

        if let Err(e) = self.poll_cycle().await {
            report(self.on_error.as_ref(), e);
        }
    }

    async fn poll_cycle(&self) -> Result<()> {
        let path = (self.path)();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No heartbeat file");
                return Ok(());
            }
            Err(source) => return Err(WorkflowError::Io { path, source }),
        };

        let config = heartbeat_file::parse(&text);
        let now = (self.clock)();
        let key = minute_key(&now);
        debug!(jobs = config.jobs.len(), minute = %key, "Heartbeat poll");

        for job in config.jobs.into_iter().filter(|job| job.enabled) {
            let schedule = match CronSchedule::parse(&job.schedule) {
                Ok(schedule) => schedule,
                Err(source) => {
                    report(
                        self.on_error.as_ref(),
                        WorkflowError::Schedule {
                            job_id: job.id.clone(),
                            source,
                        },
                    );
                    continue;
                }
            };
            if !schedule.matches(&now) {
                continue;
            }
            if self.last_runs.lock().await.get(&job.id) == Some(&key) {
                continue;
            }

            let job_id = job.id.clone();
            let ctx = RunContext {
                now,
                scheduled_for: now,
                minute_key: key.clone(),
            };
            info!(job_id = %job_id, mode = %job.mode, "Running heartbeat job");
            match AssertUnwindSafe(self.runner.run(job, ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => report(
                    self.on_error.as_ref(),
                    WorkflowError::Job {
                        job_id: job_id.clone(),
                        source,
                    },
                ),
                Err(payload) => report(
                    self.on_error.as_ref(),
                    WorkflowError::JobPanicked {
                        job_id: job_id.clone(),
                        message: panic_message(&*payload),
                    },
                ),
            }
            self.last_runs.lock().await.insert(job_id, key.clone());
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, epoch: u64) {
        let mut control = self.control.subscribe();
        let mut interval = self.poll_interval.subscribe();

        if self.control.is_current(epoch) {
            self.poll().await;
        }

        while self.control.is_current(epoch) {
            let delay = Duration::from_millis(*interval.borrow_and_update());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                changed = interval.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if !self.control.is_current(epoch) {
                break;
            }
            self.poll().await;
        }
        debug!(epoch, "Heartbeat task exiting");
    }
}

/// Clears the busy flag even if a job panics mid-cycle.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

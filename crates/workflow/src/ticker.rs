//! Fixed-interval tick loop.
//!
//! The next tick is armed only after the previous `on_tick` settles, so
//! ticks never overlap. A failing tick is reported and the loop carries on.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::control::RunControl;
use crate::error::{
    ErrorHandler, Result, WorkflowError, panic_message, report, validate_interval_ms,
};

/// Work performed on every tick.
#[async_trait]
pub trait TickHandler: Send + Sync {
    async fn on_tick(&self) -> cadence_core::Result<()>;
}

#[async_trait]
impl<F, Fut> TickHandler for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = cadence_core::Result<()>> + Send,
{
    async fn on_tick(&self) -> cadence_core::Result<()> {
        self().await
    }
}

pub struct TickLoop {
    handler: Arc<dyn TickHandler>,
    on_error: Option<ErrorHandler>,
    interval_ms: AtomicU64,
    tick_count: AtomicU64,
    control: RunControl,
    /// Held for the duration of `on_tick`
    tick_lock: Mutex<()>,
}

impl TickLoop {
    pub fn new(interval_ms: u64, handler: Arc<dyn TickHandler>) -> Result<Self> {
        Ok(Self {
            handler,
            on_error: None,
            interval_ms: AtomicU64::new(validate_interval_ms(interval_ms)?),
            tick_count: AtomicU64::new(0),
            control: RunControl::new(),
            tick_lock: Mutex::new(()),
        })
    }

    /// Report tick failures here instead of logging them.
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Begin ticking; the first tick fires one interval from now.
    ///
    /// No-op while already running. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let Some(epoch) = self.control.start() else {
            return;
        };
        info!(interval_ms = self.interval_ms(), "Tick loop started");
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(epoch).await });
    }

    /// Suppress every further tick. An in-flight tick runs to completion.
    pub fn stop(&self) {
        if self.control.stop() {
            info!(ticks = self.tick_count(), "Tick loop stopped");
        }
    }

    /// Spacing used the next time a tick is armed.
    pub fn set_interval_ms(&self, ms: u64) -> Result<()> {
        let ms = validate_interval_ms(ms)?;
        self.interval_ms.store(ms, Ordering::Release);
        debug!(interval_ms = ms, "Tick interval updated");
        Ok(())
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Acquire)
    }

    /// Completed `on_tick` invocations, successful or not.
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    async fn run(self: Arc<Self>, epoch: u64) {
        let mut control = self.control.subscribe();

        while self.control.is_current(epoch) {
            let delay = Duration::from_millis(self.interval_ms());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if !self.control.is_current(epoch) {
                break;
            }

            // A tick from an earlier epoch may still be running after stop + start
            let _tick = self.tick_lock.lock().await;
            if !self.control.is_current(epoch) {
                break;
            }

            let result = AssertUnwindSafe(self.handler.on_tick()).catch_unwind().await;
            let count = self.tick_count.fetch_add(1, Ordering::AcqRel) + 1;
            match result {
                Ok(Ok(())) => debug!(tick = count, "Tick completed"),
                Ok(Err(e)) => report(self.on_error.as_ref(), WorkflowError::Tick(e)),
                Err(payload) => report(
                    self.on_error.as_ref(),
                    WorkflowError::TickPanicked(panic_message(&*payload)),
                ),
            }
        }
        debug!(epoch, "Tick task exiting");
    }
}

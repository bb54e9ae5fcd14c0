//! Serialized access to the shared session.
//!
//! Every turn against the session goes through one `PromptQueue`. Items run
//! strictly in submission order, one at a time. An item's failure (or panic)
//! reaches only its own caller; the queue moves on to the next item.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Prompt queue is closed")]
    Closed,

    #[error("Queued item panicked")]
    Panicked,
}

impl From<QueueError> for cadence_core::Error {
    fn from(err: QueueError) -> Self {
        cadence_core::Error::Internal(err.to_string())
    }
}

pub struct PromptQueue {
    tx: mpsc::UnboundedSender<Job>,
    queued: Arc<AtomicUsize>,
    busy: Arc<AtomicBool>,
}

impl PromptQueue {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let queued = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));

        let (q, b) = (queued.clone(), busy.clone());
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                q.fetch_sub(1, Ordering::AcqRel);
                b.store(true, Ordering::Release);
                job().await;
                b.store(false, Ordering::Release);
            }
            debug!("Prompt queue drained");
        });

        Self { tx, queued, busy }
    }

    /// Submit `item` and get a future for its output.
    ///
    /// The item joins the queue when `enqueue` is called, not when the
    /// returned future is first polled, so call order is execution order.
    pub fn enqueue<F, Fut>(
        &self,
        item: F,
    ) -> impl Future<Output = Result<Fut::Output, QueueError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { item().await })
                    .catch_unwind()
                    .await
                    .map_err(|_| {
                        warn!("Queued item panicked");
                        QueueError::Panicked
                    });
                // The caller may have dropped its future
                let _ = reply_tx.send(outcome);
            }
            .boxed()
        });

        self.queued.fetch_add(1, Ordering::AcqRel);
        let sent = self.tx.send(job).is_ok();
        if !sent {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }

        async move {
            if !sent {
                return Err(QueueError::Closed);
            }
            reply_rx.await.unwrap_or(Err(QueueError::Closed))
        }
    }

    /// Items submitted but not yet started.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Whether an item is executing right now.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Default for PromptQueue {
    fn default() -> Self {
        Self::new()
    }
}

//! Rate-limited, single-concurrency send queue.
//!
//! Every outbound request goes through a [`SendQueue`]. A dispatcher task
//! runs queued jobs one at a time in submission order and starts at most
//! one job per interval. Jobs that have not started yet can be dropped with
//! [`SendQueue::clear`].

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default minimum spacing between job starts.
pub const DEFAULT_QUEUE_INTERVAL: Duration = Duration::from_millis(5);

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Entry {
    job: Job,
    done: oneshot::Sender<()>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<VecDeque<Entry>>,
    notify: Notify,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, VecDeque<Entry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves when a queued job has run.
///
/// Yields `true` once the job completed, `false` if it was cleared (or the
/// queue shut down) before it started.
#[derive(Debug)]
pub struct Completion(oneshot::Receiver<()>);

impl Future for Completion {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        Pin::new(&mut self.0).poll(cx).map(|result| result.is_ok())
    }
}

/// Serializes jobs onto one dispatcher task.
///
/// Dropping the queue stops the dispatcher; a job already running is
/// abandoned at its next await point.
pub struct SendQueue {
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
}

impl SendQueue {
    /// Create a queue and spawn its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(interval: Duration) -> Self {
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();
        tokio::spawn(dispatch_loop(Arc::clone(&shared), interval, cancel.clone()));
        SendQueue {
            shared,
            interval,
            cancel,
        }
    }

    /// Append a job. It runs after every job queued before it.
    pub fn add<F>(&self, job: F) -> Completion
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done, completion) = oneshot::channel();
        if self.cancel.is_cancelled() {
            // Dropping `done` resolves the completion as not run.
            return Completion(completion);
        }
        self.shared.pending().push_back(Entry {
            job: Box::pin(job),
            done,
        });
        self.shared.notify.notify_one();
        Completion(completion)
    }

    /// Drop every job that has not started. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.shared.pending()).len();
        if dropped > 0 {
            debug!(dropped, "Send queue cleared");
        }
        dropped
    }

    /// Number of jobs waiting to start.
    pub fn len(&self) -> usize {
        self.shared.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minimum spacing between job starts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Clear pending jobs and stop the dispatcher. Later jobs never run.
    pub fn close(&self) {
        self.cancel.cancel();
        self.clear();
    }
}

impl Drop for SendQueue {
    fn drop(&mut self) {
        self.close();
    }
}

async fn dispatch_loop(shared: Arc<Shared>, interval: Duration, cancel: CancellationToken) {
    let mut next_start: Option<Instant> = None;

    loop {
        // Wait for work. A permit stored by `notify_one` covers a job added
        // between the emptiness check and the wait.
        while shared.pending().is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = shared.notify.notified() => {}
            }
        }

        if let Some(at) = next_start {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep_until(at) => {}
            }
        }

        // The queue may have been cleared while we slept.
        let Some(entry) = shared.pending().pop_front() else {
            continue;
        };

        next_start = Some(Instant::now() + interval);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = entry.job => {}
        }
        let _ = entry.done.send(());
    }
}

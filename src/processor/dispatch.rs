//! The dispatcher: bounded queue plus fixed worker pool.
//!
//! The inbound transport produces tasks with a non-blocking [`Dispatcher::enqueue`];
//! `QueueFull` is its backpressure signal. A fixed number of workers consume
//! from one shared bounded channel and run the task pipeline. Tasks complete
//! in no particular order across workers; within one task the pipeline is
//! strictly sequential.
//!
//! Lifecycle: `new` → `start` (spawns workers, idempotent) → `shutdown`
//! (closes intake, drains the buffer, bounded by a grace period). A panic
//! inside one task is caught at the join point and never takes down the
//! worker, the pool, or other in-flight tasks.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pipeline::{process_task, Deps};
use super::task::Task;

/// Errors returned by [`Dispatcher::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// The queue already holds `queue_size` unconsumed tasks. The caller
    /// should surface backpressure (HTTP 503), not crash.
    #[error("task queue is full")]
    QueueFull,

    /// The dispatcher was used before `start()` or after shutdown began.
    #[error("dispatcher not started")]
    NotStarted,
}

/// Result of a graceful shutdown attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// True when every worker drained and exited within the grace period.
    pub completed: bool,

    /// Workers still running when the grace period elapsed. Each may have
    /// abandoned one in-flight task.
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Started,
    Stopping,
}

struct Inner {
    state: State,
    tx: Option<mpsc::Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

/// Bounded queue and worker pool executing the task pipeline.
pub struct Dispatcher {
    pool_size: usize,
    queue_size: usize,
    deps: Arc<Deps>,
    shutdown: CancellationToken,
    inner: std::sync::Mutex<Inner>,
}

impl Dispatcher {
    /// Creates a dispatcher. Both sizes must be positive; configuration
    /// validation guarantees this for values read from file.
    pub fn new(pool_size: usize, queue_size: usize, deps: Deps) -> Self {
        debug_assert!(pool_size > 0 && queue_size > 0);
        Dispatcher {
            pool_size,
            queue_size,
            deps: Arc::new(deps),
            shutdown: CancellationToken::new(),
            inner: std::sync::Mutex::new(Inner {
                state: State::Created,
                tx: None,
                workers: Vec::new(),
            }),
        }
    }

    /// The token cancelled when shutdown abandons in-flight work. Exposed
    /// so embedders can hook additional teardown to it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawns the worker pool. Calling `start` on a running dispatcher is
    /// a logged no-op.
    pub fn start(&self) {
        let mut inner = self.inner.lock().expect("dispatcher lock poisoned");
        match inner.state {
            State::Started => {
                warn!("dispatcher already started");
                return;
            }
            State::Stopping => {
                warn!("dispatcher already stopped; not restarting");
                return;
            }
            State::Created => {}
        }

        let (tx, rx) = mpsc::channel::<Task>(self.queue_size);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        info!(
            workers = self.pool_size,
            queue_size = self.queue_size,
            "starting dispatcher"
        );

        for id in 0..self.pool_size {
            let rx = Arc::clone(&rx);
            let deps = Arc::clone(&self.deps);
            let cancel = self.shutdown.clone();
            inner
                .workers
                .push(tokio::spawn(worker_loop(id, rx, deps, cancel)));
        }

        inner.tx = Some(tx);
        inner.state = State::Started;
    }

    /// Attempts a non-blocking insert into the queue.
    ///
    /// Never blocks: a saturated buffer returns `QueueFull` immediately.
    pub fn enqueue(&self, task: Task) -> Result<(), EnqueueError> {
        let inner = self.inner.lock().expect("dispatcher lock poisoned");
        if inner.state != State::Started {
            return Err(EnqueueError::NotStarted);
        }
        let tx = inner.tx.as_ref().ok_or(EnqueueError::NotStarted)?;

        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(
                    repo = %task.repo,
                    pr = %task.pull_request.number,
                    queue_size = self.queue_size,
                    "task queue is full, rejecting"
                );
                Err(EnqueueError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::NotStarted),
        }
    }

    /// Stops accepting tasks, drains the buffer, and waits for workers up to
    /// `grace`. Buffered tasks are processed to completion; none run twice.
    /// When the grace period elapses first, the shutdown token is cancelled
    /// so in-flight watches abort, and the remaining workers are abandoned.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        let workers = {
            let mut inner = self.inner.lock().expect("dispatcher lock poisoned");
            if inner.state != State::Started {
                inner.state = State::Stopping;
                return ShutdownOutcome {
                    completed: true,
                    abandoned: 0,
                };
            }
            inner.state = State::Stopping;
            // Dropping the sender closes the queue; workers drain what is
            // buffered and then see the channel end.
            inner.tx = None;
            std::mem::take(&mut inner.workers)
        };

        info!(grace = ?grace, "dispatcher draining");

        let deadline = tokio::time::Instant::now() + grace;
        let mut abandoned = 0;
        for handle in workers {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                abandoned += 1;
            }
        }

        if abandoned > 0 {
            self.shutdown.cancel();
            warn!(
                workers = abandoned,
                "shutdown timed out, in-flight tasks may have been abandoned"
            );
            ShutdownOutcome {
                completed: false,
                abandoned,
            }
        } else {
            info!("dispatcher stopped, all workers finished");
            ShutdownOutcome {
                completed: true,
                abandoned: 0,
            }
        }
    }
}

/// One worker: pull a task, run it isolated, repeat until the queue closes
/// or shutdown abandons the pool.
async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    deps: Arc<Deps>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "worker started");
    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => None,
            task = async { rx.lock().await.recv().await } => task,
        };
        let Some(task) = task else {
            break;
        };
        run_isolated(id, task, &deps, &cancel).await;
    }
    debug!(worker = id, "worker stopped");
}

/// Runs one task in its own spawned task so a panic is contained at the
/// join point instead of unwinding the worker loop.
async fn run_isolated(id: usize, task: Task, deps: &Arc<Deps>, cancel: &CancellationToken) {
    let repo = task.repo.clone();
    let pr = task.pull_request.number;
    let pattern = task.pattern.name.clone();
    let queued_ms = chrono::Utc::now()
        .signed_duration_since(task.received_at)
        .num_milliseconds();

    debug!(worker = id, repo = %repo, pr = %pr, pattern = %pattern, queued_ms, "worker picked up task");

    let deps = Arc::clone(deps);
    let cancel = cancel.clone();
    let handle = tokio::spawn(async move { process_task(&task, &deps, &cancel).await });

    match handle.await {
        Ok(Ok(outcome)) => {
            debug!(worker = id, repo = %repo, pr = %pr, pattern = %pattern, ?outcome, "task finished");
        }
        Ok(Err(task_error)) => {
            error!(
                worker = id,
                repo = %repo,
                pr = %pr,
                pattern = %pattern,
                error = %task_error,
                "task aborted"
            );
        }
        Err(join_error) => {
            error!(
                worker = id,
                repo = %repo,
                pr = %pr,
                pattern = %pattern,
                error = %join_error,
                "task panicked; worker continues"
            );
        }
    }
}

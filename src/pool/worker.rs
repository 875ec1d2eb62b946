//! Bounded Worker Pool
//!
//! A fixed number of long-lived worker tasks share one FIFO queue of
//! connection jobs. Submitting never waits for a free worker: the job is
//! queued and the caller moves on. At most `size` jobs run at any instant.
//!
//! ## Design
//!
//! ```text
//!  submit() ──> [ unbounded mpsc queue ] ──┬──> worker-0 ──> job.await
//!                                          ├──> worker-1 ──> job.await
//!                                          └──> worker-N ──> job.await
//! ```
//!
//! Idle workers take turns holding the receiver lock; whoever holds it gets
//! the next job. A job runs in its own spawned task which the worker awaits,
//! so a panicking handler is reported but does not cost the pool a worker.
//!
//! ## Shutdown
//!
//! [`WorkerPool::shutdown`] drops the sending half. Workers keep pulling until
//! the queue is empty, so every job accepted before shutdown still runs.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// A queued unit of work: one connection's full handling.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How often a slow drain reports what it is still waiting on.
pub const DRAIN_REPORT_INTERVAL: Duration = Duration::from_secs(5);

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>;

/// Errors returned by the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// A pool needs at least one worker
    #[error("worker pool size must be at least 1")]
    ZeroSize,

    /// The pool no longer accepts work
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Occupancy counters for the pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Jobs accepted by `submit`
    pub submitted: AtomicU64,
    /// Jobs waiting for a worker
    pub queued: AtomicUsize,
    /// Jobs currently running
    pub active: AtomicUsize,
    /// Jobs that have finished, including ones that panicked
    pub completed: AtomicU64,
    /// Highest `active` value seen
    pub peak_active: AtomicUsize,
    /// Progress lines logged while waiting for a drain
    pub drain_reports: AtomicU64,
}

impl PoolStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::Relaxed)
    }

    pub fn drain_reports(&self) -> u64 {
        self.drain_reports.load(Ordering::Relaxed)
    }

    fn job_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    fn job_rejected(&self) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
        self.queued.fetch_sub(1, Ordering::Relaxed);
    }

    fn job_started(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        let now = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_active.fetch_max(now, Ordering::Relaxed);
    }

    fn job_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A fixed-size pool of async workers.
///
/// Must be started from within a Tokio runtime.
///
/// # Example
///
/// ```
/// use framecho::pool::WorkerPool;
///
/// # tokio_test::block_on(async {
/// let pool = WorkerPool::start(4).unwrap();
///
/// pool.submit(async {
///     // handle one connection...
/// })
/// .unwrap();
///
/// // Waits for every submitted job to finish
/// pool.shutdown().await;
/// assert_eq!(pool.stats().completed(), 1);
/// # });
/// ```
#[derive(Debug)]
pub struct WorkerPool {
    /// `None` once shutdown has begun
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,

    /// Taken by the first `shutdown` call
    workers: Mutex<Vec<JoinHandle<()>>>,

    stats: Arc<PoolStats>,

    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers and returns a handle to the pool.
    pub fn start(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let stats = Arc::new(PoolStats::default());

        let workers: Vec<_> = (0..size)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&receiver), Arc::clone(&stats))))
            .collect();

        info!(workers = size, "Worker pool started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
            size,
        })
    }

    /// Queues a job and returns immediately.
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(PoolError::ShutDown)?;

        // Count before sending so a worker can never observe the job first
        self.stats.job_submitted();
        if sender.send(Box::pin(job)).is_err() {
            self.stats.job_rejected();
            return Err(PoolError::ShutDown);
        }

        trace!(queued = self.stats.queued(), "Job submitted");
        Ok(())
    }

    /// Stops accepting jobs and waits until every queued and running job
    /// has finished.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));

        info!(
            queued = self.stats.queued(),
            active = self.stats.active(),
            "Draining worker pool"
        );

        self.drain(workers, DRAIN_REPORT_INTERVAL).await;

        info!(completed = self.stats.completed(), "Worker pool drained");
    }

    /// Joins the workers, logging what is still running every
    /// `report_every` so a slow drain is visible.
    async fn drain(&self, workers: Vec<JoinHandle<()>>, report_every: Duration) {
        let join_all = async {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!(error = %e, "Pool worker terminated abnormally");
                }
            }
        };
        tokio::pin!(join_all);

        let mut report = tokio::time::interval_at(Instant::now() + report_every, report_every);
        loop {
            tokio::select! {
                _ = &mut join_all => return,
                _ = report.tick() => {
                    self.stats.drain_reports.fetch_add(1, Ordering::Relaxed);
                    info!(
                        active = self.stats.active(),
                        queued = self.stats.queued(),
                        "Still draining worker pool, waiting on open connections"
                    );
                }
            }
        }
    }

    /// True once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Live occupancy counters.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// The main worker loop.
async fn worker_loop(id: usize, receiver: SharedReceiver, stats: Arc<PoolStats>) {
    trace!(worker = id, "Worker started");

    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        // Channel closed and empty
        let Some(job) = job else { break };

        stats.job_started();
        if let Err(e) = tokio::spawn(job).await {
            error!(worker = id, error = %e, "Job panicked");
        }
        stats.job_finished();
    }

    debug!(worker = id, "Worker exiting");
}
